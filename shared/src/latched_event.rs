/// An event that remembers that it fired.
///
/// Listeners added after the event fired are called right away with the
/// cached arguments, so late subscribers never miss it.
pub struct LatchedEvent<A: Clone> {
    listeners: Vec<Box<dyn FnMut(&A) + Send>>,
    fired: Option<A>,
}

impl<A: Clone> Default for LatchedEvent<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Clone> LatchedEvent<A> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            fired: None,
        }
    }

    pub fn add_listener<F: FnMut(&A) + Send + 'static>(&mut self, mut listener: F) {
        if let Some(args) = &self.fired {
            listener(args);
        }
        self.listeners.push(Box::new(listener));
    }

    /// Calls every listener and latches `args`. Invoking again replaces the
    /// cached arguments.
    pub fn invoke(&mut self, args: A) {
        for listener in self.listeners.iter_mut() {
            listener(&args);
        }
        self.fired = Some(args);
    }

    /// Forgets that the event fired. Listeners stay subscribed.
    pub fn reset(&mut self) {
        self.fired = None;
    }

    pub fn has_fired(&self) -> bool {
        self.fired.is_some()
    }

    pub fn last_args(&self) -> Option<&A> {
        self.fired.as_ref()
    }

    pub fn remove_all_listeners(&mut self) {
        self.listeners.clear();
    }
}
