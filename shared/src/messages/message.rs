use std::any::Any;

use meridian_serde::Serde;

use crate::messages::message_kinds::MessageKind;

/// A type that can be sent as a standalone message.
///
/// Both ends derive the wire id from `name()`, so it has to be identical
/// in the server and client builds. The default uses the type path, which
/// holds as long as both sides compile the same protocol crate.
pub trait Message: Serde + Send + 'static {
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A decoded message of a type only known at runtime
pub struct MessageContainer {
    kind: MessageKind,
    name: &'static str,
    inner: Box<dyn Any + Send>,
}

impl MessageContainer {
    pub(crate) fn new(kind: MessageKind, name: &'static str, inner: Box<dyn Any + Send>) -> Self {
        Self { kind, name, inner }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<M: Message>(&self) -> bool {
        self.inner.is::<M>()
    }

    pub fn downcast<M: Message>(self) -> Result<M, Self> {
        if !self.inner.is::<M>() {
            return Err(self);
        }
        let kind = self.kind;
        let name = self.name;
        match self.inner.downcast::<M>() {
            Ok(message) => Ok(*message),
            Err(inner) => Err(Self { kind, name, inner }),
        }
    }
}

impl std::fmt::Debug for MessageContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContainer")
            .field("name", &self.name)
            .finish()
    }
}
