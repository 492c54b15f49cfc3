use std::{
    fmt,
    ops::{BitAnd, BitOr},
    time::{Duration, Instant},
};

use crate::replication::error::SyncSettingsError;

/// Who may originate changes to a component
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SyncFrom(u8);

impl SyncFrom {
    pub const NONE: SyncFrom = SyncFrom(0);
    pub const OWNER: SyncFrom = SyncFrom(1);
    pub const SERVER: SyncFrom = SyncFrom(2);

    pub fn contains(&self, other: SyncFrom) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// Who receives a component's changes
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SyncTo(u8);

impl SyncTo {
    pub const NONE: SyncTo = SyncTo(0);
    pub const OWNER: SyncTo = SyncTo(1);
    pub const OBSERVERS_ONLY: SyncTo = SyncTo(2);
    pub const SERVER: SyncTo = SyncTo(4);
    pub const OWNER_AND_OBSERVERS: SyncTo = SyncTo(1 | 2);

    pub fn contains(&self, other: SyncTo) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: SyncTo) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

macro_rules! impl_flag_ops {
    ($type:ident, [$(($flag:ident, $label:expr)),*]) => {
        impl BitOr for $type {
            type Output = $type;

            fn bitor(self, rhs: $type) -> $type {
                $type(self.0 | rhs.0)
            }
        }

        impl BitAnd for $type {
            type Output = $type;

            fn bitand(self, rhs: $type) -> $type {
                $type(self.0 & rhs.0)
            }
        }

        impl fmt::Debug for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_none() {
                    return write!(f, "None");
                }
                let mut first = true;
                $(
                    if self.contains($type::$flag) {
                        if !first {
                            write!(f, " | ")?;
                        }
                        write!(f, $label)?;
                        first = false;
                    }
                )*
                Ok(())
            }
        }
    };
}

impl_flag_ops!(SyncFrom, [(OWNER, "Owner"), (SERVER, "Server")]);
impl_flag_ops!(
    SyncTo,
    [(OWNER, "Owner"), (OBSERVERS_ONLY, "ObserversOnly"), (SERVER, "Server")]
);

/// How the next eligible sync time advances after a send
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncTiming {
    /// Wait at least `interval` after the last send
    #[default]
    Variable,
    /// Send on a fixed cadence of one per `interval`, even if a slot was
    /// skipped
    Fixed,
    /// Send at every opportunity
    NoInterval,
}

/// Which side of the connection is evaluating a component's settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncSide {
    Server,
    Client,
}

/// What a side knows about the object a component belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncContext {
    pub side: SyncSide,
    /// This side owns the object. Only ever true on a client.
    pub has_authority: bool,
    /// The object has an owning connection
    pub has_owner: bool,
}

impl SyncContext {
    pub fn server(has_owner: bool) -> Self {
        Self {
            side: SyncSide::Server,
            has_authority: false,
            has_owner,
        }
    }

    pub fn client(has_authority: bool) -> Self {
        Self {
            side: SyncSide::Client,
            has_authority,
            has_owner: has_authority,
        }
    }
}

/// Per-component replication policy
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyncSettings {
    pub from: SyncFrom,
    pub to: SyncTo,
    pub timing: SyncTiming,
    /// Minimum time between two sends of this component's changes
    pub interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            from: SyncFrom::SERVER,
            to: SyncTo::OWNER_AND_OBSERVERS,
            timing: SyncTiming::Variable,
            interval: Duration::from_millis(100),
        }
    }
}

impl SyncSettings {
    pub fn new(from: SyncFrom, to: SyncTo) -> Self {
        Self {
            from,
            to,
            ..Self::default()
        }
    }

    pub fn with_timing(mut self, timing: SyncTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn is_valid_direction(from: SyncFrom, to: SyncTo) -> bool {
        Self::invalid_reason(from, to).is_none()
    }

    /// Describes why a direction combination is illegal, or `None` if it
    /// is legal
    pub fn invalid_reason(from: SyncFrom, to: SyncTo) -> Option<&'static str> {
        if from.is_none() && to.is_none() {
            return None;
        }
        if from.is_none() != to.is_none() {
            return Some("either both 'from' and 'to' must be None or neither can be None");
        }
        if from.contains(SyncFrom::OWNER) && !to.contains(SyncTo::SERVER) {
            return Some("when syncing from Owner, Server must be included in 'to'");
        }
        if from.contains(SyncFrom::SERVER)
            && !to.intersects(SyncTo::OWNER_AND_OBSERVERS)
        {
            return Some(
                "when syncing from Server, either Owner or ObserversOnly must be included in 'to'",
            );
        }
        if to.contains(SyncTo::OWNER) && !from.contains(SyncFrom::SERVER) {
            return Some("when syncing to Owner, Server must be included in 'from'");
        }
        if to.contains(SyncTo::SERVER) && !from.contains(SyncFrom::OWNER) {
            return Some("when syncing to Server, Owner must be included in 'from'");
        }
        None
    }

    pub fn validate(&self) -> Result<(), SyncSettingsError> {
        match Self::invalid_reason(self.from, self.to) {
            None => Ok(()),
            Some(reason) => Err(SyncSettingsError {
                from: self.from,
                to: self.to,
                reason,
            }),
        }
    }

    /// Advances `next_sync_time` after a send at `now`
    pub fn update_time(&self, next_sync_time: &mut Option<Instant>, now: Instant) {
        *next_sync_time = Some(match self.timing {
            SyncTiming::Variable => now + self.interval,
            SyncTiming::Fixed => match next_sync_time {
                Some(previous) => *previous + self.interval,
                None => now + self.interval,
            },
            SyncTiming::NoInterval => now,
        });
    }

    /// Whether this side sends changes for the component. The server also
    /// sends the owner's changes it relays to observers.
    pub fn should_sync_from(&self, context: &SyncContext) -> bool {
        match context.side {
            SyncSide::Server => self.from.contains(SyncFrom::SERVER) || self.relays_owner_changes(),
            SyncSide::Client => {
                self.from.contains(SyncFrom::OWNER)
                    && context.has_authority
                    && self.to.contains(SyncTo::SERVER)
            }
        }
    }

    /// Whether the component's bytes only go to non-owner observers, so
    /// they are written straight into the observer writer
    pub fn to_observer_writer_only(&self, context: &SyncContext) -> bool {
        if !self.to.contains(SyncTo::OBSERVERS_ONLY) {
            return false;
        }
        if context.side == SyncSide::Client {
            return false;
        }
        if !self.to.contains(SyncTo::OWNER) {
            return true;
        }
        !context.has_owner
    }

    /// Whether bytes written for the owner are also copied to observers
    pub fn copy_to_observers(&self, context: &SyncContext) -> bool {
        context.side == SyncSide::Server
            && self.from.contains(SyncFrom::SERVER)
            && self.to.contains(SyncTo::OBSERVERS_ONLY)
    }

    /// Whether the server forwards changes it accepted from the owner to
    /// the other observers
    pub fn relays_owner_changes(&self) -> bool {
        self.from.contains(SyncFrom::OWNER) && self.to.contains(SyncTo::OBSERVERS_ONLY)
    }
}
