mod events;
pub use events::*;
