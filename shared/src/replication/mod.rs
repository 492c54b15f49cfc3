pub mod batch;
pub mod dirty;
pub mod error;
pub mod identity;
pub mod observer_set;
pub mod property;
pub mod replicate;
pub mod serializer;
pub mod sync_list;
pub mod sync_settings;
