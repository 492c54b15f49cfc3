pub mod error;
pub mod registry;
pub mod reply_table;
