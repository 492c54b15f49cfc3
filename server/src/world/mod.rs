pub mod server_object;
pub mod visibility;
