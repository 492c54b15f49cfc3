pub mod client_object;
pub mod prefabs;
