pub mod connection;
pub mod gateway;
pub mod registry;
pub mod types;
