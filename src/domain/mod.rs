pub mod connection;
pub mod ports;
pub mod stored;
pub mod transaction;
