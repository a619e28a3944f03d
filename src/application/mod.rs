pub mod bridge;
pub mod connection;
pub mod coordinator;
pub mod queue;
pub mod terminal;
