pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::terminal::{Terminal, TerminalEvent};
pub use config::Configuration;
pub use error::{Result, TerminalError};
