pub mod build;
pub mod catalog;
pub mod command;
pub mod complete;
pub mod config;
pub mod container;
pub mod error;
pub mod executor;
pub mod images;
pub mod listing;
pub mod log_sanitize;
pub mod ports;
pub mod workspace;

pub use error::{Error, Result};
