//! `cadence-core` — configuration and error types shared by the scheduler
//! engine and its hosts.

pub mod config;
pub mod error;

pub use config::CadenceConfig;
pub use error::{CadenceError, Result};
