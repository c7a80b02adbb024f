//! Common utilities shared by every part of the orchestrator

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};
