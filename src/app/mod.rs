//! Application module
//!
//! This module contains application-level functionality including:
//! - Configuration handling
//! - Logging setup

pub mod config;
pub mod logging;

pub use config::AppConfig;
pub use logging::init_logging;
