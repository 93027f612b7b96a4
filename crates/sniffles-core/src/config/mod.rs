//! Configuration
//!
//! - `sniffles_config`: configuration structure
//! - `defaults`: default configuration values

pub mod defaults;
pub mod sniffles_config;

pub use sniffles_config::{FaultConfig, SnifflesConfig};
