//! wol_common
//!
//! Common utilities shared by the Wake-on-LAN scheduler crates.
//! This crate provides the error taxonomy, logging initialisation and panic recovery.

mod error;
mod logging;

pub use error::*;
pub use logging::*;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
