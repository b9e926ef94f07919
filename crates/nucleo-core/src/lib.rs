//! # Nucleo Core
//! Shared contracts for the Nucleo workspace: the error type, the normalized
//! message record, the collaborator traits the scheduler talks through, and
//! the configuration system.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::NucleoConfig;
pub use error::{NucleoError, Result};
