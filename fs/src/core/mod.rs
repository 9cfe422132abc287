//! Core types, configuration and error handling for the file cache.
//!
//! This module contains the building blocks used throughout the engine.

pub mod atomic;
pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;
