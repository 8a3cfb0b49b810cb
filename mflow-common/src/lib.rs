//! # MasterFlow Common Library
//!
//! Shared code for MasterFlow services:
//! - Common error types
//! - TOML configuration loading and resolution helpers

pub mod config;
pub mod error;

pub use error::{Error, Result};
