//! Common utilities and types shared across kdfs crates.
//!
//! This module provides the error type used by every library crate and the
//! small value types (tree paths, sensitive buffers) that cross crate
//! boundaries.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{SensitiveBytes, TreePath};
