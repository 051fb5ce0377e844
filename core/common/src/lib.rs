//! Common types shared across the drive CLI crates.

pub mod error;

pub use error::{Error, Result};
