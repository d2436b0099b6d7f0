//! Core types for mmpack-build.
//!
//! This crate provides the error type and the loose version type shared by
//! all mmpack-build crates.

pub mod error;
pub mod version;

pub use error::{Error, ErrorCode, Fix, Result};
pub use version::Version;
