//! scribe-core - Core types and traits for the transcript retrieval system
//!
//! This crate provides the foundational types, traits, error handling and
//! configuration used throughout the scribe workspace.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{Result, ScribeError};
pub use fingerprint::{fingerprint_bytes, fingerprint_file, fingerprint_segments};
pub use traits::*;
pub use types::*;
