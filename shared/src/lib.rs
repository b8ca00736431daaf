//! Shared types and utilities for Rollcall
//!
//! This crate contains the presence and attendance data structures and the
//! ledger time helpers used by the recorder and its tests.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{presence::*, record::*};
