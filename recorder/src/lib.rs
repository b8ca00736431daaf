//! Attendance ledger recorder library
//!
//! Turns presence events from a virtual-space session into rows of a
//! spreadsheet-like ledger: one append-only partition per month plus an
//! identity table with each participant's last known display name.

pub mod audit;
pub mod config;
pub mod dead_letter;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod resolver;
pub mod retry;
pub mod source;
pub mod store;

pub use config::RecorderConfig;
pub use error::{RecorderError, Result};
pub use pipeline::{Recorder, Sinks, SyncTask};
