//! The attendance ledger
//!
//! Monthly partitions receive append-only `(identity, timestamp, label)`
//! rows; a single identity table maps identity ids to their last known
//! display name. Neither engine locks anything: both rely on being driven by
//! exactly one queue worker.

pub mod append;
pub mod cursor;
pub mod identity;
pub mod partition;

pub use append::AppendEngine;
pub use cursor::RowCursorCache;
pub use identity::{IdentityUpsertEngine, UpsertOutcome};
pub use partition::{Growth, PartitionHandle, PartitionResolver};

/// Columns of a partition row
pub const COL_IDENTITY: u32 = 0;
pub const COL_TIMESTAMP: u32 = 1;
pub const COL_LABEL: u32 = 2;

/// Columns of an identity table row
pub const COL_DISPLAY_NAME: u32 = 1;
