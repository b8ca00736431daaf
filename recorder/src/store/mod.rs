//! Tabular store backends
//!
//! The ledger lives in a spreadsheet-like document: a set of named
//! partitions, each a bounded grid of text cells. Reads outside the grid
//! fail with [`StoreError::OutOfBounds`] until the partition is resized.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("cell ({row}, {col}) is outside partition '{partition}' ({rows}x{cols})")]
    OutOfBounds {
        partition: String,
        row: u32,
        col: u32,
        rows: u32,
        cols: u32,
    },

    #[error("partition '{0}' does not exist")]
    PartitionMissing(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// A single cell value to write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    pub row: u32,
    pub col: u32,
    pub value: String,
}

impl CellWrite {
    pub fn new(row: u32, col: u32, value: impl Into<String>) -> Self {
        Self {
            row,
            col,
            value: value.into(),
        }
    }
}

/// Cell-level access to the ledger document.
///
/// Implementations own transport, authentication and their own caching.
/// No transactional guarantee is assumed across calls; callers serialize
/// their writes.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Refresh document metadata (partition list, partition sizes).
    async fn load_metadata(&self) -> Result<(), StoreError>;

    /// Names of all partitions, in document order.
    async fn partition_names(&self) -> Result<Vec<String>, StoreError>;

    /// Add an empty partition with the backend's default size.
    async fn create_partition(&self, name: &str) -> Result<(), StoreError>;

    /// Set the partition's grid size.
    async fn resize_partition(&self, name: &str, rows: u32, cols: u32) -> Result<(), StoreError>;

    /// Read one cell. `None` (or an empty string) means the cell is empty.
    async fn read_cell(&self, name: &str, row: u32, col: u32) -> Result<Option<String>, StoreError>;

    /// Write a batch of cells and confirm them. Returns only once the
    /// backend has acknowledged every cell of the batch.
    async fn write_cells(&self, name: &str, cells: &[CellWrite]) -> Result<(), StoreError>;
}
