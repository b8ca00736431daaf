//! In-memory tabular store
//!
//! Behaves like a spreadsheet document: partitions are created with a fixed
//! default grid and reads or writes outside the grid fail until the
//! partition is resized. Used by the replay binary and by tests, which can
//! also inject backend failures.

use super::{CellWrite, StoreError, TabularStore};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

/// Default grid of a freshly created partition
pub const DEFAULT_ROWS: u32 = 1000;
pub const DEFAULT_COLS: u32 = 26;

#[derive(Debug, Clone, Default)]
struct Grid {
    rows: u32,
    cols: u32,
    cells: HashMap<(u32, u32), String>,
}

impl Grid {
    fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            cells: HashMap::new(),
        }
    }

    fn check(&self, partition: &str, row: u32, col: u32) -> Result<(), StoreError> {
        if row >= self.rows || col >= self.cols {
            return Err(StoreError::OutOfBounds {
                partition: partition.to_string(),
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    /// Rows up to the last one holding any value, each trimmed to the grid width
    fn snapshot(&self) -> Vec<Vec<String>> {
        let used_rows = self.cells.keys().map(|&(row, _)| row + 1).max().unwrap_or(0);
        let used_cols = self.cells.keys().map(|&(_, col)| col + 1).max().unwrap_or(0);
        (0..used_rows)
            .map(|row| {
                (0..used_cols)
                    .map(|col| self.cells.get(&(row, col)).cloned().unwrap_or_default())
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct Document {
    /// Partition names in creation order
    order: Vec<String>,
    partitions: HashMap<String, Grid>,
}

/// Pending injected failures, consumed one per matching call
#[derive(Debug, Default)]
struct Faults {
    metadata: u32,
    creates: u32,
    resizes: u32,
    writes: u32,
}

/// A partition's contents as exported by [`MemoryStore::dump`]
#[derive(Debug, Clone, Serialize)]
pub struct PartitionDump {
    pub name: String,
    pub rows: u32,
    pub cols: u32,
    pub cells: Vec<Vec<String>>,
}

/// In-memory ledger document. Thread-safe.
#[derive(Debug)]
pub struct MemoryStore {
    store_id: String,
    default_rows: u32,
    default_cols: u32,
    document: RwLock<Document>,
    faults: Mutex<Faults>,
    resizes: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new(store_id: impl Into<String>) -> Self {
        Self::with_default_size(store_id, DEFAULT_ROWS, DEFAULT_COLS)
    }

    /// Store whose new partitions start with a `rows` x `cols` grid.
    pub fn with_default_size(store_id: impl Into<String>, rows: u32, cols: u32) -> Self {
        Self {
            store_id: store_id.into(),
            default_rows: rows,
            default_cols: cols,
            document: RwLock::new(Document::default()),
            faults: Mutex::new(Faults::default()),
            resizes: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    /// Fail the next `n` metadata loads with a backend error.
    pub fn fail_metadata_loads(&self, n: u32) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.metadata = n;
        }
    }

    /// Fail the next `n` partition creations with a backend error.
    pub fn fail_creates(&self, n: u32) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.creates = n;
        }
    }

    /// Fail the next `n` partition resizes with a backend error.
    pub fn fail_resizes(&self, n: u32) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.resizes = n;
        }
    }

    /// Fail the next `n` cell batch writes with a backend error.
    pub fn fail_writes(&self, n: u32) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.writes = n;
        }
    }

    /// Number of resize calls served so far.
    pub fn resize_count(&self) -> u64 {
        self.resizes.load(Ordering::Relaxed)
    }

    /// Number of confirmed batch writes so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Grid size of a partition, if it exists.
    pub fn dimensions(&self, name: &str) -> Option<(u32, u32)> {
        let document = self.document.read().ok()?;
        document.partitions.get(name).map(|grid| (grid.rows, grid.cols))
    }

    /// Used rows of a partition, if it exists.
    pub fn snapshot(&self, name: &str) -> Option<Vec<Vec<String>>> {
        let document = self.document.read().ok()?;
        document.partitions.get(name).map(Grid::snapshot)
    }

    /// All partitions in document order.
    pub fn dump(&self) -> Result<Vec<PartitionDump>, StoreError> {
        let document = self.read_document()?;
        Ok(document
            .order
            .iter()
            .filter_map(|name| {
                document.partitions.get(name).map(|grid| PartitionDump {
                    name: name.clone(),
                    rows: grid.rows,
                    cols: grid.cols,
                    cells: grid.snapshot(),
                })
            })
            .collect())
    }

    /// Write rows starting at row 0, creating the partition if needed.
    /// Stands in for data left behind by an earlier process.
    pub fn seed(&self, name: &str, rows: &[&[&str]]) -> Result<(), StoreError> {
        let mut document = self.write_document()?;
        if !document.partitions.contains_key(name) {
            document.order.push(name.to_string());
            document
                .partitions
                .insert(name.to_string(), Grid::new(self.default_rows, self.default_cols));
        }
        let grid = document
            .partitions
            .get_mut(name)
            .ok_or_else(|| StoreError::PartitionMissing(name.to_string()))?;
        for (row, values) in rows.iter().enumerate() {
            for (col, value) in values.iter().enumerate() {
                let (row, col) = (row as u32, col as u32);
                grid.check(name, row, col)?;
                grid.cells.insert((row, col), value.to_string());
            }
        }
        Ok(())
    }

    fn take_fault(&self, pick: impl FnOnce(&mut Faults) -> &mut u32) -> bool {
        match self.faults.lock() {
            Ok(mut faults) => {
                let counter = pick(&mut faults);
                if *counter > 0 {
                    *counter -= 1;
                    true
                } else {
                    false
                }
            }
            Err(_) => false,
        }
    }

    fn read_document(&self) -> Result<std::sync::RwLockReadGuard<'_, Document>, StoreError> {
        self.document
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn write_document(&self) -> Result<std::sync::RwLockWriteGuard<'_, Document>, StoreError> {
        self.document
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl TabularStore for MemoryStore {
    async fn load_metadata(&self) -> Result<(), StoreError> {
        if self.take_fault(|f| &mut f.metadata) {
            return Err(StoreError::Backend("injected metadata failure".to_string()));
        }
        Ok(())
    }

    async fn partition_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read_document()?.order.clone())
    }

    async fn create_partition(&self, name: &str) -> Result<(), StoreError> {
        if self.take_fault(|f| &mut f.creates) {
            return Err(StoreError::Backend("injected create failure".to_string()));
        }
        let mut document = self.write_document()?;
        if document.partitions.contains_key(name) {
            return Err(StoreError::Backend(format!(
                "a partition named '{}' already exists",
                name
            )));
        }
        document.order.push(name.to_string());
        document
            .partitions
            .insert(name.to_string(), Grid::new(self.default_rows, self.default_cols));
        tracing::debug!(store = %self.store_id, partition = %name, "Created partition");
        Ok(())
    }

    async fn resize_partition(&self, name: &str, rows: u32, cols: u32) -> Result<(), StoreError> {
        if self.take_fault(|f| &mut f.resizes) {
            return Err(StoreError::Backend("injected resize failure".to_string()));
        }
        let mut document = self.write_document()?;
        let grid = document
            .partitions
            .get_mut(name)
            .ok_or_else(|| StoreError::PartitionMissing(name.to_string()))?;
        grid.rows = rows;
        grid.cols = cols;
        // Shrinking truncates, as a spreadsheet does
        grid.cells.retain(|&(row, col), _| row < rows && col < cols);
        self.resizes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn read_cell(&self, name: &str, row: u32, col: u32) -> Result<Option<String>, StoreError> {
        let document = self.read_document()?;
        let grid = document
            .partitions
            .get(name)
            .ok_or_else(|| StoreError::PartitionMissing(name.to_string()))?;
        grid.check(name, row, col)?;
        Ok(grid.cells.get(&(row, col)).cloned())
    }

    async fn write_cells(&self, name: &str, cells: &[CellWrite]) -> Result<(), StoreError> {
        if self.take_fault(|f| &mut f.writes) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        let mut document = self.write_document()?;
        let grid = document
            .partitions
            .get_mut(name)
            .ok_or_else(|| StoreError::PartitionMissing(name.to_string()))?;
        // Validate the whole batch before touching any cell
        for cell in cells {
            grid.check(name, cell.row, cell.col)?;
        }
        for cell in cells {
            grid.cells.insert((cell.row, cell.col), cell.value.clone());
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
