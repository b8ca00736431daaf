//! Partition lookup, creation and on-demand growth

use crate::error::{RecorderError, Result};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::store::{CellWrite, StoreError, TabularStore};
use crate::{audit, metrics};
use chrono::{DateTime, FixedOffset, Utc};
use rollcall_shared::utils::time;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// How much a table is grown when a scan runs past its last row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Growth {
    /// Rows added beyond the row that was out of bounds
    pub rows: u32,
    /// Column count after growing
    pub cols: u32,
}

impl Growth {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }
}

impl Default for Growth {
    fn default() -> Self {
        Self::new(1000, 3)
    }
}

/// Cell access to one existing partition
#[derive(Clone)]
pub struct PartitionHandle {
    name: String,
    store: Arc<dyn TabularStore>,
}

impl fmt::Debug for PartitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartitionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read a cell; empty strings come back as `None`.
    pub async fn read(&self, row: u32, col: u32) -> Result<Option<String>, StoreError> {
        metrics::ROWS_SCANNED.inc();
        let value = self.store.read_cell(&self.name, row, col).await?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    /// Read a cell, growing the partition once if the cell is out of bounds.
    ///
    /// After growing, the same cell is read again; a second failure is
    /// returned to the caller as is.
    pub async fn read_or_grow(
        &self,
        row: u32,
        col: u32,
        growth: &Growth,
    ) -> Result<Option<String>, StoreError> {
        match self.read(row, col).await {
            Err(StoreError::OutOfBounds { .. }) => {
                let rows = row.saturating_add(growth.rows.max(1));
                let cols = growth.cols.max(col + 1);
                self.store.resize_partition(&self.name, rows, cols).await?;
                metrics::PARTITION_RESIZES.with_label_values(&[self.name.as_str()]).inc();
                audit::partition_grown(&self.name, row, rows, cols);
                self.read(row, col).await
            }
            other => other,
        }
    }

    /// Write and confirm a batch of cells.
    pub async fn write(&self, cells: &[CellWrite]) -> Result<(), StoreError> {
        self.store.write_cells(&self.name, cells).await
    }
}

/// Maps timestamps to monthly partitions and makes sure they exist
#[derive(Clone)]
pub struct PartitionResolver {
    store: Arc<dyn TabularStore>,
    zone: FixedOffset,
    retry: RetryPolicy,
}

impl fmt::Debug for PartitionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionResolver")
            .field("zone", &self.zone)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl PartitionResolver {
    pub fn new(store: Arc<dyn TabularStore>, zone: FixedOffset, retry: RetryPolicy) -> Self {
        Self { store, zone, retry }
    }

    /// Zone used for partition keys and rendered timestamps
    pub fn zone(&self) -> &FixedOffset {
        &self.zone
    }

    /// Partition key (`YYYY-MM`) of `ts`
    pub fn key_for(&self, ts: &DateTime<Utc>) -> String {
        time::partition_key(ts, &self.zone)
    }

    /// Handle for the monthly partition containing `ts`, creating it if needed.
    pub async fn resolve(&self, ts: &DateTime<Utc>) -> Result<PartitionHandle> {
        let key = self.key_for(ts);
        self.open(&key).await
    }

    /// Handle for the partition called `name`, creating it if needed.
    ///
    /// Each store call gets the store retry policy; once that is exhausted
    /// the failure is returned as [`RecorderError::PartitionUnavailable`].
    pub async fn open(&self, name: &str) -> Result<PartitionHandle> {
        self.ensure(name)
            .await
            .map_err(|source| RecorderError::PartitionUnavailable {
                key: name.to_string(),
                source,
            })?;
        Ok(PartitionHandle {
            name: name.to_string(),
            store: self.store.clone(),
        })
    }

    async fn ensure(&self, name: &str) -> Result<(), StoreError> {
        retry_with_backoff("load_metadata", &self.retry, || self.store.load_metadata()).await?;

        // Listing again on every attempt keeps a retried create idempotent
        let created = retry_with_backoff("ensure_partition", &self.retry, || async {
            let names = self.store.partition_names().await?;
            if names.iter().any(|existing| existing == name) {
                return Ok::<_, StoreError>(false);
            }
            self.store.create_partition(name).await?;
            Ok(true)
        })
        .await?;

        if created {
            metrics::PARTITIONS_CREATED.inc();
            info!(partition = %name, "Created partition");
        } else {
            debug!(partition = %name, "Partition exists");
        }
        Ok(())
    }
}
