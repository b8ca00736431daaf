//! Append engine for monthly attendance partitions

use super::cursor::RowCursorCache;
use super::partition::{Growth, PartitionHandle, PartitionResolver};
use super::{COL_IDENTITY, COL_LABEL, COL_TIMESTAMP};
use crate::audit;
use crate::error::Result;
use crate::store::{CellWrite, StoreError};
use rollcall_shared::utils::time;
use rollcall_shared::{AttendanceRecord, EventLabels};
use tracing::debug;

/// Writes attendance records into the first free row of their partition.
///
/// Finding the row and writing it are two separate store round trips, so
/// the engine must only ever be driven by one task at a time. It owns the
/// cursor cache for the same reason.
#[derive(Debug)]
pub struct AppendEngine {
    partitions: PartitionResolver,
    cursors: RowCursorCache,
    growth: Growth,
    labels: EventLabels,
}

impl AppendEngine {
    pub fn new(partitions: PartitionResolver, growth: Growth, labels: EventLabels) -> Self {
        Self {
            partitions,
            cursors: RowCursorCache::new(),
            growth,
            labels,
        }
    }

    pub fn cursors(&self) -> &RowCursorCache {
        &self.cursors
    }

    /// Forget all row hints; the next append per partition rescans from row 0.
    pub fn reset_cursors(&mut self) {
        self.cursors.clear();
    }

    /// Append `record` and return the row it was written to.
    pub async fn append(&mut self, record: &AttendanceRecord) -> Result<u32> {
        let partition = self.partitions.resolve(&record.timestamp).await?;
        let row = self.find_free_row(&partition).await?;

        let label = self.labels.label(record.kind);
        let timestamp = time::format_timestamp(&record.timestamp, self.partitions.zone());
        let cells = [
            CellWrite::new(row, COL_IDENTITY, record.identity_id.as_str()),
            CellWrite::new(row, COL_TIMESTAMP, timestamp.as_str()),
            CellWrite::new(row, COL_LABEL, label),
        ];
        partition.write(&cells).await?;

        // Only a confirmed write may move the hint
        self.cursors.advance(partition.name(), row + 1);
        audit::row_appended(partition.name(), row, &record.identity_id, label);
        debug!(
            partition = %partition.name(),
            row,
            identity_id = %record.identity_id,
            timestamp = %timestamp,
            "Appended attendance row"
        );
        Ok(row)
    }

    async fn find_free_row(&self, partition: &PartitionHandle) -> Result<u32, StoreError> {
        let mut row = self.cursors.get(partition.name());
        while partition
            .read_or_grow(row, COL_IDENTITY, &self.growth)
            .await?
            .is_some()
        {
            row += 1;
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecorderError;
    use crate::retry::RetryPolicy;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use rollcall_shared::EventKind;
    use std::sync::Arc;

    fn engine(store: Arc<MemoryStore>) -> AppendEngine {
        let partitions = PartitionResolver::new(store, time::tokyo(), RetryPolicy::once());
        AppendEngine::new(partitions, Growth::default(), EventLabels::default())
    }

    fn record(id: &str, h: u32, m: u32, kind: EventKind) -> AttendanceRecord {
        // Tokyo wall-clock time on 2024-05-01
        let ts = time::tokyo()
            .with_ymd_and_hms(2024, 5, 1, h, m, 0)
            .unwrap()
            .with_timezone(&Utc);
        AttendanceRecord::new(id, ts, kind)
    }

    #[tokio::test]
    async fn test_three_records_fill_rows_in_order() {
        let store = Arc::new(MemoryStore::new("doc"));
        let mut engine = engine(store.clone());

        assert_eq!(engine.append(&record("U1", 9, 0, EventKind::Enter)).await.unwrap(), 0);
        assert_eq!(engine.append(&record("U2", 9, 5, EventKind::Enter)).await.unwrap(), 1);
        assert_eq!(engine.append(&record("U1", 18, 0, EventKind::Exit)).await.unwrap(), 2);

        assert_eq!(
            store.snapshot("2024-05").unwrap(),
            vec![
                vec!["U1", "2024/05/01 09:00:00", "Enter"],
                vec!["U2", "2024/05/01 09:05:00", "Enter"],
                vec!["U1", "2024/05/01 18:00:00", "Exit"],
            ]
        );
        assert_eq!(engine.cursors().get("2024-05"), 3);
    }

    #[tokio::test]
    async fn test_cursor_counts_successful_appends() {
        let store = Arc::new(MemoryStore::new("doc"));
        let mut engine = engine(store.clone());

        for i in 0..25 {
            engine
                .append(&record(&format!("U{}", i), 10, i, EventKind::Enter))
                .await
                .unwrap();
        }
        assert_eq!(engine.cursors().get("2024-05"), 25);
    }

    #[tokio::test]
    async fn test_growth_is_transparent() {
        let store = Arc::new(MemoryStore::with_default_size("doc", 2, 26));
        let mut engine = engine(store.clone());

        engine.append(&record("U1", 9, 0, EventKind::Enter)).await.unwrap();
        engine.append(&record("U2", 9, 1, EventKind::Enter)).await.unwrap();
        assert_eq!(store.resize_count(), 0);

        let row = engine.append(&record("U3", 9, 2, EventKind::Enter)).await.unwrap();
        assert_eq!(row, 2);
        assert_eq!(store.resize_count(), 1);
        assert_eq!(store.dimensions("2024-05"), Some((1002, 3)));
        assert_eq!(store.snapshot("2024-05").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cold_restart_rescans_past_existing_rows() {
        let store = Arc::new(MemoryStore::new("doc"));
        store
            .seed(
                "2024-05",
                &[
                    &["U9", "2024/05/01 08:00:00", "Enter"],
                    &["U9", "2024/05/01 08:30:00", "Exit"],
                ],
            )
            .unwrap();
        let mut engine = engine(store.clone());

        let row = engine.append(&record("U1", 9, 0, EventKind::Enter)).await.unwrap();
        assert_eq!(row, 2);
        assert_eq!(engine.cursors().get("2024-05"), 3);

        engine.reset_cursors();
        let row = engine.append(&record("U1", 18, 0, EventKind::Exit)).await.unwrap();
        assert_eq!(row, 3);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cursor_untouched() {
        let store = Arc::new(MemoryStore::new("doc"));
        let mut engine = engine(store.clone());
        engine.append(&record("U1", 9, 0, EventKind::Enter)).await.unwrap();

        store.fail_writes(1);
        let err = engine
            .append(&record("U2", 9, 5, EventKind::Enter))
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::StoreOperationFailed(_)));
        assert_eq!(engine.cursors().get("2024-05"), 1);

        // The row the failed write targeted is still free
        let row = engine.append(&record("U2", 9, 6, EventKind::Enter)).await.unwrap();
        assert_eq!(row, 1);
    }

    #[tokio::test]
    async fn test_failed_growth_fails_append_and_keeps_cursor() {
        let store = Arc::new(MemoryStore::with_default_size("doc", 1, 26));
        let mut engine = engine(store.clone());
        engine.append(&record("U1", 9, 0, EventKind::Enter)).await.unwrap();

        store.fail_resizes(1);
        let err = engine
            .append(&record("U2", 9, 5, EventKind::Enter))
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::StoreOperationFailed(StoreError::Backend(_))));
        assert_eq!(engine.cursors().get("2024-05"), 1);
        assert_eq!(store.resize_count(), 0);
        assert_eq!(store.dimensions("2024-05"), Some((1, 26)));

        let row = engine.append(&record("U2", 9, 6, EventKind::Enter)).await.unwrap();
        assert_eq!(row, 1);
        assert_eq!(engine.cursors().get("2024-05"), 2);
    }

    #[tokio::test]
    async fn test_records_split_by_tokyo_month() {
        let store = Arc::new(MemoryStore::new("doc"));
        let mut engine = engine(store.clone());

        // 2024-05-31 15:30 UTC is June 1st in Tokyo
        let ts = Utc.with_ymd_and_hms(2024, 5, 31, 15, 30, 0).unwrap();
        engine
            .append(&AttendanceRecord::new("U1", ts, EventKind::Enter))
            .await
            .unwrap();
        engine.append(&record("U1", 9, 0, EventKind::Enter)).await.unwrap();

        assert_eq!(store.snapshot("2024-06").unwrap()[0][1], "2024/06/01 00:30:00");
        assert_eq!(engine.cursors().get("2024-06"), 1);
        assert_eq!(engine.cursors().get("2024-05"), 1);
    }
}
