//! Identity table upserts
//!
//! One row per identity: `(identity_id, display_name)`. Unlike partitions,
//! rows are rewritten in place when a known identity shows up with a new
//! name. The table is small, so every upsert scans from row 0.

use super::partition::{Growth, PartitionResolver};
use super::{COL_DISPLAY_NAME, COL_IDENTITY};
use crate::audit;
use crate::error::Result;
use crate::store::CellWrite;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was created for the identity
    Inserted { row: u32 },
    /// The identity's existing row got the new name
    Updated { row: u32 },
}

impl UpsertOutcome {
    pub fn row(&self) -> u32 {
        match self {
            Self::Inserted { row } | Self::Updated { row } => *row,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted { .. } => "inserted",
            Self::Updated { .. } => "updated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdentityUpsertEngine {
    partitions: PartitionResolver,
    table: String,
    growth: Growth,
}

impl IdentityUpsertEngine {
    pub fn new(partitions: PartitionResolver, table: impl Into<String>, growth: Growth) -> Self {
        Self {
            partitions,
            table: table.into(),
            growth,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Set the display name of `identity_id`, creating its row on first sight.
    pub async fn upsert(&self, identity_id: &str, display_name: &str) -> Result<UpsertOutcome> {
        let table = self.partitions.open(&self.table).await?;

        let mut row = 0;
        let outcome = loop {
            let cell = table.read_or_grow(row, COL_IDENTITY, &self.growth).await?;
            match cell.as_deref() {
                Some(existing) if existing == identity_id => {
                    table
                        .write(&[CellWrite::new(row, COL_DISPLAY_NAME, display_name)])
                        .await?;
                    break UpsertOutcome::Updated { row };
                }
                None => {
                    table
                        .write(&[
                            CellWrite::new(row, COL_IDENTITY, identity_id),
                            CellWrite::new(row, COL_DISPLAY_NAME, display_name),
                        ])
                        .await?;
                    break UpsertOutcome::Inserted { row };
                }
                Some(_) => row += 1,
            }
        };

        audit::identity_upserted(&self.table, outcome.row(), identity_id, outcome.as_str());
        debug!(
            table = %self.table,
            row = outcome.row(),
            identity_id = %identity_id,
            display_name = %display_name,
            "Synced identity"
        );
        Ok(outcome)
    }
}
