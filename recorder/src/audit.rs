//! Structured ledger events.
//!
//! Every confirmed ledger write and every dropped task is emitted via
//! `tracing` with a dedicated target so they can be filtered and formatted
//! (e.g. JSON) independently of operational logs.

use tracing::{info, warn};

const LEDGER_TARGET: &str = "rollcall::ledger";

/// A record was written and confirmed in a partition.
pub fn row_appended(partition: &str, row: u32, identity_id: &str, label: &str) {
    info!(
        target: LEDGER_TARGET,
        event = "row_appended",
        partition = %partition,
        row,
        identity_id = %identity_id,
        label = %label,
    );
}

/// An identity row was created or renamed.
pub fn identity_upserted(table: &str, row: u32, identity_id: &str, outcome: &str) {
    info!(
        target: LEDGER_TARGET,
        event = "identity_upserted",
        table = %table,
        row,
        identity_id = %identity_id,
        outcome = %outcome,
    );
}

/// A partition had to be grown to reach `row`.
pub fn partition_grown(partition: &str, row: u32, rows: u32, cols: u32) {
    info!(
        target: LEDGER_TARGET,
        event = "partition_grown",
        partition = %partition,
        row,
        rows,
        cols,
    );
}

/// A task was discarded after failing.
pub fn task_dropped(queue: &str, task: &str, error: &str) {
    warn!(
        target: LEDGER_TARGET,
        event = "task_dropped",
        queue = %queue,
        task = %task,
        error = %error,
    );
}
