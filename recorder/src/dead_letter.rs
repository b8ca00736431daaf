//! Where failed queue tasks go
//!
//! A failed task is never retried by its queue. It is handed to a sink
//! instead, so the policy for lost records stays swappable: the default
//! [`LogSink`] logs and drops, [`MemorySink`] keeps them for inspection.

use crate::error::RecorderError;
use crate::{audit, metrics};
use std::fmt;
use std::sync::Mutex;

pub trait DeadLetterSink<T>: Send + Sync {
    fn record(&self, queue: &str, task: T, error: &RecorderError);
}

/// Logs the failure on the ledger target and drops the task.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl<T: fmt::Debug> DeadLetterSink<T> for LogSink {
    fn record(&self, queue: &str, task: T, error: &RecorderError) {
        metrics::DEAD_LETTERS
            .with_label_values(&[queue, error.kind()])
            .inc();
        audit::task_dropped(queue, &format!("{:?}", task), &error.to_string());
    }
}

/// A failed task as retained by [`MemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter<T> {
    pub queue: String,
    pub task: T,
    pub error_kind: &'static str,
    pub error: String,
}

/// Keeps every failed task in memory.
#[derive(Debug)]
pub struct MemorySink<T> {
    letters: Mutex<Vec<DeadLetter<T>>>,
}

impl<T> Default for MemorySink<T> {
    fn default() -> Self {
        Self {
            letters: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> MemorySink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn letters(&self) -> Vec<DeadLetter<T>> {
        self.letters
            .lock()
            .map(|letters| letters.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.letters.lock().map(|letters| letters.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: fmt::Debug + Send> DeadLetterSink<T> for MemorySink<T> {
    fn record(&self, queue: &str, task: T, error: &RecorderError) {
        metrics::DEAD_LETTERS
            .with_label_values(&[queue, error.kind()])
            .inc();
        tracing::warn!(queue = %queue, task = ?task, error = %error, "Task dead-lettered");
        if let Ok(mut letters) = self.letters.lock() {
            letters.push(DeadLetter {
                queue: queue.to_string(),
                task,
                error_kind: error.kind(),
                error: error.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn test_memory_sink_retains_letters() {
        let sink = MemorySink::new();
        let err = RecorderError::StoreOperationFailed(StoreError::Backend("down".to_string()));
        sink.record("append", 42u32, &err);

        let letters = sink.letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].task, 42);
        assert_eq!(letters[0].queue, "append");
        assert_eq!(letters[0].error_kind, "store_operation_failed");
    }

    #[test]
    fn test_log_sink_accepts_any_debug_task() {
        let sink = LogSink;
        DeadLetterSink::<&str>::record(&sink, "identity-sync", "U1", &RecorderError::Cancelled);
    }
}
