//! Single-writer task queues
//!
//! Each queue is a bounded channel drained by exactly one worker task. The
//! worker owns its handler, so at most one task per queue is ever in flight
//! and tasks start strictly in admission order. Independent queues run
//! concurrently with each other.
//!
//! A failed task goes to the queue's dead-letter sink and the worker moves
//! on to the next one. On cancellation the worker stops after the in-flight
//! task and dead-letters whatever is still queued; on shutdown it drains
//! the backlog first and hands the handler back.

use crate::dead_letter::DeadLetterSink;
use crate::error::{RecorderError, Result};
use crate::metrics;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Processes one task at a time for a queue.
#[async_trait]
pub trait TaskHandler: Send + 'static {
    type Task: fmt::Debug + Send + 'static;

    async fn handle(&mut self, task: &Self::Task) -> Result<()>;
}

pub struct SingleWriterQueue<H: TaskHandler> {
    name: &'static str,
    sender: mpsc::Sender<H::Task>,
    backlog: Arc<AtomicUsize>,
    sink: Arc<dyn DeadLetterSink<H::Task>>,
    cancel: CancellationToken,
    worker: JoinHandle<H>,
}

impl<H: TaskHandler> fmt::Debug for SingleWriterQueue<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleWriterQueue")
            .field("name", &self.name)
            .field("backlog", &self.backlog())
            .finish_non_exhaustive()
    }
}

impl<H: TaskHandler> SingleWriterQueue<H> {
    /// Spawn the worker. Must be called from within a tokio runtime.
    pub fn spawn(
        name: &'static str,
        capacity: usize,
        handler: H,
        sink: Arc<dyn DeadLetterSink<H::Task>>,
        cancel: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let backlog = Arc::new(AtomicUsize::new(0));
        metrics::QUEUE_BACKLOG.with_label_values(&[name]).set(0.0);

        let worker = tokio::spawn(run_worker(
            name,
            handler,
            receiver,
            sink.clone(),
            backlog.clone(),
            cancel.clone(),
        ));

        Self {
            name,
            sender,
            backlog,
            sink,
            cancel,
            worker,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Admit a task. Waits while the queue is at capacity.
    pub async fn push(&self, task: H::Task) -> Result<()> {
        // Count before sending so the worker never decrements below zero
        track_backlog(self.name, &self.backlog, 1);
        if self.sender.send(task).await.is_err() {
            track_backlog(self.name, &self.backlog, -1);
            return Err(RecorderError::QueueClosed(self.name));
        }
        Ok(())
    }

    /// Admit a task without waiting. A task that does not fit is handed to
    /// the dead-letter sink and [`RecorderError::QueueFull`] is returned.
    pub fn try_push(&self, task: H::Task) -> Result<()> {
        track_backlog(self.name, &self.backlog, 1);
        match self.sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(task)) => {
                track_backlog(self.name, &self.backlog, -1);
                let err = RecorderError::QueueFull(self.name);
                metrics::QUEUE_TASKS.with_label_values(&[self.name, "rejected"]).inc();
                self.sink.record(self.name, task, &err);
                Err(err)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                track_backlog(self.name, &self.backlog, -1);
                Err(RecorderError::QueueClosed(self.name))
            }
        }
    }

    /// Tasks admitted and not yet started.
    pub fn backlog(&self) -> usize {
        self.backlog.load(Ordering::SeqCst)
    }

    /// Stop after the in-flight task; queued tasks are dead-lettered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Close admission, wait for the worker to finish, and return the handler.
    pub async fn shutdown(self) -> Result<H> {
        let Self {
            name,
            sender,
            worker,
            ..
        } = self;
        drop(sender);
        worker.await.map_err(|e| {
            error!(queue = name, error = %e, "Queue worker panicked");
            RecorderError::QueueClosed(name)
        })
    }
}

fn track_backlog(name: &str, backlog: &AtomicUsize, delta: isize) {
    let current = if delta >= 0 {
        backlog.fetch_add(delta as usize, Ordering::SeqCst) + delta as usize
    } else {
        backlog.fetch_sub(delta.unsigned_abs(), Ordering::SeqCst) - delta.unsigned_abs()
    };
    metrics::QUEUE_BACKLOG
        .with_label_values(&[name])
        .set(current as f64);
}

async fn run_worker<H: TaskHandler>(
    name: &'static str,
    mut handler: H,
    mut receiver: mpsc::Receiver<H::Task>,
    sink: Arc<dyn DeadLetterSink<H::Task>>,
    backlog: Arc<AtomicUsize>,
    cancel: CancellationToken,
) -> H {
    info!(queue = name, "Queue worker started");

    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = receiver.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };
        track_backlog(name, &backlog, -1);

        debug!(queue = name, task = ?task, "Task started");
        let start = Instant::now();
        let result = handler.handle(&task).await;
        metrics::QUEUE_TASK_DURATION
            .with_label_values(&[name])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                metrics::QUEUE_TASKS.with_label_values(&[name, "ok"]).inc();
            }
            Err(e) => {
                metrics::QUEUE_TASKS.with_label_values(&[name, "failed"]).inc();
                sink.record(name, task, &e);
            }
        }
    }

    // Only reachable with a backlog after cancellation
    receiver.close();
    while let Ok(task) = receiver.try_recv() {
        track_backlog(name, &backlog, -1);
        metrics::QUEUE_TASKS.with_label_values(&[name, "cancelled"]).inc();
        sink.record(name, task, &RecorderError::Cancelled);
    }

    info!(queue = name, "Queue worker stopped");
    handler
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dead_letter::MemorySink;
    use crate::store::StoreError;
    use std::time::Duration;

    /// Records the order tasks ran in; fails on odd numbers if asked to
    #[derive(Default)]
    struct Recording {
        seen: Vec<u32>,
        fail_odd: bool,
        in_flight: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TaskHandler for Recording {
        type Task = u32;

        async fn handle(&mut self, task: &u32) -> Result<()> {
            let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst);
            assert_eq!(concurrent, 0, "two tasks in flight");
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_odd && task % 2 == 1 {
                return Err(StoreError::Backend(format!("task {}", task)).into());
            }
            self.seen.push(*task);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_tasks_run_one_at_a_time_in_order() {
        let sink = Arc::new(MemorySink::<u32>::new());
        let queue = SingleWriterQueue::spawn(
            "test-order",
            4,
            Recording::default(),
            sink.clone(),
            CancellationToken::new(),
        );

        for i in 0..20 {
            queue.push(i).await.unwrap();
        }
        let handler = queue.shutdown().await.unwrap();

        assert_eq!(handler.seen, (0..20).collect::<Vec<_>>());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_failed_tasks_are_dead_lettered_and_queue_continues() {
        let sink = Arc::new(MemorySink::<u32>::new());
        let handler = Recording {
            fail_odd: true,
            ..Default::default()
        };
        let queue = SingleWriterQueue::spawn(
            "test-failures",
            8,
            handler,
            sink.clone(),
            CancellationToken::new(),
        );

        for i in 0..6 {
            queue.push(i).await.unwrap();
        }
        let handler = queue.shutdown().await.unwrap();

        assert_eq!(handler.seen, vec![0, 2, 4]);
        let failed: Vec<u32> = sink.letters().into_iter().map(|l| l.task).collect();
        assert_eq!(failed, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_cancel_dead_letters_backlog() {
        let sink = Arc::new(MemorySink::<u32>::new());
        let cancel = CancellationToken::new();
        let queue = SingleWriterQueue::spawn(
            "test-cancel",
            16,
            Recording::default(),
            sink.clone(),
            cancel.clone(),
        );

        for i in 0..10 {
            queue.push(i).await.unwrap();
        }
        queue.cancel();
        let handler = queue.shutdown().await.unwrap();

        // Whatever did not run was handed to the sink as cancelled
        let letters = sink.letters();
        assert_eq!(handler.seen.len() + letters.len(), 10);
        assert!(letters.iter().all(|l| l.error_kind == "cancelled"));
        let mut all: Vec<u32> = handler.seen.clone();
        all.extend(letters.iter().map(|l| l.task));
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    /// Holds every task until released
    struct Gate(Arc<tokio::sync::Semaphore>);

    #[async_trait]
    impl TaskHandler for Gate {
        type Task = u32;

        async fn handle(&mut self, _task: &u32) -> Result<()> {
            let _open = self.0.acquire().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_try_push_dead_letters_when_full() {
        let sink = Arc::new(MemorySink::<u32>::new());
        let release = Arc::new(tokio::sync::Semaphore::new(0));
        let queue = SingleWriterQueue::spawn(
            "test-full",
            1,
            Gate(release.clone()),
            sink.clone(),
            CancellationToken::new(),
        );

        queue.try_push(0).unwrap();
        // Wait for the worker to take task 0 so exactly one slot is free
        while queue.backlog() > 0 {
            tokio::task::yield_now().await;
        }
        queue.try_push(1).unwrap();

        let err = queue.try_push(2).unwrap_err();
        assert!(matches!(err, RecorderError::QueueFull("test-full")));
        assert_eq!(queue.backlog(), 1);

        let letters = sink.letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].task, 2);
        assert_eq!(letters[0].error_kind, "queue_full");

        release.add_permits(1);
        queue.shutdown().await.unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_push_after_worker_stopped_is_rejected() {
        let cancel = CancellationToken::new();
        let queue = SingleWriterQueue::spawn(
            "test-closed",
            2,
            Recording::default(),
            Arc::new(MemorySink::<u32>::new()),
            cancel.clone(),
        );
        cancel.cancel();
        // Let the worker observe the cancellation and drop its receiver
        while !queue.worker.is_finished() {
            tokio::task::yield_now().await;
        }

        let err = queue.push(1).await.unwrap_err();
        assert!(matches!(err, RecorderError::QueueClosed("test-closed")));
        assert_eq!(queue.backlog(), 0);
    }
}
