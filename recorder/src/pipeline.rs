//! Wires the presence source to the two ledger queues.
//!
//! ```text
//!   source ──signal──▶ Recorder::dispatch
//!                         │ enter            │ enter / exit
//!                         ▼                  ▼
//!                 identity-sync queue     append queue
//!                 (resolve name, upsert)  (append row)
//! ```

use crate::config::RecorderConfig;
use crate::dead_letter::{DeadLetterSink, LogSink};
use crate::error::{RecorderError, Result};
use crate::ledger::{AppendEngine, IdentityUpsertEngine, PartitionResolver};
use crate::metrics;
use crate::queue::{SingleWriterQueue, TaskHandler};
use crate::resolver::PresenceResolver;
use crate::source::{PresenceSource, SourceSignal};
use crate::store::TabularStore;
use async_trait::async_trait;
use rollcall_shared::{AttendanceRecord, EventKind, IdentityId, PresenceEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const APPEND_QUEUE: &str = "append";
pub const IDENTITY_SYNC_QUEUE: &str = "identity-sync";

#[async_trait]
impl TaskHandler for AppendEngine {
    type Task = AttendanceRecord;

    async fn handle(&mut self, record: &AttendanceRecord) -> Result<()> {
        self.append(record).await.map(|_| ())
    }
}

/// Identity-sync task: make the identity table reflect the identity's
/// current display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    pub identity_id: IdentityId,
}

/// Resolves an identity's name, then upserts it
pub struct IdentitySync {
    resolver: PresenceResolver,
    engine: IdentityUpsertEngine,
}

impl IdentitySync {
    pub fn new(resolver: PresenceResolver, engine: IdentityUpsertEngine) -> Self {
        Self { resolver, engine }
    }

    pub fn engine(&self) -> &IdentityUpsertEngine {
        &self.engine
    }
}

#[async_trait]
impl TaskHandler for IdentitySync {
    type Task = SyncTask;

    async fn handle(&mut self, task: &SyncTask) -> Result<()> {
        let identity = self.resolver.resolve_identity(&task.identity_id).await?;
        // resolve_identity only returns named identities
        let name = identity.name().unwrap_or_default();
        self.engine.upsert(&identity.id, name).await.map(|_| ())
    }
}

/// Dead-letter sinks for both queues
#[derive(Clone)]
pub struct Sinks {
    pub append: Arc<dyn DeadLetterSink<AttendanceRecord>>,
    pub identity_sync: Arc<dyn DeadLetterSink<SyncTask>>,
}

impl Default for Sinks {
    fn default() -> Self {
        Self {
            append: Arc::new(LogSink),
            identity_sync: Arc::new(LogSink),
        }
    }
}

/// Handlers returned by [`Recorder::shutdown`] once both queues drained
#[derive(Debug)]
pub struct Drained {
    pub append: AppendEngine,
    pub identity_sync: IdentitySync,
}

impl std::fmt::Debug for IdentitySync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySync")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

fn invalid_config(e: anyhow::Error) -> RecorderError {
    RecorderError::InvalidConfig(format!("{:#}", e))
}

pub struct Recorder {
    source: Arc<dyn PresenceSource>,
    append: SingleWriterQueue<AppendEngine>,
    identity_sync: SingleWriterQueue<IdentitySync>,
    cancel: CancellationToken,
}

impl Recorder {
    /// Build the engines from `config` and spawn both queue workers.
    pub fn spawn(
        config: &RecorderConfig,
        store: Arc<dyn TabularStore>,
        source: Arc<dyn PresenceSource>,
        sinks: Sinks,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();
        let partitions = PartitionResolver::new(
            store,
            config.zone().map_err(invalid_config)?,
            config.retry_policy().map_err(invalid_config)?,
        );

        let append = AppendEngine::new(
            partitions.clone(),
            config.partition_growth(),
            config.labels(),
        );
        let identity_sync = IdentitySync::new(
            PresenceResolver::new(
                source.clone(),
                config.poll_policy().map_err(invalid_config)?,
                cancel.child_token(),
            ),
            IdentityUpsertEngine::new(
                partitions,
                config.identity_table.clone(),
                config.identity_growth(),
            ),
        );

        Ok(Self {
            append: SingleWriterQueue::spawn(
                APPEND_QUEUE,
                config.queue_capacity,
                append,
                sinks.append,
                cancel.child_token(),
            ),
            identity_sync: SingleWriterQueue::spawn(
                IDENTITY_SYNC_QUEUE,
                config.queue_capacity,
                identity_sync,
                sinks.identity_sync,
                cancel.child_token(),
            ),
            source,
            cancel,
        })
    }

    /// Token that stops the run loop, the identity poller and both queues.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tasks waiting in the (append, identity-sync) queues.
    pub fn backlog(&self) -> (usize, usize) {
        (self.append.backlog(), self.identity_sync.backlog())
    }

    /// Route one presence event to the queues.
    ///
    /// Every event is admitted to the append queue. Entries also request an
    /// identity sync, without waiting: when the identity-sync queue is full
    /// the request goes to its dead-letter sink so name lookups never hold
    /// up attendance rows. An event whose connection has no identity is
    /// rejected with [`RecorderError::IdentityUnresolved`].
    pub async fn dispatch(&self, event: PresenceEvent) -> Result<()> {
        metrics::EVENTS_TOTAL
            .with_label_values(&[event.kind.as_str()])
            .inc();

        let identity_id = self
            .source
            .identity_for_connection(&event.connection_id)
            .ok_or_else(|| RecorderError::IdentityUnresolved {
                connection_id: event.connection_id.clone(),
            })?;
        debug!(
            kind = %event.kind,
            connection_id = %event.connection_id,
            identity_id = %identity_id,
            "Presence event"
        );

        self.append
            .push(AttendanceRecord::from_event(identity_id.clone(), &event))
            .await?;

        if event.kind == EventKind::Enter {
            match self.identity_sync.try_push(SyncTask { identity_id }) {
                Ok(()) => {}
                Err(e @ RecorderError::QueueFull(_)) => {
                    warn!(error = %e, "Identity sync skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Consume source signals until the channel closes or the recorder is
    /// cancelled.
    pub async fn run(&self, mut signals: mpsc::Receiver<SourceSignal>) -> Result<()> {
        info!("Recorder running");
        loop {
            let signal = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Recorder cancelled");
                    return Ok(());
                }
                signal = signals.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
            };

            match signal {
                SourceSignal::Connected => info!("Presence source connected"),
                SourceSignal::Disconnected { code, reason } => {
                    let err = RecorderError::SourceUnavailable(format!("{} ({})", reason, code));
                    warn!(error = %err, "Presence source disconnected, reconnecting");
                    metrics::SOURCE_RECONNECTS.inc();
                    if let Err(e) = self.source.reconnect().await {
                        error!(error = %e, "Reconnect failed");
                    }
                }
                SourceSignal::Presence(event) => match self.dispatch(event).await {
                    Ok(()) => {}
                    Err(e @ RecorderError::IdentityUnresolved { .. }) => {
                        metrics::EVENTS_DROPPED
                            .with_label_values(&[e.kind()])
                            .inc();
                        warn!(error = %e, "Dropping presence event");
                    }
                    Err(e) => return Err(e),
                },
            }
        }
        info!("Presence source closed");
        Ok(())
    }

    /// Stop both queues after their in-flight tasks; queued tasks are
    /// dead-lettered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain both queues and return their handlers.
    pub async fn shutdown(self) -> Result<Drained> {
        let (append, identity_sync) =
            tokio::join!(self.append.shutdown(), self.identity_sync.shutdown());
        Ok(Drained {
            append: append?,
            identity_sync: identity_sync?,
        })
    }
}
