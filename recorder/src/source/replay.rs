//! Replay source: presence events read from newline-delimited JSON
//!
//! Each line is one of
//!
//! ```text
//! {"type":"profile","connection_id":"c1","identity_id":"U1","display_name":"Alice"}
//! {"type":"enter","connection_id":"c1","timestamp":"2024-05-01T00:00:00Z"}
//! {"type":"exit","connection_id":"c1"}
//! {"type":"disconnect","code":1006,"reason":"network"}
//! {"type":"wait","ms":1500}
//! ```
//!
//! `profile` lines update the session directory (a profile without a
//! display name models an identity whose metadata has not propagated yet);
//! `enter`/`exit` default to the current time when no timestamp is given.

use super::{PresenceSource, SourceSignal};
use crate::error::{RecorderError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollcall_shared::{ConnectionId, EventKind, Identity, IdentityId, PresenceEvent};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayLine {
    Profile {
        #[serde(default)]
        connection_id: Option<ConnectionId>,
        identity_id: IdentityId,
        #[serde(default)]
        display_name: Option<String>,
    },
    Enter {
        connection_id: ConnectionId,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    Exit {
        connection_id: ConnectionId,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    Disconnect {
        #[serde(default)]
        code: u16,
        #[serde(default)]
        reason: String,
    },
    Wait {
        ms: u64,
    },
}

#[derive(Debug, Default)]
struct Directory {
    connections: HashMap<ConnectionId, IdentityId>,
    identities: HashMap<IdentityId, Identity>,
}

#[derive(Debug)]
pub struct ReplaySource {
    directory: RwLock<Directory>,
    /// Taken when the replay is finished so the recorder sees the end of input
    signals: Mutex<Option<mpsc::Sender<SourceSignal>>>,
    reconnects: AtomicU64,
}

impl ReplaySource {
    pub fn new(signals: mpsc::Sender<SourceSignal>) -> Self {
        Self {
            directory: RwLock::new(Directory::default()),
            signals: Mutex::new(Some(signals)),
            reconnects: AtomicU64::new(0),
        }
    }

    /// Add or update an identity, optionally binding it to a connection.
    pub fn register(&self, connection_id: Option<&str>, identity: Identity) {
        if let Ok(mut directory) = self.directory.write() {
            if let Some(connection_id) = connection_id {
                directory
                    .connections
                    .insert(connection_id.to_string(), identity.id.clone());
            }
            directory.identities.insert(identity.id.clone(), identity);
        }
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Stop delivering signals. The recorder's run loop ends once the
    /// channel is drained.
    pub fn close(&self) {
        if let Ok(mut signals) = self.signals.lock() {
            signals.take();
        }
    }

    /// Apply one replay line.
    pub async fn apply(&self, line: ReplayLine) -> Result<()> {
        match line {
            ReplayLine::Profile {
                connection_id,
                identity_id,
                display_name,
            } => {
                self.register(connection_id.as_deref(), Identity::new(identity_id, display_name));
                Ok(())
            }
            ReplayLine::Enter {
                connection_id,
                timestamp,
            } => {
                let ts = timestamp.unwrap_or_else(Utc::now);
                self.send(SourceSignal::Presence(PresenceEvent::new(EventKind::Enter, connection_id, ts)))
                    .await
            }
            ReplayLine::Exit {
                connection_id,
                timestamp,
            } => {
                let ts = timestamp.unwrap_or_else(Utc::now);
                self.send(SourceSignal::Presence(PresenceEvent::new(EventKind::Exit, connection_id, ts)))
                    .await
            }
            ReplayLine::Disconnect { code, reason } => {
                self.send(SourceSignal::Disconnected { code, reason }).await
            }
            ReplayLine::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(())
            }
        }
    }

    /// Replay every line of `reader`, then close the source. Malformed
    /// lines are logged and skipped. Returns the number of applied lines.
    pub async fn feed<R>(&self, reader: R) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        self.feed_until(reader, &CancellationToken::new()).await
    }

    /// Like [`ReplaySource::feed`], but stops as soon as `cancel` fires,
    /// even while waiting for the next line or inside a `wait`.
    pub async fn feed_until<R>(&self, reader: R, cancel: &CancellationToken) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut applied = 0;
        let mut line_no = 0;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = lines.next_line() => next,
            };
            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    self.close();
                    return Err(RecorderError::SourceUnavailable(e.to_string()));
                }
            };
            line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let parsed = match serde_json::from_str::<ReplayLine>(trimmed) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(line = line_no, error = %e, "Skipping malformed replay line");
                    continue;
                }
            };
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.apply(parsed) => outcome,
            };
            if let Err(e) = outcome {
                self.close();
                return Err(e);
            }
            applied += 1;
        }

        if cancel.is_cancelled() {
            info!(lines = applied, "Replay cancelled");
        } else {
            info!(lines = applied, "Replay finished");
        }
        self.close();
        Ok(applied)
    }

    async fn send(&self, signal: SourceSignal) -> Result<()> {
        let sender = self
            .signals
            .lock()
            .ok()
            .and_then(|signals| signals.clone())
            .ok_or_else(|| RecorderError::SourceUnavailable("replay source closed".to_string()))?;
        sender
            .send(signal)
            .await
            .map_err(|_| RecorderError::SourceUnavailable("recorder stopped listening".to_string()))
    }
}

#[async_trait]
impl PresenceSource for ReplaySource {
    async fn reconnect(&self) -> Result<()> {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        let sender = self.signals.lock().ok().and_then(|signals| signals.clone());
        match sender {
            Some(sender) => {
                // The recorder is the reader of this channel; never block on it here
                if sender.try_send(SourceSignal::Connected).is_err() {
                    debug!("Signal channel full, skipping connected notification");
                }
                Ok(())
            }
            None => Err(RecorderError::SourceUnavailable("replay source closed".to_string())),
        }
    }

    fn identity_for_connection(&self, connection_id: &str) -> Option<IdentityId> {
        self.directory
            .read()
            .ok()?
            .connections
            .get(connection_id)
            .cloned()
    }

    fn lookup_identity(&self, identity_id: &str) -> Option<Identity> {
        self.directory
            .read()
            .ok()?
            .identities
            .get(identity_id)
            .cloned()
    }
}
