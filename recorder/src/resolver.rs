//! Waits for an identity's display name to materialize.
//!
//! Entry notifications can arrive before the session has propagated the
//! participant's profile, so the identity is polled at a fixed interval.
//! Polling is bounded by an attempt budget and an optional deadline and
//! can be cancelled.

use crate::error::{RecorderError, Result};
use crate::metrics;
use crate::source::PresenceSource;
use rollcall_shared::Identity;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before each lookup
    pub interval: Duration,
    /// Lookups before giving up
    pub max_attempts: u32,
    /// Overall deadline, if any
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_attempts: 300,
            timeout: None,
        }
    }
}

pub struct PresenceResolver {
    source: Arc<dyn PresenceSource>,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl PresenceResolver {
    pub fn new(source: Arc<dyn PresenceSource>, policy: PollPolicy, cancel: CancellationToken) -> Self {
        Self {
            source,
            policy,
            cancel,
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll until `identity_id` resolves to an identity with a non-blank
    /// display name.
    ///
    /// Fails with [`RecorderError::IdentityTimeout`] once the attempt budget
    /// or deadline runs out, and with [`RecorderError::Cancelled`] when the
    /// resolver's token is cancelled.
    pub async fn resolve_identity(&self, identity_id: &str) -> Result<Identity> {
        let mut attempts = 0u32;
        let outcome = {
            let poll = self.poll(identity_id, &mut attempts);
            let bounded = async {
                match self.policy.timeout {
                    Some(limit) => tokio::time::timeout(limit, poll).await.ok().flatten(),
                    None => poll.await,
                }
            };
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(RecorderError::Cancelled),
                outcome = bounded => outcome,
            }
        };

        match outcome {
            Some(identity) => {
                debug!(identity_id = %identity_id, attempts, "Identity resolved");
                Ok(identity)
            }
            None => Err(RecorderError::IdentityTimeout {
                identity_id: identity_id.to_string(),
                attempts,
            }),
        }
    }

    async fn poll(&self, identity_id: &str, attempts: &mut u32) -> Option<Identity> {
        while *attempts < self.policy.max_attempts {
            tokio::time::sleep(self.policy.interval).await;
            *attempts += 1;
            metrics::IDENTITY_POLLS.inc();
            match self.source.lookup_identity(identity_id) {
                Some(identity) if identity.name().is_some() => return Some(identity),
                _ => trace!(identity_id = %identity_id, attempt = *attempts, "Identity not ready"),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rollcall_shared::IdentityId;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Unknown for the first `unknown_for` lookups, then named
    struct Stub {
        unknown_for: u32,
        lookups: AtomicU32,
    }

    impl Stub {
        fn new(unknown_for: u32) -> Arc<Self> {
            Arc::new(Self {
                unknown_for,
                lookups: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl PresenceSource for Stub {
        async fn reconnect(&self) -> Result<()> {
            Ok(())
        }

        fn identity_for_connection(&self, _connection_id: &str) -> Option<IdentityId> {
            None
        }

        fn lookup_identity(&self, identity_id: &str) -> Option<Identity> {
            let n = self.lookups.fetch_add(1, Ordering::SeqCst);
            if n < self.unknown_for {
                // Alternate between absent and present-without-name
                (n % 2 == 1).then(|| Identity::new(identity_id, None))
            } else {
                Some(Identity::new(identity_id, Some("Alice".to_string())))
            }
        }
    }

    fn policy(max_attempts: u32, timeout: Option<Duration>) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1000),
            max_attempts,
            timeout,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_converges_after_m_unknown_lookups() {
        let stub = Stub::new(4);
        let resolver = PresenceResolver::new(stub.clone(), policy(10, None), CancellationToken::new());

        let identity = resolver.resolve_identity("U1").await.unwrap();
        assert_eq!(identity.name(), Some("Alice"));
        assert_eq!(stub.lookups.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_exhausted() {
        let stub = Stub::new(u32::MAX);
        let resolver = PresenceResolver::new(stub.clone(), policy(3, None), CancellationToken::new());

        let err = resolver.resolve_identity("U1").await.unwrap_err();
        assert!(matches!(err, RecorderError::IdentityTimeout { attempts: 3, .. }));
        assert_eq!(stub.lookups.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exhausted() {
        let stub = Stub::new(u32::MAX);
        let resolver = PresenceResolver::new(
            stub.clone(),
            policy(100, Some(Duration::from_millis(2500))),
            CancellationToken::new(),
        );

        let err = resolver.resolve_identity("U1").await.unwrap_err();
        assert!(matches!(err, RecorderError::IdentityTimeout { attempts: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_while_waiting() {
        let stub = Stub::new(u32::MAX);
        let cancel = CancellationToken::new();
        let resolver = PresenceResolver::new(stub, policy(100, None), cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let err = resolver.resolve_identity("U1").await.unwrap_err();
        assert!(matches!(err, RecorderError::Cancelled));
    }
}
