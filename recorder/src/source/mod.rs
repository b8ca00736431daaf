//! Presence event sources
//!
//! A source pushes [`SourceSignal`]s over a channel and answers identity
//! lookups synchronously from whatever session state it has so far.

pub mod replay;

use crate::error::Result;
use async_trait::async_trait;
use rollcall_shared::{Identity, IdentityId, PresenceEvent};

pub use replay::ReplaySource;

/// Everything a source reports to the recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSignal {
    Connected,
    Disconnected { code: u16, reason: String },
    Presence(PresenceEvent),
}

#[async_trait]
pub trait PresenceSource: Send + Sync {
    /// Re-establish the session after a disconnect. Only events observed
    /// after reconnecting are delivered; nothing is backfilled.
    async fn reconnect(&self) -> Result<()>;

    /// Stable identity behind a live connection, if the session knows it.
    fn identity_for_connection(&self, connection_id: &str) -> Option<IdentityId>;

    /// Current profile of an identity. May be absent, or lack a display
    /// name, shortly after the identity joined.
    fn lookup_identity(&self, identity_id: &str) -> Option<Identity>;
}
