use std::{
    fmt::{
        Debug,
        Display,
    },
    sync::Arc,
};

use anyhow::Result;

/// Opaque identifier of a remote peer, commonly a `host:port` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PeerIdentifier(String);

impl PeerIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PeerIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<&str> for PeerIdentifier {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for PeerIdentifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The connection state of a peer as reported by its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The transport is establishing a connection to the peer.
    Connecting,
    /// The peer can accept requests.
    Available,
    /// The peer cannot currently accept requests.
    Unavailable,
}

impl Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Available => "available",
            Self::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// A snapshot of a peer's connection state and load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerStatus {
    pub connection_status: ConnectionStatus,
    /// Number of requests issued against the peer that have not finished.
    pub pending_request_count: usize,
}

/// A remote peer retained from a transport.
pub trait Peer: Send + Sync + Debug {
    fn identifier(&self) -> &PeerIdentifier;

    fn status(&self) -> PeerStatus;
}

/// Receives connection-status notifications for retained peers.
pub trait Subscriber: Send + Sync {
    /// Reports that the named peer's connection status may have changed.
    ///
    /// The subscriber reads the current status back from the peer, so
    /// notifications may be coalesced.
    fn notify_status_changed(&self, id: &PeerIdentifier);
}

/// The peer-management surface the core requires of a transport.
///
/// Retain and release are idempotent per (identifier, subscriber) pair. Both
/// are invoked under a peer list's write lock and must neither block nor
/// call back into the subscriber synchronously.
pub trait PeerTransport: Send + Sync + Debug {
    /// Retains a peer on behalf of `subscriber`, creating it if this is the
    /// first retention.
    fn retain_peer(
        &self,
        id: &PeerIdentifier,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<Arc<dyn Peer>>;

    /// Releases a peer on behalf of `subscriber`.
    ///
    /// The transport must not invoke the subscriber after release returns.
    fn release_peer(&self, id: &PeerIdentifier, subscriber: &Arc<dyn Subscriber>) -> Result<()>;
}
