use std::sync::{
    Arc,
    Mutex,
    OnceLock,
    Weak,
    atomic::{
        AtomicUsize,
        Ordering,
    },
};

use crate::{
    peer::list::ListCore,
    transport::peer::{
        ConnectionStatus,
        Peer,
        PeerIdentifier,
        PeerStatus,
        Subscriber,
    },
};

/// A per-list proxy for one remote endpoint.
///
/// The facade owns the list's view of the peer: the cached connection status
/// and the pending-request count used for load-aware choosing. It is created
/// when its identifier is added to a running list and destroyed when the
/// identifier is removed; a facade is never shared across lists, so
/// independent lists retaining the same transport peer do not interfere with
/// each other's choice weights.
///
/// The facade is also the [`Subscriber`] handed to the transport; status
/// pushes are forwarded to the owning list, which reconciles them under its
/// write lock.
#[derive(Debug)]
pub struct PeerFacade {
    identifier: PeerIdentifier,
    peer: OnceLock<Arc<dyn Peer>>,
    cached_status: Mutex<ConnectionStatus>,
    pending: AtomicUsize,
    list: Weak<ListCore>,
}

impl PeerFacade {
    pub(crate) fn new(identifier: PeerIdentifier, list: Weak<ListCore>) -> Self {
        Self {
            identifier,
            peer: OnceLock::new(),
            cached_status: Mutex::new(ConnectionStatus::Unavailable),
            pending: AtomicUsize::new(0),
            list,
        }
    }

    pub fn identifier(&self) -> &PeerIdentifier {
        &self.identifier
    }

    /// The list's view of the peer: cached connection status plus the
    /// pending-request count accounted by the list.
    pub fn status(&self) -> PeerStatus {
        PeerStatus {
            connection_status: self.cached_status(),
            pending_request_count: self.pending.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn bind_peer(&self, peer: Arc<dyn Peer>) {
        self.peer.set(peer).ok();
    }

    /// The retained transport peer.
    pub(crate) fn peer(&self) -> Arc<dyn Peer> {
        self.peer
            .get()
            .expect("facade used before the transport peer was bound")
            .clone()
    }

    /// The connection status currently reported by the transport.
    pub(crate) fn transport_status(&self) -> ConnectionStatus {
        self.peer().status().connection_status
    }

    pub(crate) fn cached_status(&self) -> ConnectionStatus {
        *self
            .cached_status
            .lock()
            .expect("peer facade lock poisoned")
    }

    pub(crate) fn set_cached_status(&self, status: ConnectionStatus) {
        *self
            .cached_status
            .lock()
            .expect("peer facade lock poisoned") = status;
    }

    pub(crate) fn increment_pending(&self) -> usize {
        self.pending.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn decrement_pending(&self) -> usize {
        let previous = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                Some(pending.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }
}

impl Subscriber for PeerFacade {
    fn notify_status_changed(&self, id: &PeerIdentifier) {
        if let Some(list) = self.list.upgrade() {
            list.notify_status_changed(id);
        }
    }
}
