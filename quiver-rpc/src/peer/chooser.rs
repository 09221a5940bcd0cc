use std::sync::Arc;

use crate::{
    core::request::Request,
    peer::facade::PeerFacade,
    transport::peer::PeerIdentifier,
};

/// A peer-selection strategy over the available facades of one list.
///
/// Every method runs under the owning list's write lock, so implementations
/// see a consistent view and must not block. The list only adds facades
/// whose status is available, and removes them as soon as they stop being
/// so.
pub trait Chooser: Send {
    /// Makes a facade eligible for choosing.
    ///
    /// Happens-before the next `choose` that returns the facade.
    fn add(&mut self, facade: Arc<PeerFacade>);

    /// Withdraws a facade from choosing.
    ///
    /// Happens-before the next `choose`, which will not return it.
    fn remove(&mut self, id: &PeerIdentifier);

    /// Selects a facade for the request, or `None` when none is eligible.
    fn choose(&mut self, request: &Request) -> Option<Arc<PeerFacade>>;

    /// Observes a change to a facade's pending-request count.
    ///
    /// Load-aware strategies reposition the facade; others ignore this.
    fn update_pending_request_count(&mut self, _id: &PeerIdentifier, _pending: usize) {}
}
