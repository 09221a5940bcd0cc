use std::sync::Arc;

use crate::{
    core::request::Request,
    peer::{
        chooser::Chooser,
        facade::PeerFacade,
    },
    transport::peer::PeerIdentifier,
};

/// A chooser cycling through the available peers in insertion order.
#[derive(Default)]
pub struct RoundRobin {
    ring: Vec<Arc<PeerFacade>>,
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Chooser for RoundRobin {
    fn add(&mut self, facade: Arc<PeerFacade>) {
        self.ring.push(facade);
    }

    fn remove(&mut self, id: &PeerIdentifier) {
        let Some(position) = self
            .ring
            .iter()
            .position(|facade| facade.identifier() == id)
        else {
            return;
        };
        self.ring.remove(position);
        // Keep the cursor on the peer that would have been chosen next.
        if position < self.cursor {
            self.cursor -= 1;
        }
        if self.ring.is_empty() {
            self.cursor = 0;
        } else {
            self.cursor %= self.ring.len();
        }
    }

    fn choose(&mut self, _: &Request) -> Option<Arc<PeerFacade>> {
        if self.ring.is_empty() {
            return None;
        }
        let facade = self.ring[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.ring.len();
        Some(facade)
    }
}

#[cfg(test)]
mod round_robin_test {
    use std::sync::{
        Arc,
        Weak,
    };

    use crate::{
        core::request::Request,
        peer::{
            chooser::Chooser,
            facade::PeerFacade,
            round_robin::RoundRobin,
        },
        transport::peer::ConnectionStatus,
    };

    fn facade(id: &str) -> Arc<PeerFacade> {
        let facade = Arc::new(PeerFacade::new(id.into(), Weak::new()));
        facade.set_cached_status(ConnectionStatus::Available);
        facade
    }

    fn choose(ring: &mut RoundRobin) -> String {
        ring.choose(&Request::default())
            .expect("expected a peer")
            .identifier()
            .to_string()
    }

    #[test]
    fn cycles_in_insertion_order() {
        let mut ring = RoundRobin::new();
        ring.add(facade("a"));
        ring.add(facade("b"));
        ring.add(facade("c"));
        assert_eq!(choose(&mut ring), "a");
        assert_eq!(choose(&mut ring), "b");
        assert_eq!(choose(&mut ring), "c");
        assert_eq!(choose(&mut ring), "a");
    }

    #[test]
    fn removal_splices_and_preserves_the_cycle() {
        let mut ring = RoundRobin::new();
        ring.add(facade("a"));
        ring.add(facade("b"));
        ring.add(facade("c"));
        assert_eq!(choose(&mut ring), "a");
        // Cursor points at "b"; removing "a" must not skip it.
        ring.remove(&"a".into());
        assert_eq!(choose(&mut ring), "b");
        assert_eq!(choose(&mut ring), "c");
        assert_eq!(choose(&mut ring), "b");
    }

    #[test]
    fn empties_cleanly() {
        let mut ring = RoundRobin::new();
        ring.add(facade("a"));
        assert_eq!(choose(&mut ring), "a");
        ring.remove(&"a".into());
        assert!(ring.choose(&Request::default()).is_none());
    }
}
