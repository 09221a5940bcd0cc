use std::sync::Arc;

use crate::{
    core::{
        hash::HashMap,
        request::Request,
    },
    peer::{
        chooser::Chooser,
        facade::PeerFacade,
    },
    transport::peer::PeerIdentifier,
};

struct HeapEntry {
    facade: Arc<PeerFacade>,
    pending: usize,
    /// Monotone insertion order, breaking ties so equally loaded peers are
    /// chosen oldest first.
    order: u64,
}

impl HeapEntry {
    fn less(&self, other: &HeapEntry) -> bool {
        (self.pending, self.order) < (other.pending, other.order)
    }
}

/// A chooser preferring the peer with the fewest pending requests.
///
/// Entries live in a binary min-heap keyed by pending count, with an
/// identifier-to-position index so a pending-count update repositions the
/// affected entry in O(log n).
#[derive(Default)]
pub struct PendingHeap {
    entries: Vec<HeapEntry>,
    positions: HashMap<PeerIdentifier, usize>,
    next_order: u64,
}

impl PendingHeap {
    pub fn new() -> Self {
        Self::default()
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.positions
            .insert(self.entries[a].facade.identifier().clone(), a);
        self.positions
            .insert(self.entries[b].facade.identifier().clone(), b);
    }

    fn sift_up(&mut self, mut i: usize) -> usize {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.entries[i].less(&self.entries[parent]) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
        i
    }

    fn sift_down(&mut self, mut i: usize) -> usize {
        loop {
            let mut smallest = i;
            for child in [2 * i + 1, 2 * i + 2] {
                if child < self.entries.len() && self.entries[child].less(&self.entries[smallest]) {
                    smallest = child;
                }
            }
            if smallest == i {
                return i;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }
}

impl Chooser for PendingHeap {
    fn add(&mut self, facade: Arc<PeerFacade>) {
        if self.positions.contains_key(facade.identifier()) {
            return;
        }
        let pending = facade.status().pending_request_count;
        let order = self.next_order;
        self.next_order += 1;
        let i = self.entries.len();
        self.positions.insert(facade.identifier().clone(), i);
        self.entries.push(HeapEntry {
            facade,
            pending,
            order,
        });
        self.sift_up(i);
    }

    fn remove(&mut self, id: &PeerIdentifier) {
        let Some(position) = self.positions.remove(id) else {
            return;
        };
        let last = self.entries.len() - 1;
        if position != last {
            self.swap(position, last);
        }
        self.entries.pop();
        self.positions.remove(id);
        if position < self.entries.len() {
            let settled = self.sift_down(position);
            if settled == position {
                self.sift_up(position);
            }
        }
    }

    fn choose(&mut self, _: &Request) -> Option<Arc<PeerFacade>> {
        self.entries.first().map(|entry| entry.facade.clone())
    }

    fn update_pending_request_count(&mut self, id: &PeerIdentifier, pending: usize) {
        let Some(&position) = self.positions.get(id) else {
            return;
        };
        self.entries[position].pending = pending;
        let settled = self.sift_down(position);
        if settled == position {
            self.sift_up(position);
        }
    }
}

#[cfg(test)]
mod pending_heap_test {
    use std::sync::{
        Arc,
        Weak,
    };

    use crate::{
        core::request::Request,
        peer::{
            chooser::Chooser,
            facade::PeerFacade,
            pending_heap::PendingHeap,
        },
        transport::peer::ConnectionStatus,
    };

    fn facade(id: &str) -> Arc<PeerFacade> {
        let facade = Arc::new(PeerFacade::new(id.into(), Weak::new()));
        facade.set_cached_status(ConnectionStatus::Available);
        facade
    }

    fn choose(heap: &mut PendingHeap) -> String {
        heap.choose(&Request::default())
            .expect("expected a peer")
            .identifier()
            .to_string()
    }

    #[test]
    fn prefers_the_least_loaded_peer() {
        let mut heap = PendingHeap::new();
        heap.add(facade("a"));
        heap.add(facade("b"));
        heap.add(facade("c"));
        // Equal loads break ties by insertion order.
        assert_eq!(choose(&mut heap), "a");

        heap.update_pending_request_count(&"a".into(), 2);
        assert_eq!(choose(&mut heap), "b");

        heap.update_pending_request_count(&"b".into(), 3);
        assert_eq!(choose(&mut heap), "c");

        heap.update_pending_request_count(&"a".into(), 0);
        assert_eq!(choose(&mut heap), "a");
    }

    #[test]
    fn removal_keeps_the_heap_ordered() {
        let mut heap = PendingHeap::new();
        for (id, pending) in [("a", 5), ("b", 1), ("c", 3), ("d", 2)] {
            heap.add(facade(id));
            heap.update_pending_request_count(&id.into(), pending);
        }
        assert_eq!(choose(&mut heap), "b");
        heap.remove(&"b".into());
        assert_eq!(choose(&mut heap), "d");
        heap.remove(&"d".into());
        assert_eq!(choose(&mut heap), "c");
    }

    #[test]
    fn ignores_unknown_and_duplicate_ids() {
        let mut heap = PendingHeap::new();
        let peer = facade("a");
        heap.add(peer.clone());
        heap.add(peer);
        heap.update_pending_request_count(&"missing".into(), 9);
        heap.remove(&"missing".into());
        assert_eq!(choose(&mut heap), "a");
    }
}
