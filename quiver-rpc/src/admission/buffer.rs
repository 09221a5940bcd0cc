use tokio::time::Instant;

/// An index heap over entity slots with its inverse permutation, so any
/// slot's heap position is found in O(1).
struct Heap {
    /// Heap position to slot index; positions below the buffer's partition
    /// index form the heap, the rest hold free slots.
    heap: Vec<usize>,
    /// Slot index to heap position.
    pos: Vec<usize>,
}

impl Heap {
    fn new(capacity: usize) -> Self {
        Self {
            heap: (0..capacity).collect(),
            pos: (0..capacity).collect(),
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        let (slot_a, slot_b) = (self.heap[a], self.heap[b]);
        self.heap.swap(a, b);
        self.pos[slot_a] = b;
        self.pos[slot_b] = a;
    }

    fn sift_up<F>(&mut self, mut i: usize, less: F)
    where
        F: Fn(usize, usize) -> bool,
    {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !less(self.heap[i], self.heap[parent]) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down<F>(&mut self, mut i: usize, len: usize, less: F) -> usize
    where
        F: Fn(usize, usize) -> bool,
    {
        loop {
            let mut best = i;
            for child in [2 * i + 1, 2 * i + 2] {
                if child < len && less(self.heap[child], self.heap[best]) {
                    best = child;
                }
            }
            if best == i {
                return i;
            }
            self.swap(i, best);
            i = best;
        }
    }

    /// Restores heap order at position `i` after its slot's key changed or a
    /// foreign slot was swapped in.
    fn fix<F>(&mut self, i: usize, len: usize, less: F)
    where
        F: Fn(usize, usize) -> bool + Copy,
    {
        if self.sift_down(i, len, less) == i {
            self.sift_up(i, less);
        }
    }
}

/// A bounded priority buffer of entities ordered three ways at once.
///
/// Every used slot appears in each of three index heaps: by deadline (for
/// expiry), by priority value ascending (for dispatch), and by priority
/// value descending (for eviction). The partition index `len` separates used
/// from free heap positions in each heap, and a free list tracks unused
/// slots, so every operation is O(log n) with no allocation after
/// construction.
///
/// Priority convention: **lower numeric value means higher precedence**.
/// [`Buffer::pop`] returns the lowest value; [`Buffer::evict_lower_priority`]
/// evicts a numerically greater value.
pub struct Buffer<T> {
    capacity: usize,
    len: usize,
    deadlines: Vec<Instant>,
    priorities: Vec<u32>,
    values: Vec<Option<T>>,
    free: Vec<usize>,
    deadline_heap: Heap,
    first_heap: Heap,
    last_heap: Heap,
}

impl<T> Buffer<T> {
    /// Creates a buffer with a fixed capacity of entity slots.
    pub fn new(capacity: usize) -> Self {
        let now = Instant::now();
        Self {
            capacity,
            len: 0,
            deadlines: vec![now; capacity],
            priorities: vec![0; capacity],
            values: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).rev().collect(),
            deadline_heap: Heap::new(capacity),
            first_heap: Heap::new(capacity),
            last_heap: Heap::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Inserts an entity, returning its slot, or `None` when the buffer is
    /// full.
    pub fn insert(&mut self, deadline: Instant, priority: u32, value: T) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        let slot = self.free.pop().expect("free list empty below capacity");
        self.deadlines[slot] = deadline;
        self.priorities[slot] = priority;
        self.values[slot] = Some(value);

        // Swap the claimed slot to the partition boundary of each heap, then
        // sift it toward the root.
        let n = self.len;
        self.len += 1;
        let deadlines = &self.deadlines;
        let priorities = &self.priorities;

        let p = self.deadline_heap.pos[slot];
        self.deadline_heap.swap(p, n);
        self.deadline_heap
            .sift_up(n, |a, b| deadlines[a] < deadlines[b]);

        let p = self.first_heap.pos[slot];
        self.first_heap.swap(p, n);
        self.first_heap
            .sift_up(n, |a, b| priorities[a] < priorities[b]);

        let p = self.last_heap.pos[slot];
        self.last_heap.swap(p, n);
        self.last_heap
            .sift_up(n, |a, b| priorities[a] > priorities[b]);

        Some(slot)
    }

    fn remove_slot(&mut self, slot: usize) -> Option<T> {
        let value = self.values[slot].take()?;
        let n = self.len - 1;
        self.len = n;
        let deadlines = &self.deadlines;
        let priorities = &self.priorities;

        let p = self.deadline_heap.pos[slot];
        self.deadline_heap.swap(p, n);
        if p < n {
            self.deadline_heap
                .fix(p, n, |a, b| deadlines[a] < deadlines[b]);
        }

        let p = self.first_heap.pos[slot];
        self.first_heap.swap(p, n);
        if p < n {
            self.first_heap
                .fix(p, n, |a, b| priorities[a] < priorities[b]);
        }

        let p = self.last_heap.pos[slot];
        self.last_heap.swap(p, n);
        if p < n {
            self.last_heap
                .fix(p, n, |a, b| priorities[a] > priorities[b]);
        }

        self.free.push(slot);
        Some(value)
    }

    /// Removes and returns the highest-precedence entity.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let slot = self.first_heap.heap[0];
        self.remove_slot(slot)
    }

    /// Evicts one entity whose deadline is at or before `now`, returning its
    /// slot and value.
    pub fn evict_expired(&mut self, now: Instant) -> Option<(usize, T)> {
        if self.is_empty() {
            return None;
        }
        let slot = self.deadline_heap.heap[0];
        if self.deadlines[slot] > now {
            return None;
        }
        let value = self.remove_slot(slot)?;
        Some((slot, value))
    }

    /// Evicts one entity with strictly lower precedence than `priority`
    /// (a numerically greater value), returning its slot and value.
    pub fn evict_lower_priority(&mut self, priority: u32) -> Option<(usize, T)> {
        if self.is_empty() {
            return None;
        }
        let slot = self.last_heap.heap[0];
        if self.priorities[slot] <= priority {
            return None;
        }
        let value = self.remove_slot(slot)?;
        Some((slot, value))
    }

    #[cfg(test)]
    fn assert_invariants(&self) {
        assert_eq!(self.len + self.free.len(), self.capacity);
        for heap in [&self.deadline_heap, &self.first_heap, &self.last_heap] {
            // Heap and co-heap stay inverse permutations.
            for position in 0..self.capacity {
                assert_eq!(heap.pos[heap.heap[position]], position);
            }
            // Used slots occupy exactly the heap partition.
            for position in 0..self.len {
                assert!(self.values[heap.heap[position]].is_some());
            }
            for position in self.len..self.capacity {
                assert!(self.values[heap.heap[position]].is_none());
            }
        }
        for &slot in &self.free {
            assert!(self.values[slot].is_none());
        }
    }
}
