use std::sync::Mutex;

/// A pool of reusable byte buffers.
///
/// Buffers are scoped to a single request: acquired at entry and released
/// after the corresponding body has been fully written. Buffers that grow
/// beyond the configured capacity cap are dropped instead of retained, which
/// bounds the memory held by an idle pool.
///
/// Pools are constructed explicitly and shared by `Arc`; there is no process
/// level singleton.
#[derive(Debug)]
pub struct BufferPool {
    max_capacity: usize,
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    /// The default cap on the capacity of a retained buffer.
    pub const DEFAULT_MAX_CAPACITY: usize = 1 << 20;

    /// Creates a pool retaining buffers up to `max_capacity` bytes each.
    pub fn new(max_capacity: usize) -> Self {
        Self {
            max_capacity,
            buffers: Mutex::new(Vec::new()),
        }
    }

    /// Takes a cleared buffer from the pool, or allocates a fresh one.
    pub fn acquire(&self) -> Vec<u8> {
        self.buffers
            .lock()
            .expect("buffer pool lock poisoned")
            .pop()
            .unwrap_or_default()
    }

    /// Returns a buffer to the pool.
    pub fn release(&self, mut buffer: Vec<u8>) {
        if buffer.capacity() > self.max_capacity {
            return;
        }
        buffer.clear();
        self.buffers
            .lock()
            .expect("buffer pool lock poisoned")
            .push(buffer);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_CAPACITY)
    }
}

#[cfg(test)]
mod pool_test {
    use crate::core::pool::BufferPool;

    #[test]
    fn reuses_released_buffers() {
        let pool = BufferPool::default();
        let mut buffer = pool.acquire();
        buffer.extend_from_slice(b"payload");
        let capacity = buffer.capacity();
        pool.release(buffer);

        let buffer = pool.acquire();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), capacity);
    }

    #[test]
    fn drops_oversized_buffers() {
        let pool = BufferPool::new(8);
        let buffer = Vec::with_capacity(64);
        pool.release(buffer);
        assert_eq!(pool.acquire().capacity(), 0);
    }
}
