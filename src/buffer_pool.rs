//! Process-wide recycling of connection buffers.
//!
//! Every `Conn` holds a [`PooledBufferSet`] for its whole life. When the
//! connection goes away the buffers are cleared and parked in a bounded
//! lock-free queue for the next connection.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, LazyLock};

use crossbeam_queue::ArrayQueue;

use crate::BufferSet;

const POOL_CAPACITY: usize = 128;

/// Buffers that grew past this (large result sets) are not recycled.
const MAX_RETAINED_CAPACITY: usize = 1 << 20;

/// Buffer pool shared by all connections.
pub static GLOBAL_BUFFER_POOL: LazyLock<Arc<BufferPool>> =
    LazyLock::new(|| Arc::new(BufferPool::new(POOL_CAPACITY)));

/// A `BufferSet` on loan from a [`BufferPool`].
pub struct PooledBufferSet {
    pool: Arc<BufferPool>,
    buffers: BufferSet,
}

impl Deref for PooledBufferSet {
    type Target = BufferSet;

    fn deref(&self) -> &BufferSet {
        &self.buffers
    }
}

impl DerefMut for PooledBufferSet {
    fn deref_mut(&mut self) -> &mut BufferSet {
        &mut self.buffers
    }
}

impl Drop for PooledBufferSet {
    fn drop(&mut self) {
        // an empty BufferSet does not allocate
        self.pool.recycle(std::mem::take(&mut self.buffers));
    }
}

/// Bounded pool of cleared `BufferSet`s.
#[derive(Debug)]
pub struct BufferPool {
    parked: ArrayQueue<BufferSet>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            parked: ArrayQueue::new(capacity),
        }
    }

    /// Number of buffer sets parked for reuse.
    pub fn available(&self) -> usize {
        self.parked.len()
    }

    /// Take a parked buffer set, or allocate a fresh one.
    pub fn get_buffer_set(self: &Arc<Self>) -> PooledBufferSet {
        PooledBufferSet {
            pool: Arc::clone(self),
            buffers: self.parked.pop().unwrap_or_else(BufferSet::new),
        }
    }

    fn recycle(&self, mut buffers: BufferSet) {
        if buffers.read_buffer.capacity() > MAX_RETAINED_CAPACITY
            || buffers.frame_buffer.capacity() > MAX_RETAINED_CAPACITY
            || buffers.write_buffer.capacity() > MAX_RETAINED_CAPACITY
        {
            return;
        }
        if buffers.read_buffer.capacity() == 0 {
            // nothing worth keeping
            return;
        }
        buffers.clear();
        // a full pool drops the surplus
        let _ = self.parked.push(buffers);
    }
}
