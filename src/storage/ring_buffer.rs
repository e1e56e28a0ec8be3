use alloc::vec;
use alloc::vec::Vec;

/// A fixed-capacity byte ring buffer.
///
/// Writes past the remaining capacity are clipped, never an error; the
/// caller learns how much was accepted from the return value.
#[derive(Debug)]
pub struct RingBuffer {
    storage: Vec<u8>,
    read_at: usize,
    length: usize,
}

impl RingBuffer {
    /// Create a ring buffer with the given capacity.
    pub fn new(capacity: usize) -> RingBuffer {
        RingBuffer {
            storage: vec![0; capacity],
            read_at: 0,
            length: 0,
        }
    }

    pub fn clear(&mut self) {
        self.read_at = 0;
        self.length = 0;
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn len(&self) -> usize {
        self.length
    }

    /// Return the amount of octets that can still be enqueued.
    pub fn window(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.window() == 0
    }

    fn clamp_writer(&self, mut size: usize) -> (usize, usize) {
        let write_at = (self.read_at + self.length) % self.storage.len();
        // We can't enqueue more than there is free space.
        let free = self.storage.len() - self.length;
        if size > free {
            size = free
        }
        // We can't contiguously enqueue past the end of the storage.
        let until_end = self.storage.len() - write_at;
        if size > until_end {
            size = until_end
        }

        (write_at, size)
    }

    fn enqueue(&mut self, size: usize) -> &mut [u8] {
        let (write_at, size) = self.clamp_writer(size);
        self.length += size;
        &mut self.storage[write_at..write_at + size]
    }

    /// Enqueue as much of `data` as fits, and return the amount enqueued.
    pub fn enqueue_slice(&mut self, data: &[u8]) -> usize {
        let mut enqueued = 0;
        let rest = {
            let dest = self.enqueue(data.len());
            enqueued += dest.len();
            let (head, rest) = data.split_at(dest.len());
            dest.copy_from_slice(head);
            rest
        };
        // Retry, in case we had a wraparound.
        let dest = self.enqueue(rest.len());
        enqueued += dest.len();
        let (head, _) = rest.split_at(dest.len());
        dest.copy_from_slice(head);
        enqueued
    }

    fn clamp_reader(&self, offset: usize, mut size: usize) -> (usize, usize) {
        let read_at = (self.read_at + offset) % self.storage.len();
        // We can't read past the end of the queued data.
        if offset > self.length {
            return (read_at, 0);
        }
        // We can't dequeue more than was queued.
        let clamped_length = self.length - offset;
        if size > clamped_length {
            size = clamped_length
        }
        // We can't contiguously dequeue past the end of the storage.
        let until_end = self.storage.len() - read_at;
        if size > until_end {
            size = until_end
        }

        (read_at, size)
    }

    /// Dequeue up to `size` octets as one contiguous slice.
    ///
    /// The returned slice may be shorter than `size` when the queued data
    /// wraps around the end of the storage; call again for the rest.
    pub fn dequeue(&mut self, size: usize) -> &[u8] {
        let (read_at, size) = self.clamp_reader(0, size);
        self.read_at = (self.read_at + size) % self.storage.len();
        self.length -= size;
        &self.storage[read_at..read_at + size]
    }

    /// Look at up to `size` octets starting `offset` into the queued data,
    /// without dequeuing, as one contiguous slice.
    pub fn peek(&self, offset: usize, size: usize) -> &[u8] {
        let (read_at, size) = self.clamp_reader(offset, size);
        &self.storage[read_at..read_at + size]
    }

    /// Discard `size` octets from the front of the queued data.
    ///
    /// # Panics
    /// This function panics if `size` exceeds the amount queued.
    pub fn advance(&mut self, size: usize) {
        if size > self.length {
            panic!("advancing {} octets into free space", size - self.length)
        }
        self.read_at = (self.read_at + size) % self.storage.len();
        self.length -= size;
    }
}
