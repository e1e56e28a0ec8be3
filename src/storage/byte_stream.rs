use alloc::vec::Vec;

use crate::storage::RingBuffer;

/// A flow-controlled, in-memory FIFO byte stream.
///
/// One end writes, the other reads. The stream holds at most `capacity`
/// octets at a time; a write past the remaining capacity accepts only what
/// fits and reports the shorter count, never an error. The writer signals
/// end-of-input once; the reader observes `eof` after it has also drained
/// everything written before that.
///
/// Both transfer directions of a connection use this type: the sender drains
/// one staged by the application, and the reassembler fills one drained by
/// the application.
#[derive(Debug)]
pub struct ByteStream {
    buffer: RingBuffer,
    bytes_written: u64,
    bytes_read: u64,
    input_ended: bool,
    error: bool,
}

impl ByteStream {
    /// Create a stream holding up to `capacity` octets.
    pub fn new(capacity: usize) -> ByteStream {
        ByteStream {
            buffer: RingBuffer::new(capacity),
            bytes_written: 0,
            bytes_read: 0,
            input_ended: false,
            error: false,
        }
    }

    /// Write octets into the stream, up to the remaining capacity.
    ///
    /// Returns the number of octets accepted. Always 0 after
    /// [end_input](#method.end_input) or [set_error](#method.set_error).
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.input_ended || self.error {
            return 0;
        }
        let accepted = self.buffer.enqueue_slice(data);
        if accepted > 0 {
            #[cfg(any(test, feature = "verbose"))]
            net_trace!(
                "stream: enqueueing {} octets (now {})",
                accepted,
                self.buffer.len()
            );
        }
        self.bytes_written += accepted as u64;
        accepted
    }

    /// Look at up to `size` octets from the front of the stream without
    /// removing them.
    ///
    /// The returned slice may be shorter than both `size` and
    /// [len](#method.len) when the buffered data wraps around internally.
    pub fn peek(&self, size: usize) -> &[u8] {
        self.buffer.peek(0, size)
    }

    /// Remove up to `size` octets from the front of the stream.
    pub fn pop(&mut self, size: usize) {
        let size = size.min(self.buffer.len());
        self.buffer.advance(size);
        self.bytes_read += size as u64;
    }

    /// Remove and return up to `size` octets from the front of the stream.
    pub fn read(&mut self, size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size.min(self.len()));
        while data.len() < size {
            let chunk = self.buffer.dequeue(size - data.len());
            if chunk.is_empty() {
                break;
            }
            data.extend_from_slice(chunk);
        }
        if !data.is_empty() {
            #[cfg(any(test, feature = "verbose"))]
            net_trace!(
                "stream: dequeueing {} octets (now {})",
                data.len(),
                self.buffer.len()
            );
        }
        self.bytes_read += data.len() as u64;
        data
    }

    /// Signal that nothing more will be written. Idempotent.
    pub fn end_input(&mut self) {
        self.input_ended = true;
    }

    /// Return whether the writing side has finished.
    pub fn input_ended(&self) -> bool {
        self.input_ended
    }

    /// Return whether the stream is finished *and* fully drained.
    pub fn eof(&self) -> bool {
        self.input_ended && self.buffer.is_empty()
    }

    /// Mark the stream as permanently failed.
    pub fn set_error(&mut self) {
        self.error = true;
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    /// The number of octets currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// The number of octets that can still be written.
    pub fn remaining_capacity(&self) -> usize {
        self.buffer.window()
    }

    /// The total number of octets ever accepted by [write](#method.write).
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// The total number of octets ever removed by the reading side.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_write_read() {
        let mut stream = ByteStream::new(8);
        assert_eq!(stream.write(b"hello"), 5);
        assert_eq!(stream.bytes_written(), 5);
        assert_eq!(stream.len(), 5);
        assert_eq!(stream.remaining_capacity(), 3);
        assert_eq!(stream.read(3), b"hel");
        assert_eq!(stream.bytes_read(), 3);
        assert_eq!(stream.read(8), b"lo");
        assert!(stream.is_empty());
    }

    #[test]
    fn test_write_overflow() {
        let mut stream = ByteStream::new(4);
        assert_eq!(stream.write(b"foobar"), 4);
        assert_eq!(stream.read(8), b"foob");
        // Reading frees up room again.
        assert_eq!(stream.write(b"ar"), 2);
        assert_eq!(stream.read(8), b"ar");
    }

    #[test]
    fn test_read_across_wraparound() {
        let mut stream = ByteStream::new(8);
        stream.write(b"foobar");
        stream.pop(4);
        assert_eq!(stream.write(b"bazhog"), 6);
        // "ar" sits at the end of the storage, "bazhog" wraps to the front.
        assert_eq!(stream.read(8), b"arbazhog");
        assert_eq!(stream.bytes_read(), 12);
    }

    #[test]
    fn test_peek_then_pop() {
        let mut stream = ByteStream::new(8);
        stream.write(b"foobar");
        assert_eq!(stream.peek(3), b"foo");
        stream.pop(3);
        assert_eq!(stream.peek(8), b"bar");
        assert_eq!(stream.bytes_read(), 3);
    }

    #[test]
    fn test_end_input() {
        let mut stream = ByteStream::new(8);
        stream.write(b"fin");
        stream.end_input();
        stream.end_input(); // idempotent
        assert!(stream.input_ended());
        assert!(!stream.eof());
        assert_eq!(stream.write(b"more"), 0);
        assert_eq!(stream.read(8), b"fin");
        assert!(stream.eof());
    }

    #[test]
    fn test_error_flag() {
        let mut stream = ByteStream::new(8);
        stream.set_error();
        assert!(stream.has_error());
        assert_eq!(stream.write(b"nope"), 0);
    }
}
