use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::storage::ByteStream;

/// An out-of-order segment reassembler.
///
/// The reassembler accepts arbitrary `(index, octets, end-flag)` submissions
/// and writes every newly contiguous octet into its output [ByteStream],
/// closing the stream once the logical end position has been reached.
/// Submissions that arrive out of order are buffered as non-overlapping
/// ranges keyed by start index.
///
/// The acceptance window is bounded: octets at or past
/// `output.bytes_read() + capacity` are clipped, so the sum of buffered and
/// not-yet-read octets never exceeds `capacity`. Out-of-window input is
/// never an error: flow control keeps a correct peer inside the window,
/// and clipping protects the memory bound against a misbehaving one.
///
/// [ByteStream]: struct.ByteStream.html
#[derive(Debug)]
pub struct Reassembler {
    output: ByteStream,
    capacity: usize,
    /// Buffered out-of-order ranges. Invariant: pairwise non-overlapping
    /// after every submission.
    pending: BTreeMap<u64, Vec<u8>>,
    pending_bytes: usize,
    end_index: Option<u64>,
}

impl Reassembler {
    /// Create a reassembler whose output stream and pending buffer together
    /// hold up to `capacity` octets.
    pub fn new(capacity: usize) -> Reassembler {
        Reassembler {
            output: ByteStream::new(capacity),
            capacity,
            pending: BTreeMap::new(),
            pending_bytes: 0,
            end_index: None,
        }
    }

    /// The first stream index not yet written to the output.
    fn first_unassembled(&self) -> u64 {
        self.output.bytes_written()
    }

    /// The first stream index past the acceptance window. Octets the
    /// application has already read free up room.
    fn first_unacceptable(&self) -> u64 {
        self.output.bytes_read() + self.capacity as u64
    }

    /// Submit a substring of the logical stream.
    ///
    /// `index` is the stream position of the first octet of `data`;
    /// `is_end` marks `index + data.len()` as the stream's end position.
    /// Substrings may arrive in any order, may overlap, and may duplicate
    /// earlier submissions; where a new range overlaps an already-buffered
    /// one, the buffered octets win.
    pub fn submit(&mut self, data: &[u8], index: u64, is_end: bool) {
        if !data.is_empty() {
            if let Some((start, octets)) = self.clip(data, index) {
                self.insert(start, octets);
            }
        }

        // Flush every range that is now contiguous with the output.
        while let Some((&start, _)) = self.pending.first_key_value() {
            if start != self.first_unassembled() {
                break;
            }
            let octets = self.pending.remove(&start).unwrap();
            self.pending_bytes -= octets.len();
            let written = self.output.write(&octets);
            debug_assert_eq!(written, octets.len());
        }

        // The end marker is remembered from the caller's original values:
        // it may lie beyond the current acceptance window and only become
        // reachable later.
        if is_end {
            self.end_index = Some(index.saturating_add(data.len() as u64));
        }
        if self.end_index == Some(self.first_unassembled()) {
            self.output.end_input();
        }
    }

    /// Clip a submission against the acceptance window, returning the
    /// surviving range or `None` when nothing of it is new.
    fn clip(&self, data: &[u8], index: u64) -> Option<(u64, Vec<u8>)> {
        let first_unassembled = self.first_unassembled();
        let first_unacceptable = self.first_unacceptable();

        if index >= first_unacceptable {
            net_trace!("reassembler: dropping {} octets at {} past window end {}",
                       data.len(), index, first_unacceptable);
            return None;
        }

        let mut data = data;
        // Clip the tail to the window.
        if index + data.len() as u64 > first_unacceptable {
            data = &data[..(first_unacceptable - index) as usize];
        }
        // Everything before the first unassembled index was already
        // delivered.
        if index + data.len() as u64 <= first_unassembled {
            return None;
        }
        if index < first_unassembled {
            data = &data[(first_unassembled - index) as usize..];
            return Some((first_unassembled, data.to_vec()));
        }
        Some((index, data.to_vec()))
    }

    /// Insert a clipped range, merging away any overlap with buffered
    /// ranges. Buffered octets take precedence over resubmitted duplicates
    /// in the overlapping region.
    fn insert(&mut self, start: u64, octets: Vec<u8>) {
        let mut start = start;
        let mut octets = octets;

        let overlapping: Vec<u64> = self
            .pending
            .range(..start + octets.len() as u64)
            .rev()
            .take_while(|(&other, stored)| other + stored.len() as u64 >= start)
            .map(|(&other, _)| other)
            .collect();

        for other in overlapping {
            let stored = self.pending.remove(&other).unwrap();
            self.pending_bytes -= stored.len();
            let (merged_start, merged) = merge(start, octets, other, stored);
            start = merged_start;
            octets = merged;
        }

        self.pending_bytes += octets.len();
        self.pending.insert(start, octets);
    }

    /// The number of octets buffered but not yet assembled.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Return whether no out-of-order octets are buffered.
    pub fn is_pending_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Access the output stream.
    pub fn stream(&self) -> &ByteStream {
        &self.output
    }

    /// Mutable access to the output stream, e.g. for reading or erroring it.
    pub fn stream_mut(&mut self) -> &mut ByteStream {
        &mut self.output
    }
}

/// Merge two overlapping ranges into one spanning their union.
///
/// The `stored` range was buffered earlier and its octets are kept wherever
/// the two overlap; the new range contributes only its exclusive head or
/// tail. A stored range fully inside the new one is absorbed.
fn merge(start: u64, new: Vec<u8>, other: u64, stored: Vec<u8>) -> (u64, Vec<u8>) {
    let new_end = start + new.len() as u64;
    let stored_end = other + stored.len() as u64;

    if start < other && new_end <= stored_end {
        // New range extends the stored one to the left.
        let mut merged = new[..(other - start) as usize].to_vec();
        merged.extend_from_slice(&stored);
        (start, merged)
    } else if start >= other && new_end > stored_end {
        // New range extends the stored one to the right.
        let mut merged = stored;
        merged.extend_from_slice(&new[(stored_end - start) as usize..]);
        (other, merged)
    } else if start >= other && new_end <= stored_end {
        // New range is contained in the stored one.
        (other, stored)
    } else {
        // New range covers the stored one entirely.
        (start, new)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn read_all(reassembler: &mut Reassembler) -> Vec<u8> {
        let len = reassembler.stream().len();
        reassembler.stream_mut().read(len)
    }

    #[test]
    fn test_in_order() {
        let mut r = Reassembler::new(32);
        r.submit(b"abcd", 0, false);
        r.submit(b"efgh", 4, false);
        assert_eq!(read_all(&mut r), b"abcdefgh");
        assert_eq!(r.pending_bytes(), 0);
        assert!(r.is_pending_empty());
    }

    #[test]
    fn test_out_of_order() {
        let mut r = Reassembler::new(32);
        r.submit(b"efgh", 4, false);
        assert_eq!(r.pending_bytes(), 4);
        assert_eq!(r.stream().len(), 0);
        r.submit(b"abcd", 0, false);
        assert_eq!(r.pending_bytes(), 0);
        assert_eq!(read_all(&mut r), b"abcdefgh");
    }

    #[test]
    fn test_cascade_flush() {
        let mut r = Reassembler::new(32);
        r.submit(b"cd", 2, false);
        r.submit(b"gh", 6, false);
        r.submit(b"ef", 4, false);
        assert_eq!(r.pending_bytes(), 6);
        r.submit(b"ab", 0, false);
        assert_eq!(r.pending_bytes(), 0);
        assert_eq!(read_all(&mut r), b"abcdefgh");
    }

    #[test]
    fn test_duplicate_is_idempotent() {
        let mut r = Reassembler::new(32);
        r.submit(b"abcd", 0, false);
        r.submit(b"abcd", 0, false);
        assert_eq!(r.stream().bytes_written(), 4);
        r.submit(b"ijkl", 8, false);
        r.submit(b"ijkl", 8, false);
        assert_eq!(r.pending_bytes(), 4);
        r.submit(b"efgh", 4, false);
        assert_eq!(read_all(&mut r), b"abcdefghijkl");
        assert_eq!(r.stream().bytes_written(), 12);
    }

    #[test]
    fn test_overlap_head() {
        let mut r = Reassembler::new(32);
        r.submit(b"cdef", 2, false);
        r.submit(b"abcd", 0, false);
        r.submit(b"XX", 6, false);
        assert_eq!(read_all(&mut r), b"abcdefXX");
    }

    #[test]
    fn test_overlap_tail() {
        let mut r = Reassembler::new(32);
        r.submit(b"cdef", 2, false);
        r.submit(b"efgh", 4, false);
        assert_eq!(r.pending_bytes(), 6);
        r.submit(b"ab", 0, false);
        assert_eq!(read_all(&mut r), b"abcdefgh");
    }

    #[test]
    fn test_overlap_contained() {
        let mut r = Reassembler::new(32);
        r.submit(b"bcdefg", 1, false);
        r.submit(b"cd", 2, false);
        assert_eq!(r.pending_bytes(), 6);
        r.submit(b"a", 0, false);
        assert_eq!(read_all(&mut r), b"abcdefg");
    }

    #[test]
    fn test_overlap_covering() {
        let mut r = Reassembler::new(32);
        r.submit(b"cd", 2, false);
        r.submit(b"fg", 5, false);
        r.submit(b"bcdefgh", 1, false);
        assert_eq!(r.pending_bytes(), 7);
        r.submit(b"a", 0, false);
        assert_eq!(read_all(&mut r), b"abcdefgh");
    }

    #[test]
    fn test_stored_octets_win_on_overlap() {
        let mut r = Reassembler::new(32);
        r.submit(b"BC", 1, false);
        // Overlapping resubmission with different content; the buffered
        // octets are authoritative.
        r.submit(b"xyz", 1, false);
        r.submit(b"a", 0, false);
        assert_eq!(read_all(&mut r), b"aBCz");
    }

    #[test]
    fn test_window_clip_tail() {
        let mut r = Reassembler::new(4);
        r.submit(b"abcdefgh", 0, false);
        assert_eq!(r.stream().bytes_written(), 4);
        assert_eq!(read_all(&mut r), b"abcd");
        // Reading made room; the tail was dropped, not deferred.
        assert_eq!(r.pending_bytes(), 0);
    }

    #[test]
    fn test_window_drop_past_end() {
        let mut r = Reassembler::new(4);
        r.submit(b"xy", 6, false);
        assert_eq!(r.pending_bytes(), 0);
        r.submit(b"xy", 4, false);
        assert_eq!(r.pending_bytes(), 0);
    }

    #[test]
    fn test_window_follows_reader() {
        let mut r = Reassembler::new(4);
        r.submit(b"abcd", 0, false);
        r.submit(b"ef", 4, false);
        assert_eq!(r.pending_bytes(), 0);
        r.stream_mut().read(2);
        r.submit(b"ef", 4, false);
        assert_eq!(r.stream().bytes_written(), 6);
    }

    #[test]
    fn test_already_delivered_dropped() {
        let mut r = Reassembler::new(32);
        r.submit(b"abcd", 0, false);
        r.submit(b"ab", 0, false);
        r.submit(b"bcde", 1, false);
        assert_eq!(r.stream().bytes_written(), 5);
        assert_eq!(read_all(&mut r), b"abcde");
    }

    #[test]
    fn test_end_marker() {
        let mut r = Reassembler::new(32);
        r.submit(b"abcd", 0, true);
        assert!(r.stream().input_ended());
        assert_eq!(read_all(&mut r), b"abcd");
        assert!(r.stream_mut().eof());
    }

    #[test]
    fn test_end_marker_out_of_order() {
        let mut r = Reassembler::new(32);
        r.submit(b"ef", 4, true);
        assert!(!r.stream().input_ended());
        r.submit(b"abcd", 0, false);
        assert!(r.stream().input_ended());
        assert_eq!(read_all(&mut r), b"abcdef");
    }

    #[test]
    fn test_empty_end_marker() {
        let mut r = Reassembler::new(32);
        r.submit(b"ab", 0, false);
        r.submit(b"", 2, true);
        assert!(r.stream().input_ended());
    }

    #[test]
    fn test_end_marker_beyond_window() {
        let mut r = Reassembler::new(4);
        // The payload tail is clipped, but the end marker is still recorded
        // from the caller's original values.
        r.submit(b"abcdef", 0, true);
        assert_eq!(r.stream().bytes_written(), 4);
        assert!(!r.stream().input_ended());
        r.stream_mut().read(4);
        r.submit(b"ef", 4, false);
        assert!(r.stream().input_ended());
    }

    #[test]
    fn test_end_marker_at_index_limit() {
        let mut r = Reassembler::new(4);
        // An end marker at the top of the index space must neither overflow
        // nor end the stream early.
        r.submit(b"x", u64::MAX, true);
        assert_eq!(r.pending_bytes(), 0);
        assert!(!r.stream().input_ended());
        r.submit(b"ab", 0, false);
        assert_eq!(r.stream().bytes_written(), 2);
        assert!(!r.stream().input_ended());
    }

    // Model test against an obviously-correct byte map, in the spirit of
    // feeding a stream split into arbitrary overlapping chunks.
    #[test]
    fn test_random() {
        use rand::seq::SliceRandom;
        use rand::Rng;

        const LEN: usize = 200;

        for _ in 0..300 {
            let mut rng = rand::thread_rng();
            let reference: Vec<u8> = (0..LEN).map(|_| rng.gen()).collect();

            let mut chunks: Vec<(usize, usize)> = Vec::new();
            let mut at = 0;
            while at < LEN {
                let len = rng.gen_range(1..=32);
                let end = (at + len).min(LEN);
                chunks.push((at, end));
                // Step back sometimes to create overlap.
                at = end - rng.gen_range(0..end - at);
            }
            chunks.shuffle(&mut rng);

            let mut r = Reassembler::new(LEN);
            for &(start, end) in &chunks {
                r.submit(&reference[start..end], start as u64, end == LEN);
            }
            assert!(r.stream().input_ended());
            assert_eq!(r.pending_bytes(), 0);
            let len = r.stream().len();
            assert_eq!(r.stream_mut().read(len), reference);
        }
    }
}
