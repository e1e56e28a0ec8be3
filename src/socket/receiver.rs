use crate::socket::Config;
use crate::storage::{ByteStream, Reassembler};
use crate::wire::{SeqNumber, Segment};

/// The receiving half of a connection.
///
/// The receiver learns the peer's initial sequence number from the SYN,
/// translates each incoming segment's wire sequence number into a stream
/// index, and hands the payload to a [Reassembler]. From the reassembled
/// stream it derives the acknowledgment number and window to advertise
/// back.
///
/// [Reassembler]: ../storage/struct.Reassembler.html
#[derive(Debug)]
pub struct Receiver {
    reassembler: Reassembler,
    isn: Option<SeqNumber>,
    capacity: usize,
}

impl Receiver {
    pub fn new(config: &Config) -> Receiver {
        Receiver {
            reassembler: Reassembler::new(config.stream_capacity),
            isn: None,
            capacity: config.stream_capacity,
        }
    }

    /// Process one incoming segment.
    ///
    /// Until a SYN has been seen, everything without the SYN flag is
    /// discarded. The SYN occupies sequence-space slot zero, so the payload
    /// of any later segment lands at stream index `abs_seqno - 1`.
    pub fn segment_received(&mut self, seg: &Segment) {
        let isn = match self.isn {
            Some(isn) => isn,
            None => {
                if !seg.syn {
                    net_trace!("receiver: discarding {} before syn", seg);
                    return;
                }
                self.isn = Some(seg.seq_number);
                seg.seq_number
            }
        };

        // The last reassembled position is the best guess for where this
        // segment belongs. Before any byte has been reassembled the
        // subtraction wraps, which still yields the nearest candidate.
        let checkpoint = if seg.syn {
            0
        } else {
            self.reassembler.stream().bytes_written().wrapping_sub(1)
        };
        let abs_seqno = seg.seq_number.unwrap(isn, checkpoint);
        // Only the SYN may occupy sequence-space slot zero; a later segment
        // claiming it carries no valid stream position.
        if !seg.syn && abs_seqno == 0 {
            net_trace!("receiver: discarding {} claiming the syn slot", seg);
            return;
        }
        let stream_index = if seg.syn { 0 } else { abs_seqno - 1 };
        self.reassembler.submit(&seg.payload, stream_index, seg.fin);
    }

    /// The acknowledgment number to advertise: the first sequence number
    /// not yet reassembled. `None` until a SYN has been seen.
    ///
    /// The SYN slot accounts for one sequence number, and the FIN slot for
    /// one more once the inbound stream has ended.
    pub fn ack_number(&self) -> Option<SeqNumber> {
        self.isn.map(|isn| {
            let mut abs_ackno = self.reassembler.stream().bytes_written() + 1;
            if self.reassembler.stream().input_ended() {
                abs_ackno += 1;
            }
            SeqNumber::wrap(abs_ackno, isn)
        })
    }

    /// The window to advertise: room left for new inbound data, saturated
    /// at the largest value the wire field can carry.
    pub fn window_len(&self) -> u16 {
        let window = self.capacity - self.reassembler.stream().len();
        window.min(u16::MAX as usize) as u16
    }

    /// The number of octets buffered out of order.
    pub fn pending_bytes(&self) -> usize {
        self.reassembler.pending_bytes()
    }

    /// Access the inbound stream the application reads from.
    pub fn stream(&self) -> &ByteStream {
        self.reassembler.stream()
    }

    pub fn stream_mut(&mut self) -> &mut ByteStream {
        self.reassembler.stream_mut()
    }
}
