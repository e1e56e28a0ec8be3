use alloc::collections::VecDeque;

use crate::socket::Config;
use crate::storage::ByteStream;
use crate::time::Duration;
use crate::wire::{SeqNumber, Segment};

/// The retransmission timer.
///
/// An inert value advanced only by explicit elapsed-time input; it never
/// reads a clock. At most one timer runs per sender, covering the oldest
/// outstanding segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetransmitTimer {
    Idle,
    Running { expires_in: Duration },
}

impl RetransmitTimer {
    fn is_started(&self) -> bool {
        matches!(self, RetransmitTimer::Running { .. })
    }

    fn is_expired(&self) -> bool {
        matches!(self, RetransmitTimer::Running { expires_in } if *expires_in == Duration::ZERO)
    }

    fn start(&mut self, rto: Duration) {
        *self = RetransmitTimer::Running { expires_in: rto };
    }

    fn stop(&mut self) {
        *self = RetransmitTimer::Idle;
    }

    fn tick(&mut self, elapsed: Duration) {
        if let RetransmitTimer::Running { expires_in } = self {
            *expires_in = expires_in.saturating_sub(elapsed);
        }
    }
}

/// The sending half of a connection.
///
/// The sender drains an outbound [ByteStream] into segments that honor the
/// peer's advertised window, keeps every unacknowledged segment in an
/// outstanding queue, and retransmits the oldest one with exponential
/// backoff when the timer expires.
///
/// Produced segments accumulate in an output queue drained with
/// [poll_segment](#method.poll_segment); the sender itself never touches
/// the network.
///
/// [ByteStream]: ../storage/struct.ByteStream.html
#[derive(Debug)]
pub struct Sender {
    isn: SeqNumber,
    stream: ByteStream,
    segments_out: VecDeque<Segment>,
    /// Sent but unacknowledged segments, oldest first, each with its
    /// absolute sequence number. Invariant: the segment lengths sum to
    /// `next_seqno - last_ackno`.
    outstanding: VecDeque<(u64, Segment)>,
    next_seqno: u64,
    last_ackno: u64,
    last_window_len: u16,
    timer: RetransmitTimer,
    initial_rto: Duration,
    rto: Duration,
    consecutive_retx: u32,
    max_payload_len: usize,
}

impl Sender {
    pub fn new(config: &Config) -> Sender {
        let isn = config.isn.unwrap_or_else(|| {
            SeqNumber(crate::rand::Rand::new(config.rand_seed).rand_u32())
        });
        Sender {
            isn,
            stream: ByteStream::new(config.stream_capacity),
            segments_out: VecDeque::new(),
            outstanding: VecDeque::new(),
            next_seqno: 0,
            last_ackno: 0,
            last_window_len: 0,
            timer: RetransmitTimer::Idle,
            initial_rto: config.retx_timeout,
            rto: config.retx_timeout,
            consecutive_retx: 0,
            max_payload_len: config.max_payload_len,
        }
    }

    /// Access the outbound stream the application writes into.
    pub fn stream(&self) -> &ByteStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut ByteStream {
        &mut self.stream
    }

    /// The number of sequence-space octets sent but not yet acknowledged.
    /// SYN and FIN count one octet each.
    pub fn bytes_in_flight(&self) -> u64 {
        self.next_seqno - self.last_ackno
    }

    /// The next sequence number to send, as an absolute stream position.
    pub fn next_seqno_absolute(&self) -> u64 {
        self.next_seqno
    }

    /// The next sequence number to send, in wire space.
    pub fn next_seq_number(&self) -> SeqNumber {
        SeqNumber::wrap(self.next_seqno, self.isn)
    }

    /// The number of consecutive retransmissions of the oldest outstanding
    /// segment.
    pub fn consecutive_retransmissions(&self) -> u32 {
        self.consecutive_retx
    }

    /// Take the next queued outgoing segment.
    pub fn poll_segment(&mut self) -> Option<Segment> {
        self.segments_out.pop_front()
    }

    pub fn has_queued_segments(&self) -> bool {
        !self.segments_out.is_empty()
    }

    /// Emit as many segments as the advertised window allows.
    ///
    /// The first call sends a bare SYN; nothing else is sent until that SYN
    /// is acknowledged. A zero advertised window is treated as one octet so
    /// the sender keeps probing for the window to reopen.
    pub fn fill_window(&mut self) {
        if self.next_seqno == 0 {
            let seg = Segment {
                syn: true,
                ..Segment::default()
            };
            self.send_segment(seg);
            return;
        }
        if self.next_seqno == self.bytes_in_flight() {
            // SYN still in flight.
            return;
        }

        let window = if self.last_window_len == 0 {
            1
        } else {
            self.last_window_len as u64
        };
        while window > self.bytes_in_flight() {
            let remaining = (window - self.bytes_in_flight()) as usize;
            if !self.stream.eof() {
                let payload = self.stream.read(self.max_payload_len.min(remaining));
                let mut seg = Segment {
                    payload,
                    ..Segment::default()
                };
                // Piggyback the FIN if the stream just drained and the flag
                // still fits in the window.
                if self.stream.eof() && seg.segment_len() < remaining {
                    seg.fin = true;
                }
                if seg.segment_len() == 0 {
                    return;
                }
                self.send_segment(seg);
            } else if self.next_seqno < self.stream.bytes_written() + 2 {
                // Stream drained before the window filled; the FIN goes out
                // on its own.
                let seg = Segment {
                    fin: true,
                    ..Segment::default()
                };
                self.send_segment(seg);
                return;
            } else {
                // FIN already sent.
                return;
            }
        }
    }

    /// Process an acknowledgment and advertised window from the peer.
    ///
    /// An ackno for data not yet sent is ignored entirely, window included.
    /// A duplicate ackno still records the window. Any newly acknowledged
    /// data resets the retransmission state.
    pub fn ack_received(&mut self, ackno: SeqNumber, window_len: u16) {
        let abs_ackno = ackno.unwrap(self.isn, self.last_ackno);
        if abs_ackno > self.next_seqno {
            net_debug!("sender: ignoring ack {} for unsent data", ackno);
            return;
        }
        if abs_ackno > self.last_ackno {
            self.last_ackno = abs_ackno;

            while let Some(&(seqno, ref seg)) = self.outstanding.front() {
                if seqno + seg.segment_len() as u64 <= abs_ackno {
                    self.outstanding.pop_front();
                } else {
                    break;
                }
            }

            self.rto = self.initial_rto;
            self.consecutive_retx = 0;
            if self.outstanding.is_empty() {
                self.timer.stop();
            } else {
                self.timer.start(self.rto);
            }
        }
        self.last_window_len = window_len;
        self.fill_window();
    }

    /// Advance the retransmission timer by `elapsed`.
    ///
    /// On expiry the oldest outstanding segment is queued again. Backoff is
    /// suppressed while the last advertised window was zero: repeated
    /// probes at the same rate are expected there, not a sign of loss.
    pub fn tick(&mut self, elapsed: Duration) {
        self.timer.tick(elapsed);

        if !self.outstanding.is_empty() && self.timer.is_expired() {
            let (_, seg) = &self.outstanding[0];
            net_debug!("sender: retransmitting {}", seg);
            self.segments_out.push_back(seg.clone());
            if self.last_window_len > 0 {
                self.consecutive_retx += 1;
                self.rto = self.rto * 2;
            }
            self.timer.start(self.rto);
        } else if self.outstanding.is_empty() {
            self.timer.stop();
        }
    }

    /// Queue a zero-length segment carrying the current sequence number.
    ///
    /// It occupies no sequence space, so it is not tracked for
    /// retransmission. Used for pure acknowledgments and keep-alive
    /// replies.
    pub fn send_empty_segment(&mut self) {
        let seg = Segment {
            seq_number: self.next_seq_number(),
            ..Segment::default()
        };
        self.segments_out.push_back(seg);
    }

    fn send_segment(&mut self, mut seg: Segment) {
        seg.seq_number = self.next_seq_number();
        net_trace!("sender: tx {}", seg);
        self.outstanding.push_back((self.next_seqno, seg.clone()));
        self.next_seqno += seg.segment_len() as u64;
        self.segments_out.push_back(seg);

        if !self.timer.is_started() {
            self.timer.start(self.rto);
        }
    }
}
