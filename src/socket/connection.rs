use alloc::collections::VecDeque;

use crate::socket::{Config, Receiver, Sender};
use crate::storage::ByteStream;
use crate::time::Duration;
use crate::wire::Segment;

/// A full-duplex connection endpoint.
///
/// The connection routes incoming segments to its [Receiver], feeds
/// acknowledgment and window feedback to its [Sender], stamps every
/// outgoing segment with the current acknowledgment state, and decides when
/// the endpoint may shut down cleanly or must abort.
///
/// It is driven entirely by three inputs: [segment_received], application
/// [write] (and [end_input_stream]), and elapsed-time [tick]. After each
/// call the owner drains [poll_segment] and puts the segments on the wire.
/// [active] turning false is the single external failure signal; whether
/// the shutdown was clean can be told from the streams' error flags.
///
/// An endpoint that is dropped while still active leaves the peer hanging
/// until it times out; owners are expected to call [close] first.
///
/// [Sender]: struct.Sender.html
/// [Receiver]: struct.Receiver.html
/// [segment_received]: #method.segment_received
/// [write]: #method.write
/// [end_input_stream]: #method.end_input_stream
/// [tick]: #method.tick
/// [poll_segment]: #method.poll_segment
/// [active]: #method.active
/// [close]: #method.close
#[derive(Debug)]
pub struct Connection {
    sender: Sender,
    receiver: Receiver,
    segments_out: VecDeque<Segment>,
    active: bool,
    linger_after_streams_finish: bool,
    time_since_last_segment_received: Duration,
    initial_rto: Duration,
    max_retx_attempts: u32,
}

impl Connection {
    pub fn new(config: &Config) -> Connection {
        Connection {
            sender: Sender::new(config),
            receiver: Receiver::new(config),
            segments_out: VecDeque::new(),
            active: true,
            linger_after_streams_finish: true,
            time_since_last_segment_received: Duration::ZERO,
            initial_rto: config.retx_timeout,
            max_retx_attempts: config.max_retx_attempts,
        }
    }

    /// Return whether the connection is still alive, whether in a fully
    /// established state or any intermediate one.
    pub fn active(&self) -> bool {
        self.active
    }

    /// Room left in the outbound stream for [write](#method.write).
    pub fn remaining_outbound_capacity(&self) -> usize {
        self.sender.stream().remaining_capacity()
    }

    /// Sequence-space octets sent but not yet acknowledged by the peer.
    pub fn bytes_in_flight(&self) -> u64 {
        self.sender.bytes_in_flight()
    }

    /// Octets received out of order, not yet readable.
    pub fn pending_bytes(&self) -> usize {
        self.receiver.pending_bytes()
    }

    pub fn time_since_last_segment_received(&self) -> Duration {
        self.time_since_last_segment_received
    }

    /// Access the inbound stream the application reads from.
    pub fn inbound_stream(&self) -> &ByteStream {
        self.receiver.stream()
    }

    pub fn inbound_stream_mut(&mut self) -> &mut ByteStream {
        self.receiver.stream_mut()
    }

    /// Access the outbound stream, e.g. to inspect its error flag.
    pub fn outbound_stream(&self) -> &ByteStream {
        self.sender.stream()
    }

    /// Take the next segment queued for the wire.
    pub fn poll_segment(&mut self) -> Option<Segment> {
        self.segments_out.pop_front()
    }

    pub fn has_queued_segments(&self) -> bool {
        !self.segments_out.is_empty()
    }

    /// Start an active open by sending the SYN.
    pub fn connect(&mut self) {
        self.sender.fill_window();
        self.send_segments();
    }

    /// Process one segment arriving from the network.
    pub fn segment_received(&mut self, seg: &Segment) {
        if !self.active {
            return;
        }
        self.time_since_last_segment_received = Duration::ZERO;

        if seg.rst {
            net_debug!("connection: rst received");
            self.unclean_shutdown();
            return;
        }

        self.receiver.segment_received(seg);

        // Passive open: the peer's SYN just arrived and our side has sent
        // nothing yet. Reply with the second leg of the handshake.
        if self.receiver.ack_number().is_some()
            && !self.receiver.stream().input_ended()
            && self.sender.next_seqno_absolute() == 0
        {
            self.connect();
            return;
        }

        if let Some(ack_number) = seg.ack_number {
            self.sender.ack_received(ack_number, seg.window_len);
        }

        // The peer consumed sequence space; it must hear back even when the
        // sender has nothing of its own to say.
        if seg.segment_len() > 0 && !self.sender.has_queued_segments() {
            self.sender.send_empty_segment();
        }

        // A keep-alive probe sits one sequence number before the next
        // expected one and always elicits an acknowledgment.
        if let Some(ack_number) = self.receiver.ack_number() {
            if seg.segment_len() == 0 && seg.seq_number == ack_number - 1 {
                self.sender.send_empty_segment();
            }
        }

        self.send_segments();
        self.clean_shutdown();
    }

    /// Write application data into the outbound stream and send as much of
    /// it as the peer's window allows. Returns the number of octets
    /// accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if !self.active || data.is_empty() {
            return 0;
        }
        let written = self.sender.stream_mut().write(data);
        self.sender.fill_window();
        self.send_segments();
        written
    }

    /// Advance time by `elapsed`.
    ///
    /// Drives retransmission, aborts the connection once the
    /// retransmission ceiling is exceeded, and expires the linger period.
    pub fn tick(&mut self, elapsed: Duration) {
        if !self.active {
            return;
        }
        self.sender.tick(elapsed);
        self.time_since_last_segment_received += elapsed;

        if self.sender.consecutive_retransmissions() > self.max_retx_attempts {
            net_debug!("connection: retransmission limit exceeded, resetting");
            self.send_rst_segment();
            self.unclean_shutdown();
            return;
        }

        self.send_segments();
        self.clean_shutdown();
    }

    /// Finish the outbound stream. Once all prior data is delivered this
    /// sends the FIN.
    pub fn end_input_stream(&mut self) {
        self.sender.stream_mut().end_input();
        self.sender.fill_window();
        self.send_segments();
    }

    /// Tear the connection down.
    ///
    /// While still active this is an abort: a best-effort RST is sent and
    /// both streams are marked errored. A no-op on an inactive connection.
    pub fn close(&mut self) {
        if self.active {
            net_debug!("connection: closed while active, sending rst");
            self.send_rst_segment();
            self.unclean_shutdown();
        }
    }

    /// Drain the sender's queue, stamping each segment with the current
    /// acknowledgment number and window.
    fn send_segments(&mut self) {
        while let Some(seg) = self.sender.poll_segment() {
            let seg = self.stamp(seg);
            net_trace!("connection: tx {}", seg);
            self.segments_out.push_back(seg);
        }
    }

    fn stamp(&self, mut seg: Segment) -> Segment {
        if let Some(ack_number) = self.receiver.ack_number() {
            seg.ack_number = Some(ack_number);
            seg.window_len = self.receiver.window_len();
        }
        seg
    }

    fn send_rst_segment(&mut self) {
        self.sender.fill_window();
        if !self.sender.has_queued_segments() {
            self.sender.send_empty_segment();
        }
        if let Some(seg) = self.sender.poll_segment() {
            let mut seg = self.stamp(seg);
            seg.rst = true;
            self.segments_out.push_back(seg);
        }
    }

    /// Local FIN sent and fully acknowledged.
    fn fin_acked(&self) -> bool {
        self.sender.stream().eof()
            && self.sender.next_seqno_absolute() == self.sender.stream().bytes_written() + 2
            && self.sender.bytes_in_flight() == 0
    }

    fn clean_shutdown(&mut self) {
        if self.receiver.stream().input_ended() && !self.sender.stream().eof() {
            // The peer finished first, so it is not waiting for our FIN to
            // be acknowledged; no need to linger once our side completes.
            self.linger_after_streams_finish = false;
        } else if self.fin_acked() && self.receiver.stream().input_ended() {
            if !self.linger_after_streams_finish
                || self.time_since_last_segment_received >= self.initial_rto * 10
            {
                net_trace!("connection: shut down cleanly");
                self.active = false;
            }
        }
    }

    fn unclean_shutdown(&mut self) {
        self.sender.stream_mut().set_error();
        self.receiver.stream_mut().set_error();
        self.active = false;
    }
}
