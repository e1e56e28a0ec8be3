/*! Transport state machines.

The `socket` module contains the three state machines that make up a
connection endpoint:

  - [Sender] turns an outbound [ByteStream](../storage/struct.ByteStream.html)
    into segments honoring the peer's advertised window, tracks outstanding
    segments, and retransmits with exponential backoff;
  - [Receiver] translates incoming segments into stream positions, feeds a
    [Reassembler](../storage/struct.Reassembler.html), and derives the
    acknowledgment number and window to advertise;
  - [Connection] composes one of each, interprets control flags, and decides
    when the endpoint may shut down cleanly or must abort.

Everything here is driven by explicit input: inbound segments, application
writes, and elapsed-time ticks. No operation blocks or reads a clock, so
the state machines are deterministic and can be tested without one.

[Sender]: struct.Sender.html
[Receiver]: struct.Receiver.html
[Connection]: struct.Connection.html
*/

mod connection;
mod receiver;
mod sender;

pub use self::connection::Connection;
pub use self::receiver::Receiver;
pub use self::sender::Sender;

use crate::time::Duration;
use crate::wire::SeqNumber;

/// Default retransmission timeout, before any backoff.
pub const DEFAULT_RETX_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default ceiling on consecutive retransmissions of the same data before
/// the connection gives up and aborts.
pub const DEFAULT_MAX_RETX_ATTEMPTS: u32 = 8;

/// Default upper bound on the payload carried by a single segment, sized so
/// the segment fits a common Ethernet MTU under an IP header.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 1452;

/// Connection endpoint parameters.
///
/// A `Config` is consumed by [Connection::new]. The defaults are suitable
/// for general use; tests fix `isn` to make sequence numbers predictable,
/// and callers who care about ISN unpredictability should set `rand_seed`
/// from a proper entropy source.
///
/// [Connection::new]: struct.Connection.html#method.new
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Capacity of each direction's byte stream, in octets.
    pub stream_capacity: usize,
    /// Initial retransmission timeout.
    pub retx_timeout: Duration,
    /// Consecutive retransmissions tolerated before aborting.
    pub max_retx_attempts: u32,
    /// Largest payload placed in a single outgoing segment.
    pub max_payload_len: usize,
    /// Fixed initial sequence number. When `None`, one is drawn from the
    /// crate PRNG seeded with `rand_seed`.
    pub isn: Option<SeqNumber>,
    /// Seed for the initial sequence number draw.
    pub rand_seed: u64,
}

impl Config {
    /// Create a configuration with the given stream capacity and the
    /// defaults for everything else.
    pub fn new(stream_capacity: usize) -> Config {
        Config {
            stream_capacity,
            retx_timeout: DEFAULT_RETX_TIMEOUT,
            max_retx_attempts: DEFAULT_MAX_RETX_ATTEMPTS,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            isn: None,
            rand_seed: 0,
        }
    }
}
