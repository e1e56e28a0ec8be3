//! The transport core of a minimal TCP stack.
//!
//! _seatcp_ turns a reliable, in-order byte-stream abstraction into a stream
//! of TCP segments, and an incoming (possibly reordered, overlapping, lossy)
//! stream of segments back into ordered bytes with acknowledgment and window
//! feedback. It contains no sockets, no interfaces, and no I/O: the crate is
//! driven entirely by an external event loop that delivers inbound segments,
//! application writes, and elapsed-time ticks, and drains an outbound segment
//! queue after each.
//!
//! The crate is split into the following modules:
//!
//! * [wire](wire/index.html): the TCP header view, the owned [`Segment`]
//!   representation, and wrapping 32-bit sequence number arithmetic;
//! * [storage](storage/index.html): the flow-controlled byte stream shared
//!   by both transfer directions, and the out-of-order reassembler;
//! * [socket](socket/index.html): the sender and receiver state machines and
//!   the [`Connection`] that composes them.
//!
//! All time is explicit: nothing in this crate reads a clock. Deadlines are
//! values advanced by [`Connection::tick`], which makes every state machine
//! deterministic and testable without real timers.
//!
//! [`Segment`]: wire/struct.Segment.html
//! [`Connection`]: socket/struct.Connection.html
//! [`Connection::tick`]: socket/struct.Connection.html#method.tick

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

#[cfg(feature = "std")]
extern crate std;
extern crate alloc;

use core::fmt;

#[macro_use]
mod macros;
mod rand;

pub mod socket;
pub mod storage;
pub mod time;
pub mod wire;

/// The error type for the wire boundary.
///
/// Only parsing and emission of packet buffers can fail. Segments that are
/// well-formed on the wire but violate the protocol (out-of-window sequence
/// numbers, acknowledgments of unsent data, data before synchronization) are
/// never surfaced as errors; they are silently dropped or trimmed by the
/// state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A field was out of bounds for the underlying buffer.
    Truncated,
    /// A packet was recognized but one of its fields contained an invalid
    /// value, e.g. a data offset shorter than the fixed header.
    Malformed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated => write!(f, "truncated packet"),
            Error::Malformed => write!(f, "malformed packet"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Truncated => defmt::write!(f, "truncated packet"),
            Error::Malformed => defmt::write!(f, "malformed packet"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// The result type for the wire boundary.
pub type Result<T> = core::result::Result<T, Error>;
