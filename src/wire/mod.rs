/*! Low-level packet access and construction.

The `wire` module deals with the wire-visible representation of TCP segments:
a zero-copy [Packet] view over a buffer, an owned [Segment] representation
that the state machines create and queue, and the wrapping 32-bit
[SeqNumber] arithmetic that maps wire sequence numbers onto 64-bit logical
stream positions.

[Packet]: struct.TcpPacket.html
[Segment]: struct.Segment.html
[SeqNumber]: struct.SeqNumber.html
*/

mod tcp;

pub use self::tcp::{Packet as TcpPacket, SeqNumber, Segment};
