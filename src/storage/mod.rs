/*! Buffering and reassembly.

The `storage` module provides the flow-controlled byte stream that stages
application bytes for the sender and delivers reassembled bytes to the
application, and the reassembler that turns out-of-order, overlapping
segment payloads back into that ordered stream.

[ByteStream]: struct.ByteStream.html
[Reassembler]: struct.Reassembler.html
*/

mod byte_stream;
mod reassembler;
mod ring_buffer;

pub use self::byte_stream::ByteStream;
pub use self::reassembler::Reassembler;
pub use self::ring_buffer::RingBuffer;
