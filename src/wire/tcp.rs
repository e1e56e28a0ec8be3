use core::{fmt, ops};

use alloc::vec::Vec;
use byteorder::{ByteOrder, NetworkEndian};

use crate::{Error, Result};

/// A TCP sequence number.
///
/// A sequence number is a monotonically advancing integer modulo
/// 2<sup>32</sup>. The wire carries only these 32 bits; the state machines
/// work with 64-bit absolute stream positions and convert at the boundary
/// with [wrap](#method.wrap) and [unwrap](#method.unwrap).
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct SeqNumber(pub u32);

impl SeqNumber {
    /// Map an absolute 64-bit stream position onto the wire, offset from the
    /// given initial sequence number.
    pub fn wrap(abs: u64, isn: SeqNumber) -> SeqNumber {
        SeqNumber(isn.0.wrapping_add(abs as u32))
    }

    /// Map a wire sequence number back to the absolute 64-bit stream position
    /// that is closest to `checkpoint`.
    ///
    /// The candidates differ by multiples of 2<sup>32</sup>; the 32-bit
    /// wrapping offset from the checkpoint picks out the nearest one, with a
    /// correction when the nearest candidate lies one period earlier.
    pub fn unwrap(self, isn: SeqNumber, checkpoint: u64) -> u64 {
        let offset = self.0.wrapping_sub(SeqNumber::wrap(checkpoint, isn).0) as u64;
        let pos = checkpoint.wrapping_add(offset);
        if offset > 1 << 31 && pos >= 1 << 32 {
            pos - (1 << 32)
        } else {
            pos
        }
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SeqNumber {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.0);
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        debug_assert!(rhs <= u32::MAX as usize);
        SeqNumber(self.0.wrapping_add(rhs as u32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl ops::Sub<usize> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: usize) -> SeqNumber {
        debug_assert!(rhs <= u32::MAX as usize);
        SeqNumber(self.0.wrapping_sub(rhs as u32))
    }
}

/// A read/write wrapper around a Transmission Control Protocol packet buffer.
#[derive(Debug)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    #![allow(non_snake_case)]

    pub type Field = ::core::ops::Range<usize>;

    pub const SRC_PORT: Field = 0..2;
    pub const DST_PORT: Field = 2..4;
    pub const SEQ_NUM: Field = 4..8;
    pub const ACK_NUM: Field = 8..12;
    pub const FLAGS: Field = 12..14;
    pub const WIN_SIZE: Field = 14..16;
    pub const CHECKSUM: Field = 16..18;
    pub const URGENT: Field = 18..20;

    pub const FLG_FIN: u16 = 0x001;
    pub const FLG_SYN: u16 = 0x002;
    pub const FLG_RST: u16 = 0x004;
    pub const FLG_PSH: u16 = 0x008;
    pub const FLG_ACK: u16 = 0x010;
    pub const FLG_URG: u16 = 0x020;
}

/// Length of the fixed TCP header, without options.
pub const HEADER_LEN: usize = field::URGENT.end;

impl<T: AsRef<[u8]>> Packet<T> {
    /// Wrap a buffer with a TCP packet, without checking its length.
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Wrap a buffer with a TCP packet. Returns `Err(Error::Truncated)` if
    /// the buffer is too small to contain one.
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic.
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Consume the packet, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the source port field.
    #[inline]
    pub fn src_port(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::SRC_PORT])
    }

    /// Return the destination port field.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::DST_PORT])
    }

    /// Return the sequence number field.
    #[inline]
    pub fn seq_number(&self) -> SeqNumber {
        let data = self.buffer.as_ref();
        SeqNumber(NetworkEndian::read_u32(&data[field::SEQ_NUM]))
    }

    /// Return the acknowledgement number field.
    #[inline]
    pub fn ack_number(&self) -> SeqNumber {
        let data = self.buffer.as_ref();
        SeqNumber(NetworkEndian::read_u32(&data[field::ACK_NUM]))
    }

    #[inline]
    fn flags(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::FLAGS])
    }

    /// Return the FIN flag.
    #[inline]
    pub fn fin(&self) -> bool {
        self.flags() & field::FLG_FIN != 0
    }

    /// Return the SYN flag.
    #[inline]
    pub fn syn(&self) -> bool {
        self.flags() & field::FLG_SYN != 0
    }

    /// Return the RST flag.
    #[inline]
    pub fn rst(&self) -> bool {
        self.flags() & field::FLG_RST != 0
    }

    /// Return the PSH flag.
    #[inline]
    pub fn psh(&self) -> bool {
        self.flags() & field::FLG_PSH != 0
    }

    /// Return the ACK flag.
    #[inline]
    pub fn ack(&self) -> bool {
        self.flags() & field::FLG_ACK != 0
    }

    /// Return the URG flag.
    #[inline]
    pub fn urg(&self) -> bool {
        self.flags() & field::FLG_URG != 0
    }

    /// Return the header length, in octets.
    #[inline]
    pub fn header_len(&self) -> u8 {
        ((self.flags() >> 12) * 4) as u8
    }

    /// Return the window size field.
    #[inline]
    pub fn window_len(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::WIN_SIZE])
    }

    /// Return the checksum field.
    ///
    /// Checksum computation requires the IP pseudo-header and is the
    /// business of the network layer that carries these segments; this crate
    /// only provides access to the field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::CHECKSUM])
    }

    /// Return the urgent pointer field.
    #[inline]
    pub fn urgent_at(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::URGENT])
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    /// Return a pointer to the payload.
    ///
    /// # Panics
    /// This function panics if the data offset field is out of bounds;
    /// use [Segment::parse] for checked access.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let header_len = self.header_len() as usize;
        let data = self.buffer.as_ref();
        &data[header_len..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the source port field.
    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::SRC_PORT], value)
    }

    /// Set the destination port field.
    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::DST_PORT], value)
    }

    /// Set the sequence number field.
    #[inline]
    pub fn set_seq_number(&mut self, value: SeqNumber) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u32(&mut data[field::SEQ_NUM], value.0)
    }

    /// Set the acknowledgement number field.
    #[inline]
    pub fn set_ack_number(&mut self, value: SeqNumber) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u32(&mut data[field::ACK_NUM], value.0)
    }

    #[inline]
    fn set_flag(&mut self, flag: u16, value: bool) {
        let data = self.buffer.as_mut();
        let raw = NetworkEndian::read_u16(&data[field::FLAGS]);
        let raw = if value { raw | flag } else { raw & !flag };
        NetworkEndian::write_u16(&mut data[field::FLAGS], raw)
    }

    /// Clear the entire flags field.
    #[inline]
    pub fn clear_flags(&mut self) {
        let data = self.buffer.as_mut();
        let raw = NetworkEndian::read_u16(&data[field::FLAGS]);
        let raw = raw & !0x0fff;
        NetworkEndian::write_u16(&mut data[field::FLAGS], raw)
    }

    /// Set the FIN flag.
    #[inline]
    pub fn set_fin(&mut self, value: bool) {
        self.set_flag(field::FLG_FIN, value)
    }

    /// Set the SYN flag.
    #[inline]
    pub fn set_syn(&mut self, value: bool) {
        self.set_flag(field::FLG_SYN, value)
    }

    /// Set the RST flag.
    #[inline]
    pub fn set_rst(&mut self, value: bool) {
        self.set_flag(field::FLG_RST, value)
    }

    /// Set the PSH flag.
    #[inline]
    pub fn set_psh(&mut self, value: bool) {
        self.set_flag(field::FLG_PSH, value)
    }

    /// Set the ACK flag.
    #[inline]
    pub fn set_ack(&mut self, value: bool) {
        self.set_flag(field::FLG_ACK, value)
    }

    /// Set the URG flag.
    #[inline]
    pub fn set_urg(&mut self, value: bool) {
        self.set_flag(field::FLG_URG, value)
    }

    /// Set the header length, in octets.
    #[inline]
    pub fn set_header_len(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        let raw = NetworkEndian::read_u16(&data[field::FLAGS]);
        let raw = (raw & !0xf000) | ((value as u16) / 4) << 12;
        NetworkEndian::write_u16(&mut data[field::FLAGS], raw)
    }

    /// Set the window size field.
    #[inline]
    pub fn set_window_len(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::WIN_SIZE], value)
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], value)
    }

    /// Set the urgent pointer field.
    #[inline]
    pub fn set_urgent_at(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::URGENT], value)
    }
}

impl<'a, T: AsRef<[u8]> + AsMut<[u8]> + ?Sized> Packet<&'a mut T> {
    /// Return a mutable pointer to the payload data.
    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len() as usize;
        let data = self.buffer.as_mut();
        &mut data[header_len..]
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> fmt::Display for Packet<&'a T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP src={} dst={}", self.src_port(), self.dst_port())?;
        if self.syn() {
            write!(f, " syn")?
        }
        if self.fin() {
            write!(f, " fin")?
        }
        if self.rst() {
            write!(f, " rst")?
        }
        if self.psh() {
            write!(f, " psh")?
        }
        write!(f, " seq={}", self.seq_number())?;
        if self.ack() {
            write!(f, " ack={}", self.ack_number())?;
        }
        write!(f, " win={}", self.window_len())?;
        write!(f, " len={}", self.buffer.as_ref().len() - self.header_len() as usize)?;
        Ok(())
    }
}

/// An owned, high-level representation of a TCP segment.
///
/// Segments are created by the sender, queued for output, and optionally
/// retained in the outstanding set for retransmission; the connection stamps
/// the acknowledgment fields just before a segment is handed outward.
/// Options are neither parsed into state nor emitted.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Segment {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_number: SeqNumber,
    /// Present if and only if the ACK flag is set.
    pub ack_number: Option<SeqNumber>,
    pub window_len: u16,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
    pub payload: Vec<u8>,
}

impl Segment {
    /// Parse a packet buffer into an owned segment.
    ///
    /// Options between the fixed header and the payload are skipped.
    pub fn parse<T: AsRef<[u8]> + ?Sized>(packet: &Packet<&T>) -> Result<Segment> {
        packet.check_len()?;
        let data = packet.buffer.as_ref();
        let header_len = packet.header_len() as usize;
        if header_len < HEADER_LEN || header_len > data.len() {
            return Err(Error::Malformed);
        }

        Ok(Segment {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            seq_number: packet.seq_number(),
            ack_number: if packet.ack() {
                Some(packet.ack_number())
            } else {
                None
            },
            window_len: packet.window_len(),
            syn: packet.syn(),
            fin: packet.fin(),
            rst: packet.rst(),
            psh: packet.psh(),
            payload: data[header_len..].to_vec(),
        })
    }

    /// Return the length of the segment in terms of sequence space.
    ///
    /// SYN and FIN each occupy one slot of sequence space in addition to the
    /// payload octets.
    pub fn segment_len(&self) -> usize {
        self.payload.len() + self.syn as usize + self.fin as usize
    }

    /// Return the length of the header that [emit](#method.emit) writes.
    pub fn header_len(&self) -> usize {
        HEADER_LEN
    }

    /// Return the length of the buffer required to emit this segment.
    pub fn buffer_len(&self) -> usize {
        self.header_len() + self.payload.len()
    }

    /// Emit the segment into a packet buffer.
    ///
    /// The checksum field is written as zero; filling it in requires the IP
    /// pseudo-header and is left to the network layer.
    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(&self, packet: &mut Packet<&mut T>) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_seq_number(self.seq_number);
        packet.set_ack_number(self.ack_number.unwrap_or(SeqNumber(0)));
        packet.set_window_len(self.window_len);
        packet.set_header_len(self.header_len() as u8);
        packet.clear_flags();
        packet.set_syn(self.syn);
        packet.set_fin(self.fin);
        packet.set_rst(self.rst);
        packet.set_psh(self.psh);
        packet.set_ack(self.ack_number.is_some());
        packet.set_checksum(0);
        packet.set_urgent_at(0);
        packet.payload_mut().copy_from_slice(&self.payload);
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP src={} dst={}", self.src_port, self.dst_port)?;
        if self.syn {
            write!(f, " syn")?
        }
        if self.fin {
            write!(f, " fin")?
        }
        if self.rst {
            write!(f, " rst")?
        }
        write!(f, " seq={}", self.seq_number)?;
        if let Some(ack_number) = self.ack_number {
            write!(f, " ack={}", ack_number)?;
        }
        write!(f, " win={}", self.window_len)?;
        write!(f, " len={}", self.payload.len())?;
        Ok(())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Segment {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "TCP src={} dst={} syn={} fin={} rst={} seq={} ack={} win={} len={}",
            self.src_port,
            self.dst_port,
            self.syn,
            self.fin,
            self.rst,
            self.seq_number,
            self.ack_number,
            self.window_len,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wrap() {
        assert_eq!(SeqNumber::wrap(3 << 32, SeqNumber(0)), SeqNumber(0));
        assert_eq!(SeqNumber::wrap((3 << 32) + 17, SeqNumber(15)), SeqNumber(32));
        assert_eq!(SeqNumber::wrap((7 << 32) - 2, SeqNumber(15)), SeqNumber(13));
    }

    #[test]
    fn test_unwrap_near_zero() {
        assert_eq!(SeqNumber(1).unwrap(SeqNumber(0), 0), 1);
        assert_eq!(SeqNumber(55).unwrap(SeqNumber(55), 0), 0);
        assert_eq!(SeqNumber(17).unwrap(SeqNumber(15), 0), 2);
    }

    #[test]
    fn test_unwrap_forward_across_wrap() {
        // Checkpoint just below a period boundary; the wire number is just
        // above it.
        assert_eq!(SeqNumber(2).unwrap(SeqNumber(0), (1 << 32) - 10), (1 << 32) + 2);
    }

    #[test]
    fn test_unwrap_backward() {
        // The closest candidate is behind the checkpoint.
        assert_eq!(
            SeqNumber(u32::MAX - 9).unwrap(SeqNumber(0), (1 << 32) + 3),
            (1 << 32) - 10
        );
        // ...unless going backward would be negative.
        assert_eq!(SeqNumber(u32::MAX - 9).unwrap(SeqNumber(0), 3), (1 << 32) - 10);
    }

    #[test]
    fn test_unwrap_checkpoint_underflow() {
        // A receiver that has not yet written any bytes uses a checkpoint of
        // 0u64.wrapping_sub(1); the first in-order byte must still unwrap to
        // stream position 1.
        let isn = SeqNumber(0xdeadbeef);
        let n = SeqNumber::wrap(1, isn);
        assert_eq!(n.unwrap(isn, u64::MAX), 1);
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        for &isn in &[SeqNumber(0), SeqNumber(10), SeqNumber(0xffff_fff0)] {
            for &checkpoint in &[0u64, 1 << 20, 1 << 32, (1 << 40) + 17] {
                for &delta in &[0u64, 1, 1000, (1 << 31) - 1] {
                    let v = checkpoint + delta;
                    assert_eq!(SeqNumber::wrap(v, isn).unwrap(isn, checkpoint), v);
                    if checkpoint >= delta {
                        let v = checkpoint - delta;
                        assert_eq!(SeqNumber::wrap(v, isn).unwrap(isn, checkpoint), v);
                    }
                }
            }
        }
    }

    static PACKET_BYTES: [u8; 24] = [
        0xbf, 0x00, 0x00, 0x50, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x50, 0x11, 0x01,
        0x23, 0x00, 0x00, 0x00, 0x00, 0xaa, 0x00, 0x00, 0xff,
    ];

    static PAYLOAD_BYTES: [u8; 4] = [0xaa, 0x00, 0x00, 0xff];

    #[test]
    fn test_deconstruct() {
        let packet = Packet::new_checked(&PACKET_BYTES[..]).unwrap();
        assert_eq!(packet.src_port(), 48896);
        assert_eq!(packet.dst_port(), 80);
        assert_eq!(packet.seq_number(), SeqNumber(0x01234567));
        assert_eq!(packet.ack_number(), SeqNumber(0x89abcdef));
        assert_eq!(packet.header_len(), 20);
        assert_eq!(packet.fin(), true);
        assert_eq!(packet.syn(), false);
        assert_eq!(packet.rst(), false);
        assert_eq!(packet.ack(), true);
        assert_eq!(packet.window_len(), 0x0123);
        assert_eq!(packet.payload(), &PAYLOAD_BYTES[..]);
    }

    #[test]
    fn test_truncated() {
        assert_eq!(
            Packet::new_checked(&PACKET_BYTES[..19]).err(),
            Some(Error::Truncated)
        );
    }

    fn segment() -> Segment {
        Segment {
            src_port: 48896,
            dst_port: 80,
            seq_number: SeqNumber(0x01234567),
            ack_number: Some(SeqNumber(0x89abcdef)),
            window_len: 0x0123,
            fin: true,
            payload: PAYLOAD_BYTES.to_vec(),
            ..Segment::default()
        }
    }

    #[test]
    fn test_parse() {
        let packet = Packet::new_unchecked(&PACKET_BYTES[..]);
        assert_eq!(Segment::parse(&packet), Ok(segment()));
    }

    #[test]
    fn test_parse_bad_data_offset() {
        let mut bytes = PACKET_BYTES;
        // Data offset of 1 word, shorter than the fixed header.
        bytes[12] = 0x10;
        let packet = Packet::new_unchecked(&bytes[..]);
        assert_eq!(Segment::parse(&packet), Err(Error::Malformed));
    }

    #[test]
    fn test_emit() {
        let segment = segment();
        let mut bytes = vec![0xa5; segment.buffer_len()];
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        segment.emit(&mut packet);
        assert_eq!(&packet.into_inner()[..], &PACKET_BYTES[..]);
    }

    #[test]
    fn test_segment_len() {
        assert_eq!(segment().segment_len(), 5);
        let syn = Segment {
            syn: true,
            ..Segment::default()
        };
        assert_eq!(syn.segment_len(), 1);
        assert_eq!(Segment::default().segment_len(), 0);
    }
}
