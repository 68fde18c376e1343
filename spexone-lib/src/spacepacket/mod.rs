//! CCSDS space packet decoding.
//!
//! References:
//! * CCSDS Space Packet Protocol 133.0-B-2
//!     - <https://public.ccsds.org/Pubs/133x0b2e1.pdf>
mod group;
mod summary;
mod timestamp;

use std::fmt::Display;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{Error, Result};

pub use group::{collect_groups, GroupStats, LogicalPacket, PacketGrouper};
pub use summary::{ApidSummary, Summary};
pub use timestamp::Timestamp;

pub type Apid = u16;

/// Packet grouping as indicated by the 2 sequence flag bits of the primary header.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SequenceFlag {
    /// Packet is a part of a packet group, but not first and not last
    Continuation = 0,
    /// Packet is the first packet in a packet group
    First = 1,
    /// Packet is the last packet in a packet group
    Last = 2,
    /// Packet is not part of a packet group, i.e., standalone.
    Standalone = 3,
}

impl From<u8> for SequenceFlag {
    fn from(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::Continuation,
            1 => Self::First,
            2 => Self::Last,
            _ => Self::Standalone,
        }
    }
}

/// CCSDS Primary Header
///
/// The primary header format is common to all CCSDS space packets.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrimaryHeader {
    pub version: u8,
    pub type_flag: u8,
    pub has_secondary_header: bool,
    pub apid: Apid,
    pub sequence_flags: SequenceFlag,
    pub sequence_id: u16,
    pub len_minus1: u16,
}

impl PrimaryHeader {
    /// Size of a ``PrimaryHeader``
    pub const LEN: usize = 6;
    pub const SEQ_MAX: u16 = 16383;

    /// Decode from exactly [PrimaryHeader::LEN] bytes.
    #[must_use]
    pub fn from_bytes(buf: &[u8; Self::LEN]) -> Self {
        let d1 = u16::from_be_bytes([buf[0], buf[1]]);
        let d2 = u16::from_be_bytes([buf[2], buf[3]]);
        let d3 = u16::from_be_bytes([buf[4], buf[5]]);

        PrimaryHeader {
            version: (d1 >> 13 & 0x7) as u8,
            type_flag: (d1 >> 12 & 0x1) as u8,
            has_secondary_header: (d1 >> 11 & 0x1) == 1,
            apid: (d1 & 0x7ff),
            sequence_flags: SequenceFlag::from((d2 >> 14 & 0x3) as u8),
            sequence_id: (d2 & 0x3fff),
            len_minus1: d3,
        }
    }

    /// Decode from bytes. Returns `None` if there are not enough bytes to construct the
    /// header.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let head: &[u8; Self::LEN] = buf.get(..Self::LEN)?.try_into().ok()?;
        Some(Self::from_bytes(head))
    }

    /// Encode into the 6 header bytes. Inverse of [PrimaryHeader::from_bytes].
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let d1 = (u16::from(self.version & 0x7) << 13)
            | (u16::from(self.type_flag & 0x1) << 12)
            | (u16::from(self.has_secondary_header) << 11)
            | (self.apid & 0x7ff);
        let d2 = ((self.sequence_flags as u16) << 14) | (self.sequence_id & 0x3fff);
        let [a, b] = d1.to_be_bytes();
        let [c, d] = d2.to_be_bytes();
        let [e, f] = self.len_minus1.to_be_bytes();
        [a, b, c, d, e, f]
    }

    /// Number of bytes in the packet data field, i.e., everything after the primary header.
    #[must_use]
    pub fn data_len(&self) -> usize {
        self.len_minus1 as usize + 1
    }
}

/// Packet represents a single CCSDS space packet and its associated data.
///
/// This packet contains the primary header data as well as the user data,
/// which may or may not contain a secondary header. See the header's
/// `has_secondary_header` flag.
///
/// # Example
/// Create a packet from the minimum number of bytes.
/// ```
/// use spexone::{Packet, PrimaryHeader};
///
/// let dat: &[u8] = &[
///     // primary header bytes
///     0xd, 0x59, 0xd2, 0xab, 0x0, 0x6,
///     // secondary header timestamp
///     0x63, 0x62, 0x8a, 0x1b, 0x80, 0x00,
///     // minimum 1 byte of user data
///     0xff
/// ];
/// let packet = Packet::decode(dat).unwrap();
/// assert_eq!(packet.header.apid, 1369);
/// assert_eq!(packet.user_data(), &[0xff]);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Packet {
    /// All packets have a primary header
    pub header: PrimaryHeader,
    /// All packet bytes, including header and user data
    pub data: Vec<u8>,
    /// Byte offset of this packet in the stream it was read from
    pub offset: usize,
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet{{header: {:?}, data:[len={}]}}",
            self.header,
            self.data.len()
        )
    }
}

impl Packet {
    #[must_use]
    pub fn is_first(&self) -> bool {
        self.header.sequence_flags == SequenceFlag::First
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.header.sequence_flags == SequenceFlag::Last
    }

    #[must_use]
    pub fn is_cont(&self) -> bool {
        self.header.sequence_flags == SequenceFlag::Continuation
    }

    #[must_use]
    pub fn is_standalone(&self) -> bool {
        self.header.sequence_flags == SequenceFlag::Standalone
    }

    /// Decode from bytes. Returns `None` if there are not enough bytes to construct the
    /// header or if there are not enough bytes to construct the [Packet] of the length
    /// indicated by the header. Trailing bytes beyond the packet are ignored.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Packet> {
        let header = PrimaryHeader::decode(dat)?;
        let total = PrimaryHeader::LEN + header.data_len();
        Some(Packet {
            header,
            data: dat.get(..total)?.to_vec(),
            offset: 0,
        })
    }

    /// The secondary header time stamp, if the packet carries a secondary header.
    #[must_use]
    pub fn timestamp(&self) -> Option<Timestamp> {
        if !self.header.has_secondary_header {
            return None;
        }
        Timestamp::decode(self.data.get(PrimaryHeader::LEN..)?)
    }

    /// Bytes following the primary and, when present, secondary header.
    #[must_use]
    pub fn user_data(&self) -> &[u8] {
        let start = if self.header.has_secondary_header {
            PrimaryHeader::LEN + Timestamp::LEN
        } else {
            PrimaryHeader::LEN
        };
        self.data.get(start..).unwrap_or_default()
    }
}

/// Calculate the number of missing sequence ids.
///
/// `cur` is the current sequence id. `last` is the sequence id seen before `cur`.
#[must_use]
pub fn missing_packets(cur: u16, last: u16) -> u16 {
    let expected = if last + 1 > PrimaryHeader::SEQ_MAX {
        0
    } else {
        last + 1
    };
    if cur != expected {
        if last + 1 > cur {
            return cur + PrimaryHeader::SEQ_MAX - last;
        }
        return cur - last - 1;
    }
    0
}

/// Fill `buf` as far as the reader allows, returning the number of bytes read. Less than
/// `buf.len()` means the reader hit EOF.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

pub struct PacketReaderIter<R>
where
    R: Read,
{
    reader: R,
    offset: usize,
    done: bool,
}

impl<R> PacketReaderIter<R>
where
    R: Read,
{
    fn new(reader: R) -> Self {
        PacketReaderIter {
            reader,
            offset: 0,
            done: false,
        }
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        let mut head = [0u8; PrimaryHeader::LEN];
        let got = read_full(&mut self.reader, &mut head)?;
        if got == 0 {
            return Ok(None);
        }
        if got < PrimaryHeader::LEN {
            return Err(Error::TruncatedPacket {
                offset: self.offset,
                needed: PrimaryHeader::LEN,
                available: got,
            });
        }

        let header = PrimaryHeader::from_bytes(&head);
        let total = PrimaryHeader::LEN + header.data_len();
        let mut data = vec![0u8; total];
        data[..PrimaryHeader::LEN].copy_from_slice(&head);
        let got = read_full(&mut self.reader, &mut data[PrimaryHeader::LEN..])?;
        if got < header.data_len() {
            return Err(Error::TruncatedPacket {
                offset: self.offset,
                needed: total,
                available: PrimaryHeader::LEN + got,
            });
        }

        let packet = Packet {
            header,
            data,
            offset: self.offset,
        };
        self.offset += total;
        Ok(Some(packet))
    }
}

impl<R> Iterator for PacketReaderIter<R>
where
    R: Read,
{
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_packet() {
            Ok(Some(packet)) => Some(Ok(packet)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                // nothing after a framing error can be trusted
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Return an iterator providing [Packet] data read from a byte synchronized packet
/// stream.
///
/// The stream ends cleanly when EOF falls on a packet boundary. A packet whose header
/// claims more bytes than remain produces a single [Error::TruncatedPacket] after which
/// the iterator is exhausted.
///
/// # Examples
/// ```
/// use spexone::decode_packets;
///
/// let dat: &[u8] = &[
///     0xd, 0x59, 0xd2, 0xab, 0x0, 0x6,
///     0x63, 0x62, 0x8a, 0x1b, 0x80, 0x00,
///     0xff
/// ];
///
/// decode_packets(dat).for_each(|zult| {
///     let packet = zult.unwrap();
///     assert_eq!(packet.header.apid, 1369);
/// });
/// ```
pub fn decode_packets<R>(reader: R) -> PacketReaderIter<R>
where
    R: Read,
{
    PacketReaderIter::new(reader)
}

/// Read all packets from the file at `path`.
///
/// # Errors
/// [Error::Io] if the file cannot be read, or [Error::TruncatedPacket] if the file does
/// not end on a packet boundary.
pub fn read_packet_file<P: AsRef<Path>>(path: P) -> Result<Vec<Packet>> {
    let path = path.as_ref();
    trace!("opening reader: {path:?}");
    let reader = BufReader::new(File::open(path)?);
    decode_packets(reader).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_header() {
        let dat: [u8; 6] = [
            // bytes from a SNPP CrIS packet
            0xd, 0x59, 0xd2, 0xab, 0xa, 0x8f,
        ];
        let ph = PrimaryHeader::decode(&dat).unwrap();

        assert_eq!(ph.version, 0);
        assert_eq!(ph.type_flag, 0);
        assert!(ph.has_secondary_header);
        assert_eq!(ph.apid, 1369);
        assert_eq!(ph.sequence_flags, SequenceFlag::Standalone);
        assert_eq!(ph.sequence_id, 4779);
        assert_eq!(ph.len_minus1, 2703);
        assert_eq!(ph.to_bytes(), dat);
    }

    #[test]
    fn test_decode_header_too_short() {
        assert!(PrimaryHeader::decode(&[0xd, 0x59, 0xd2]).is_none());
    }

    #[test]
    fn test_packet_timestamp_and_user_data() {
        let dat: &[u8] = &[
            0xd, 0x59, 0xd2, 0xab, 0x0, 0x7, 0x63, 0x62, 0x8a, 0x1b, 0x80, 0x00, 0xaa, 0xbb,
        ];
        let packet = Packet::decode(dat).unwrap();
        let ts = packet.timestamp().unwrap();

        assert_eq!(ts.seconds, 0x6362_8a1b);
        assert_eq!(ts.subseconds, 0x8000);
        assert_eq!(packet.user_data(), &[0xaa, 0xbb]);
    }

    #[test]
    fn test_packet_without_secondary_header() {
        let dat: &[u8] = &[0x5, 0x59, 0xd2, 0xab, 0x0, 0x1, 0xaa, 0xbb];
        let packet = Packet::decode(dat).unwrap();

        assert!(packet.timestamp().is_none());
        assert_eq!(packet.user_data(), &[0xaa, 0xbb]);
    }

    #[test]
    fn packet_iter_test() {
        #[rustfmt::skip]
        let dat: &[u8] = &[
            // byte 4 is sequence number 1 & 2
            0xd, 0x59, 0xc0, 0x01, 0x0, 0x6, 0x63, 0x62, 0x8a, 0x1b, 0x0, 0x0, 0xff,
            0xd, 0x59, 0xc0, 0x02, 0x0, 0x6, 0x63, 0x62, 0x8a, 0x1c, 0x0, 0x0, 0xff,
        ];

        let packets: Vec<Packet> = decode_packets(dat).map(Result::unwrap).collect();

        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].header.apid, 1369);
        assert_eq!(packets[0].header.sequence_id, 1);
        assert_eq!(&packets[0].data[..], &dat[..13]);
        assert_eq!(packets[1].header.sequence_id, 2);
        assert_eq!(packets[1].offset, 13);
        assert_eq!(&packets[1].data[..], &dat[13..]);
    }

    #[test]
    fn truncated_data_field_is_an_error() {
        #[rustfmt::skip]
        let dat: &[u8] = &[
            0xd, 0x59, 0xc0, 0x01, 0x0, 0x6, 0x63, 0x62, 0x8a, 0x1b, 0x0, 0x0, 0xff,
            // claims 7 data bytes, only 3 follow
            0xd, 0x59, 0xc0, 0x02, 0x0, 0x6, 0x63, 0x62, 0x8a,
        ];

        let zults: Vec<Result<Packet>> = decode_packets(dat).collect();

        assert_eq!(zults.len(), 2);
        assert!(zults[0].is_ok());
        match &zults[1] {
            Err(Error::TruncatedPacket {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(*offset, 13);
                assert_eq!(*needed, 13);
                assert_eq!(*available, 9);
            }
            other => panic!("expected truncated packet, got {other:?}"),
        }
    }

    #[test]
    fn truncated_header_is_an_error() {
        let dat: &[u8] = &[0xd, 0x59, 0xc0];
        let zults: Vec<Result<Packet>> = decode_packets(dat).collect();

        assert_eq!(zults.len(), 1);
        assert!(matches!(
            zults[0],
            Err(Error::TruncatedPacket {
                offset: 0,
                needed: 6,
                available: 3
            })
        ));
    }

    #[test]
    fn empty_stream_has_no_packets() {
        let dat: &[u8] = &[];
        assert_eq!(decode_packets(dat).count(), 0);
    }

    #[test]
    fn test_science_header_to_bytes() {
        let dat = hex::decode("0b50c00a0009").unwrap();
        let ph = PrimaryHeader::decode(&dat).unwrap();

        assert_eq!(ph.apid, 0x350);
        assert!(ph.has_secondary_header);
        assert_eq!(ph.sequence_flags, SequenceFlag::Standalone);
        assert_eq!(ph.sequence_id, 10);
        assert_eq!(ph.len_minus1, 9);
        assert_eq!(hex::encode(ph.to_bytes()), "0b50c00a0009");
    }

    #[test]
    fn test_missing_packets() {
        assert_eq!(missing_packets(5, 4), 0);
        assert_eq!(missing_packets(5, 3), 1);
        assert_eq!(missing_packets(0, PrimaryHeader::SEQ_MAX), 0);
        assert_eq!(missing_packets(0, PrimaryHeader::SEQ_MAX - 1), 1);
        assert_eq!(missing_packets(0, 0), PrimaryHeader::SEQ_MAX);
    }
}
