use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{missing_packets, Apid, Packet, PrimaryHeader, SequenceFlag, Timestamp};

/// A reassembled unit of one or more packets: a FIRST, CONTINUATION*, LAST run or a
/// single standalone packet.
///
/// The identity of a logical packet (header, sequence count and time stamp) is that of its
/// first constituent. `data` is the concatenation of the constituents' user data, i.e.,
/// without primary or secondary headers.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LogicalPacket {
    pub apid: Apid,
    /// Sequence count of the first packet, modulo 2^14.
    pub sequence_count: u16,
    pub timestamp: Option<Timestamp>,
    pub header: PrimaryHeader,
    /// Number of packets reassembled into this one
    pub packet_count: usize,
    pub data: Vec<u8>,
}

impl From<Packet> for LogicalPacket {
    fn from(packet: Packet) -> Self {
        LogicalPacket {
            apid: packet.header.apid,
            sequence_count: packet.header.sequence_id & PrimaryHeader::SEQ_MAX,
            timestamp: packet.timestamp(),
            header: packet.header,
            packet_count: 1,
            data: packet.user_data().to_vec(),
        }
    }
}

/// Counts of packets the grouper could not use.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GroupStats {
    /// Continuation or last packets with no open run for their APID.
    pub orphans: usize,
    /// Runs replaced by a new first packet or still open at the end of input.
    pub abandoned: usize,
    /// Runs dropped because of a sequence count gap.
    pub broken: usize,
}

impl GroupStats {
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.orphans + self.abandoned + self.broken
    }
}

/// In-progress accumulation for one APID.
struct Run {
    logical: LogicalPacket,
    last_seq: u16,
}

impl Run {
    fn start(packet: Packet) -> Self {
        let last_seq = packet.header.sequence_id;
        Run {
            logical: LogicalPacket::from(packet),
            last_seq,
        }
    }

    fn follows(&self, header: &PrimaryHeader) -> bool {
        missing_packets(header.sequence_id, self.last_seq) == 0
    }

    fn push(&mut self, packet: &Packet) {
        self.last_seq = packet.header.sequence_id;
        self.logical.packet_count += 1;
        self.logical.data.extend_from_slice(packet.user_data());
    }
}

/// Iterator reassembling segmented packets into [LogicalPacket]s.
///
/// Runs are tracked per APID so interleaved APIDs reassemble independently. Logical
/// packets are produced in completion order. Packets that cannot be part of a complete
/// run are dropped and counted in [GroupStats] rather than treated as errors.
pub struct PacketGrouper<I>
where
    I: Iterator<Item = Packet>,
{
    packets: I,
    runs: HashMap<Apid, Run>,
    stats: GroupStats,
    done: bool,
}

impl<I> PacketGrouper<I>
where
    I: Iterator<Item = Packet>,
{
    fn new(packets: I) -> Self {
        PacketGrouper {
            packets,
            runs: HashMap::default(),
            stats: GroupStats::default(),
            done: false,
        }
    }

    /// Drop counts so far. Runs still open are only counted once the input is exhausted.
    #[must_use]
    pub fn stats(&self) -> GroupStats {
        self.stats
    }

    fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        for (apid, run) in self.runs.drain() {
            debug!(
                apid,
                packets = run.logical.packet_count,
                "input ended with open run; dropping"
            );
            self.stats.abandoned += 1;
        }
    }
}

impl<I> Iterator for PacketGrouper<I>
where
    I: Iterator<Item = Packet>,
{
    type Item = LogicalPacket;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(packet) = self.packets.next() else {
                self.finish();
                return None;
            };
            let apid = packet.header.apid;

            match packet.header.sequence_flags {
                SequenceFlag::Standalone => return Some(LogicalPacket::from(packet)),
                SequenceFlag::First => {
                    if let Some(old) = self.runs.insert(apid, Run::start(packet)) {
                        debug!(
                            apid,
                            packets = old.logical.packet_count,
                            "new first packet before last; dropping open run"
                        );
                        self.stats.abandoned += 1;
                    }
                }
                SequenceFlag::Continuation => match self.runs.entry(apid) {
                    Entry::Vacant(_) => {
                        debug!(apid, seqid = packet.header.sequence_id, "orphan continuation");
                        self.stats.orphans += 1;
                    }
                    Entry::Occupied(mut entry) => {
                        if entry.get().follows(&packet.header) {
                            entry.get_mut().push(&packet);
                        } else {
                            debug!(
                                apid,
                                seqid = packet.header.sequence_id,
                                last = entry.get().last_seq,
                                "sequence gap; dropping open run"
                            );
                            entry.remove();
                            self.stats.broken += 1;
                        }
                    }
                },
                SequenceFlag::Last => match self.runs.remove(&apid) {
                    None => {
                        debug!(apid, seqid = packet.header.sequence_id, "orphan last packet");
                        self.stats.orphans += 1;
                    }
                    Some(mut run) => {
                        if run.follows(&packet.header) {
                            run.push(&packet);
                            return Some(run.logical);
                        }
                        debug!(
                            apid,
                            seqid = packet.header.sequence_id,
                            last = run.last_seq,
                            "sequence gap; dropping open run"
                        );
                        self.stats.broken += 1;
                    }
                },
            }
        }
    }
}

/// Reassemble `packets` into [LogicalPacket]s.
///
/// # Examples
/// ```
/// use spexone::{collect_groups, decode_packets};
///
/// let dat: &[u8] = &[
///     0xd, 0x59, 0xd2, 0xab, 0x0, 0x6,
///     0x63, 0x62, 0x8a, 0x1b, 0x80, 0x00,
///     0xff
/// ];
/// let packets = decode_packets(dat).map_while(Result::ok);
/// let mut grouper = collect_groups(packets);
/// let logical: Vec<_> = grouper.by_ref().collect();
///
/// assert_eq!(logical.len(), 1);
/// assert_eq!(logical[0].data, vec![0xff]);
/// assert_eq!(grouper.stats().dropped(), 0);
/// ```
pub fn collect_groups<I>(packets: I) -> PacketGrouper<I::IntoIter>
where
    I: IntoIterator<Item = Packet>,
{
    PacketGrouper::new(packets.into_iter())
}
