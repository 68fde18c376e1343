use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{missing_packets, Apid, Packet, PrimaryHeader, Timestamp};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ApidSummary {
    pub count: usize,
    pub bytes: usize,
    pub missing: usize,
    pub first: Option<Timestamp>,
    pub last: Option<Timestamp>,
}

impl ApidSummary {
    fn add_time(&mut self, ts: Timestamp) {
        self.first = Some(self.first.map_or(ts, |cur| cur.min(ts)));
        self.last = Some(self.last.map_or(ts, |cur| cur.max(ts)));
    }
}

/// Tracks stats on packet iteration.
///
/// # Example
/// ```
/// use spexone::spacepacket::{decode_packets, Packet, Summary};
/// let dat: &[u8] = &[0xd, 0x59, 0xc0, 0x01, 0x0, 0x6, 0x63, 0x62, 0x8a, 0x1b, 0x0, 0x0, 0xff];
///
/// let mut summary = Summary::default();
/// let packets: Vec<Packet> = decode_packets(dat)
///     .filter_map(Result::ok)
///     .inspect(|p| {
///         summary.add(p);
///     })
///     .collect();
/// assert_eq!(summary.count, 1);
/// ```
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub bytes: usize,
    pub missing: usize,
    pub first: Option<Timestamp>,
    pub last: Option<Timestamp>,
    pub apids: BTreeMap<Apid, ApidSummary>,

    #[serde(skip)]
    seen_headers: BTreeMap<Apid, PrimaryHeader>,
}

impl Summary {
    pub fn add(&mut self, packet: &Packet) {
        self.count += 1;
        self.bytes += packet.data.len();

        let hdr = packet.header;
        let apid = self.apids.entry(hdr.apid).or_default();
        apid.count += 1;
        apid.bytes += packet.data.len();

        if let Some(last_hdr) = self.seen_headers.get(&hdr.apid) {
            let missing = missing_packets(hdr.sequence_id, last_hdr.sequence_id) as usize;
            apid.missing += missing;
            self.missing += missing;
        }
        self.seen_headers.insert(hdr.apid, hdr);

        if let Some(ts) = packet.timestamp() {
            apid.add_time(ts);
            self.first = Some(self.first.map_or(ts, |cur| cur.min(ts)));
            self.last = Some(self.last.map_or(ts, |cur| cur.max(ts)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary() {
        #[rustfmt::skip]
        let dat: &[u8] = &[
            // byte 4 is sequence number 1 & 3
            0xd, 0x59, 0xc0, 0x01, 0x0, 0x6, 0x63, 0x62, 0x8a, 0x1b, 0x0, 0x0, 0xff,
            0xd, 0x59, 0xc0, 0x03, 0x0, 0x6, 0x63, 0x62, 0x8a, 0x1c, 0x0, 0x0, 0xff,
        ];

        let mut summary = Summary::default();
        let packet = Packet::decode(&dat[0..13]).unwrap();
        summary.add(&packet);
        let packet = Packet::decode(&dat[13..]).unwrap();
        summary.add(&packet);

        assert_eq!(summary.count, 2);
        assert_eq!(summary.bytes, 26);
        assert_eq!(summary.missing, 1);
        assert_eq!(summary.apids.len(), 1);
        assert_eq!(summary.apids[&1369].count, 2);
        assert_eq!(summary.apids[&1369].bytes, 26);
        assert_eq!(summary.apids[&1369].missing, 1);
        assert_eq!(summary.first.unwrap().seconds, 0x6362_8a1b);
        assert_eq!(summary.last.unwrap().seconds, 0x6362_8a1c);
    }
}
