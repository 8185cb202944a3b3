use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::packet::Packet;

/// Calculate the number of packets missing between two sequence numbers of the same channel.
///
/// `cur` is the current sequence number. `last` is the sequence number seen before `cur`.
/// Sequence numbers wrap from 255 to 0.
#[must_use]
pub fn missing_packets(cur: u8, last: u8) -> u8 {
    cur.wrapping_sub(last).wrapping_sub(1)
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub count: usize,
    pub bytes: usize,
    pub missing: usize,
    /// Data types seen on this channel
    pub data_types: Vec<u8>,
}

/// Tracks stats on packet iteration.
///
/// # Example
/// ```
/// use chapter10::{read_packets, Packet, Summary};
/// let dat: &[u8] = &[];
///
/// let mut summary = Summary::default();
/// let packets: Vec<Packet> = read_packets(dat)
///     .filter_map(Result::ok)
///     .inspect(|p| summary.add(p))
///     .collect();
/// assert_eq!(summary.count, packets.len());
/// ```
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub bytes: usize,
    pub missing: usize,
    pub channels: HashMap<u16, ChannelSummary>,

    last_sequence: HashMap<u16, u8>,
}

impl Summary {
    pub fn add(&mut self, packet: &Packet) {
        let hdr = packet.header;
        let len = packet.packet_len();
        self.count += 1;
        self.bytes += len;

        let channel = self.channels.entry(hdr.channel_id).or_default();
        channel.count += 1;
        channel.bytes += len;
        if !channel.data_types.contains(&hdr.data_type) {
            channel.data_types.push(hdr.data_type);
        }

        if let Some(last) = self.last_sequence.get(&hdr.channel_id) {
            let missing = usize::from(missing_packets(hdr.sequence_number, *last));
            channel.missing += missing;
            self.missing += missing;
        }
        self.last_sequence.insert(hdr.channel_id, hdr.sequence_number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{PrimaryHeader, SYNC_PATTERN};

    fn packet(channel_id: u16, sequence_number: u8) -> Packet {
        let mut hdr = PrimaryHeader {
            sync_pattern: SYNC_PATTERN,
            channel_id,
            packet_length: 26,
            data_length: 2,
            header_version: 6,
            sequence_number,
            secondary_header: false,
            ipts_source: 0,
            rtc_sync_error: 0,
            data_overflow_error: 0,
            secondary_format: 0,
            data_checksum_present: 0,
            data_type: 0x7f,
            rtc: 0,
            header_checksum: 0,
            header_sums: 0,
        };
        hdr.seal().unwrap();
        let mut dat = hdr.encode().unwrap();
        dat.extend_from_slice(&[0, 0]);
        Packet::from_bytes(&dat).unwrap()
    }

    #[test]
    fn test_missing_packets() {
        assert_eq!(missing_packets(5, 4), 0);
        assert_eq!(missing_packets(5, 3), 1);
        assert_eq!(missing_packets(0, 255), 0);
        assert_eq!(missing_packets(0, 254), 1);
        assert_eq!(missing_packets(0, 0), 255);
    }

    #[test]
    fn summary() {
        let mut summary = Summary::default();
        summary.add(&packet(1, 0));
        summary.add(&packet(2, 10));
        summary.add(&packet(1, 1));
        summary.add(&packet(1, 4));

        assert_eq!(summary.count, 4);
        assert_eq!(summary.bytes, 4 * 26);
        assert_eq!(summary.missing, 2);
        assert_eq!(summary.channels.len(), 2);
        assert_eq!(summary.channels[&1].count, 3);
        assert_eq!(summary.channels[&1].missing, 2);
        assert_eq!(summary.channels[&1].data_types, vec![0x7f]);
        assert_eq!(summary.channels[&2].missing, 0);
    }
}
