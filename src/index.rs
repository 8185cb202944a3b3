use std::io::Read;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::datatype::Registry;
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::stream::PacketReader;

/// Location of a valid packet in a source.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketIndex {
    pub offset: usize,
    /// Bytes needed to decode the packet, see [Packet::as_bytes].
    pub len: usize,
    pub channel_id: u16,
    pub data_type: u8,
}

/// Locate every valid packet in `reader` without decoding bodies.
///
/// # Errors
/// [Error::Io] if reading the source fails for any reason other than reaching its end.
pub fn index_packets<R>(reader: R) -> Result<Vec<PacketIndex>>
where
    R: Read + Send,
{
    PacketReader::builder()
        .lazy(true)
        .build()
        .read(reader)
        .map(|zult| {
            zult.map(|packet| PacketIndex {
                offset: packet.offset(),
                len: packet.as_bytes().len(),
                channel_id: packet.header.channel_id,
                data_type: packet.header.data_type,
            })
        })
        .collect()
}

/// Decode the packets at `index` in `data` in parallel on the rayon global pool.
///
/// Results are in the same order as `index`. Each packet carries the offset from its
/// index entry.
pub fn decode_indexed(
    data: &[u8],
    index: &[PacketIndex],
    registry: &Registry,
) -> Vec<Result<Packet>> {
    index
        .par_iter()
        .map(|idx| {
            let end = idx.offset.saturating_add(idx.len);
            if end > data.len() {
                return Err(Error::Truncated {
                    actual: data.len().saturating_sub(idx.offset),
                    minimum: idx.len,
                });
            }
            let mut packet = Packet::from_bytes_with(&data[idx.offset..end], registry, false)?;
            packet.set_offset(idx.offset);
            Ok(packet)
        })
        .collect()
}
