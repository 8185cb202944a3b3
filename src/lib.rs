//! IRIG-106 Chapter 10 packet decoding library.
//!
//! Packets are located in a byte stream by their primary header, validated with the
//! header checksums, and their bodies decoded according to a [Schema] selected by the
//! header's data type. Bodies are either flat (CSDW followed by raw bytes) or a sequence
//! of items, each with its own intra-packet header.
//!
//! References:
//! * IRIG Standard 106, Chapter 10: Digital Recording Standard
//!     - <https://www.irig106.org/docs/106-22/chapter10.pdf>
//!
//! # Example
//! ```
//! use chapter10::{read_packets, Packet};
//!
//! let dat: &[u8] = &[0xff; 64];
//! let packets: Vec<Packet> = read_packets(dat).filter_map(Result::ok).collect();
//! assert!(packets.is_empty());
//! ```
mod bits;
mod bytes;
pub mod datatype;
mod error;
pub mod format;
pub mod header;
mod index;
pub mod item;
pub mod packet;
mod stream;
mod summary;

pub use datatype::{BodyKind, Registry, Schema};
pub use error::{Error, InvalidReason, Result};
pub use format::{BitFieldFormat, FieldSpec, Fields};
pub use header::{
    word_sum, DataChecksum, PrimaryHeader, SecondaryHeader, TimeFormat, MAX_DATA_LENGTH,
    MAX_TRAILER_LENGTH, SYNC_PATTERN,
};
pub use index::{decode_indexed, index_packets, PacketIndex};
pub use item::{walk_items, Item, ItemWalker};
pub use packet::{validate, Packet, PacketSnapshot, Payload};
pub use stream::{open, read_packets, PacketReader, PacketStream};
pub use summary::{missing_packets, ChannelSummary, Summary};
