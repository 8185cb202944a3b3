use std::fmt::Display;
use std::io::Read;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::datatype::{BodyKind, Registry, Schema};
use crate::error::{Error, InvalidReason, Result};
use crate::format::{BitFieldFormat, Fields};
use crate::header::{PrimaryHeader, SecondaryHeader, MAX_DATA_LENGTH, MAX_TRAILER_LENGTH};
use crate::item::{walk_items, Item, ItemWalker};

/// Decoded packet body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Flat {
        /// Fields decoded from the leading bytes, if the schema declares a data format
        fields: Fields,
        /// Body bytes following the CSDW and any decoded fields
        raw: Vec<u8>,
    },
    Items(Vec<Item>),
}

#[derive(Debug, Clone)]
struct Decoded {
    csdw: Fields,
    payload: Payload,
}

/// Serializable state of a [Packet], sufficient to reconstruct it without the source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PacketSnapshot {
    pub offset: usize,
    pub header: PrimaryHeader,
    pub secondary: Option<SecondaryHeader>,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Packet represents a single Chapter 10 packet and its associated data.
///
/// The packet retains every byte it was decoded from (see [Packet::as_bytes]). The body is
/// decoded according to the [Schema] registered for the header's `data_type`, either
/// when the packet is read or, for lazily read packets, on first access.
///
/// # Example
/// ```
/// use chapter10::{Packet, PrimaryHeader, SYNC_PATTERN};
///
/// let mut header = PrimaryHeader {
///     sync_pattern: SYNC_PATTERN,
///     channel_id: 1,
///     packet_length: 28,
///     data_length: 4,
///     header_version: 6,
///     sequence_number: 0,
///     secondary_header: false,
///     ipts_source: 0,
///     rtc_sync_error: 0,
///     data_overflow_error: 0,
///     secondary_format: 0,
///     data_checksum_present: 0,
///     data_type: 0x7f,
///     rtc: 0,
///     header_checksum: 0,
///     header_sums: 0,
/// };
/// header.seal().unwrap();
/// let mut dat = header.encode().unwrap();
/// dat.extend_from_slice(&[1, 2, 3, 4]);
///
/// let packet = Packet::from_bytes(&dat).unwrap();
/// assert_eq!(packet.header.channel_id, 1);
/// assert_eq!(packet.raw().unwrap(), &[1, 2, 3, 4]);
/// assert_eq!(packet.as_bytes(), &dat[..]);
/// ```
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: PrimaryHeader,
    pub secondary: Option<SecondaryHeader>,
    /// All packet bytes, including headers
    data: Vec<u8>,
    offset: usize,
    schema: Arc<Schema>,
    decoded: OnceLock<Decoded>,
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet{{channel_id: {}, data_type: {:#04x}, sequence_number: {}, data:[len={}]}}",
            self.header.channel_id,
            self.header.data_type,
            self.header.sequence_number,
            self.data.len()
        )
    }
}

/// Validate headers in order: header checksum, sync, then either the secondary checksum or,
/// without a secondary header, the data length cap. Last, `packet_length` must cover the
/// headers and, without a secondary header, be no longer than the largest possible packet.
///
/// # Errors
/// [Error::InvalidPacket] with the first failing check.
pub fn validate(header: &PrimaryHeader, secondary: Option<&SecondaryHeader>) -> Result<()> {
    header.validate()?;
    match secondary {
        Some(secondary) => secondary.validate()?,
        None => {
            if header.data_length > MAX_DATA_LENGTH {
                return Err(InvalidReason::DataLengthTooLarge(header.data_length).into());
            }
        }
    }

    let packet_length = u64::from(header.packet_length);
    let header_len = header.header_len() as u64;
    let too_long = secondary.is_none()
        && packet_length
            > header_len + u64::from(MAX_DATA_LENGTH) + u64::from(MAX_TRAILER_LENGTH);
    if packet_length < header_len || too_long {
        return Err(InvalidReason::PacketLength(header.packet_length).into());
    }
    Ok(())
}

/// Number of bytes read for a packet. Normally `packet_length`, but never less than the
/// headers plus `data_length` so the body can always be decoded.
fn span(header: &PrimaryHeader) -> usize {
    let declared = usize::try_from(header.packet_length).unwrap_or(usize::MAX);
    let body = usize::try_from(header.data_length).unwrap_or(usize::MAX);
    declared.max(header.header_len().saturating_add(body))
}

impl Packet {
    /// Read a single packet using the default [Registry], decoding its body.
    ///
    /// # Errors
    /// [Error::Io] if the primary header cannot be read, [Error::InvalidPacket] if header
    /// validation fails, [Error::Truncated] if the source ends before the packet does or
    /// the body does not match its schema.
    pub fn read<R>(r: R) -> Result<Packet>
    where
        R: Read,
    {
        Self::read_with(r, &Registry::default(), false)
    }

    /// Read a single packet using `registry`. When `lazy` is set, the body is decoded on
    /// first access instead of here. Either way a body that does not fit its schema is an
    /// error here, so lazy and eager reads accept the same packets.
    ///
    /// # Errors
    /// See [Self::read].
    pub fn read_with<R>(mut r: R, registry: &Registry, lazy: bool) -> Result<Packet>
    where
        R: Read,
    {
        let mut buf = vec![0u8; PrimaryHeader::LEN];
        r.read_exact(&mut buf)?;
        let header = PrimaryHeader::decode(&buf)?;
        header.validate()?;

        // Past this point the packet has a valid header, so running out of bytes means
        // the packet is truncated rather than that the source is exhausted.
        let secondary = if header.secondary_header {
            fill(&mut r, &mut buf, PrimaryHeader::LEN + SecondaryHeader::LEN)?;
            Some(SecondaryHeader::decode(&buf[PrimaryHeader::LEN..])?)
        } else {
            None
        };
        validate(&header, secondary.as_ref())?;

        fill(&mut r, &mut buf, span(&header))?;

        let packet = Packet {
            header,
            secondary,
            data: buf,
            offset: 0,
            schema: registry.lookup(header.data_type),
            decoded: OnceLock::new(),
        };
        if lazy {
            packet.check_body()?;
        } else {
            packet.decoded()?;
        }
        Ok(packet)
    }

    /// Decode a packet from the front of `dat` using the default [Registry].
    ///
    /// # Errors
    /// See [Self::read]. Too few bytes for the primary header is [Error::Truncated].
    pub fn from_bytes(dat: &[u8]) -> Result<Packet> {
        Self::from_bytes_with(dat, &Registry::default(), false)
    }

    /// # Errors
    /// See [Self::from_bytes].
    pub fn from_bytes_with(dat: &[u8], registry: &Registry, lazy: bool) -> Result<Packet> {
        if dat.len() < PrimaryHeader::LEN {
            return Err(Error::Truncated {
                actual: dat.len(),
                minimum: PrimaryHeader::LEN,
            });
        }
        Self::read_with(dat, registry, lazy)
    }

    /// Reconstruct a packet from a [PacketSnapshot]. The body is decoded on first access.
    ///
    /// # Errors
    /// [Error::Truncated] if the snapshot data is shorter than its headers.
    pub fn restore(snapshot: PacketSnapshot, registry: &Registry) -> Result<Packet> {
        let PacketSnapshot {
            offset,
            header,
            secondary,
            data,
        } = snapshot;
        if data.len() < header.header_len() {
            return Err(Error::Truncated {
                actual: data.len(),
                minimum: header.header_len(),
            });
        }
        Ok(Packet {
            header,
            secondary,
            data,
            offset,
            schema: registry.lookup(header.data_type),
            decoded: OnceLock::new(),
        })
    }

    /// Capture this packet's headers and bytes.
    #[must_use]
    pub fn snapshot(&self) -> PacketSnapshot {
        PacketSnapshot {
            offset: self.offset,
            header: self.header,
            secondary: self.secondary,
            data: self.data.clone(),
        }
    }

    /// The exact bytes this packet was read from.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes this packet occupies in its source, i.e., `packet_length`. May be
    /// shorter than [Self::as_bytes] when `data_length` runs past `packet_length`.
    #[must_use]
    pub fn packet_len(&self) -> usize {
        usize::try_from(self.header.packet_length)
            .unwrap_or(usize::MAX)
            .min(self.data.len())
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }

    /// Byte offset of this packet in its source. Always 0 for packets not read through a
    /// [crate::PacketStream].
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Packet body bytes: `data_length` bytes following the headers.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        let start = self.header.header_len();
        let len = usize::try_from(self.header.data_length).unwrap_or(usize::MAX);
        &self.data[start..start.saturating_add(len).min(self.data.len())]
    }

    /// True once the body has been decoded.
    #[must_use]
    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }

    fn decoded(&self) -> Result<&Decoded> {
        if let Some(decoded) = self.decoded.get() {
            return Ok(decoded);
        }
        let decoded = self.decode_body()?;
        Ok(self.decoded.get_or_init(|| decoded))
    }

    /// Check the body against the schema's layout without decoding it. Fails exactly when
    /// [Self::decode_body] would.
    fn check_body(&self) -> Result<()> {
        let body = self.body();
        let csdw_len = self.schema.csdw_len();
        if body.len() < csdw_len {
            return Err(Error::Truncated {
                actual: body.len(),
                minimum: csdw_len,
            });
        }
        let rest = &body[csdw_len..];

        match &self.schema.body {
            BodyKind::Flat { data_format } => {
                let need = data_format.as_ref().map_or(0, BitFieldFormat::size_bytes);
                if rest.len() < need {
                    return Err(Error::Truncated {
                        actual: rest.len(),
                        minimum: need,
                    });
                }
            }
            BodyKind::Items {
                iph_format,
                label,
                item_size,
            } => {
                let count = match &self.schema.csdw_format {
                    Some(format) => format.field_value(body, "count")?,
                    None => None,
                };
                ItemWalker::new(rest, iph_format.clone(), label, *item_size, count).check()?;
            }
        }
        Ok(())
    }

    fn decode_body(&self) -> Result<Decoded> {
        let body = self.body();
        let csdw_len = self.schema.csdw_len();
        let csdw = match &self.schema.csdw_format {
            Some(format) => format.decode(body)?,
            None => Fields::new(),
        };
        let rest = &body[csdw_len..];

        let payload = match &self.schema.body {
            BodyKind::Flat { data_format } => match data_format {
                Some(format) => Payload::Flat {
                    fields: format.decode(rest)?,
                    raw: rest[format.size_bytes()..].to_vec(),
                },
                None => Payload::Flat {
                    fields: Fields::new(),
                    raw: rest.to_vec(),
                },
            },
            BodyKind::Items {
                iph_format,
                label,
                item_size,
            } => Payload::Items(walk_items(
                rest,
                iph_format.clone(),
                label,
                *item_size,
                csdw.get("count").copied(),
            )?),
        };

        Ok(Decoded { csdw, payload })
    }

    /// Decoded channel specific data word.
    ///
    /// # Errors
    /// Any error decoding the body, see [Self::payload].
    pub fn csdw(&self) -> Result<&Fields> {
        Ok(&self.decoded()?.csdw)
    }

    /// Decoded body, decoding it first if necessary.
    ///
    /// # Errors
    /// [Error::Truncated] if the body is too short for the schema's formats.
    pub fn payload(&self) -> Result<&Payload> {
        Ok(&self.decoded()?.payload)
    }

    /// Items of an items body; empty for flat bodies.
    ///
    /// # Errors
    /// See [Self::payload].
    pub fn items(&self) -> Result<&[Item]> {
        match self.payload()? {
            Payload::Items(items) => Ok(items),
            Payload::Flat { .. } => Ok(&[]),
        }
    }

    /// Undecoded bytes of a flat body; empty for items bodies.
    ///
    /// # Errors
    /// See [Self::payload].
    pub fn raw(&self) -> Result<&[u8]> {
        match self.payload()? {
            Payload::Flat { raw, .. } => Ok(raw),
            Payload::Items(_) => Ok(&[]),
        }
    }

    /// Iterate over items. Yields nothing if the body is flat or fails to decode; use
    /// [Self::items] or [Self::payload] to see the decode error.
    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items().unwrap_or(&[]).iter()
    }

    /// Number of items, 0 if the body is flat or fails to decode. See [Self::iter].
    #[must_use]
    pub fn len(&self) -> usize {
        self.items().map_or(0, <[Item]>::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Verify the trailing data checksum, if the header declares one.
    ///
    /// The checksum occupies the last bytes of the packet and covers the body.
    #[must_use]
    pub fn verify_data_checksum(&self) -> Option<bool> {
        let kind = self.header.data_checksum();
        if kind.is_empty() {
            return None;
        }
        let width = kind.len();
        let trailer = self.data.len().checked_sub(width)?;
        if trailer < self.header.header_len() {
            return Some(false);
        }
        let stored = self.data[trailer..]
            .iter()
            .fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
        let body = self.body();
        let body = &body[..body.len().min(trailer - self.header.header_len())];
        Some(kind.compute(body) == stored)
    }
}

impl<'a> IntoIterator for &'a Packet {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Read until `buf` holds `len` bytes, failing with [Error::Truncated] if `r` ends first.
fn fill<R>(r: &mut R, buf: &mut Vec<u8>, len: usize) -> Result<()>
where
    R: Read,
{
    let have = buf.len();
    if have >= len {
        return Ok(());
    }
    let want = (len - have) as u64;
    r.take(want).read_to_end(buf)?;
    if buf.len() < len {
        return Err(Error::Truncated {
            actual: buf.len(),
            minimum: len,
        });
    }
    Ok(())
}
