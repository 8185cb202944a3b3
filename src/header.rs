use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InvalidReason, Result};
use crate::format::{BitFieldFormat, Fields};

/// Value of `sync_pattern` for every valid packet.
pub const SYNC_PATTERN: u16 = 0xeb25;

/// Largest `data_length` accepted for packets without a secondary header.
pub const MAX_DATA_LENGTH: u32 = 524_288;

/// Bytes a packet may carry past its body: up to 3 filler bytes and a 4 byte data checksum.
pub const MAX_TRAILER_LENGTH: u32 = 7;

fn primary_format() -> &'static BitFieldFormat {
    static FORMAT: OnceLock<BitFieldFormat> = OnceLock::new();
    FORMAT.get_or_init(|| {
        BitFieldFormat::compile(
            "
            u16 sync_pattern
            u16 channel_id
            u32 packet_length
            u32 data_length
            u8 header_version
            u8 sequence_number
            u1 secondary_header
            u1 ipts_source
            u1 rtc_sync_error
            u1 data_overflow_error
            u2 secondary_format
            u2 data_checksum_present
            u8 data_type
            u48 rtc
            u16 header_checksum",
        )
        .expect("built-in primary header format is not valid")
    })
}

fn secondary_format() -> &'static BitFieldFormat {
    static FORMAT: OnceLock<BitFieldFormat> = OnceLock::new();
    FORMAT.get_or_init(|| {
        BitFieldFormat::compile(
            "
            u64 secondary_time
            p16 reserved
            u16 secondary_checksum",
        )
        .expect("built-in secondary header format is not valid")
    })
}

/// Sum of the big-endian 16-bit words in `dat`, modulo 2^16. A trailing odd byte is
/// ignored.
#[must_use]
pub fn word_sum(dat: &[u8]) -> u16 {
    dat.chunks_exact(2)
        .fold(0u16, |acc, w| acc.wrapping_add(u16::from_be_bytes([w[0], w[1]])))
}

fn field(fields: &Fields, name: &str) -> u64 {
    fields.get(name).copied().unwrap_or_default()
}

/// Time source of the secondary header and intra-packet time stamps, from
/// [PrimaryHeader::secondary_format].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFormat {
    /// IRIG-106 Chapter 4 binary weighted time
    Chapter4,
    /// IEEE-1588 precision time; seconds in the upper 32 bits, nanoseconds in the lower
    Ieee1588,
    /// Extended relative time counter
    Ertc,
    Reserved,
}

impl From<u8> for TimeFormat {
    fn from(value: u8) -> Self {
        match value & 0x3 {
            0 => TimeFormat::Chapter4,
            1 => TimeFormat::Ieee1588,
            2 => TimeFormat::Ertc,
            _ => TimeFormat::Reserved,
        }
    }
}

/// Width of the optional data checksum trailing a packet, from
/// [PrimaryHeader::data_checksum_present].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataChecksum {
    None,
    Sum8,
    Sum16,
    Sum32,
}

impl DataChecksum {
    /// Number of bytes the checksum occupies at the end of the packet.
    #[must_use]
    pub fn len(self) -> usize {
        match self {
            DataChecksum::None => 0,
            DataChecksum::Sum8 => 1,
            DataChecksum::Sum16 => 2,
            DataChecksum::Sum32 => 4,
        }
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self == DataChecksum::None
    }

    /// Sum `dat` in words of this checksum's width, truncated to that width.
    #[must_use]
    pub fn compute(self, dat: &[u8]) -> u32 {
        match self {
            DataChecksum::None => 0,
            DataChecksum::Sum8 => dat.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)).into(),
            DataChecksum::Sum16 => word_sum(dat).into(),
            DataChecksum::Sum32 => dat.chunks_exact(4).fold(0u32, |acc, w| {
                acc.wrapping_add(u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
            }),
        }
    }
}

impl From<u8> for DataChecksum {
    fn from(value: u8) -> Self {
        match value & 0x3 {
            0 => DataChecksum::None,
            1 => DataChecksum::Sum8,
            2 => DataChecksum::Sum16,
            _ => DataChecksum::Sum32,
        }
    }
}

/// Chapter 10 primary packet header.
///
/// The header is always 24 bytes and ends with a checksum over the preceding 11 words.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryHeader {
    pub sync_pattern: u16,
    pub channel_id: u16,
    /// Total packet length in bytes, including headers.
    pub packet_length: u32,
    /// Length of the packet body in bytes, excluding headers.
    pub data_length: u32,
    pub header_version: u8,
    pub sequence_number: u8,
    pub secondary_header: bool,
    pub ipts_source: u8,
    pub rtc_sync_error: u8,
    pub data_overflow_error: u8,
    pub secondary_format: u8,
    pub data_checksum_present: u8,
    /// Selects the payload schema, see [crate::Registry].
    pub data_type: u8,
    /// 48-bit relative time counter.
    pub rtc: u64,
    pub header_checksum: u16,
    /// Checksum computed from the decoded bytes, compared against `header_checksum`.
    pub header_sums: u16,
}

impl PrimaryHeader {
    /// Size of a ``PrimaryHeader``
    pub const LEN: usize = 24;
    /// Relative time counter rate
    pub const RTC_HZ: u64 = 10_000_000;

    /// Decode a header from the first [Self::LEN] bytes of `buf`.
    ///
    /// No validation is performed, see [Self::validate].
    ///
    /// # Errors
    /// [crate::Error::Truncated] if there are not enough bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let fields = primary_format().decode(buf)?;
        Ok(PrimaryHeader {
            sync_pattern: field(&fields, "sync_pattern") as u16,
            channel_id: field(&fields, "channel_id") as u16,
            packet_length: field(&fields, "packet_length") as u32,
            data_length: field(&fields, "data_length") as u32,
            header_version: field(&fields, "header_version") as u8,
            sequence_number: field(&fields, "sequence_number") as u8,
            secondary_header: field(&fields, "secondary_header") == 1,
            ipts_source: field(&fields, "ipts_source") as u8,
            rtc_sync_error: field(&fields, "rtc_sync_error") as u8,
            data_overflow_error: field(&fields, "data_overflow_error") as u8,
            secondary_format: field(&fields, "secondary_format") as u8,
            data_checksum_present: field(&fields, "data_checksum_present") as u8,
            data_type: field(&fields, "data_type") as u8,
            rtc: field(&fields, "rtc"),
            header_checksum: field(&fields, "header_checksum") as u16,
            header_sums: word_sum(&buf[..Self::LEN - 2]),
        })
    }

    /// All header fields as a name to value mapping. `header_sums` is not included.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        [
            ("sync_pattern", u64::from(self.sync_pattern)),
            ("channel_id", u64::from(self.channel_id)),
            ("packet_length", u64::from(self.packet_length)),
            ("data_length", u64::from(self.data_length)),
            ("header_version", u64::from(self.header_version)),
            ("sequence_number", u64::from(self.sequence_number)),
            ("secondary_header", u64::from(self.secondary_header)),
            ("ipts_source", u64::from(self.ipts_source)),
            ("rtc_sync_error", u64::from(self.rtc_sync_error)),
            ("data_overflow_error", u64::from(self.data_overflow_error)),
            ("secondary_format", u64::from(self.secondary_format)),
            ("data_checksum_present", u64::from(self.data_checksum_present)),
            ("data_type", u64::from(self.data_type)),
            ("rtc", self.rtc),
            ("header_checksum", u64::from(self.header_checksum)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    /// Encode the header fields as they are, including `header_checksum`.
    ///
    /// # Errors
    /// [crate::Error::ValueOutOfRange] if a field exceeds its wire width, e.g., an `rtc`
    /// over 48 bits.
    pub fn encode(&self) -> Result<Vec<u8>> {
        primary_format().encode(&self.to_fields())
    }

    /// Recompute `header_checksum` and `header_sums` from the current field values.
    ///
    /// # Errors
    /// See [Self::encode].
    pub fn seal(&mut self) -> Result<()> {
        let buf = self.encode()?;
        self.header_sums = word_sum(&buf[..Self::LEN - 2]);
        self.header_checksum = self.header_sums;
        Ok(())
    }

    /// Checks the checksum and then the sync pattern.
    ///
    /// # Errors
    /// [InvalidReason::HeaderChecksum] or [InvalidReason::BadSync].
    pub fn validate(&self) -> std::result::Result<(), InvalidReason> {
        if self.header_sums != self.header_checksum {
            return Err(InvalidReason::HeaderChecksum {
                expected: self.header_checksum,
                actual: self.header_sums,
            });
        }
        if self.sync_pattern != SYNC_PATTERN {
            return Err(InvalidReason::BadSync(self.sync_pattern));
        }
        Ok(())
    }

    /// Size of the primary and, if present, secondary header.
    #[must_use]
    pub fn header_len(&self) -> usize {
        if self.secondary_header {
            Self::LEN + SecondaryHeader::LEN
        } else {
            Self::LEN
        }
    }

    #[must_use]
    pub fn time_format(&self) -> TimeFormat {
        TimeFormat::from(self.secondary_format)
    }

    #[must_use]
    pub fn data_checksum(&self) -> DataChecksum {
        DataChecksum::from(self.data_checksum_present)
    }

    /// Relative time counter as elapsed time.
    #[must_use]
    pub fn rtc_duration(&self) -> Duration {
        Duration::from_nanos(self.rtc.saturating_mul(1_000_000_000 / Self::RTC_HZ))
    }
}

/// Optional 12 byte secondary header, present when [PrimaryHeader::secondary_header] is set.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondaryHeader {
    pub secondary_time: u64,
    pub secondary_checksum: u16,
    pub secondary_sums: u16,
}

impl SecondaryHeader {
    /// Size of a ``SecondaryHeader``
    pub const LEN: usize = 12;

    /// Decode a secondary header from the first [Self::LEN] bytes of `buf`.
    ///
    /// # Errors
    /// [crate::Error::Truncated] if there are not enough bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let fields = secondary_format().decode(buf)?;
        Ok(SecondaryHeader {
            secondary_time: field(&fields, "secondary_time"),
            secondary_checksum: field(&fields, "secondary_checksum") as u16,
            secondary_sums: word_sum(&buf[..Self::LEN - 2]),
        })
    }

    #[must_use]
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("secondary_time".into(), self.secondary_time);
        fields.insert("secondary_checksum".into(), self.secondary_checksum.into());
        fields
    }

    /// Encode the secondary header; the reserved word is always zero.
    ///
    /// # Errors
    /// Not expected, all fields fit their wire widths.
    pub fn encode(&self) -> Result<Vec<u8>> {
        secondary_format().encode(&self.to_fields())
    }

    /// Recompute `secondary_checksum` and `secondary_sums`.
    ///
    /// # Errors
    /// See [Self::encode].
    pub fn seal(&mut self) -> Result<()> {
        let buf = self.encode()?;
        self.secondary_sums = word_sum(&buf[..Self::LEN - 2]);
        self.secondary_checksum = self.secondary_sums;
        Ok(())
    }

    /// # Errors
    /// [InvalidReason::SecondaryChecksum] on a checksum mismatch.
    pub fn validate(&self) -> std::result::Result<(), InvalidReason> {
        if self.secondary_sums != self.secondary_checksum {
            return Err(InvalidReason::SecondaryChecksum {
                expected: self.secondary_checksum,
                actual: self.secondary_sums,
            });
        }
        Ok(())
    }

    /// Absolute time of the packet. Only IEEE-1588 time carries an absolute epoch, all
    /// other formats return `None`.
    #[must_use]
    pub fn time(&self, format: TimeFormat) -> Option<DateTime<Utc>> {
        match format {
            TimeFormat::Ieee1588 => {
                let secs = i64::try_from(self.secondary_time >> 32).ok()?;
                let nanos = u32::try_from(self.secondary_time & 0xffff_ffff).ok()?;
                DateTime::from_timestamp(secs, nanos)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample() -> PrimaryHeader {
        let mut hdr = PrimaryHeader {
            sync_pattern: SYNC_PATTERN,
            channel_id: 0x0102,
            packet_length: 0x28,
            data_length: 0x10,
            header_version: 0x06,
            sequence_number: 0x7f,
            secondary_header: false,
            ipts_source: 1,
            rtc_sync_error: 0,
            data_overflow_error: 1,
            secondary_format: 2,
            data_checksum_present: 1,
            data_type: 0x38,
            rtc: 0x0000_1234_5678,
            header_checksum: 0,
            header_sums: 0,
        };
        hdr.seal().unwrap();
        hdr
    }

    #[test]
    fn word_sum_wraps() {
        assert_eq!(word_sum(&[0xff, 0xff, 0x00, 0x02]), 1);
        assert_eq!(word_sum(&[0x12, 0x34, 0x56]), 0x1234);
        assert_eq!(word_sum(&[]), 0);
    }

    #[test]
    fn primary_header_layout() {
        let hdr = sample();
        let buf = hdr.encode().unwrap();
        assert_eq!(buf.len(), PrimaryHeader::LEN);

        #[rustfmt::skip]
        let expected = [
            0xeb, 0x25, 0x01, 0x02,
            0x00, 0x00, 0x00, 0x28,
            0x00, 0x00, 0x00, 0x10,
            0x06, 0x7f,
            // secondary(0) ipts(1) rtc_sync(0) overflow(1) secondary_format(10) checksum(01)
            0b0101_1001,
            0x38,
            0x00, 0x00, 0x12, 0x34, 0x56, 0x78,
        ];
        assert_eq!(&buf[..22], &expected[..]);
        assert_eq!(
            u16::from_be_bytes([buf[22], buf[23]]),
            word_sum(&expected),
            "checksum should be the sum of the preceding words"
        );
    }

    #[test]
    fn primary_header_roundtrip() {
        let hdr = sample();
        let buf = hdr.encode().unwrap();
        let decoded = PrimaryHeader::decode(&buf).unwrap();
        assert_eq!(decoded, hdr);
        assert!(decoded.validate().is_ok());
        assert_eq!(decoded.encode().unwrap(), buf);
    }

    #[test]
    fn decode_short_header_fails() {
        let buf = sample().encode().unwrap();
        assert!(matches!(
            PrimaryHeader::decode(&buf[..23]),
            Err(Error::Truncated {
                actual: 23,
                minimum: 24
            })
        ));
    }

    #[test]
    fn checksum_mismatch_is_reported_before_sync() {
        let buf = sample().encode().unwrap();
        let mut bad = buf.clone();
        bad[0] ^= 0x01;
        let hdr = PrimaryHeader::decode(&bad).unwrap();
        assert!(matches!(
            hdr.validate(),
            Err(InvalidReason::HeaderChecksum { .. })
        ));
    }

    #[test]
    fn bad_sync_with_valid_checksum() {
        let mut hdr = sample();
        hdr.sync_pattern = 0x1234;
        hdr.seal().unwrap();
        assert_eq!(hdr.validate(), Err(InvalidReason::BadSync(0x1234)));
    }

    #[test]
    fn rtc_wider_than_48_bits_cannot_encode() {
        let mut hdr = sample();
        hdr.rtc = 1 << 48;
        assert!(matches!(hdr.encode(), Err(Error::ValueOutOfRange { .. })));
    }

    #[test]
    fn secondary_header_roundtrip() {
        let mut sec = SecondaryHeader {
            secondary_time: 0x0102_0304_0506_0708,
            secondary_checksum: 0,
            secondary_sums: 0,
        };
        sec.seal().unwrap();
        let buf = sec.encode().unwrap();
        assert_eq!(buf.len(), SecondaryHeader::LEN);
        assert_eq!(&buf[8..10], &[0, 0], "reserved word must be zero");

        let decoded = SecondaryHeader::decode(&buf).unwrap();
        assert_eq!(decoded, sec);
        assert!(decoded.validate().is_ok());
        assert_eq!(decoded.encode().unwrap(), buf);

        let mut bad = buf.clone();
        bad[3] ^= 0x80;
        assert!(matches!(
            SecondaryHeader::decode(&bad).unwrap().validate(),
            Err(InvalidReason::SecondaryChecksum { .. })
        ));
    }

    #[test]
    fn ieee1588_time() {
        let sec = SecondaryHeader {
            secondary_time: (1_700_000_000u64 << 32) | 500,
            secondary_checksum: 0,
            secondary_sums: 0,
        };
        let time = sec.time(TimeFormat::Ieee1588).unwrap();
        assert_eq!(time.timestamp(), 1_700_000_000);
        assert_eq!(time.timestamp_subsec_nanos(), 500);
        assert!(sec.time(TimeFormat::Chapter4).is_none());
    }

    #[test]
    fn rtc_duration_uses_10mhz_ticks() {
        let mut hdr = sample();
        hdr.rtc = 10_000_000;
        assert_eq!(hdr.rtc_duration(), Duration::from_secs(1));
    }

    #[test]
    fn flag_conversions() {
        let hdr = sample();
        assert_eq!(hdr.time_format(), TimeFormat::Ertc);
        assert_eq!(hdr.data_checksum(), DataChecksum::Sum8);
        assert_eq!(DataChecksum::Sum32.len(), 4);
        assert_eq!(DataChecksum::Sum8.compute(&[0xff, 0x02]), 1);
    }
}
