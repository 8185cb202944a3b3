/// Reason a candidate packet was rejected by header validation.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    #[error("incorrect sync pattern {0:#06x}")]
    BadSync(u16),
    #[error("header checksum mismatch; expected {expected:#06x}, computed {actual:#06x}")]
    HeaderChecksum { expected: u16, actual: u16 },
    #[error("secondary header checksum mismatch; expected {expected:#06x}, computed {actual:#06x}")]
    SecondaryChecksum { expected: u16, actual: u16 },
    #[error("data length {0} larger than allowed")]
    DataLengthTooLarge(u32),
    #[error("packet length {0} cannot hold the packet headers and body")]
    PacketLength(u32),
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Malformed field format text.
    #[error("invalid format: {0}")]
    Format(String),

    #[error("not enough bytes; got {actual}, need {minimum}")]
    Truncated {
        /// Number of bytes we got
        actual: usize,
        /// Minimum number of expected bytes
        minimum: usize,
    },

    #[error("invalid packet: {0}")]
    InvalidPacket(#[from] InvalidReason),

    #[error("value {value} for field {field} does not fit in {bits} bits")]
    ValueOutOfRange { field: String, value: u64, bits: u8 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when this error is the source running out of bytes.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Io(err) if err.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
