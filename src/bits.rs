//! MSB-first bit cursors used by [crate::format::BitFieldFormat].

use crate::error::{Error, Result};

/// Reads unsigned values of up to 64 bits, most significant bit first.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader { data, bit_pos: 0 }
    }

    pub fn bits_remaining(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bit_pos)
    }

    pub fn read(&mut self, bits: u8) -> Result<u64> {
        let bits = usize::from(bits);
        if bits > self.bits_remaining() {
            return Err(Error::Truncated {
                actual: self.data.len(),
                minimum: (self.bit_pos + bits).div_ceil(8),
            });
        }
        let mut value = 0u64;
        let mut left = bits;
        while left > 0 {
            let byte = self.data[self.bit_pos / 8];
            let offset = self.bit_pos % 8;
            // consume as many bits as remain in the current byte
            let take = (8 - offset).min(left);
            let chunk = (byte >> (8 - offset - take)) & (0xffu8 >> (8 - take));
            value = (value << take) | u64::from(chunk);
            self.bit_pos += take;
            left -= take;
        }
        Ok(value)
    }
}

/// Writes unsigned values of up to 64 bits, most significant bit first, into a
/// zero-initialized buffer.
pub(crate) struct BitWriter {
    buf: Vec<u8>,
    bit_pos: usize,
}

impl BitWriter {
    pub fn with_bits(bits: usize) -> Self {
        BitWriter {
            buf: vec![0u8; bits.div_ceil(8)],
            bit_pos: 0,
        }
    }

    /// `value` must already be known to fit in `bits`.
    pub fn write(&mut self, value: u64, bits: u8) {
        let mut left = usize::from(bits);
        while left > 0 {
            let offset = self.bit_pos % 8;
            let take = (8 - offset).min(left);
            #[allow(clippy::cast_possible_truncation)]
            let chunk = ((value >> (left - take)) as u8) & (0xffu8 >> (8 - take));
            self.buf[self.bit_pos / 8] |= chunk << (8 - offset - take);
            self.bit_pos += take;
            left -= take;
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
