use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::str::FromStr;

use crate::bits::{BitReader, BitWriter};
use crate::error::{Error, Result};

/// Decoded field values keyed by field name.
pub type Fields = BTreeMap<String, u64>;

/// Widest field a format may declare.
pub const MAX_FIELD_BITS: u8 = 64;

/// A single field of a [BitFieldFormat]. A field without a name is padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: Option<String>,
    pub bits: u8,
}

impl FieldSpec {
    #[must_use]
    pub fn is_padding(&self) -> bool {
        self.name.is_none()
    }

    fn max_value(&self) -> u64 {
        if self.bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }
}

/// A compiled, ordered layout of bit-packed unsigned fields.
///
/// Fields are packed contiguously, most significant bit first, in declaration order.
///
/// # Example
/// ```
/// use chapter10::BitFieldFormat;
///
/// let fmt = BitFieldFormat::compile("u4 a p4 u8 b").unwrap();
/// assert_eq!(fmt.size_bits(), 16);
///
/// let fields = fmt.decode(&[0xa0, 0x17]).unwrap();
/// assert_eq!(fields["a"], 0xa);
/// assert_eq!(fields["b"], 0x17);
/// assert_eq!(fmt.encode(&fields).unwrap(), vec![0xa0, 0x17]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitFieldFormat {
    fields: Vec<FieldSpec>,
    size_bits: usize,
}

fn parse_width(token: &str) -> Option<(char, u8)> {
    let mut chars = token.chars();
    let kind = chars.next()?;
    if kind != 'u' && kind != 'p' {
        return None;
    }
    let width = chars.as_str();
    if width.is_empty() || !width.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Out-of-range widths are still width tokens; the caller rejects them.
    let width = width.parse::<u64>().ok()?.min(u64::from(u8::MAX));
    #[allow(clippy::cast_possible_truncation)]
    Some((kind, width as u8))
}

impl BitFieldFormat {
    /// Compile whitespace separated `u<N> <name>` and `p<N>` tokens.
    ///
    /// A padding token may be followed by a descriptive label, which is discarded.
    ///
    /// # Errors
    /// [Error::Format] for unrecognized tokens, a missing field name, duplicate names, or
    /// widths outside of 1 to 64 bits.
    pub fn compile(text: &str) -> Result<Self> {
        let mut fields = Vec::new();
        let mut seen = HashSet::new();
        let mut tokens = text.split_whitespace().peekable();

        while let Some(token) = tokens.next() {
            let Some((kind, bits)) = parse_width(token) else {
                return Err(Error::Format(format!("unrecognized token '{token}'")));
            };
            if bits == 0 || bits > MAX_FIELD_BITS {
                return Err(Error::Format(format!(
                    "'{token}' must be between 1 and {MAX_FIELD_BITS} bits"
                )));
            }
            let next_is_label = tokens.peek().is_some_and(|t| parse_width(t).is_none());
            let name = match kind {
                'u' => {
                    if !next_is_label {
                        return Err(Error::Format(format!("'{token}' is missing a field name")));
                    }
                    let name = tokens.next().unwrap_or_default().to_string();
                    if !seen.insert(name.clone()) {
                        return Err(Error::Format(format!("duplicate field '{name}'")));
                    }
                    Some(name)
                }
                _ => {
                    if next_is_label {
                        tokens.next();
                    }
                    None
                }
            };
            fields.push(FieldSpec { name, bits });
        }

        Ok(Self::from_fields(fields))
    }

    #[must_use]
    pub fn from_fields(fields: Vec<FieldSpec>) -> Self {
        let size_bits = fields.iter().map(|f| usize::from(f.bits)).sum();
        BitFieldFormat { fields, size_bits }
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Sum of all declared field widths.
    #[must_use]
    pub fn size_bits(&self) -> usize {
        self.size_bits
    }

    /// Number of whole bytes needed to hold [Self::size_bits].
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.size_bits.div_ceil(8)
    }

    /// True if a named field `name` is declared.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name.as_deref() == Some(name))
    }

    /// Decode fields from the front of `dat`. Any bytes past [Self::size_bytes] are ignored.
    ///
    /// # Errors
    /// [Error::Truncated] if `dat` is shorter than [Self::size_bytes].
    pub fn decode(&self, dat: &[u8]) -> Result<Fields> {
        if dat.len() < self.size_bytes() {
            return Err(Error::Truncated {
                actual: dat.len(),
                minimum: self.size_bytes(),
            });
        }
        let mut reader = BitReader::new(dat);
        let mut out = Fields::new();
        for field in &self.fields {
            let value = reader.read(field.bits)?;
            if let Some(name) = &field.name {
                out.insert(name.clone(), value);
            }
        }
        Ok(out)
    }

    /// Value of the single field `name`, reading no further into `dat` than that field.
    ///
    /// # Errors
    /// [Error::Truncated] if `dat` ends before the field does.
    pub fn field_value(&self, dat: &[u8], name: &str) -> Result<Option<u64>> {
        let mut reader = BitReader::new(dat);
        for field in &self.fields {
            let value = reader.read(field.bits)?;
            if field.name.as_deref() == Some(name) {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Encode `values` into [Self::size_bytes] bytes. Missing fields encode as zero, padding
    /// is always zero, and names not in this format are ignored.
    ///
    /// # Errors
    /// [Error::ValueOutOfRange] if a value does not fit its field width.
    pub fn encode(&self, values: &Fields) -> Result<Vec<u8>> {
        let mut writer = BitWriter::with_bits(self.size_bits);
        for field in &self.fields {
            let value = match &field.name {
                Some(name) => values.get(name).copied().unwrap_or(0),
                None => 0,
            };
            if value > field.max_value() {
                return Err(Error::ValueOutOfRange {
                    field: field.name.clone().unwrap_or_default(),
                    value,
                    bits: field.bits,
                });
            }
            writer.write(value, field.bits);
        }
        Ok(writer.into_inner())
    }
}

impl FromStr for BitFieldFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::compile(s)
    }
}

impl Display for BitFieldFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for field in &self.fields {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            match &field.name {
                Some(name) => write!(f, "u{} {name}", field.bits)?,
                None => write!(f, "p{}", field.bits)?,
            }
        }
        Ok(())
    }
}
