use std::fmt::Display;
use std::ops::Range;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::format::{BitFieldFormat, Fields};

/// One sub-record of an items body: its decoded IPH, label, and payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Decoded intra-packet header fields
    pub fields: Fields,
    pub label: String,
    /// Item payload, excluding the IPH and any filler byte
    pub data: Vec<u8>,
    format: Arc<BitFieldFormat>,
}

impl Item {
    /// Value of the IPH field `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u64> {
        self.fields.get(name).copied()
    }

    /// The IPH format this item was decoded with.
    #[must_use]
    pub fn format(&self) -> &BitFieldFormat {
        &self.format
    }

    /// Re-encode the IPH from [Self::fields].
    ///
    /// # Errors
    /// [Error::ValueOutOfRange] if a field was modified to a value too wide for the IPH.
    pub fn iph_bytes(&self) -> Result<Vec<u8>> {
        self.format.encode(&self.fields)
    }

    /// Encoded IPH followed by the payload.
    ///
    /// # Errors
    /// See [Self::iph_bytes].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = self.iph_bytes()?;
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }
}

impl Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} len={}>", self.label, self.data.len())
    }
}

/// Iterates over the items packed in a body.
///
/// Each item is an IPH followed by a payload of either a fixed size or the IPH's `length`
/// field. Odd length payloads are followed by one filler byte. Iteration stops when `count`
/// items have been produced or the body is exhausted, whichever comes first.
///
/// An IPH that does not fit in the remaining body produces [Error::Truncated] after which
/// the iterator is done. A payload running past the end of the body is cut at the body
/// boundary.
pub struct ItemWalker<'a> {
    body: &'a [u8],
    pos: usize,
    format: Arc<BitFieldFormat>,
    label: &'a str,
    item_size: Option<usize>,
    count: Option<u64>,
    produced: u64,
    done: bool,
}

impl<'a> ItemWalker<'a> {
    /// A `count` of `Some(0)` is treated as no count.
    #[must_use]
    pub fn new(
        body: &'a [u8],
        format: Arc<BitFieldFormat>,
        label: &'a str,
        item_size: Option<usize>,
        count: Option<u64>,
    ) -> Self {
        ItemWalker {
            body,
            pos: 0,
            format,
            label,
            item_size,
            count: count.filter(|c| *c > 0),
            produced: 0,
            done: false,
        }
    }

    /// Current byte offset into the body.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Step over the next item, returning the byte ranges of its IPH and payload.
    fn advance(&mut self) -> Result<(Range<usize>, Range<usize>)> {
        let iph_len = self.format.size_bytes();
        let remaining = self.body.len() - self.pos;
        if remaining < iph_len {
            return Err(Error::Truncated {
                actual: remaining,
                minimum: iph_len,
            });
        }
        let iph = self.pos..self.pos + iph_len;

        let length = match self.item_size {
            Some(size) => size,
            None => self
                .format
                .field_value(&self.body[iph.clone()], "length")?
                .map_or(0, |len| usize::try_from(len).unwrap_or(usize::MAX)),
        };
        let end = iph.end.saturating_add(length).min(self.body.len());
        let data = iph.end..end;
        self.pos = end;

        // items are word aligned
        if length % 2 == 1 {
            self.pos += 1;
        }
        Ok((iph, data))
    }

    fn next_item(&mut self) -> Result<Item> {
        let (iph, data) = self.advance()?;
        Ok(Item {
            fields: self.format.decode(&self.body[iph])?,
            label: self.label.to_string(),
            data: self.body[data].to_vec(),
            format: self.format.clone(),
        })
    }

    fn step<T>(&mut self, f: fn(&mut Self) -> Result<T>) -> Option<Result<T>> {
        if self.done {
            return None;
        }
        if self.count.is_some_and(|count| self.produced >= count) || self.pos >= self.body.len() {
            self.done = true;
            return None;
        }
        match f(self) {
            Ok(value) => {
                self.produced += 1;
                Some(Ok(value))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }

    /// Walk the remaining items without building them, returning how many there are.
    ///
    /// Fails exactly when collecting the items would.
    ///
    /// # Errors
    /// [Error::Truncated] if an IPH does not fit in the body.
    pub fn check(mut self) -> Result<usize> {
        let mut count = 0;
        while let Some(zult) = self.step(Self::advance) {
            zult?;
            count += 1;
        }
        Ok(count)
    }
}

impl Iterator for ItemWalker<'_> {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step(Self::next_item)
    }
}

/// Collect all items of `body`. See [ItemWalker].
///
/// # Errors
/// [Error::Truncated] if an IPH does not fit in the body.
pub fn walk_items(
    body: &[u8],
    format: Arc<BitFieldFormat>,
    label: &str,
    item_size: Option<usize>,
    count: Option<u64>,
) -> Result<Vec<Item>> {
    ItemWalker::new(body, format, label, item_size, count).collect()
}
