use std::collections::VecDeque;
use std::io::{self, Read};

/// Bytes provides the ability to read bytes from a reader and give them back if a
/// read attempt turns out to be unusable, i.e., read-and-rewind.
///
/// Every byte read since the last [Bytes::commit] or [Bytes::rewind] is journaled. Both put
/// the journaled bytes, minus a number of leading bytes, back in front of the stream so the
/// next read sees them again in their original order.
pub(crate) struct Bytes<R>
where
    R: Read + Send,
{
    reader: R,
    num_read: usize,
    cache: VecDeque<u8>,
    journal: Vec<u8>,
}

impl<R> Bytes<R>
where
    R: Read + Send,
{
    pub fn new(reader: R) -> Self {
        Bytes {
            reader,
            num_read: 0,
            cache: VecDeque::new(),
            journal: Vec::new(),
        }
    }

    /// Consume the first `len` journaled bytes for good and return the rest to the front
    /// of the stream.
    pub fn commit(&mut self, len: usize) {
        self.rewind(len);
    }

    /// Return all journaled bytes except the first `skip` to the front of the stream.
    pub fn rewind(&mut self, skip: usize) {
        let skip = skip.min(self.journal.len());
        for b in self.journal[skip..].iter().rev() {
            self.cache.push_front(*b);
        }
        self.journal.clear();
    }

    /// Offset of the next byte to be read, relative to the start of the reader.
    pub fn offset(&self) -> usize {
        self.num_read - self.cache.len()
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R> Read for Bytes<R>
where
    R: Read + Send,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = if self.cache.is_empty() {
            let n = self.reader.read(buf)?;
            self.num_read += n;
            n
        } else {
            let n = buf.len().min(self.cache.len());
            for (dst, src) in buf.iter_mut().zip(self.cache.drain(..n)) {
                *dst = src;
            }
            n
        };
        self.journal.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test() {
        let dat = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut bytes = Bytes::new(&dat[..]);

        let mut buf = [0u8; 4];
        bytes.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
        assert_eq!(bytes.offset(), 4);

        // give back everything but the first byte
        bytes.rewind(1);
        assert_eq!(bytes.offset(), 1);

        let mut buf = [0u8; 5];
        bytes.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5], "rewound bytes should be read first, in order");
        assert_eq!(bytes.offset(), 6);
    }

    #[test]
    fn commit_discards_journal() {
        let dat = [1, 2, 3, 4, 5, 6];
        let mut bytes = Bytes::new(&dat[..]);

        let mut buf = [0u8; 3];
        bytes.read_exact(&mut buf).unwrap();
        bytes.commit(3);
        bytes.rewind(1);
        assert_eq!(bytes.offset(), 3, "nothing to rewind after commit");

        bytes.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [4, 5, 6]);
    }

    #[test]
    fn partial_commit_returns_the_rest() {
        let dat = [1, 2, 3, 4, 5, 6];
        let mut bytes = Bytes::new(&dat[..]);

        let mut buf = [0u8; 5];
        bytes.read_exact(&mut buf).unwrap();
        bytes.commit(3);
        assert_eq!(bytes.offset(), 3);

        let mut buf = [0u8; 3];
        bytes.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [4, 5, 6]);
    }

    #[test]
    fn repeated_rewinds_walk_forward_one_byte() {
        let dat = [1, 2, 3, 4, 5, 6];
        let mut bytes = Bytes::new(&dat[..]);

        let mut buf = [0u8; 4];
        for start in 1..=3u8 {
            bytes.read_exact(&mut buf).unwrap();
            assert_eq!(buf[0], start);
            bytes.rewind(1);
        }
        assert_eq!(bytes.offset(), 3);
        assert_eq!(bytes.num_read, 6);
    }

    #[test]
    fn eof_after_rewind() {
        let dat = [1, 2, 3];
        let mut bytes = Bytes::new(&dat[..]);

        let mut buf = [0u8; 4];
        let err = bytes.read_exact(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        bytes.rewind(1);

        let mut buf = [0u8; 2];
        bytes.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [2, 3]);
    }
}
