use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace};
use typed_builder::TypedBuilder;

use crate::bytes::Bytes;
use crate::datatype::Registry;
use crate::error::{Error, Result};
use crate::packet::Packet;

/// Options for reading a packet stream. ``PacketReader::read`` starts reading.
///
/// # Example
/// ```
/// use chapter10::PacketReader;
///
/// let dat: &[u8] = &[];
/// let packets = PacketReader::builder()
///     .lazy(true)
///     .build()
///     .read(dat)
///     .filter_map(Result::ok);
/// assert_eq!(packets.count(), 0);
/// ```
#[derive(TypedBuilder, Debug, Clone)]
pub struct PacketReader {
    /// Defer decoding packet bodies until they are accessed.
    #[builder(default)]
    lazy: bool,
    /// Schemas used to decode packet bodies.
    #[builder(default = Arc::new(Registry::default()))]
    registry: Arc<Registry>,
}

impl Default for PacketReader {
    fn default() -> Self {
        PacketReader::builder().build()
    }
}

impl PacketReader {
    /// Start reading packets from `reader`.
    pub fn read<R>(self, reader: R) -> PacketStream<R>
    where
        R: Read + Send,
    {
        PacketStream {
            bytes: Bytes::new(reader),
            lazy: self.lazy,
            registry: self.registry,
            done: false,
        }
    }

    /// Start reading packets from the file at `path`.
    ///
    /// # Errors
    /// [Error::Io] if the file cannot be opened.
    pub fn open<P>(self, path: P) -> Result<PacketStream<BufReader<File>>>
    where
        P: AsRef<Path>,
    {
        Ok(self.read(BufReader::new(File::open(path)?)))
    }
}

/// Iterator over the valid packets in a byte stream.
///
/// Each packet advances the stream by its `packet_length`.
/// A packet that fails to decode or validate is never fatal: the stream steps forward a
/// single byte from where that packet started and tries again, until it finds the next
/// valid packet or runs out of bytes. Running out of bytes ends the iterator. Any other
/// I/O error is produced once as an `Err` and ends the iterator.
///
/// The reader is owned by the stream and dropped with it.
pub struct PacketStream<R>
where
    R: Read + Send,
{
    bytes: Bytes<R>,
    lazy: bool,
    registry: Arc<Registry>,
    done: bool,
}

impl<R> PacketStream<R>
where
    R: Read + Send,
{
    /// Offset of the next byte to be examined.
    pub fn offset(&self) -> usize {
        self.bytes.offset()
    }

    /// Stop reading and release the reader.
    pub fn close(self) {
        drop(self.bytes);
    }

    /// Stop reading and return the reader. Bytes read ahead but not yet used are lost.
    pub fn into_inner(self) -> R {
        self.bytes.into_inner()
    }
}

impl<R> Iterator for PacketStream<R>
where
    R: Read + Send,
{
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let offset = self.bytes.offset();
            match Packet::read_with(&mut self.bytes, &self.registry, self.lazy) {
                Ok(mut packet) => {
                    // Bytes read past `packet_length` to decode the body belong to the
                    // next candidate.
                    self.bytes.commit(packet.packet_len());
                    packet.set_offset(offset);
                    trace!(offset, packet = %packet, "packet");
                    return Some(Ok(packet));
                }
                Err(err) if err.is_eof() => {
                    trace!(offset, "end of source");
                    self.done = true;
                    return None;
                }
                Err(Error::Io(err)) => {
                    debug!(offset, "error reading source: {err}");
                    self.done = true;
                    return Some(Err(Error::Io(err)));
                }
                Err(err) => {
                    debug!(offset, "invalid packet, advancing 1 byte: {err}");
                    self.bytes.rewind(1);
                }
            }
        }
    }
}

/// Return an [Iterator] providing the valid [Packet]s in `reader` using the default
/// [Registry], decoding each packet's body as it is read.
///
/// # Examples
/// ```
/// use chapter10::read_packets;
///
/// let dat: &[u8] = &[0xff; 100];
/// assert_eq!(read_packets(dat).count(), 0);
/// ```
pub fn read_packets<R>(reader: R) -> PacketStream<R>
where
    R: Read + Send,
{
    PacketReader::default().read(reader)
}

/// Read the valid [Packet]s in the file at `path`. See [read_packets].
///
/// # Errors
/// [Error::Io] if the file cannot be opened.
pub fn open<P>(path: P) -> Result<PacketStream<BufReader<File>>>
where
    P: AsRef<Path>,
{
    PacketReader::default().open(path)
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::header::{PrimaryHeader, SYNC_PATTERN};

    fn raw_packet(sequence_number: u8, body: &[u8]) -> Vec<u8> {
        let len = u32::try_from(body.len()).unwrap();
        let mut hdr = PrimaryHeader {
            sync_pattern: SYNC_PATTERN,
            channel_id: 1,
            packet_length: 24 + len,
            data_length: len,
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
        dat.extend_from_slice(body);
        dat
    }

    #[test]
    fn packet_iter_test() {
        let mut dat = raw_packet(1, &[1, 2]);
        dat.extend(raw_packet(2, &[3, 4]));

        let packets: Vec<Packet> = read_packets(&dat[..]).filter_map(Result::ok).collect();

        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].header.sequence_number, 1);
        assert_eq!(packets[0].offset(), 0);
        assert_eq!(packets[0].as_bytes(), &dat[..26]);
        assert_eq!(packets[1].header.sequence_number, 2);
        assert_eq!(packets[1].offset(), 26);
        assert_eq!(packets[1].as_bytes(), &dat[26..]);
    }

    #[test]
    fn skips_leading_garbage() {
        let mut dat = vec![0xeb, 0x25, 0x00, 0xeb];
        dat.extend(raw_packet(1, &[1, 2]));

        let packets: Vec<Packet> = read_packets(&dat[..]).map(Result::unwrap).collect();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].offset(), 4);
    }

    #[test]
    fn truncated_final_packet_ends_cleanly() {
        let mut dat = raw_packet(1, &[1, 2]);
        let second = raw_packet(2, &[3, 4, 5, 6]);
        dat.extend_from_slice(&second[..second.len() - 2]);

        let zults: Vec<Result<Packet>> = read_packets(&dat[..]).collect();
        assert_eq!(zults.len(), 1);
        assert!(zults[0].is_ok());
    }

    #[test]
    fn advances_by_packet_length() {
        // data_length runs 4 bytes past packet_length, into the next packet
        let mut first = raw_packet(1, &[1, 2, 3, 4]);
        let mut hdr = PrimaryHeader::decode(&first).unwrap();
        hdr.data_length = 8;
        hdr.seal().unwrap();
        first[..PrimaryHeader::LEN].copy_from_slice(&hdr.encode().unwrap());
        let second = raw_packet(2, &[5, 6]);

        let mut dat = first.clone();
        dat.extend_from_slice(&second);

        for lazy in [false, true] {
            let packets: Vec<Packet> = PacketReader::builder()
                .lazy(lazy)
                .build()
                .read(&dat[..])
                .map(Result::unwrap)
                .collect();
            assert_eq!(packets.len(), 2, "lazy={lazy}");
            assert_eq!(packets[0].offset(), 0);
            assert_eq!(packets[0].as_bytes().len(), 32);
            assert_eq!(packets[0].packet_len(), 28);
            assert_eq!(packets[1].offset(), 28);
            assert_eq!(packets[1].as_bytes(), &second[..]);
        }
    }

    #[test]
    fn lazy_packets_decode_after_close() {
        let dat = raw_packet(1, &[1, 2]);
        let stream = PacketReader::builder().lazy(true).build().read(&dat[..]);
        let packets: Vec<Packet> = stream.map(Result::unwrap).collect();
        assert!(!packets[0].is_decoded());
        assert_eq!(packets[0].raw().unwrap(), &[1, 2]);
    }

    struct FailingReader {
        dat: Vec<u8>,
        pos: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.dat.len() {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "source went away"));
            }
            let n = buf.len().min(self.dat.len() - self.pos);
            buf[..n].copy_from_slice(&self.dat[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn io_errors_are_fatal() {
        let reader = FailingReader {
            dat: raw_packet(1, &[1, 2]),
            pos: 0,
        };
        let mut stream = read_packets(reader);
        assert!(stream.next().unwrap().is_ok());
        assert!(matches!(stream.next(), Some(Err(Error::Io(_)))));
        assert!(stream.next().is_none());
    }
}
