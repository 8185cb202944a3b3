#![allow(dead_code)]
use std::path::PathBuf;

use chapter10::{BitFieldFormat, Fields, PrimaryHeader, SYNC_PATTERN};

pub fn fixture_path(name: &str) -> PathBuf {
    let mut path =
        PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"));
    path.push("tests/fixtures");
    path.push(name);
    path
}

/// Bytes of a fixture stored as hex text; whitespace is ignored.
pub fn hex_fixture(name: &str) -> Vec<u8> {
    let text = std::fs::read_to_string(fixture_path(name)).unwrap();
    let text: String = text.split_whitespace().collect();
    hex::decode(text).unwrap()
}

/// A sealed primary header for a packet with a `body_len` byte body and no secondary header.
pub fn header(
    channel_id: u16,
    data_type: u8,
    sequence_number: u8,
    body_len: usize,
) -> PrimaryHeader {
    let len = u32::try_from(body_len).unwrap();
    let mut hdr = PrimaryHeader {
        sync_pattern: SYNC_PATTERN,
        channel_id,
        packet_length: PrimaryHeader::LEN as u32 + len,
        data_length: len,
        header_version: 6,
        sequence_number,
        secondary_header: false,
        ipts_source: 0,
        rtc_sync_error: 0,
        data_overflow_error: 0,
        secondary_format: 0,
        data_checksum_present: 0,
        data_type,
        rtc: 0,
        header_checksum: 0,
        header_sums: 0,
    };
    hdr.seal().unwrap();
    hdr
}

pub fn build_packet(channel_id: u16, data_type: u8, sequence_number: u8, body: &[u8]) -> Vec<u8> {
    let mut dat = header(channel_id, data_type, sequence_number, body.len())
        .encode()
        .unwrap();
    dat.extend_from_slice(body);
    dat
}

pub fn message_iph() -> BitFieldFormat {
    "u64 ipts u16 length u14 subchannel u1 format_error u1 data_error"
        .parse()
        .unwrap()
}

/// Body of a message packet holding one item per entry of `payloads`.
pub fn message_body(payloads: &[&[u8]]) -> Vec<u8> {
    let mut body = vec![0, payloads.len() as u8, 0, 0];
    for (i, payload) in payloads.iter().enumerate() {
        let mut iph = Fields::new();
        iph.insert("ipts".into(), i as u64);
        iph.insert("length".into(), payload.len() as u64);
        body.extend(message_iph().encode(&iph).unwrap());
        body.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            body.push(0);
        }
    }
    body
}
