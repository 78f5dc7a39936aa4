use aero_io_snapshot::io::state::codec::{Decoder, Encoder};
use aero_io_snapshot::io::state::{
    SnapshotError, SnapshotReader, SnapshotVersion, SnapshotWriter,
};

const DEVICE_ID: [u8; 4] = *b"TST0";

fn sample() -> Vec<u8> {
    let mut w = SnapshotWriter::new(DEVICE_ID, SnapshotVersion::new(1, 0));
    w.field_u32(1, 0xDEAD_BEEF);
    w.field_bool(2, true);
    w.finish()
}

#[test]
fn truncation_only_parses_on_field_boundaries() {
    // Header (16) + u32 field (6 + 4) + bool field (6 + 1).
    const BOUNDARIES: [usize; 3] = [16, 26, 33];

    let bytes = sample();
    assert_eq!(bytes.len(), 33);
    for len in 0..=bytes.len() {
        match SnapshotReader::parse(&bytes[..len], DEVICE_ID) {
            Ok(_) => assert!(BOUNDARIES.contains(&len), "len {len} parsed"),
            Err(err) => assert!(
                matches!(err, SnapshotError::Corrupt(_)),
                "len {len}: unexpected error {err:?}"
            ),
        }
    }
}

#[test]
fn bad_magic_is_rejected() {
    let mut bytes = sample();
    bytes[0] = b'X';
    assert_eq!(
        SnapshotReader::parse(&bytes, DEVICE_ID).unwrap_err(),
        SnapshotError::InvalidMagic
    );
}

#[test]
fn unknown_format_major_is_rejected() {
    let mut bytes = sample();
    bytes[4..6].copy_from_slice(&9u16.to_le_bytes());
    assert_eq!(
        SnapshotReader::parse(&bytes, DEVICE_ID).unwrap_err(),
        SnapshotError::UnsupportedVersion {
            found_major: 9,
            found_minor: 0
        }
    );
}

#[test]
fn oversized_field_length_is_rejected() {
    let bytes = Encoder::new()
        .bytes(&sample())
        .u16(7)
        .u32(u32::MAX)
        .u8(0)
        .finish();
    assert_eq!(
        SnapshotReader::parse(&bytes, DEVICE_ID).unwrap_err(),
        SnapshotError::Corrupt("field length exceeds snapshot")
    );
}

#[test]
fn duplicate_tags_are_rejected() {
    let bytes = Encoder::new()
        .bytes(&sample())
        .u16(1)
        .u32(4)
        .u32(0)
        .finish();
    assert_eq!(
        SnapshotReader::parse(&bytes, DEVICE_ID).unwrap_err(),
        SnapshotError::Corrupt("duplicate field tag")
    );
}

#[test]
fn invalid_bool_value_is_an_encoding_error() {
    let mut w = SnapshotWriter::new(DEVICE_ID, SnapshotVersion::new(1, 0));
    w.field_u8(3, 2);
    let bytes = w.finish();

    let r = SnapshotReader::parse(&bytes, DEVICE_ID).unwrap();
    assert_eq!(r.bool(3), Err(SnapshotError::InvalidFieldEncoding("bool")));
}

#[test]
fn nested_payloads_decode_with_codec() {
    let payload = Encoder::new()
        .vec_bytes(&[vec![1, 2], vec![], vec![3]])
        .finish();

    let mut d = Decoder::new(&payload);
    let count = d.u32().unwrap();
    let mut items = Vec::new();
    for _ in 0..count {
        let len = d.u32().unwrap() as usize;
        items.push(d.bytes(len).unwrap().to_vec());
    }
    d.finish().unwrap();

    assert_eq!(items, vec![vec![1, 2], vec![], vec![3]]);
}
