use std::collections::BTreeMap;

use thiserror::Error;

use self::codec::{Decoder, Encoder};

const MAGIC: [u8; 4] = *b"AERO";
const FORMAT_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);
const HEADER_LEN: usize = 16;
const FIELD_HEADER_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotVersion {
    pub major: u16,
    pub minor: u16,
}

impl SnapshotVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub format_version: SnapshotVersion,
    pub device_id: [u8; 4],
    pub device_version: SnapshotVersion,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("corrupt snapshot: {0}")]
    Corrupt(&'static str),
    #[error("invalid snapshot magic")]
    InvalidMagic,
    #[error("unsupported snapshot format version {found_major}.{found_minor}")]
    UnsupportedVersion { found_major: u16, found_minor: u16 },
    #[error("snapshot device id mismatch (expected {expected:?}, found {found:?})")]
    DeviceIdMismatch { expected: [u8; 4], found: [u8; 4] },
    #[error("unsupported device major version {found} (supported {supported})")]
    UnsupportedDeviceMajorVersion { found: u16, supported: u16 },
    #[error("invalid field encoding: {0}")]
    InvalidFieldEncoding(&'static str),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Builds a device snapshot blob.
#[derive(Debug)]
pub struct SnapshotWriter {
    header: SnapshotHeader,
    fields: BTreeMap<u16, Vec<u8>>,
}

impl SnapshotWriter {
    pub fn new(device_id: [u8; 4], device_version: SnapshotVersion) -> Self {
        Self {
            header: SnapshotHeader {
                format_version: FORMAT_VERSION,
                device_id,
                device_version,
            },
            fields: BTreeMap::new(),
        }
    }

    /// Writing the same tag twice keeps the last value.
    pub fn field_bytes(&mut self, tag: u16, value: Vec<u8>) {
        self.fields.insert(tag, value);
    }

    pub fn field_u8(&mut self, tag: u16, value: u8) {
        self.field_bytes(tag, vec![value]);
    }

    pub fn field_bool(&mut self, tag: u16, value: bool) {
        self.field_u8(tag, u8::from(value));
    }

    pub fn field_u16(&mut self, tag: u16, value: u16) {
        self.field_bytes(tag, value.to_le_bytes().to_vec());
    }

    pub fn field_u32(&mut self, tag: u16, value: u32) {
        self.field_bytes(tag, value.to_le_bytes().to_vec());
    }

    pub fn field_i32(&mut self, tag: u16, value: i32) {
        self.field_bytes(tag, value.to_le_bytes().to_vec());
    }

    pub fn field_u64(&mut self, tag: u16, value: u64) {
        self.field_bytes(tag, value.to_le_bytes().to_vec());
    }

    pub fn finish(self) -> Vec<u8> {
        let h = self.header;
        let mut enc = Encoder::new()
            .bytes(&MAGIC)
            .u16(h.format_version.major)
            .u16(h.format_version.minor)
            .bytes(&h.device_id)
            .u16(h.device_version.major)
            .u16(h.device_version.minor);
        for (tag, value) in self.fields {
            enc = enc.u16(tag).u32(value.len() as u32).bytes(&value);
        }
        enc.finish()
    }
}

/// Parsed view over a device snapshot blob.
#[derive(Debug)]
pub struct SnapshotReader<'a> {
    header: SnapshotHeader,
    fields: BTreeMap<u16, &'a [u8]>,
}

impl<'a> SnapshotReader<'a> {
    pub fn parse(bytes: &'a [u8], expected_device_id: [u8; 4]) -> SnapshotResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(SnapshotError::Corrupt("truncated header"));
        }

        let mut d = Decoder::new(bytes);
        if d.bytes(MAGIC.len())? != MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }
        let format_version = SnapshotVersion::new(d.u16()?, d.u16()?);
        if format_version.major != FORMAT_VERSION.major {
            return Err(SnapshotError::UnsupportedVersion {
                found_major: format_version.major,
                found_minor: format_version.minor,
            });
        }
        let mut device_id = [0u8; 4];
        device_id.copy_from_slice(d.bytes(4)?);
        if device_id != expected_device_id {
            return Err(SnapshotError::DeviceIdMismatch {
                expected: expected_device_id,
                found: device_id,
            });
        }
        let device_version = SnapshotVersion::new(d.u16()?, d.u16()?);

        let mut fields = BTreeMap::new();
        while !d.is_empty() {
            if d.remaining() < FIELD_HEADER_LEN {
                return Err(SnapshotError::Corrupt("truncated field header"));
            }
            let tag = d.u16()?;
            let len = d.u32()? as usize;
            if len > d.remaining() {
                return Err(SnapshotError::Corrupt("field length exceeds snapshot"));
            }
            let value = d.bytes(len)?;
            if fields.insert(tag, value).is_some() {
                return Err(SnapshotError::Corrupt("duplicate field tag"));
            }
        }

        Ok(Self {
            header: SnapshotHeader {
                format_version,
                device_id,
                device_version,
            },
            fields,
        })
    }

    pub fn header(&self) -> &SnapshotHeader {
        &self.header
    }

    pub fn ensure_device_major(&self, supported: u16) -> SnapshotResult<()> {
        let found = self.header.device_version.major;
        if found != supported {
            return Err(SnapshotError::UnsupportedDeviceMajorVersion { found, supported });
        }
        Ok(())
    }

    pub fn bytes(&self, tag: u16) -> Option<&'a [u8]> {
        self.fields.get(&tag).copied()
    }

    fn fixed<const N: usize>(&self, tag: u16) -> SnapshotResult<Option<[u8; N]>> {
        let Some(buf) = self.bytes(tag) else {
            return Ok(None);
        };
        let arr: [u8; N] = buf
            .try_into()
            .map_err(|_| SnapshotError::InvalidFieldEncoding("fixed-width field length"))?;
        Ok(Some(arr))
    }

    pub fn u8(&self, tag: u16) -> SnapshotResult<Option<u8>> {
        Ok(self.fixed::<1>(tag)?.map(|[b]| b))
    }

    pub fn bool(&self, tag: u16) -> SnapshotResult<Option<bool>> {
        match self.u8(tag)? {
            None => Ok(None),
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            Some(_) => Err(SnapshotError::InvalidFieldEncoding("bool")),
        }
    }

    pub fn u16(&self, tag: u16) -> SnapshotResult<Option<u16>> {
        Ok(self.fixed(tag)?.map(u16::from_le_bytes))
    }

    pub fn u32(&self, tag: u16) -> SnapshotResult<Option<u32>> {
        Ok(self.fixed(tag)?.map(u32::from_le_bytes))
    }

    pub fn i32(&self, tag: u16) -> SnapshotResult<Option<i32>> {
        Ok(self.fixed(tag)?.map(i32::from_le_bytes))
    }

    pub fn u64(&self, tag: u16) -> SnapshotResult<Option<u64>> {
        Ok(self.fixed(tag)?.map(u64::from_le_bytes))
    }
}

/// Little-endian primitive encoding shared by the container and nested field payloads.
pub mod codec {
    use super::{SnapshotError, SnapshotResult};

    #[derive(Debug, Default)]
    pub struct Encoder {
        buf: Vec<u8>,
    }

    impl Encoder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn u8(mut self, v: u8) -> Self {
            self.buf.push(v);
            self
        }

        pub fn bool(self, v: bool) -> Self {
            self.u8(u8::from(v))
        }

        pub fn u16(mut self, v: u16) -> Self {
            self.buf.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn u32(mut self, v: u32) -> Self {
            self.buf.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn u64(mut self, v: u64) -> Self {
            self.buf.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn bytes(mut self, v: &[u8]) -> Self {
            self.buf.extend_from_slice(v);
            self
        }

        /// Count-prefixed list of length-prefixed byte strings.
        pub fn vec_bytes(mut self, items: &[Vec<u8>]) -> Self {
            self = self.u32(items.len() as u32);
            for item in items {
                self = self.u32(item.len() as u32).bytes(item);
            }
            self
        }

        pub fn finish(self) -> Vec<u8> {
            self.buf
        }
    }

    #[derive(Debug)]
    pub struct Decoder<'a> {
        buf: &'a [u8],
        pos: usize,
    }

    impl<'a> Decoder<'a> {
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, pos: 0 }
        }

        pub fn remaining(&self) -> usize {
            self.buf.len() - self.pos
        }

        pub fn is_empty(&self) -> bool {
            self.remaining() == 0
        }

        pub fn bytes(&mut self, len: usize) -> SnapshotResult<&'a [u8]> {
            if len > self.remaining() {
                return Err(SnapshotError::Corrupt("unexpected end of data"));
            }
            let out = &self.buf[self.pos..self.pos + len];
            self.pos += len;
            Ok(out)
        }

        fn array<const N: usize>(&mut self) -> SnapshotResult<[u8; N]> {
            let mut out = [0u8; N];
            out.copy_from_slice(self.bytes(N)?);
            Ok(out)
        }

        pub fn u8(&mut self) -> SnapshotResult<u8> {
            Ok(self.array::<1>()?[0])
        }

        pub fn bool(&mut self) -> SnapshotResult<bool> {
            match self.u8()? {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(SnapshotError::InvalidFieldEncoding("bool")),
            }
        }

        pub fn u16(&mut self) -> SnapshotResult<u16> {
            Ok(u16::from_le_bytes(self.array()?))
        }

        pub fn u32(&mut self) -> SnapshotResult<u32> {
            Ok(u32::from_le_bytes(self.array()?))
        }

        pub fn u64(&mut self) -> SnapshotResult<u64> {
            Ok(u64::from_le_bytes(self.array()?))
        }

        /// Fails if any bytes are left unread.
        pub fn finish(self) -> SnapshotResult<()> {
            if !self.is_empty() {
                return Err(SnapshotError::Corrupt("trailing bytes"));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_ID: [u8; 4] = *b"TEST";

    #[test]
    fn fields_are_written_in_tag_order() {
        let mut a = SnapshotWriter::new(DEVICE_ID, SnapshotVersion::new(1, 0));
        a.field_u8(2, 0xAA);
        a.field_u8(1, 0xBB);

        let mut b = SnapshotWriter::new(DEVICE_ID, SnapshotVersion::new(1, 0));
        b.field_u8(1, 0xBB);
        b.field_u8(2, 0xAA);

        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn header_layout_is_stable() {
        let bytes = SnapshotWriter::new(DEVICE_ID, SnapshotVersion::new(3, 7)).finish();
        assert_eq!(
            bytes,
            vec![b'A', b'E', b'R', b'O', 1, 0, 0, 0, b'T', b'E', b'S', b'T', 3, 0, 7, 0]
        );
    }

    #[test]
    fn reader_returns_typed_fields() {
        let mut w = SnapshotWriter::new(DEVICE_ID, SnapshotVersion::new(1, 2));
        w.field_bool(1, true);
        w.field_u16(2, 0x1234);
        w.field_u64(3, u64::MAX - 1);
        w.field_i32(4, -5);
        let bytes = w.finish();

        let r = SnapshotReader::parse(&bytes, DEVICE_ID).unwrap();
        assert_eq!(r.header().device_version, SnapshotVersion::new(1, 2));
        assert_eq!(r.bool(1).unwrap(), Some(true));
        assert_eq!(r.u16(2).unwrap(), Some(0x1234));
        assert_eq!(r.u64(3).unwrap(), Some(u64::MAX - 1));
        assert_eq!(r.i32(4).unwrap(), Some(-5));
        assert_eq!(r.u32(99).unwrap(), None);
    }

    #[test]
    fn wrong_width_is_an_encoding_error() {
        let mut w = SnapshotWriter::new(DEVICE_ID, SnapshotVersion::new(1, 0));
        w.field_bytes(1, vec![1, 2, 3]);
        let bytes = w.finish();

        let r = SnapshotReader::parse(&bytes, DEVICE_ID).unwrap();
        assert!(matches!(
            r.u32(1),
            Err(SnapshotError::InvalidFieldEncoding(_))
        ));
    }

    #[test]
    fn decoder_rejects_trailing_bytes() {
        let buf = Encoder::new().u16(1).u8(2).finish();
        let mut d = Decoder::new(&buf);
        assert_eq!(d.u16().unwrap(), 1);
        assert_eq!(d.finish(), Err(SnapshotError::Corrupt("trailing bytes")));
    }
}
