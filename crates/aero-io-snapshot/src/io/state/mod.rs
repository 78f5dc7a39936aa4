//! Deterministic snapshot encoding for I/O devices.
//!
//! Every device blob starts with a fixed 16-byte header followed by tag-length-value fields:
//!
//! ```text
//! 0..4    magic "AERO"
//! 4..6    format major (u16 LE)
//! 6..8    format minor (u16 LE)
//! 8..12   device id
//! 12..14  device major (u16 LE)
//! 14..16  device minor (u16 LE)
//! 16..    repeated { tag: u16 LE, len: u32 LE, value: [u8; len] }
//! ```
//!
//! Fields are written in ascending tag order so identical device state always encodes to
//! identical bytes. Readers skip tags they do not know, and devices treat absent tags as "keep the
//! default", which lets later minor versions add fields without breaking older snapshots.

mod version;

pub use version::{
    codec, SnapshotError, SnapshotHeader, SnapshotReader, SnapshotResult, SnapshotVersion,
    SnapshotWriter,
};

/// Snapshotting contract for emulated I/O devices.
///
/// `DEVICE_ID` must never change once shipped. New fields may be added within a major version;
/// removing or reinterpreting a tag requires a major bump.
pub trait IoSnapshot {
    const DEVICE_ID: [u8; 4];
    const DEVICE_VERSION: SnapshotVersion;

    fn save_state(&self) -> Vec<u8>;
    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()>;
}
