#![forbid(unsafe_code)]

//! Versioned, deterministic save/restore encoding for emulated I/O devices.

pub mod io;
