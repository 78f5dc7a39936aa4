//! Microsoft serial mouse, three-button ("M3") variant.
//!
//! The mouse is powered from the host's DTR/RTS outputs. Raising both lines resets it, after which
//! it identifies itself and starts reporting. Reports are 3 bytes, 7-bit clean:
//!
//! ```text
//!          bit 6   bit 5   bit 4   bit 3   bit 2   bit 1   bit 0
//! byte 0     1       L       R      Y7      Y6      X7      X6
//! byte 1     0      X5      X4      X3      X2      X1      X0
//! byte 2     0      Y5      Y4      Y3      Y2      Y1      Y0
//! ```
//!
//! X/Y are 8-bit two's complement deltas with Y positive downwards on the wire. The middle button
//! is signalled out of band with a lone `0x20` byte.

use aero_io_snapshot::io::state::{
    IoSnapshot, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::sink::{MouseStatusSink, SerialRxSink};

/// Identification sent after every reset: 'M' (Microsoft protocol), '3' (three buttons).
pub const MOUSE_ID_BYTES: [u8; 2] = [0x4D, 0x33];

/// Standalone byte reporting middle button activity.
pub const MIDDLE_BUTTON_BYTE: u8 = 0x20;

pub const BUTTON_LEFT: usize = 0;
pub const BUTTON_MIDDLE: usize = 1;
pub const BUTTON_RIGHT: usize = 2;

const MCR_DTR: u8 = 0x01;
const MCR_RTS: u8 = 0x02;

const PACKET_SYNC: u8 = 0b0100_0000;
const PACKET_LBUTTON: u8 = 0b0010_0000;
const PACKET_RBUTTON: u8 = 0b0001_0000;
const DELTA_HO_BITS: u8 = 0b1100_0000;
const DELTA_LO_BITS: u8 = 0b0011_1111;

const TAG_ENABLED: u16 = 1;
const TAG_BUTTONS: u16 = 2;
const TAG_ACCUMULATED_DX: u16 = 3;
const TAG_ACCUMULATED_DY: u16 = 4;
const TAG_LAST_HANDSHAKE: u16 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SerialMouseConfig {
    /// Multiplier applied to host motion before accumulation.
    pub motion_scale: f64,
}

impl SerialMouseConfig {
    pub const DEFAULT: Self = Self { motion_scale: 1.0 };
}

impl Default for SerialMouseConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Host-side input delivered to the mouse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SerialMouseEvent {
    /// Current `[left, middle, right]` button state.
    Buttons([bool; 3]),
    /// Relative motion in device units; fractions carry over to later events.
    Motion { dx: f64, dy: f64 },
    /// New DTR (bit 0) / RTS (bit 1) levels driven by the guest.
    ModemControl(u8),
}

/// Persisted device state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialMouseState {
    pub enabled: bool,
    pub buttons: [bool; 3],
    pub accumulated_dx: f64,
    pub accumulated_dy: f64,
    pub last_handshake_asserted: bool,
}

pub struct SerialMouse {
    config: SerialMouseConfig,
    enabled: bool,
    buttons: [bool; 3],
    accumulated_dx: f64,
    accumulated_dy: f64,
    last_handshake_asserted: bool,
    packet: [u8; 3],
    status_sink: Option<Box<dyn MouseStatusSink>>,
}

impl std::fmt::Debug for SerialMouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialMouse")
            .field("config", &self.config)
            .field("enabled", &self.enabled)
            .field("buttons", &self.buttons)
            .field("accumulated_dx", &self.accumulated_dx)
            .field("accumulated_dy", &self.accumulated_dy)
            .field("last_handshake_asserted", &self.last_handshake_asserted)
            .field("has_status_sink", &self.status_sink.is_some())
            .finish_non_exhaustive()
    }
}

impl SerialMouse {
    pub fn new(config: SerialMouseConfig) -> Self {
        Self {
            config,
            enabled: false,
            buttons: [false; 3],
            accumulated_dx: 0.0,
            accumulated_dy: 0.0,
            last_handshake_asserted: false,
            packet: [0; 3],
            status_sink: None,
        }
    }

    pub fn config(&self) -> SerialMouseConfig {
        self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn buttons(&self) -> [bool; 3] {
        self.buttons
    }

    /// Sub-unit motion not yet reported, `(dx, dy)`.
    pub fn accumulated_motion(&self) -> (f64, f64) {
        (self.accumulated_dx, self.accumulated_dy)
    }

    pub fn set_status_sink(&mut self, sink: Box<dyn MouseStatusSink>) {
        self.status_sink = Some(sink);
    }

    pub fn handle_event(&mut self, event: SerialMouseEvent, rx: &mut dyn SerialRxSink) {
        match event {
            SerialMouseEvent::Buttons(buttons) => self.set_buttons(buttons, rx),
            SerialMouseEvent::Motion { dx, dy } => self.add_motion(dx, dy, rx),
            SerialMouseEvent::ModemControl(lines) => self.set_modem_control(lines, rx),
        }
    }

    /// Feeds the current DTR/RTS levels. A rising edge of "both asserted" resets and enables the
    /// mouse; every other transition only updates the remembered level.
    pub fn set_modem_control(&mut self, lines: u8, rx: &mut dyn SerialRxSink) {
        let asserted = lines & (MCR_DTR | MCR_RTS) == (MCR_DTR | MCR_RTS);

        if !self.last_handshake_asserted && asserted {
            self.reset(rx);
            self.enabled = true;
            debug!("serial mouse enabled");
            if let Some(sink) = self.status_sink.as_mut() {
                sink.mouse_enabled(self.enabled);
            }
        }

        self.last_handshake_asserted = asserted;
    }

    /// Clears buttons and pending motion, then identifies. The ID goes out even while disabled.
    pub fn reset(&mut self, rx: &mut dyn SerialRxSink) {
        self.buttons = [false; 3];
        self.accumulated_dx = 0.0;
        self.accumulated_dy = 0.0;
        debug!("serial mouse reset");
        rx.receive_bytes(&MOUSE_ID_BYTES);
    }

    /// Replaces the button state and reports it with a zero-motion packet.
    ///
    /// While the middle button is held, every call also sends [`MIDDLE_BUTTON_BYTE`], whether or
    /// not the mouse is enabled.
    pub fn set_buttons(&mut self, buttons: [bool; 3], rx: &mut dyn SerialRxSink) {
        self.buttons = buttons;
        self.send_mouse_packet(0, 0, rx);
        if buttons[BUTTON_MIDDLE] {
            rx.data_received(MIDDLE_BUTTON_BYTE);
        }
    }

    /// Accumulates host motion and reports its whole-unit part. Fractions (truncated toward zero)
    /// stay in the accumulator, so no packet is sent until a full unit has built up on some axis.
    pub fn add_motion(&mut self, dx: f64, dy: f64, rx: &mut dyn SerialRxSink) {
        let scale = self.config.motion_scale;
        self.accumulated_dx = accumulate(self.accumulated_dx, dx * scale);
        self.accumulated_dy = accumulate(self.accumulated_dy, dy * scale);

        let change_x = self.accumulated_dx.trunc();
        let change_y = self.accumulated_dy.trunc();
        if change_x == 0.0 && change_y == 0.0 {
            return;
        }

        self.accumulated_dx -= change_x;
        self.accumulated_dy -= change_y;

        // `as` saturates; anything past i32 is clamped to the packet range below anyway.
        self.send_mouse_packet(change_x as i32, change_y as i32, rx);
    }

    /// Encodes and sends one report with the current buttons. No-op while disabled.
    pub fn send_mouse_packet(&mut self, x: i32, y: i32, rx: &mut dyn SerialRxSink) {
        if !self.enabled {
            return;
        }

        let delta_x = x.clamp(-128, 127);
        // Host Y grows upwards, wire Y grows downwards.
        let delta_y = -y.clamp(-128, 127);

        self.packet = encode_packet(
            delta_x,
            delta_y,
            self.buttons[BUTTON_LEFT],
            self.buttons[BUTTON_RIGHT],
        );
        trace!(
            delta_x,
            delta_y,
            "serial mouse report {:02x} {:02x} {:02x}",
            self.packet[0],
            self.packet[1],
            self.packet[2]
        );
        rx.receive_bytes(&self.packet);
    }

    pub fn state(&self) -> SerialMouseState {
        SerialMouseState {
            enabled: self.enabled,
            buttons: self.buttons,
            accumulated_dx: self.accumulated_dx,
            accumulated_dy: self.accumulated_dy,
            last_handshake_asserted: self.last_handshake_asserted,
        }
    }

    /// Restores persisted state. Accumulators outside (-1, 1) or non-finite restore as 0. The
    /// status sink is not notified.
    pub fn restore_state(&mut self, state: SerialMouseState) {
        self.enabled = state.enabled;
        self.buttons = state.buttons;
        self.accumulated_dx = sanitize_remainder(state.accumulated_dx);
        self.accumulated_dy = sanitize_remainder(state.accumulated_dy);
        self.last_handshake_asserted = state.last_handshake_asserted;
    }
}

impl Default for SerialMouse {
    fn default() -> Self {
        Self::new(SerialMouseConfig::default())
    }
}

impl IoSnapshot for SerialMouse {
    const DEVICE_ID: [u8; 4] = *b"SMSE";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

    fn save_state(&self) -> Vec<u8> {
        let mut w = SnapshotWriter::new(Self::DEVICE_ID, Self::DEVICE_VERSION);
        w.field_bool(TAG_ENABLED, self.enabled);
        w.field_u8(TAG_BUTTONS, buttons_to_mask(self.buttons));
        w.field_u64(TAG_ACCUMULATED_DX, self.accumulated_dx.to_bits());
        w.field_u64(TAG_ACCUMULATED_DY, self.accumulated_dy.to_bits());
        w.field_bool(TAG_LAST_HANDSHAKE, self.last_handshake_asserted);
        w.finish()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;

        // Absent tags fall back to the power-on value, not to whatever state we had before.
        let state = SerialMouseState {
            enabled: r.bool(TAG_ENABLED)?.unwrap_or(false),
            buttons: r.u8(TAG_BUTTONS)?.map(buttons_from_mask).unwrap_or_default(),
            accumulated_dx: r.u64(TAG_ACCUMULATED_DX)?.map_or(0.0, f64::from_bits),
            accumulated_dy: r.u64(TAG_ACCUMULATED_DY)?.map_or(0.0, f64::from_bits),
            last_handshake_asserted: r.bool(TAG_LAST_HANDSHAKE)?.unwrap_or(false),
        };
        self.restore_state(state);
        Ok(())
    }
}

fn accumulate(acc: f64, delta: f64) -> f64 {
    if !delta.is_finite() {
        trace!(delta, "serial mouse dropping non-finite motion");
        return acc;
    }
    acc + delta
}

fn sanitize_remainder(v: f64) -> f64 {
    if v.is_finite() && v.abs() < 1.0 {
        v
    } else {
        0.0
    }
}

/// Packs already-clamped deltas. Bit operations use the low 8 bits, so a wire Y of +128
/// (host -128 inverted) goes out as 0x80.
fn encode_packet(delta_x: i32, delta_y: i32, left: bool, right: bool) -> [u8; 3] {
    let x = delta_x as u8;
    let y = delta_y as u8;

    let mut b0 = PACKET_SYNC | ((y & DELTA_HO_BITS) >> 4) | ((x & DELTA_HO_BITS) >> 6);
    if left {
        b0 |= PACKET_LBUTTON;
    }
    if right {
        b0 |= PACKET_RBUTTON;
    }

    [b0, x & DELTA_LO_BITS, y & DELTA_LO_BITS]
}

fn buttons_to_mask(buttons: [bool; 3]) -> u8 {
    buttons
        .iter()
        .enumerate()
        .fold(0, |mask, (i, &pressed)| mask | (u8::from(pressed) << i))
}

fn buttons_from_mask(mask: u8) -> [bool; 3] {
    [mask & 0x01 != 0, mask & 0x02 != 0, mask & 0x04 != 0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_places_high_bits_below_buttons() {
        // x=127, y=127 on the host: wire y is -127 (0x81).
        assert_eq!(encode_packet(127, -127, false, false), [0x49, 0x3F, 0x01]);
        assert_eq!(encode_packet(100, 50, false, false), [0x41, 0x24, 0x32]);
    }

    #[test]
    fn encode_button_bits() {
        assert_eq!(encode_packet(0, 0, true, false), [0x60, 0, 0]);
        assert_eq!(encode_packet(0, 0, false, true), [0x50, 0, 0]);
        assert_eq!(encode_packet(0, 0, true, true), [0x70, 0, 0]);
    }

    #[test]
    fn encode_negative_deltas_are_twos_complement() {
        // -1 = 0xFF: high bits 11 for both axes.
        assert_eq!(encode_packet(-1, -1, false, false), [0x4F, 0x3F, 0x3F]);
        assert_eq!(encode_packet(-128, 128, false, false), [0x4A, 0x00, 0x00]);
    }

    #[test]
    fn button_mask_roundtrip() {
        for mask in 0..8u8 {
            assert_eq!(buttons_to_mask(buttons_from_mask(mask)), mask);
        }
        assert_eq!(buttons_from_mask(0xF8), [false; 3]);
    }

    #[test]
    fn sanitize_rejects_whole_units() {
        assert_eq!(sanitize_remainder(0.5), 0.5);
        assert_eq!(sanitize_remainder(-0.999), -0.999);
        assert_eq!(sanitize_remainder(1.0), 0.0);
        assert_eq!(sanitize_remainder(f64::NAN), 0.0);
        assert_eq!(sanitize_remainder(f64::NEG_INFINITY), 0.0);
    }
}
