use tracing::debug;

use crate::io::PortIO;
use crate::serial_mouse::{SerialMouse, SerialMouseConfig, SerialMouseEvent};
use crate::uart16550::{Uart16550, UartConfig};

const MCR_LINES: u8 = 0x03;

/// A COM port with a Microsoft serial mouse plugged into it.
///
/// Guest port I/O goes to the UART; whenever a write changes DTR/RTS the new levels are handed to
/// the mouse, which answers through the UART's RX FIFO. Host input is injected through the
/// `inject_*` methods.
#[derive(Debug)]
pub struct MouseSerialPort {
    uart: Uart16550,
    mouse: SerialMouse,
}

impl MouseSerialPort {
    pub fn new(uart: UartConfig, mouse: SerialMouseConfig) -> Self {
        Self {
            uart: Uart16550::new(uart),
            mouse: SerialMouse::new(mouse),
        }
    }

    pub fn uart(&self) -> &Uart16550 {
        &self.uart
    }

    pub fn mouse(&self) -> &SerialMouse {
        &self.mouse
    }

    pub fn mouse_mut(&mut self) -> &mut SerialMouse {
        &mut self.mouse
    }

    pub fn inject_buttons(&mut self, buttons: [bool; 3]) {
        self.mouse.set_buttons(buttons, &mut self.uart);
    }

    pub fn inject_motion(&mut self, dx: f64, dy: f64) {
        self.mouse.add_motion(dx, dy, &mut self.uart);
    }

    pub fn handle_event(&mut self, event: SerialMouseEvent) {
        self.mouse.handle_event(event, &mut self.uart);
    }

    fn read_u8(&mut self, port: u16) -> u8 {
        self.uart.read_u8(port)
    }

    fn write_u8(&mut self, port: u16, value: u8) {
        let before = self.uart.modem_control() & MCR_LINES;
        self.uart.write_u8(port, value);
        let after = self.uart.modem_control() & MCR_LINES;

        if before != after {
            debug!(
                base_port = self.uart.config().base_port,
                "serial mouse port DTR/RTS {before:#04b} -> {after:#04b}"
            );
            self.mouse.set_modem_control(after, &mut self.uart);
        }
    }
}

impl Default for MouseSerialPort {
    fn default() -> Self {
        Self::new(UartConfig::default(), SerialMouseConfig::default())
    }
}

impl PortIO for MouseSerialPort {
    fn port_read(&mut self, port: u16, size: usize) -> u32 {
        match size {
            1 => self.read_u8(port) as u32,
            2 => {
                let lo = self.read_u8(port) as u32;
                let hi = self.read_u8(port.wrapping_add(1)) as u32;
                lo | (hi << 8)
            }
            4 => {
                let b0 = self.read_u8(port) as u32;
                let b1 = self.read_u8(port.wrapping_add(1)) as u32;
                let b2 = self.read_u8(port.wrapping_add(2)) as u32;
                let b3 = self.read_u8(port.wrapping_add(3)) as u32;
                b0 | (b1 << 8) | (b2 << 16) | (b3 << 24)
            }
            _ => 0,
        }
    }

    fn port_write(&mut self, port: u16, size: usize, val: u32) {
        match size {
            1 => self.write_u8(port, val as u8),
            2 => {
                let [b0, b1] = (val as u16).to_le_bytes();
                self.write_u8(port, b0);
                self.write_u8(port.wrapping_add(1), b1);
            }
            4 => {
                let [b0, b1, b2, b3] = val.to_le_bytes();
                self.write_u8(port, b0);
                self.write_u8(port.wrapping_add(1), b1);
                self.write_u8(port.wrapping_add(2), b2);
                self.write_u8(port.wrapping_add(3), b3);
            }
            _ => {}
        }
    }
}
