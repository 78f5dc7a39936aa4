use std::collections::VecDeque;

use tracing::trace;

use crate::sink::SerialRxSink;

const REG_DATA: u16 = 0;
const REG_IER: u16 = 1;
const REG_IIR_FCR: u16 = 2;
const REG_LCR: u16 = 3;
const REG_MCR: u16 = 4;
const REG_LSR: u16 = 5;
const REG_MSR: u16 = 6;
const REG_SCR: u16 = 7;

const LCR_DLAB: u8 = 0x80;
const FCR_ENABLE: u8 = 0x01;
const FCR_CLEAR_RX: u8 = 0x02;
const LSR_DATA_READY: u8 = 0x01;
const LSR_THR_EMPTY: u8 = 0x20;
const LSR_TX_EMPTY: u8 = 0x40;
const IIR_NO_INTERRUPT: u8 = 0x01;
const IIR_FIFO_ENABLED: u8 = 0xC0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    pub base_port: u16,
    pub irq: u8,
}

impl UartConfig {
    pub const COM1: Self = Self {
        base_port: 0x3F8,
        irq: 4,
    };
    pub const COM2: Self = Self {
        base_port: 0x2F8,
        irq: 3,
    };
    pub const COM3: Self = Self {
        base_port: 0x3E8,
        irq: 4,
    };
    pub const COM4: Self = Self {
        base_port: 0x2E8,
        irq: 3,
    };

    /// Whether `port` falls inside this UART's 8-register window.
    pub fn contains(&self, port: u16) -> bool {
        port.wrapping_sub(self.base_port) < 8
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self::COM1
    }
}

/// 16550 register file with an RX FIFO fed by the attached device.
///
/// Nothing is attached to the transmit side: THR writes are dropped.
#[derive(Debug)]
pub struct Uart16550 {
    config: UartConfig,
    dll: u8,
    dlm: u8,
    ier: u8,
    fcr: u8,
    lcr: u8,
    mcr: u8,
    scr: u8,
    rx_fifo: VecDeque<u8>,
}

impl Uart16550 {
    pub fn new(config: UartConfig) -> Self {
        Self {
            config,
            dll: 0,
            dlm: 0,
            ier: 0,
            fcr: 0,
            lcr: 0,
            mcr: 0,
            scr: 0,
            rx_fifo: VecDeque::new(),
        }
    }

    pub fn config(&self) -> UartConfig {
        self.config
    }

    /// Current MCR value (bit 0 DTR, bit 1 RTS).
    pub fn modem_control(&self) -> u8 {
        self.mcr
    }

    /// Bytes waiting for the guest to read.
    pub fn rx_pending(&self) -> usize {
        self.rx_fifo.len()
    }

    fn dlab(&self) -> bool {
        (self.lcr & LCR_DLAB) != 0
    }

    pub fn read_u8(&mut self, port: u16) -> u8 {
        match port.wrapping_sub(self.config.base_port) {
            REG_DATA => {
                if self.dlab() {
                    self.dll
                } else {
                    self.rx_fifo.pop_front().unwrap_or(0)
                }
            }
            REG_IER => {
                if self.dlab() {
                    self.dlm
                } else {
                    self.ier
                }
            }
            REG_IIR_FCR => {
                let fifo_bits = if (self.fcr & FCR_ENABLE) != 0 {
                    IIR_FIFO_ENABLED
                } else {
                    0
                };
                fifo_bits | IIR_NO_INTERRUPT
            }
            REG_LCR => self.lcr,
            REG_MCR => self.mcr,
            REG_LSR => {
                let mut lsr = LSR_THR_EMPTY | LSR_TX_EMPTY;
                if !self.rx_fifo.is_empty() {
                    lsr |= LSR_DATA_READY;
                }
                lsr
            }
            REG_MSR => 0,
            REG_SCR => self.scr,
            _ => 0,
        }
    }

    pub fn write_u8(&mut self, port: u16, value: u8) {
        match port.wrapping_sub(self.config.base_port) {
            REG_DATA => {
                if self.dlab() {
                    self.dll = value;
                } else {
                    trace!(
                        base_port = self.config.base_port,
                        "uart dropping THR byte {value:#04x}"
                    );
                }
            }
            REG_IER => {
                if self.dlab() {
                    self.dlm = value;
                } else {
                    self.ier = value;
                }
            }
            REG_IIR_FCR => {
                self.fcr = value;
                if (value & FCR_CLEAR_RX) != 0 {
                    self.rx_fifo.clear();
                }
            }
            REG_LCR => self.lcr = value,
            REG_MCR => self.mcr = value,
            REG_SCR => self.scr = value,
            _ => {}
        }
    }
}

impl SerialRxSink for Uart16550 {
    fn data_received(&mut self, byte: u8) {
        self.rx_fifo.push_back(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u16 = 0x3F8;

    #[test]
    fn lsr_tracks_rx_fifo() {
        let mut uart = Uart16550::new(UartConfig::COM1);
        assert_eq!(uart.read_u8(BASE + REG_LSR) & LSR_DATA_READY, 0);

        uart.receive_bytes(&[0x4D, 0x33]);
        assert_ne!(uart.read_u8(BASE + REG_LSR) & LSR_DATA_READY, 0);
        assert_eq!(uart.read_u8(BASE), 0x4D);
        assert_eq!(uart.read_u8(BASE), 0x33);
        assert_eq!(uart.read_u8(BASE + REG_LSR) & LSR_DATA_READY, 0);
        assert_eq!(uart.read_u8(BASE), 0);
    }

    #[test]
    fn dlab_exposes_divisor_latch() {
        let mut uart = Uart16550::new(UartConfig::COM1);
        uart.data_received(0xAA);

        uart.write_u8(BASE + REG_LCR, LCR_DLAB | 0x02);
        uart.write_u8(BASE, 0x60);
        uart.write_u8(BASE + REG_IER, 0x00);
        assert_eq!(uart.read_u8(BASE), 0x60);
        assert_eq!(uart.rx_pending(), 1, "divisor reads must not drain the FIFO");

        uart.write_u8(BASE + REG_LCR, 0x02);
        assert_eq!(uart.read_u8(BASE), 0xAA);
    }

    #[test]
    fn fcr_clears_rx_fifo() {
        let mut uart = Uart16550::new(UartConfig::COM2);
        uart.receive_bytes(&[1, 2, 3]);
        uart.write_u8(0x2F8 + REG_IIR_FCR, FCR_ENABLE | FCR_CLEAR_RX);
        assert_eq!(uart.rx_pending(), 0);
        assert_eq!(uart.read_u8(0x2F8 + REG_IIR_FCR), 0xC1);
    }

    #[test]
    fn config_window() {
        assert!(UartConfig::COM1.contains(0x3F8));
        assert!(UartConfig::COM1.contains(0x3FF));
        assert!(!UartConfig::COM1.contains(0x400));
        assert!(!UartConfig::COM1.contains(0x3F7));
    }
}
