#![forbid(unsafe_code)]

//! Serial port device models: a 16550 UART and the Microsoft serial mouse attached to it.

mod io;
mod port;
mod serial_mouse;
mod sink;
mod uart16550;

pub use io::PortIO;
pub use port::MouseSerialPort;
pub use serial_mouse::{
    SerialMouse, SerialMouseConfig, SerialMouseEvent, SerialMouseState, BUTTON_LEFT,
    BUTTON_MIDDLE, BUTTON_RIGHT, MIDDLE_BUTTON_BYTE, MOUSE_ID_BYTES,
};
pub use sink::{MouseStatusSink, SerialRxSink};
pub use uart16550::{Uart16550, UartConfig};
