/// Receive side of a serial link: bytes a device sends towards the guest.
pub trait SerialRxSink {
    fn data_received(&mut self, byte: u8);

    /// Forwards `bytes` one at a time, in order.
    fn receive_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.data_received(byte);
        }
    }
}

/// Captures the raw byte stream, e.g. for host-side tracing or tests.
impl SerialRxSink for Vec<u8> {
    fn data_received(&mut self, byte: u8) {
        self.push(byte);
    }
}

/// Observer for mouse enable transitions (e.g. so the host can start capturing the pointer).
pub trait MouseStatusSink {
    fn mouse_enabled(&mut self, enabled: bool);
}
