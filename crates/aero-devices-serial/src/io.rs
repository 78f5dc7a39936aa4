/// x86 port I/O access as seen from the guest.
///
/// `size` is 1, 2 or 4; wider accesses touch consecutive ports little-endian. Unsupported sizes
/// read as 0 and ignore writes.
pub trait PortIO {
    fn port_read(&mut self, port: u16, size: usize) -> u32;
    fn port_write(&mut self, port: u16, size: usize, val: u32);
}
