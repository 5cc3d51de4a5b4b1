use super::config::AddressMode;
use super::Error;

/// Largest NBYTES value the peripheral accepts in one go
pub const MAX_CHUNK: usize = 255;

/// One I2C transaction as seen by the application
///
/// The buffer must stay valid while DMA may still access it, hence the
/// `'static` lifetime.
#[derive(Debug)]
pub struct Transfer {
    buffer: &'static mut [u8],
    remaining: usize,
    address: u16,
    register: u16,
}

impl Transfer {
    /// Transfer the whole of `buffer` to or from the target at `address`
    /// (unshifted).
    pub fn new(address: u16, buffer: &'static mut [u8]) -> Self {
        Transfer {
            remaining: buffer.len(),
            buffer,
            address,
            register: 0,
        }
    }

    /// Register or memory address inside the target, sent before the data
    /// unless `Options::NO_MEM_ADDR` is set
    pub fn register(mut self, register: u16) -> Self {
        self.register = register;
        self
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn register_address(&self) -> u16 {
        self.register
    }

    /// Bytes not yet accounted for by the driver
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn buffer(&self) -> &[u8] {
        self.buffer
    }

    pub fn into_buffer(self) -> &'static mut [u8] {
        self.buffer
    }

    pub(crate) fn set_remaining(&mut self, remaining: usize) {
        self.remaining = remaining;
    }

    /// Position of the next byte in the interrupt programming model
    fn cursor(&self) -> usize {
        self.buffer.len() - self.remaining
    }

    pub(crate) fn next_byte(&mut self) -> Option<u8> {
        if self.remaining == 0 {
            return None;
        }
        let byte = self.buffer[self.cursor()];
        self.remaining -= 1;
        Some(byte)
    }

    pub(crate) fn push_byte(&mut self, byte: u8) -> bool {
        if self.remaining == 0 {
            return false;
        }
        let cursor = self.cursor();
        self.buffer[cursor] = byte;
        self.remaining -= 1;
        true
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut [u8] {
        self.buffer
    }
}

/// A transaction that did not go ahead, with its descriptor handed back
#[derive(Debug)]
pub struct TransferError {
    pub error: Error,
    pub transfer: Transfer,
}

/// NBYTES/RELOAD pair for the next piece of a transfer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Chunk {
    pub nbytes: u8,
    pub reload: bool,
}

impl Chunk {
    pub const fn for_remaining(remaining: usize) -> Self {
        if remaining <= MAX_CHUNK {
            Chunk {
                nbytes: remaining as u8,
                reload: false,
            }
        } else {
            Chunk {
                nbytes: MAX_CHUNK as u8,
                reload: true,
            }
        }
    }
}

/// Value programmed into CR2
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cr2 {
    /// Target address, unshifted
    pub address: u16,
    pub address_mode: AddressMode,
    pub read: bool,
    pub nbytes: u8,
    pub reload: bool,
    pub autoend: bool,
    pub start: bool,
}

impl Cr2 {
    pub const fn new(address: u16, address_mode: AddressMode) -> Self {
        Cr2 {
            address,
            address_mode,
            read: false,
            nbytes: 0,
            reload: false,
            autoend: false,
            start: false,
        }
    }

    pub fn chunk(&mut self, chunk: Chunk) {
        self.nbytes = chunk.nbytes;
        self.reload = chunk.reload;
    }

    /// SADD field contents
    pub const fn sadd(&self) -> u16 {
        match self.address_mode {
            AddressMode::AddressMode7bit => (self.address & 0x7F) << 1,
            AddressMode::AddressMode10bit => self.address & 0x3FF,
        }
    }

    /// Register encoding
    pub const fn bits(&self) -> u32 {
        (self.sadd() as u32)
            | ((self.read as u32) << 10)
            | ((matches!(self.address_mode, AddressMode::AddressMode10bit) as u32) << 11)
            | ((self.start as u32) << 13)
            | ((self.nbytes as u32) << 16)
            | ((self.reload as u32) << 24)
            | ((self.autoend as u32) << 25)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leak(data: &[u8]) -> &'static mut [u8] {
        Box::leak(data.to_vec().into_boxed_slice())
    }

    #[test]
    fn chunk_rule_boundary() {
        assert_eq!(
            Chunk::for_remaining(1),
            Chunk { nbytes: 1, reload: false }
        );
        assert_eq!(
            Chunk::for_remaining(255),
            Chunk { nbytes: 255, reload: false }
        );
        assert_eq!(
            Chunk::for_remaining(256),
            Chunk { nbytes: 255, reload: true }
        );
        assert_eq!(
            Chunk::for_remaining(300),
            Chunk { nbytes: 255, reload: true }
        );
        assert_eq!(
            Chunk::for_remaining(0),
            Chunk { nbytes: 0, reload: false }
        );
    }

    #[test]
    fn seven_bit_address_is_shifted() {
        let mut cr2 = Cr2::new(0x50, AddressMode::AddressMode7bit);
        cr2.read = true;
        cr2.autoend = true;
        cr2.start = true;
        cr2.chunk(Chunk::for_remaining(300));

        assert_eq!(cr2.sadd(), 0xA0);
        assert_eq!(
            cr2.bits(),
            0xA0 | 1 << 10 | 1 << 13 | 255 << 16 | 1 << 24 | 1 << 25
        );
    }

    #[test]
    fn ten_bit_address_sets_add10() {
        let cr2 = Cr2::new(0x3F5, AddressMode::AddressMode10bit);
        assert_eq!(cr2.sadd(), 0x3F5);
        assert_eq!(cr2.bits(), 0x3F5 | 1 << 11);
    }

    #[test]
    fn interrupt_model_cursor_walks_buffer() {
        let mut tx = Transfer::new(0x20, leak(&[1, 2, 3]));
        assert_eq!(tx.next_byte(), Some(1));
        assert_eq!(tx.next_byte(), Some(2));
        assert_eq!(tx.remaining(), 1);
        assert_eq!(tx.next_byte(), Some(3));
        assert_eq!(tx.next_byte(), None);

        let mut rx = Transfer::new(0x20, leak(&[0; 2]));
        assert!(rx.push_byte(0xAB));
        assert!(rx.push_byte(0xCD));
        assert!(!rx.push_byte(0xEF));
        assert_eq!(rx.buffer(), &[0xAB, 0xCD]);
    }
}
