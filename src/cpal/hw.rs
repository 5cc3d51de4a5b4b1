//! Hardware collaborators
//!
//! The state machine never touches registers directly. Everything it needs
//! from the I2C peripheral, the DMA controller and the supervisor timer goes
//! through the traits in this module. The register backends in
//! [`crate::i2c`], [`crate::gpdma`] and [`crate::timer`] implement them for
//! STM32H5 parts; tests implement them with recording mocks.

use bitflags::bitflags;

use super::config::{BusConfig, Config, Options};
use super::transfer::{Chunk, Cr2};
use super::{DeviceId, Direction};

bitflags! {
    /// Snapshot of the I2C interrupt and status register
    ///
    /// Bit positions match ISR, and the clearable subset matches ICR.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        /// Transmit data register empty
        const TXE = 1 << 0;
        /// Transmit interrupt status: TXDR must be written
        const TXIS = 1 << 1;
        /// Receive data register not empty
        const RXNE = 1 << 2;
        /// Not-acknowledge received
        const NACKF = 1 << 4;
        /// Stop detected
        const STOPF = 1 << 5;
        /// Transfer complete (RELOAD = 0, AUTOEND = 0)
        const TC = 1 << 6;
        /// Transfer complete reload: next NBYTES must be written
        const TCR = 1 << 7;
        /// Bus error
        const BERR = 1 << 8;
        /// Arbitration lost
        const ARLO = 1 << 9;
        /// Overrun/underrun
        const OVR = 1 << 10;
        /// Bus busy
        const BUSY = 1 << 15;

        /// Error flags reported by the error interrupt
        const ERRORS = Self::BERR.bits() | Self::ARLO.bits() | Self::OVR.bits();
    }
}

bitflags! {
    /// Interrupt enables in CR1
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interrupts: u32 {
        const TX = 1 << 1;
        const RX = 1 << 2;
        const NACK = 1 << 4;
        const STOP = 1 << 5;
        /// Covers both TC and TCR
        const TC = 1 << 6;
        const ERR = 1 << 7;

        /// Interrupts enabled for the whole of a master transaction
        const MASTER = Self::ERR.bits() | Self::TC.bits() | Self::STOP.bits() | Self::NACK.bits();
    }
}

bitflags! {
    /// DMA channel event flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaStatus: u8 {
        const TRANSFER_COMPLETE = 1 << 0;
        const HALF_TRANSFER = 1 << 1;
        const TRANSFER_ERROR = 1 << 2;
    }
}

/// Register level access to one I2C peripheral
///
/// The `init_*`/`deinit_*` hooks cover the board specific parts (pin muxing,
/// clock gating, NVIC routing). They default to doing nothing so a backend
/// only overrides what it can actually do.
pub trait Registers {
    /// Program timing, filters and own address, and disable wakeup. The
    /// peripheral is left disabled.
    fn configure(&mut self, bus: &BusConfig);

    /// Set PE
    fn enable(&mut self);

    fn disable(&mut self);

    /// Read ISR once
    fn status(&self) -> Status;

    /// Overwrite CR2
    fn write_cr2(&mut self, cr2: Cr2);

    /// Update NBYTES and RELOAD, leaving the rest of CR2 untouched
    fn reload(&mut self, chunk: Chunk);

    /// Set CR2.START on the currently programmed transfer
    fn generate_start(&mut self);

    /// Write TXDR
    fn send(&mut self, byte: u8);

    /// Read RXDR
    fn receive(&mut self) -> u8;

    /// Clear flags through ICR
    fn clear(&mut self, flags: Status);

    fn enable_interrupts(&mut self, interrupts: Interrupts);

    fn disable_interrupts(&mut self, interrupts: Interrupts);

    fn enable_dma_request(&mut self, direction: Direction);

    fn disable_dma_request(&mut self, direction: Direction);

    fn init_gpio(&mut self, _device: DeviceId) {}

    fn deinit_gpio(&mut self, _device: DeviceId) {}

    fn init_clock(&mut self, _device: DeviceId) {}

    fn deinit_clock(&mut self, _device: DeviceId) {}

    fn init_interrupts(&mut self, _device: DeviceId, _config: &Config) {}

    fn deinit_interrupts(&mut self, _device: DeviceId) {}
}

/// The TX and RX DMA channels serving one I2C peripheral
pub trait Dma {
    /// Largest buffer a single channel programming can move (BNDT is 16
    /// bits wide)
    const MAX_TRANSFER: usize = u16::MAX as usize;

    /// Configure the channels used by `direction` (`TxRx` for both)
    fn init(&mut self, direction: Direction, options: Options);

    fn deinit(&mut self, direction: Direction);

    /// Point the TX channel at `buffer`
    fn configure_tx(&mut self, buffer: &[u8]);

    /// Point the RX channel at `buffer`
    fn configure_rx(&mut self, buffer: &mut [u8]);

    fn enable(&mut self, direction: Direction);

    fn disable(&mut self, direction: Direction);

    fn status(&self, direction: Direction) -> DmaStatus;

    /// Clear every event flag of the channel
    fn clear(&mut self, direction: Direction);
}

/// DMA backend for devices using the interrupt programming model
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDma;

impl Dma for NoDma {
    fn init(&mut self, _: Direction, _: Options) {}
    fn deinit(&mut self, _: Direction) {}
    fn configure_tx(&mut self, _: &[u8]) {}
    fn configure_rx(&mut self, _: &mut [u8]) {}
    fn enable(&mut self, _: Direction) {}
    fn disable(&mut self, _: Direction) {}
    fn status(&self, _: Direction) -> DmaStatus {
        DmaStatus::empty()
    }
    fn clear(&mut self, _: Direction) {}
}

/// Periodic timer driving the timeout supervisor
pub trait TickTimer {
    /// Start generating periodic tick interrupts
    fn start(&mut self);

    fn stop(&mut self);

    /// Keep the tick interrupt from being serviced
    fn mask(&mut self);

    fn unmask(&mut self);

    /// Restart the current period from zero
    fn restart(&mut self);

    /// Clear the update flag and any pending tick interrupt
    fn clear_pending(&mut self);
}
