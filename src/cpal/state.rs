//! State shared between the caller and the interrupt handlers

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use bitflags::bitflags;
use num_enum::{FromPrimitive, IntoPrimitive};

use super::timeout::TimeoutCounter;

/// Lifecycle state of a device
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum State {
    /// Not initialized, or deinitialized
    Disabled = 0x00,
    /// Idle, accepting transactions
    Ready = 0x01,
    /// A transaction is being set up
    Busy = 0x02,
    /// Write set up, address phase in progress
    ReadyTx = 0x03,
    /// Read set up, address phase in progress
    ReadyRx = 0x05,
    /// Write data phase
    BusyTx = 0x06,
    /// Read data phase
    BusyRx = 0x0A,
    /// The last transaction failed; see the error flags
    #[num_enum(default)]
    Error = 0x10,
}

impl State {
    pub fn is_busy(self) -> bool {
        matches!(self, State::Busy | State::BusyTx | State::BusyRx)
    }
}

bitflags! {
    /// Last error observed on a device
    ///
    /// Hardware error bits sit at their ISR positions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DevError: u32 {
        /// Target did not acknowledge (AF)
        const NACK = 1 << 4;
        /// Misplaced START or STOP
        const BUS = 1 << 8;
        const ARBITRATION = 1 << 9;
        const OVERRUN = 1 << 10;
        /// A bounded wait or the supervisor expired
        const TIMEOUT = 1 << 16;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DevError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "DevError({=u32:#x})", self.bits())
    }
}

/// Per-device data touched from more than one execution context
///
/// Usually placed in a `static` and handed to [`Cpal::new`](super::Cpal::new)
/// and to the timer interrupt:
///
/// ```
/// use stm32_i2c_cpal::cpal::DeviceState;
///
/// static I2C1_STATE: DeviceState = DeviceState::new();
/// ```
#[derive(Debug)]
pub struct DeviceState {
    state: AtomicU8,
    error: AtomicU32,
    timeout: TimeoutCounter,
}

impl DeviceState {
    pub const fn new() -> Self {
        DeviceState {
            state: AtomicU8::new(State::Disabled as u8),
            error: AtomicU32::new(0),
            timeout: TimeoutCounter::new(),
        }
    }

    pub fn state(&self) -> State {
        State::from(self.state.load(Ordering::Acquire))
    }

    /// Overwrite the lifecycle state, e.g. from a DMA completion callback
    /// that considers the transaction finished
    pub fn set_state(&self, state: State) {
        self.state.store(state.into(), Ordering::Release);
    }

    pub fn error(&self) -> DevError {
        DevError::from_bits_retain(self.error.load(Ordering::Acquire))
    }

    /// Overwrite the error flags
    pub fn set_error(&self, error: DevError) {
        self.error.store(error.bits(), Ordering::Release);
    }

    pub fn clear_error(&self) {
        self.set_error(DevError::empty());
    }

    pub fn timeout(&self) -> &TimeoutCounter {
        &self.timeout
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disabled_without_error() {
        let shared = DeviceState::new();
        assert_eq!(shared.state(), State::Disabled);
        assert!(shared.error().is_empty());
        assert!(!shared.timeout().is_armed());
    }

    #[test]
    fn errors_overwrite() {
        let shared = DeviceState::new();
        shared.set_error(DevError::BUS | DevError::OVERRUN);
        shared.set_error(DevError::NACK);
        assert_eq!(shared.error(), DevError::NACK);
    }

    #[test]
    fn unknown_raw_state_reads_as_error() {
        assert_eq!(State::from(0x7Fu8), State::Error);
        assert_eq!(u8::from(State::BusyRx), 0x0A);
        assert!(State::BusyTx.is_busy());
        assert!(!State::ReadyTx.is_busy());
    }
}
