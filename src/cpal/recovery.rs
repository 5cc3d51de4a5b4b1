//! Freeing a bus held low by a target
//!
//! A target that lost track of the clock in the middle of a byte keeps SDA
//! low and waits for more clock pulses. Toggling SCL by hand until SDA is
//! released, followed by a START and a STOP, resets its state machine.
//!
//! The pins have to be switched to open-drain GPIO mode for this. The
//! following [`Cpal::init`](super::Cpal::init) restores their I2C function
//! through [`Registers::init_gpio`](super::hw::Registers::init_gpio).

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin};

use super::{Callbacks, DeviceId, DeviceState, Error};
use crate::time::MicroSeconds;

/// A target needs at most nine clocks to finish a byte and its ACK
const MAX_PULSES: u8 = 16;

/// Half periods to wait for a target stretching the clock
const MAX_STRETCH: u32 = 100;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecoveryError {
    /// SDA still low after the maximum number of pulses, or SCL held low
    Stuck,
    /// A pin could not be driven or read
    Pin(digital::ErrorKind),
}

fn pin<E: digital::Error>(error: E) -> RecoveryError {
    RecoveryError::Pin(error.kind())
}

/// Bit-banged bus recovery over open-drain SCL and SDA pins
pub struct BusRecovery<SCL, SDA, D> {
    scl: SCL,
    sda: SDA,
    delay: D,
    half_period: MicroSeconds,
}

impl<SCL, SDA, D> BusRecovery<SCL, SDA, D>
where
    SCL: OutputPin + InputPin,
    SDA: OutputPin + InputPin,
    D: DelayNs,
{
    /// Clock at 50kHz (10us half period)
    pub fn new(scl: SCL, sda: SDA, delay: D) -> Self {
        BusRecovery {
            scl,
            sda,
            delay,
            half_period: MicroSeconds::micros(10),
        }
    }

    pub fn half_period(mut self, half_period: MicroSeconds) -> Self {
        self.half_period = half_period;
        self
    }

    /// Clock the bus until SDA is released, then send START and STOP.
    /// Returns the number of clock pulses needed.
    pub fn recover(&mut self) -> Result<u8, RecoveryError> {
        self.sda.set_high().map_err(pin)?;
        self.scl.set_high().map_err(pin)?;
        self.pause();

        let mut pulses = 0;
        while self.sda.is_low().map_err(pin)? {
            if pulses == MAX_PULSES {
                return Err(RecoveryError::Stuck);
            }
            self.wait_scl_released()?;
            self.pause();
            self.scl.set_low().map_err(pin)?;
            self.pause();
            self.scl.set_high().map_err(pin)?;
            self.pause();
            pulses += 1;
        }

        // START: SDA falls while SCL is high
        self.sda.set_low().map_err(pin)?;
        self.pause();
        self.scl.set_low().map_err(pin)?;
        self.pause();
        // STOP: SDA rises while SCL is high
        self.scl.set_high().map_err(pin)?;
        self.pause();
        self.sda.set_high().map_err(pin)?;
        self.pause();

        Ok(pulses)
    }

    pub fn free(self) -> (SCL, SDA, D) {
        (self.scl, self.sda, self.delay)
    }

    fn pause(&mut self) {
        self.delay.delay_us(self.half_period.to_micros());
    }

    fn wait_scl_released(&mut self) -> Result<(), RecoveryError> {
        for _ in 0..MAX_STRETCH {
            if self.scl.is_high().map_err(pin)? {
                return Ok(());
            }
            self.pause();
        }
        Err(RecoveryError::Stuck)
    }
}

/// Runs bus recovery whenever a timeout is reported
impl<SCL, SDA, D> Callbacks for BusRecovery<SCL, SDA, D>
where
    SCL: OutputPin + InputPin,
    SDA: OutputPin + InputPin,
    D: DelayNs,
{
    fn timeout(&mut self, _device: DeviceId, _shared: &DeviceState) -> Result<(), Error> {
        match self.recover() {
            Ok(_pulses) => {
                #[cfg(feature = "log")]
                log::debug!("{:?}: bus released after {} pulses", _device, _pulses);

                #[cfg(feature = "defmt")]
                defmt::debug!("{}: bus released after {} pulses", _device, _pulses);

                Err(Error::Timeout)
            }
            Err(_error) => {
                #[cfg(feature = "log")]
                log::warn!("{:?}: bus recovery failed: {:?}", _device, _error);

                #[cfg(feature = "defmt")]
                defmt::warn!("{}: bus recovery failed: {}", _device, _error);

                Err(Error::BusStuck)
            }
        }
    }
}
