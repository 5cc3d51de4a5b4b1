use bitflags::bitflags;

use super::timeout::DEFAULT_TICKS;
use super::Direction;
use crate::time::{Hertz, MicroSeconds};

/// Addressing mode
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressMode {
    /// 7-bit addressing mode
    AddressMode7bit,
    /// 10-bit addressing mode
    AddressMode10bit,
}

/// Bus role of the device
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Master,
    /// Accepted by the configuration but refused by `init`
    Slave,
}

/// How bytes are moved between memory and the data registers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProgModel {
    /// DMA channels move the data, TCR accounts for whole chunks
    Dma,
    /// TXIS/RXNE interrupts move one byte at a time
    Interrupt,
}

/// Which error callbacks fire
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorCallbacks {
    None,
    /// One `error` callback receiving all flags
    Single,
    /// One callback per error kind
    PerKind,
}

bitflags! {
    /// Transaction options
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Options: u32 {
        /// Target has no internal register address: skip the address phase
        const NO_MEM_ADDR = 1 << 0;
        /// Register address is two bytes, sent MSB first
        const REG_ADDR_16BIT = 1 << 1;
        /// Target address is 10 bits wide
        const ADDR_10BIT = 1 << 2;
        /// Report DMA half-transfer events
        const DMA_HT_IT = 1 << 3;
        /// Report DMA transfer errors
        const DMA_TE_IT = 1 << 4;
    }
}

/// Contents of the TIMINGR register
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    pub presc: u8,
    pub scll: u8,
    pub sclh: u8,
    pub sdadel: u8,
    pub scldel: u8,
}

impl Timing {
    /// Decode a raw TIMINGR value, such as one produced by STM32CubeMX
    pub const fn from_bits(bits: u32) -> Self {
        Timing {
            presc: ((bits >> 28) & 0xF) as u8,
            scldel: ((bits >> 20) & 0xF) as u8,
            sdadel: ((bits >> 16) & 0xF) as u8,
            sclh: ((bits >> 8) & 0xFF) as u8,
            scll: (bits & 0xFF) as u8,
        }
    }

    pub const fn bits(&self) -> u32 {
        ((self.presc as u32 & 0xF) << 28)
            | ((self.scldel as u32 & 0xF) << 20)
            | ((self.sdadel as u32 & 0xF) << 16)
            | ((self.sclh as u32) << 8)
            | self.scll as u32
    }

    /// Derive the timing for a bus frequency from the peripheral kernel
    /// clock.
    ///
    /// # Panics
    ///
    /// Panics if the ratio between `ker_ck` and `bus` is below 4, if `bus`
    /// exceeds 1MHz, or if `ker_ck` is too slow for the requested mode.
    pub fn from_frequency(ker_ck: Hertz, bus: Hertz) -> Self {
        // Maximum f_SCL for Fast-mode Plus (Fm+)
        assert!(bus.raw() <= 1_000_000);
        calc_timing_params(ker_ck.raw(), bus.raw())
    }
}

// Refer to RM0492 Rev 2 Sections 34.4.5 & 34.4.9 for timing details.
//
// t_I2CCLK = 1 / i2c_ker_ck
// t_PRESC  = (PRESC + 1) * t_I2CCLK
// t_SCLL   = (SCLL + 1) * t_PRESC
// t_SCLH   = (SCLH + 1) * t_PRESC
//
// t_SYNC1 + t_SYNC2 > 4 * t_I2CCLK
// t_SCL ~= t_SYNC1 + t_SYNC2 + t_SCLL + t_SCLH
fn calc_timing_params(ker_ck: u32, target_freq: u32) -> Timing {
    let ratio = ker_ck / target_freq;

    // For the standard-mode configuration method, we must have a ratio of 4
    // or higher
    assert!(
        ratio >= 4,
        "i2c_ker_ck must be at least 4 times the bus frequency!"
    );

    let (presc, scll, sclh, sdadel, scldel) = if target_freq > 100_000 {
        // Fast-mode (Fm) or Fast-mode Plus (Fm+): SCLL + 1 = 2 * (SCLH + 1)
        let presc_reg = ((ratio - 1) / 96) as u8;
        let presc = (presc_reg + 1) as u32;

        let sclh = ((ratio / presc) - 3) / 3;
        let scll = (2 * (sclh + 1)) - 1;

        let (sdadel, scldel) = if target_freq > 400_000 {
            assert!(ker_ck >= 17_000_000);
            (ker_ck / 8_000_000 / presc, ker_ck / 4_000_000 / presc - 1)
        } else {
            assert!(ker_ck >= 8_000_000);
            (ker_ck / 3_000_000 / presc, ker_ck / 1_000_000 / presc - 1)
        };

        (presc_reg, scll, sclh, sdadel, scldel)
    } else {
        // Standard-mode (Sm): SCLL = SCLH
        assert!(ker_ck >= 2_000_000);

        let divider = if target_freq < 8000 {
            256
        } else if target_freq < 80_000 {
            128
        } else {
            64
        };
        let presc_reg = core::cmp::min((ratio - 1) / divider, 15) as u8;
        let presc = (presc_reg + 1) as u32;

        let sclh = ((ratio / presc) - 2) / 2;
        assert!(
            sclh < 256,
            "The I2C PCLK is too fast for this bus frequency!"
        );

        (
            presc_reg,
            sclh,
            sclh,
            ker_ck / 2_000_000 / presc,
            ker_ck / 500_000 / presc - 1,
        )
    };

    assert!(presc < 16);

    Timing {
        presc,
        scll: scll as u8,
        sclh: sclh as u8,
        sdadel: sdadel.clamp(1, 15) as u8,
        scldel: scldel.clamp(4, 15) as u8,
    }
}

/// Peripheral setup applied by `init`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    pub(crate) timing: Timing,
    pub(crate) analog_filter: bool,
    pub(crate) digital_filter: u8,
    pub(crate) own_address: u16,
    pub(crate) own_address_mode: AddressMode,
    pub(crate) ack: bool,
}

impl BusConfig {
    pub const fn new() -> Self {
        BusConfig {
            timing: Timing::from_bits(0),
            analog_filter: true,
            digital_filter: 0,
            own_address: 0,
            own_address_mode: AddressMode::AddressMode7bit,
            ack: true,
        }
    }

    pub const fn timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub const fn analog_filter(mut self, enabled: bool) -> Self {
        self.analog_filter = enabled;
        self
    }

    /// Digital noise filter length in kernel clock periods (0..=15)
    pub const fn digital_filter(mut self, length: u8) -> Self {
        self.digital_filter = length & 0xF;
        self
    }

    /// Own address, unshifted
    pub const fn own_address(mut self, address: u16, mode: AddressMode) -> Self {
        self.own_address = address;
        self.own_address_mode = mode;
        self
    }

    pub const fn ack(mut self, enabled: bool) -> Self {
        self.ack = enabled;
        self
    }

    pub fn get_timing(&self) -> Timing {
        self.timing
    }

    pub fn has_analog_filter(&self) -> bool {
        self.analog_filter
    }

    pub fn get_digital_filter(&self) -> u8 {
        self.digital_filter
    }

    pub fn get_own_address(&self) -> (u16, AddressMode) {
        (self.own_address, self.own_address_mode)
    }

    pub fn has_ack(&self) -> bool {
        self.ack
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Tick budgets for the bounded waits
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeouts {
    pub txis: u32,
    pub tcr: u32,
    pub tc: u32,
    pub busy: u32,
}

impl Timeouts {
    pub const fn new() -> Self {
        Timeouts {
            txis: DEFAULT_TICKS,
            tcr: DEFAULT_TICKS,
            tc: DEFAULT_TICKS,
            busy: DEFAULT_TICKS,
        }
    }

    /// Same budget for every wait, expressed as a duration of a supervisor
    /// running with period `tick`
    pub fn uniform(budget: MicroSeconds, tick: MicroSeconds) -> Self {
        let ticks = crate::time::ticks_for(budget, tick).max(1);
        Timeouts {
            txis: ticks,
            tcr: ticks,
            tc: ticks,
            busy: ticks,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::new()
    }
}

/// Device configuration
///
/// This structure uses the builder pattern:
///
/// ```
/// use stm32_i2c_cpal::cpal::{Config, Options, ProgModel};
///
/// let config = Config::new()
///     .programming_model(ProgModel::Interrupt)
///     .options(Options::REG_ADDR_16BIT);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub(crate) direction: Direction,
    pub(crate) mode: Mode,
    pub(crate) prog_model: ProgModel,
    pub(crate) options: Options,
    pub(crate) error_callbacks: ErrorCallbacks,
    pub(crate) timeouts: Timeouts,
    pub(crate) bus: BusConfig,
}

impl Config {
    /// Defaults: both directions, master, DMA, no options, no error
    /// callbacks, two-tick budgets
    pub const fn new() -> Self {
        Config {
            direction: Direction::TxRx,
            mode: Mode::Master,
            prog_model: ProgModel::Dma,
            options: Options::empty(),
            error_callbacks: ErrorCallbacks::None,
            timeouts: Timeouts::new(),
            bus: BusConfig::new(),
        }
    }

    pub const fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub const fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub const fn programming_model(mut self, prog_model: ProgModel) -> Self {
        self.prog_model = prog_model;
        self
    }

    pub const fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub const fn error_callbacks(mut self, style: ErrorCallbacks) -> Self {
        self.error_callbacks = style;
        self
    }

    pub const fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub const fn bus(mut self, bus: BusConfig) -> Self {
        self.bus = bus;
        self
    }

    pub fn get_direction(&self) -> Direction {
        self.direction
    }

    pub fn get_mode(&self) -> Mode {
        self.mode
    }

    pub fn get_programming_model(&self) -> ProgModel {
        self.prog_model
    }

    pub fn get_options(&self) -> Options {
        self.options
    }

    pub fn get_timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn get_bus(&self) -> &BusConfig {
        &self.bus
    }

    pub(crate) fn supports(&self, direction: Direction) -> bool {
        self.direction == Direction::TxRx || self.direction == direction
    }

    /// Bytes in the register address phase
    pub(crate) fn register_address_len(&self) -> u8 {
        if self.options.contains(Options::REG_ADDR_16BIT) {
            2
        } else {
            1
        }
    }

    pub(crate) fn address_mode(&self) -> AddressMode {
        if self.options.contains(Options::ADDR_10BIT) {
            AddressMode::AddressMode10bit
        } else {
            AddressMode::AddressMode7bit
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
