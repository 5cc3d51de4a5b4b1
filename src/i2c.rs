//! Register backend for the I2C peripheral
//!
//! [`I2cRegs`] implements [`Registers`] on top of the PAC register block so
//! an I2C instance can be driven by a [`Cpal`](crate::cpal::Cpal) handle.
//!
//! ```ignore
//! let dp = pac::Peripherals::take().unwrap();
//! let cpal = I2cRegs::new(dp.I2C1).into_cpal(dma, timer, &I2C1_STATE, NoCallbacks);
//! ```
//!
//! SCL and SDA must be muxed to the I2C alternate function in open-drain
//! mode by the application; the pin hooks of [`Registers`] are left as no-ops.
//! Interrupt priorities are left to the application as well, only the
//! masking is handled here.

use core::ops::Deref;

use cortex_m::peripheral::NVIC;

use crate::cpal::config::{AddressMode, BusConfig, Config};
use crate::cpal::hw::{Dma, Interrupts, Registers, Status, TickTimer};
use crate::cpal::{Callbacks, Chunk, Cpal, Cr2, DeviceId, DeviceState, Direction};
use crate::stm32::{i2c1, Interrupt};

mod i2c_def;

/// Flags that can be cleared through ICR
const CLEARABLE: Status = Status::NACKF
    .union(Status::STOPF)
    .union(Status::BERR)
    .union(Status::ARLO)
    .union(Status::OVR);

pub trait Instance:
    crate::Sealed + Deref<Target = i2c1::RegisterBlock>
{
    const DEVICE: DeviceId;

    #[doc(hidden)]
    const EVENT_INTERRUPT: Interrupt;

    #[doc(hidden)]
    const ERROR_INTERRUPT: Interrupt;

    #[doc(hidden)]
    fn ptr() -> *const i2c1::RegisterBlock;

    #[doc(hidden)]
    fn enable_clock();

    #[doc(hidden)]
    fn disable_clock();

    #[doc(hidden)]
    fn reset();
}

/// I2C register access for one instance
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cRegs<I2C> {
    i2c: I2C,
}

impl<I2C: Instance> I2cRegs<I2C> {
    pub fn new(i2c: I2C) -> Self {
        I2cRegs { i2c }
    }

    pub fn free(self) -> I2C {
        self.i2c
    }

    /// Driver handle for this instance, identified by its [`DeviceId`]
    pub fn into_cpal<DMA, TIM, CB>(
        self,
        dma: DMA,
        timer: TIM,
        shared: &'static DeviceState,
        callbacks: CB,
    ) -> Cpal<Self, DMA, TIM, CB>
    where
        DMA: Dma,
        TIM: TickTimer,
        CB: Callbacks,
    {
        Cpal::new(I2C::DEVICE, self, dma, timer, shared, callbacks)
    }

    /// Address of TXDR, the destination of the TX DMA channel
    pub fn txdr_address() -> u32 {
        // Note (unsafe): only the address is taken
        unsafe { (*I2C::ptr()).txdr().as_ptr() as u32 }
    }

    /// Address of RXDR, the source of the RX DMA channel
    pub fn rxdr_address() -> u32 {
        // Note (unsafe): only the address is taken
        unsafe { (*I2C::ptr()).rxdr().as_ptr() as u32 }
    }
}

impl<I2C: Instance> Registers for I2cRegs<I2C> {
    fn configure(&mut self, bus: &BusConfig) {
        self.i2c.cr1().modify(|_, w| w.pe().disabled());
        interrupt_clear_clock_sync_delay!(self.i2c.cr1());

        let timing = bus.get_timing();
        self.i2c.timingr().write(|w| {
            w.presc()
                .set(timing.presc)
                .scll()
                .set(timing.scll)
                .sclh()
                .set(timing.sclh)
                .sdadel()
                .set(timing.sdadel)
                .scldel()
                .set(timing.scldel)
        });

        let (own_address, mode) = bus.get_own_address();
        self.i2c.oar1().write(|w| match mode {
            AddressMode::AddressMode7bit => {
                w.oa1().set(own_address << 1).oa1mode().bit7()
            }
            AddressMode::AddressMode10bit => {
                w.oa1().set(own_address).oa1mode().bit10()
            }
        });
        if own_address != 0 {
            self.i2c.oar1().modify(|_, w| w.oa1en().enabled());
        }

        self.i2c.cr2().modify(|_, w| w.nack().bit(!bus.has_ack()));

        self.i2c.cr1().write(|w| {
            w.anfoff()
                .bit(!bus.has_analog_filter())
                .dnf()
                .set(bus.get_digital_filter())
                .wupen()
                .clear_bit()
        });
    }

    fn enable(&mut self) {
        self.i2c.cr1().modify(|_, w| w.pe().enabled());
    }

    fn disable(&mut self) {
        self.i2c.cr1().modify(|_, w| w.pe().disabled());
        interrupt_clear_clock_sync_delay!(self.i2c.cr1());
    }

    fn status(&self) -> Status {
        Status::from_bits_truncate(self.i2c.isr().read().bits())
    }

    fn write_cr2(&mut self, cr2: Cr2) {
        self.i2c.cr2().write(|w| {
            w.sadd()
                .set(cr2.sadd())
                .rd_wrn()
                .bit(cr2.read)
                .add10()
                .bit(cr2.address_mode == AddressMode::AddressMode10bit)
                .nbytes()
                .set(cr2.nbytes)
                .reload()
                .bit(cr2.reload)
                .autoend()
                .bit(cr2.autoend)
                .start()
                .bit(cr2.start)
        });
    }

    fn reload(&mut self, chunk: Chunk) {
        self.i2c.cr2().modify(|_, w| {
            w.nbytes().set(chunk.nbytes).reload().bit(chunk.reload)
        });
    }

    fn generate_start(&mut self) {
        self.i2c.cr2().modify(|_, w| w.start().start());
    }

    fn send(&mut self, byte: u8) {
        self.i2c.txdr().write(|w| w.txdata().set(byte));
    }

    fn receive(&mut self) -> u8 {
        self.i2c.rxdr().read().rxdata().bits()
    }

    fn clear(&mut self, flags: Status) {
        let flags = flags & CLEARABLE;
        self.i2c.icr().write(|w| {
            w.nackcf()
                .bit(flags.contains(Status::NACKF))
                .stopcf()
                .bit(flags.contains(Status::STOPF))
                .berrcf()
                .bit(flags.contains(Status::BERR))
                .arlocf()
                .bit(flags.contains(Status::ARLO))
                .ovrcf()
                .bit(flags.contains(Status::OVR))
        });
        interrupt_clear_clock_sync_delay!(self.i2c.isr());
    }

    fn enable_interrupts(&mut self, interrupts: Interrupts) {
        // Interrupts share their bit positions with CR1
        self.i2c
            .cr1()
            .modify(|r, w| unsafe { w.bits(r.bits() | interrupts.bits()) });
    }

    fn disable_interrupts(&mut self, interrupts: Interrupts) {
        self.i2c
            .cr1()
            .modify(|r, w| unsafe { w.bits(r.bits() & !interrupts.bits()) });
        interrupt_clear_clock_sync_delay!(self.i2c.cr1());
    }

    fn enable_dma_request(&mut self, direction: Direction) {
        self.i2c.cr1().modify(|_, w| match direction {
            Direction::Tx => w.txdmaen().enabled(),
            Direction::Rx => w.rxdmaen().enabled(),
            Direction::TxRx => w.txdmaen().enabled().rxdmaen().enabled(),
        });
    }

    fn disable_dma_request(&mut self, direction: Direction) {
        self.i2c.cr1().modify(|_, w| match direction {
            Direction::Tx => w.txdmaen().disabled(),
            Direction::Rx => w.rxdmaen().disabled(),
            Direction::TxRx => w.txdmaen().disabled().rxdmaen().disabled(),
        });
    }

    fn init_clock(&mut self, device: DeviceId) {
        debug_assert_eq!(device, I2C::DEVICE);
        I2C::enable_clock();
        I2C::reset();
    }

    fn deinit_clock(&mut self, _device: DeviceId) {
        I2C::reset();
        I2C::disable_clock();
    }

    fn init_interrupts(&mut self, _device: DeviceId, _config: &Config) {
        NVIC::unpend(I2C::EVENT_INTERRUPT);
        NVIC::unpend(I2C::ERROR_INTERRUPT);
        // Note (unsafe): the handlers only touch state owned by the handle
        unsafe {
            NVIC::unmask(I2C::EVENT_INTERRUPT);
            NVIC::unmask(I2C::ERROR_INTERRUPT);
        }
    }

    fn deinit_interrupts(&mut self, _device: DeviceId) {
        NVIC::mask(I2C::EVENT_INTERRUPT);
        NVIC::mask(I2C::ERROR_INTERRUPT);
    }
}
