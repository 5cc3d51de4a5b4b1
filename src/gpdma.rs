//! GPDMA channel pair serving one I2C peripheral
//!
//! [`I2cDma`] implements [`Dma`] with two linear channels (0 to 5) of a GPDMA
//! controller: one moves bytes from memory into TXDR, the other from RXDR
//! into memory. Both are byte wide and paced by the I2C DMA requests.
//!
//! ```ignore
//! let dma = I2cDma::new::<pac::I2C1>(
//!     dp.GPDMA1,
//!     ChannelConfig::new(0, I2C1_TX_REQUEST),
//!     ChannelConfig::new(1, I2C1_RX_REQUEST),
//! );
//! ```
//!
//! The request line numbers are part specific; see the GPDMA request table of
//! the reference manual.

use core::ops::Deref;

use cortex_m::peripheral::NVIC;

use crate::cpal::config::Options;
use crate::cpal::hw::{Dma, DmaStatus};
use crate::cpal::Direction;
use crate::i2c::{self, I2cRegs};
use crate::pac::{gpdma1, Interrupt, GPDMA1, GPDMA2, RCC};
use crate::Sealed;

/// Channels 6 and 7 use the 2D register layout
const LINEAR_CHANNELS: usize = 6;

pub trait Instance: Sealed + Deref<Target = gpdma1::RegisterBlock> {
    #[doc(hidden)]
    const INTERRUPTS: [Interrupt; LINEAR_CHANNELS];

    #[doc(hidden)]
    fn ptr() -> *const gpdma1::RegisterBlock;

    /// Access channel registers. Valid for channels 0-5 only.
    /// # Safety
    /// The caller must ensure that the channel index is within bounds and
    /// that no other owner drives the same channel.
    unsafe fn ch(channel: usize) -> &'static gpdma1::CH {
        (*Self::ptr()).ch(channel)
    }

    #[doc(hidden)]
    fn enable_clock();
}

impl Sealed for GPDMA1 {}
impl Sealed for GPDMA2 {}

macro_rules! gpdma {
    ($GPDMAX:ident: $en:ident) => {
        paste::item! {
            impl Instance for $GPDMAX {
                const INTERRUPTS: [Interrupt; LINEAR_CHANNELS] = [
                    Interrupt::[<$GPDMAX _CH0>],
                    Interrupt::[<$GPDMAX _CH1>],
                    Interrupt::[<$GPDMAX _CH2>],
                    Interrupt::[<$GPDMAX _CH3>],
                    Interrupt::[<$GPDMAX _CH4>],
                    Interrupt::[<$GPDMAX _CH5>],
                ];

                fn ptr() -> *const gpdma1::RegisterBlock {
                    <$GPDMAX>::ptr() as *const _
                }

                fn enable_clock() {
                    cortex_m::interrupt::free(|_| {
                        // Note (unsafe): only this controller's bit is touched
                        let rcc = unsafe { &*RCC::ptr() };
                        rcc.ahb1enr().modify(|_, w| w.$en().set_bit());
                        let _ = rcc.ahb1enr().read();
                    });
                }
            }
        }
    };
}

gpdma! { GPDMA1: gpdma1en }
gpdma! { GPDMA2: gpdma2en }

/// Channel index and hardware request line
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    channel: usize,
    request: u8,
}

impl ChannelConfig {
    /// # Panics
    ///
    /// Panics if `channel` is not one of the linear channels 0 to 5
    pub const fn new(channel: usize, request: u8) -> Self {
        assert!(channel < LINEAR_CHANNELS, "GPDMA linear channels are 0-5");
        ChannelConfig { channel, request }
    }
}

struct Channel<DMA> {
    config: ChannelConfig,
    peripheral_address: u32,
    _dma: core::marker::PhantomData<DMA>,
}

impl<DMA: Instance> Channel<DMA> {
    fn new(config: ChannelConfig, peripheral_address: u32) -> Self {
        Channel {
            config,
            peripheral_address,
            _dma: core::marker::PhantomData,
        }
    }

    #[inline(always)]
    fn regs(&self) -> &'static gpdma1::CH {
        // Note (unsafe): index checked by ChannelConfig, channel owned by
        // this I2cDma
        unsafe { DMA::ch(self.config.channel) }
    }

    fn interrupt(&self) -> Interrupt {
        DMA::INTERRUPTS[self.config.channel]
    }

    fn init(&self, direction: Direction, options: Options) {
        self.reset();
        let ch = self.regs();

        ch.tr1().write(|w| match direction {
            Direction::Rx => w.sinc().fixed_burst().dinc().contiguous(),
            _ => w.sinc().contiguous().dinc().fixed_burst(),
        });
        ch.tr2().write(|w| {
            let w = unsafe { w.reqsel().bits(self.config.request) };
            match direction {
                Direction::Rx => w.swreq().hardware().dreq().source(),
                _ => w.swreq().hardware().dreq().destination(),
            }
        });
        match direction {
            Direction::Rx => {
                ch.sar().write(|w| w.sa().set(self.peripheral_address))
            }
            _ => ch.dar().write(|w| w.da().set(self.peripheral_address)),
        };
        ch.cr().write(|w| {
            w.tcie()
                .enabled()
                .htie()
                .bit(options.contains(Options::DMA_HT_IT))
                .dteie()
                .bit(options.contains(Options::DMA_TE_IT))
                .useie()
                .bit(options.contains(Options::DMA_TE_IT))
        });

        self.clear();
        NVIC::unpend(self.interrupt());
        // Note (unsafe): the handler only touches state owned by the handle
        unsafe { NVIC::unmask(self.interrupt()) };
    }

    fn deinit(&self) {
        NVIC::mask(self.interrupt());
        self.reset();
        self.clear();
    }

    fn set_memory(&self, address: u32, len: usize, direction: Direction) {
        let ch = self.regs();
        match direction {
            Direction::Rx => ch.dar().write(|w| w.da().set(address)),
            _ => ch.sar().write(|w| w.sa().set(address)),
        };
        // longer buffers are refused before a transfer starts
        let len = u16::try_from(len).unwrap_or(u16::MAX);
        ch.br1().modify(|_, w| w.bndt().set(len));
    }

    fn enable(&self) {
        self.regs().cr().modify(|_, w| w.en().enabled());
    }

    /// Suspend a running transfer, then reset the channel
    fn reset(&self) {
        let ch = self.regs();
        if ch.cr().read().en().is_enabled() {
            ch.cr().modify(|_, w| w.susp().suspended());
            loop {
                let sr = ch.sr().read();
                if sr.suspf().is_trigger() || sr.idlef().is_trigger() {
                    break;
                }
            }
        }
        ch.cr().modify(|_, w| w.reset().reset());
    }

    fn status(&self) -> DmaStatus {
        let sr = self.regs().sr().read();
        let mut status = DmaStatus::empty();
        status.set(DmaStatus::TRANSFER_COMPLETE, sr.tcf().is_trigger());
        status.set(DmaStatus::HALF_TRANSFER, sr.htf().is_trigger());
        status.set(
            DmaStatus::TRANSFER_ERROR,
            sr.dtef().is_trigger() || sr.usef().is_trigger(),
        );
        status
    }

    fn clear(&self) {
        let ch = self.regs();
        ch.fcr().write(|w| {
            w.tcf()
                .clear()
                .htf()
                .clear()
                .dtef()
                .clear()
                .usef()
                .clear()
                .ulef()
                .clear()
                .suspf()
                .clear()
                .tof()
                .clear()
        });
        interrupt_clear_clock_sync_delay!(ch.sr());
    }
}

/// TX and RX channels for one I2C peripheral
pub struct I2cDma<DMA> {
    tx: Channel<DMA>,
    rx: Channel<DMA>,
}

impl<DMA: Instance> I2cDma<DMA> {
    /// The controller is only borrowed so that several I2C peripherals can
    /// share it on different channels
    pub fn new<I2C: i2c::Instance>(
        _dma: &DMA,
        tx: ChannelConfig,
        rx: ChannelConfig,
    ) -> Self {
        assert_ne!(tx.channel, rx.channel, "TX and RX need separate channels");
        DMA::enable_clock();
        I2cDma {
            tx: Channel::new(tx, I2cRegs::<I2C>::txdr_address()),
            rx: Channel::new(rx, I2cRegs::<I2C>::rxdr_address()),
        }
    }

    fn channels(
        &self,
        direction: Direction,
    ) -> impl Iterator<Item = (Direction, &Channel<DMA>)> {
        let tx = matches!(direction, Direction::Tx | Direction::TxRx)
            .then_some((Direction::Tx, &self.tx));
        let rx = matches!(direction, Direction::Rx | Direction::TxRx)
            .then_some((Direction::Rx, &self.rx));
        tx.into_iter().chain(rx)
    }
}

impl<DMA: Instance> Dma for I2cDma<DMA> {
    fn init(&mut self, direction: Direction, options: Options) {
        for (direction, channel) in self.channels(direction) {
            channel.init(direction, options);
        }
    }

    fn deinit(&mut self, direction: Direction) {
        for (_, channel) in self.channels(direction) {
            channel.deinit();
        }
    }

    fn configure_tx(&mut self, buffer: &[u8]) {
        self.tx
            .set_memory(buffer.as_ptr() as u32, buffer.len(), Direction::Tx);
    }

    fn configure_rx(&mut self, buffer: &mut [u8]) {
        self.rx.set_memory(
            buffer.as_mut_ptr() as u32,
            buffer.len(),
            Direction::Rx,
        );
    }

    fn enable(&mut self, direction: Direction) {
        for (_, channel) in self.channels(direction) {
            channel.enable();
        }
    }

    fn disable(&mut self, direction: Direction) {
        for (_, channel) in self.channels(direction) {
            channel.reset();
        }
    }

    fn status(&self, direction: Direction) -> DmaStatus {
        self.channels(direction)
            .fold(DmaStatus::empty(), |status, (_, ch)| status | ch.status())
    }

    fn clear(&mut self, direction: Direction) {
        for (_, channel) in self.channels(direction) {
            channel.clear();
        }
    }
}
