//! I2C master transactions driven by interrupts or DMA
//!
//! A [`Cpal`] handle sequences write and read transactions on one I2C
//! peripheral, optionally preceded by a register (memory) address phase. The
//! data phase is moved by DMA or by per-byte interrupts, and transfers longer
//! than 255 bytes are chunked with the peripheral's reload mode.
//!
//! Every wait on a status flag is bounded by a countdown in
//! [`DeviceState`] which a periodic timer decrements through
//! [`timeout_manager`]. When a countdown expires the device enters
//! [`State::Error`] and [`Callbacks::timeout`] runs, which can free a stuck bus
//! with [`BusRecovery`].
//!
//! # Usage
//!
//! ```ignore
//! static STATE: DeviceState = DeviceState::new();
//!
//! let mut cpal = Cpal::new(DeviceId::I2c1, i2c, dma, tick, &STATE, NoCallbacks)
//!     .with_config(Config::new().bus(BusConfig::new().timing(timing)));
//! cpal.init()?;
//!
//! // write 0xAA to register 0x10 of the target at 0x50
//! cpal.write(Transfer::new(0x50, buffer).register(0x10))?;
//! cpal.wait()?;
//! let buffer = cpal.take_tx().unwrap().into_buffer();
//! ```
//!
//! The interrupt vectors forward to the handle:
//!
//! ```ignore
//! #[interrupt]
//! fn I2C1_EV() { cpal.event_irq() }
//! #[interrupt]
//! fn I2C1_ER() { cpal.error_irq() }
//! #[interrupt]
//! fn GPDMA1_CH0() { cpal.dma_tx_irq() }
//! #[interrupt]
//! fn GPDMA1_CH1() { cpal.dma_rx_irq() }
//! #[interrupt]
//! fn TIM6() {
//!     tick.clear_pending();
//!     timeout_manager(DeviceId::I2c1, &STATE, &mut callbacks);
//! }
//! ```
//!
//! The timer interrupt only needs the [`DeviceState`], so it can preempt a
//! context that holds the handle and is spinning in a bounded wait.

mod callbacks;
pub mod config;
mod dma;
mod events;
mod hal;
pub mod hw;
pub mod recovery;
mod state;
pub mod timeout;
mod transfer;

pub use callbacks::{Callbacks, NoCallbacks};
pub use config::{
    AddressMode, BusConfig, Config, ErrorCallbacks, Mode, Options, ProgModel,
    Timeouts, Timing,
};
pub use hw::{Dma, NoDma, Registers, TickTimer};
pub use recovery::{BusRecovery, RecoveryError};
pub use state::{DevError, DeviceState, State};
pub use timeout::{timeout_manager, Tick};
pub use transfer::{Chunk, Cr2, Transfer, TransferError, MAX_CHUNK};

use hw::{Interrupts, Status};
use timeout::WaitError;

/// I2C peripheral instance
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceId {
    I2c1,
    I2c2,
}

/// Transfer direction(s)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Write to the target
    Tx,
    /// Read from the target
    Rx,
    /// Both
    TxRx,
}

/// Driver error
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// A transaction is already in progress on this device
    Busy,
    /// The device is not initialized
    Disabled,
    /// The previous transaction failed; re-initialize the device
    Faulted,
    /// The configuration does not enable this direction
    Direction,
    /// The configuration or the transfer asks for something this driver
    /// cannot do, such as slave mode or a buffer longer than one DMA
    /// channel programming can move
    Unsupported,
    /// A bounded wait expired
    Timeout,
    /// Bus recovery could not get SDA released
    BusStuck,
    /// The transaction ended with these device errors
    Device(DevError),
}

/// Driver handle for one I2C peripheral
pub struct Cpal<I2C, DMA, TIM, CB = NoCallbacks> {
    device: DeviceId,
    config: Config,
    i2c: I2C,
    dma: DMA,
    timer: TIM,
    callbacks: CB,
    shared: &'static DeviceState,
    tx: Option<Transfer>,
    rx: Option<Transfer>,
}

impl<I2C, DMA, TIM, CB> Cpal<I2C, DMA, TIM, CB>
where
    I2C: hw::Registers,
    DMA: hw::Dma,
    TIM: hw::TickTimer,
    CB: Callbacks,
{
    /// Create a handle with the default configuration. The device starts
    /// out [`State::Disabled`]; call [`init`](Self::init) before use.
    pub fn new(
        device: DeviceId,
        i2c: I2C,
        dma: DMA,
        timer: TIM,
        shared: &'static DeviceState,
        callbacks: CB,
    ) -> Self {
        shared.set_state(State::Disabled);
        shared.clear_error();
        shared.timeout().reset();

        Cpal {
            device,
            config: Config::new(),
            i2c,
            dma,
            timer,
            callbacks,
            shared,
            tx: None,
            rx: None,
        }
    }

    /// Replace the configuration while building the handle
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Replace the configuration. Takes effect at the next `init`.
    pub fn set_config(&mut self, config: Config) -> Result<(), Error> {
        if self.in_transaction() {
            return Err(Error::Busy);
        }
        self.config = config;
        Ok(())
    }

    /// Reset the configuration to its defaults and mark the device disabled
    pub fn struct_init(&mut self) -> Result<(), Error> {
        if self.in_transaction() {
            return Err(Error::Busy);
        }
        self.config = Config::new();
        self.shared.set_state(State::Disabled);
        self.shared.clear_error();
        self.shared.timeout().reset();
        Ok(())
    }

    /// Bring up the peripheral and start the timeout supervisor
    pub fn init(&mut self) -> Result<(), Error> {
        if !self.is_settled() {
            return Err(Error::Busy);
        }
        if self.config.mode != Mode::Master {
            return Err(Error::Unsupported);
        }

        let direction = self.config.direction;

        self.i2c.disable();
        self.i2c.deinit_gpio(self.device);
        self.i2c.deinit_clock(self.device);
        self.dma.deinit(direction);

        self.i2c.init_gpio(self.device);
        self.i2c.init_clock(self.device);
        self.i2c.configure(&self.config.bus);
        self.i2c.enable();

        if self.uses_dma() {
            self.dma.init(direction, self.config.options);
        }
        self.i2c.init_interrupts(self.device, &self.config);

        self.shared.clear_error();
        self.shared.timeout().reset();
        self.shared.set_state(State::Ready);
        self.timer.start();

        #[cfg(feature = "log")]
        log::debug!("{:?}: initialized", self.device);

        #[cfg(feature = "defmt")]
        defmt::debug!("{}: initialized", self.device);

        Ok(())
    }

    /// Shut the peripheral down and stop the timeout supervisor
    pub fn deinit(&mut self) -> Result<(), Error> {
        if !self.is_settled() {
            return Err(Error::Busy);
        }

        self.i2c.deinit_gpio(self.device);
        self.i2c.disable();
        self.i2c.deinit_clock(self.device);
        self.dma.deinit(self.config.direction);
        self.i2c.deinit_interrupts(self.device);

        self.shared.set_state(State::Disabled);
        self.shared.clear_error();
        self.shared.timeout().reset();
        self.timer.stop();

        Ok(())
    }

    /// Start writing `transfer` to its target
    ///
    /// Returns once the data phase is running; completion is reported
    /// through [`Callbacks::tx_complete`] and [`poll`](Self::poll). A
    /// descriptor left over from an earlier write is dropped.
    pub fn write(&mut self, transfer: Transfer) -> Result<(), TransferError> {
        if let Err(error) = self.check_ready(Direction::Tx, transfer.remaining()) {
            return Err(self.reject(error, transfer));
        }

        self.shared.clear_error();
        self.shared.set_state(State::Busy);
        self.shared.set_state(State::ReadyTx);

        if self.uses_dma() {
            self.dma.configure_tx(transfer.buffer());
            self.dma.enable(Direction::Tx);
        }

        let mut cr2 = Cr2::new(transfer.address(), self.config.address_mode());
        let register_phase = self.has_register_phase();

        if register_phase {
            cr2.reload = true;
            cr2.nbytes = self.config.register_address_len();
            self.i2c.write_cr2(cr2);
            self.i2c.generate_start();

            let tcr = self.config.timeouts.tcr;
            let phase = self
                .send_register_address(transfer.register_address())
                .and_then(|_| self.wait_status(tcr, |s| s.contains(Status::TCR)));
            if let Err(error) = phase {
                return Err(self.abort(Direction::Tx, error, transfer));
            }
            cr2.nbytes = 0;
        }

        self.shared.set_state(State::BusyTx);
        cr2.autoend = true;
        cr2.chunk(Chunk::for_remaining(transfer.remaining()));
        // with a register phase the reload continues the running transfer
        cr2.start = !register_phase;
        self.i2c.write_cr2(cr2);

        self.tx = Some(transfer);

        if self.uses_dma() {
            self.i2c.enable_dma_request(Direction::Tx);
            self.i2c.enable_interrupts(Interrupts::MASTER);
        } else {
            self.i2c.enable_interrupts(Interrupts::MASTER | Interrupts::TX);
        }

        Ok(())
    }

    /// Start reading into `transfer` from its target
    ///
    /// Completion is reported through [`Callbacks::rx_complete`] and
    /// [`poll`](Self::poll).
    pub fn read(&mut self, mut transfer: Transfer) -> Result<(), TransferError> {
        if let Err(error) = self.check_ready(Direction::Rx, transfer.remaining()) {
            return Err(self.reject(error, transfer));
        }

        self.shared.clear_error();
        self.shared.set_state(State::Busy);
        self.shared.set_state(State::ReadyRx);

        if self.uses_dma() {
            self.dma.configure_rx(transfer.buffer_mut());
            self.dma.enable(Direction::Rx);
        }

        let mut cr2 = Cr2::new(transfer.address(), self.config.address_mode());

        if self.has_register_phase() {
            cr2.nbytes = self.config.register_address_len();
            self.i2c.write_cr2(cr2);
            self.i2c.generate_start();

            let tc = self.config.timeouts.tc;
            let phase = self
                .send_register_address(transfer.register_address())
                .and_then(|_| self.wait_status(tc, |s| s.contains(Status::TC)));
            if let Err(error) = phase {
                return Err(self.abort(Direction::Rx, error, transfer));
            }
            cr2.nbytes = 0;
        }

        self.shared.set_state(State::BusyRx);
        cr2.read = true;
        cr2.autoend = true;
        cr2.chunk(Chunk::for_remaining(transfer.remaining()));
        cr2.start = true;

        self.rx = Some(transfer);

        if self.uses_dma() {
            self.i2c.enable_dma_request(Direction::Rx);
            self.i2c.write_cr2(cr2);
            self.i2c.enable_interrupts(Interrupts::MASTER);
        } else {
            self.i2c.write_cr2(cr2);
            self.i2c.enable_interrupts(Interrupts::MASTER | Interrupts::RX);
        }

        Ok(())
    }

    /// Outcome of the last transaction
    ///
    /// `WouldBlock` while it runs, [`Error::Device`] if it failed.
    pub fn poll(&self) -> nb::Result<(), Error> {
        match self.state() {
            State::Ready => Ok(()),
            State::Error => Err(nb::Error::Other(Error::Device(self.error()))),
            State::Disabled => Err(nb::Error::Other(Error::Disabled)),
            _ => Err(nb::Error::WouldBlock),
        }
    }

    /// Spin until the last transaction finishes
    pub fn wait(&self) -> Result<(), Error> {
        nb::block!(self.poll())
    }

    /// Supervisor tick using this handle's callbacks
    ///
    /// Only usable when the timer interrupt can borrow the handle; see
    /// [`timeout_manager`] otherwise.
    pub fn timeout_manager(&mut self) -> Tick {
        self.timer.clear_pending();
        timeout::timeout_manager(self.device, self.shared, &mut self.callbacks)
    }

    /// Hand back the write descriptor once no transaction is running
    pub fn take_tx(&mut self) -> Option<Transfer> {
        if self.in_transaction() {
            return None;
        }
        self.release_dma(Direction::Tx);
        self.tx.take()
    }

    /// Hand back the read descriptor once no transaction is running
    pub fn take_rx(&mut self) -> Option<Transfer> {
        if self.in_transaction() {
            return None;
        }
        self.release_dma(Direction::Rx);
        self.rx.take()
    }

    pub fn tx(&self) -> Option<&Transfer> {
        self.tx.as_ref()
    }

    pub fn rx(&self) -> Option<&Transfer> {
        self.rx.as_ref()
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> State {
        self.shared.state()
    }

    pub fn error(&self) -> DevError {
        self.shared.error()
    }

    pub fn shared(&self) -> &'static DeviceState {
        self.shared
    }

    pub fn callbacks(&self) -> &CB {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut CB {
        &mut self.callbacks
    }

    /// Release the hardware
    pub fn free(self) -> (I2C, DMA, TIM, CB) {
        (self.i2c, self.dma, self.timer, self.callbacks)
    }

    fn uses_dma(&self) -> bool {
        self.config.prog_model == ProgModel::Dma
    }

    fn has_register_phase(&self) -> bool {
        self.config.mode == Mode::Master
            && !self.config.options.contains(Options::NO_MEM_ADDR)
    }

    fn in_transaction(&self) -> bool {
        let state = self.state();
        state.is_busy() || matches!(state, State::ReadyTx | State::ReadyRx)
    }

    /// Init and deinit are only allowed from these states
    fn is_settled(&self) -> bool {
        matches!(self.state(), State::Ready | State::Error | State::Disabled)
    }

    fn check_ready(&self, direction: Direction, len: usize) -> Result<(), Error> {
        match self.state() {
            State::Ready => {}
            State::Disabled => return Err(Error::Disabled),
            State::Error => return Err(Error::Faulted),
            _ => return Err(Error::Busy),
        }
        if !self.config.supports(direction) {
            return Err(Error::Direction);
        }
        if self.uses_dma() && len > DMA::MAX_TRANSFER {
            return Err(Error::Unsupported);
        }
        Ok(())
    }

    fn reject(&self, error: Error, transfer: Transfer) -> TransferError {
        #[cfg(feature = "log")]
        log::debug!("{:?}: transaction rejected: {:?}", self.device, error);

        #[cfg(feature = "defmt")]
        defmt::debug!("{}: transaction rejected: {}", self.device, error);

        TransferError { error, transfer }
    }

    fn abort(
        &mut self,
        direction: Direction,
        error: Error,
        transfer: Transfer,
    ) -> TransferError {
        self.release_dma(direction);
        TransferError { error, transfer }
    }

    fn release_dma(&mut self, direction: Direction) {
        if self.uses_dma() {
            self.i2c.disable_dma_request(direction);
            self.dma.disable(direction);
        }
    }

    /// Register address, MSB first, each byte after TXIS
    fn send_register_address(&mut self, register: u16) -> Result<(), Error> {
        let bytes = register.to_be_bytes();
        let bytes = match self.config.register_address_len() {
            2 => &bytes[..],
            _ => &bytes[1..],
        };
        let txis = self.config.timeouts.txis;
        for &byte in bytes {
            self.wait_status(txis, |s| s.contains(Status::TXIS))?;
            self.i2c.send(byte);
        }
        Ok(())
    }

    /// Bounded wait on the I2C status register
    fn wait_status<F>(&mut self, ticks: u32, condition: F) -> Result<(), Error>
    where
        F: Fn(Status) -> bool,
    {
        let i2c = &self.i2c;
        let result = timeout::wait_until(
            self.shared.timeout(),
            &mut self.timer,
            ticks,
            || condition(i2c.status()),
        );
        match result {
            Ok(()) => Ok(()),
            Err(reason) => Err(self.timed_out(reason)),
        }
    }

    /// Timeout handling for a polling wait that gave up
    fn timed_out(&mut self, reason: WaitError) -> Error {
        // a tick landing between the last poll and the disarm may have
        // expired the device already; the supervisor ran the callback then
        if reason == WaitError::Expired
            || !self.shared.timeout().disarm(&mut self.timer)
        {
            return Error::Timeout;
        }

        self.shared.set_state(State::Error);
        self.shared.set_error(DevError::TIMEOUT);

        #[cfg(feature = "log")]
        log::warn!("{:?}: timeout waiting on bus", self.device);

        #[cfg(feature = "defmt")]
        defmt::warn!("{}: timeout waiting on bus", self.device);

        match self.callbacks.timeout(self.device, self.shared) {
            Err(error) => error,
            Ok(()) => Error::Timeout,
        }
    }
}
