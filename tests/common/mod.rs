#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use stm32_i2c_cpal::cpal::hw::{DmaStatus, Interrupts, Status};
use stm32_i2c_cpal::cpal::timeout::TIMEOUT_DETECTED;
use stm32_i2c_cpal::cpal::{
    BusConfig, Callbacks, Chunk, Config, Cpal, Cr2, DevError, DeviceId,
    DeviceState, Direction, Dma, Error, Options, Registers, TickTimer,
};
use stm32_i2c_cpal::cpal::timeout_manager;

/// Everything the mocks and callbacks did, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Configure,
    Enable,
    Disable,
    WriteCr2(Cr2),
    Reload(Chunk),
    Start,
    Send(u8),
    Receive(u8),
    Clear(Status),
    EnableIt(Interrupts),
    DisableIt(Interrupts),
    EnableRequest(Direction),
    DisableRequest(Direction),
    InitGpio,
    DeinitGpio,
    InitClock,
    DeinitClock,
    InitInterrupts,
    DeinitInterrupts,
    DmaInit(Direction, Options),
    DmaDeinit(Direction),
    DmaConfigureTx(usize),
    DmaConfigureRx(usize),
    DmaEnable(Direction),
    DmaDisable(Direction),
    DmaClear(Direction),
    TimerStart,
    TimerStop,
    Callback(Cb),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cb {
    TxComplete,
    RxComplete,
    Tx,
    Rx,
    DmaTxComplete,
    DmaTxHalfTransfer,
    DmaTxError,
    DmaRxComplete,
    DmaRxHalfTransfer,
    DmaRxError,
    Error(DevError),
    BusError,
    ArbitrationLoss,
    Overrun,
    NotAcknowledged,
    Timeout,
}

pub type Log = Rc<RefCell<Vec<Op>>>;

/// Behavioral model of the I2C peripheral, enough to run the address
/// phase and the byte-by-byte data phase
pub struct I2cModel {
    log: Log,
    shared: &'static DeviceState,
    pub isr: Status,
    pub interrupts: Interrupts,
    pub address_acked: bool,
    pub busy_stuck: bool,
    pub status_reads: usize,
    /// Supervisor ticks elapsing per status read
    pub ticks_per_read: usize,
    pub sent: Vec<u8>,
    rx_fifo: VecDeque<u8>,
    read: bool,
    nbytes: u8,
    reload: bool,
    autoend: bool,
    count: u8,
}

impl I2cModel {
    pub fn raise(&mut self, flags: Status) {
        self.isr |= flags;
    }

    /// Target puts a byte on the bus
    pub fn feed(&mut self, byte: u8) {
        self.rx_fifo.push_back(byte);
        self.isr |= Status::RXNE;
    }

    /// STOP condition on the bus
    pub fn stop(&mut self) {
        self.isr |= Status::STOPF;
        if !self.busy_stuck {
            self.isr.remove(Status::BUSY);
        }
    }

    fn start_condition(&mut self) {
        self.isr |= Status::BUSY;
        if self.address_acked && !self.read {
            self.isr |= Status::TXIS;
        }
    }

    fn advance(&mut self) {
        if self.count < self.nbytes {
            if !self.read {
                self.isr |= Status::TXIS;
            }
        } else if self.reload {
            self.isr |= Status::TCR;
        } else if self.autoend {
            self.stop();
        } else {
            self.isr |= Status::TC;
        }
    }
}

pub struct MockI2c(Rc<RefCell<I2cModel>>);

impl Registers for MockI2c {
    fn configure(&mut self, _bus: &BusConfig) {
        self.0.borrow().log.borrow_mut().push(Op::Configure);
    }

    fn enable(&mut self) {
        self.0.borrow().log.borrow_mut().push(Op::Enable);
    }

    fn disable(&mut self) {
        self.0.borrow().log.borrow_mut().push(Op::Disable);
    }

    /// Each read also advances the timeout countdown by one tick, standing
    /// in for the supervisor interrupt
    fn status(&self) -> Status {
        let mut model = self.0.borrow_mut();
        model.status_reads += 1;
        for _ in 0..model.ticks_per_read {
            model.shared.timeout().tick();
        }
        model.isr
    }

    fn write_cr2(&mut self, cr2: Cr2) {
        let mut model = self.0.borrow_mut();
        model.log.borrow_mut().push(Op::WriteCr2(cr2));
        model.read = cr2.read;
        model.nbytes = cr2.nbytes;
        model.reload = cr2.reload;
        model.autoend = cr2.autoend;
        model.count = 0;
        model.isr.remove(Status::TC | Status::TCR);
        if cr2.start {
            model.start_condition();
        } else if model.isr.contains(Status::BUSY) && !model.read {
            model.isr |= Status::TXIS;
        }
    }

    fn reload(&mut self, chunk: Chunk) {
        let mut model = self.0.borrow_mut();
        model.log.borrow_mut().push(Op::Reload(chunk));
        model.nbytes = chunk.nbytes;
        model.reload = chunk.reload;
        model.count = 0;
        model.isr.remove(Status::TCR);
        if !model.read {
            model.isr |= Status::TXIS;
        }
    }

    fn generate_start(&mut self) {
        let mut model = self.0.borrow_mut();
        model.log.borrow_mut().push(Op::Start);
        model.start_condition();
    }

    fn send(&mut self, byte: u8) {
        let mut model = self.0.borrow_mut();
        model.log.borrow_mut().push(Op::Send(byte));
        model.sent.push(byte);
        model.isr.remove(Status::TXIS);
        model.count += 1;
        model.advance();
    }

    fn receive(&mut self) -> u8 {
        let mut model = self.0.borrow_mut();
        let byte = model.rx_fifo.pop_front().unwrap_or(0);
        model.log.borrow_mut().push(Op::Receive(byte));
        if model.rx_fifo.is_empty() {
            model.isr.remove(Status::RXNE);
        }
        model.count += 1;
        model.advance();
        byte
    }

    fn clear(&mut self, flags: Status) {
        let mut model = self.0.borrow_mut();
        model.log.borrow_mut().push(Op::Clear(flags));
        model.isr.remove(flags);
    }

    fn enable_interrupts(&mut self, interrupts: Interrupts) {
        let mut model = self.0.borrow_mut();
        model.log.borrow_mut().push(Op::EnableIt(interrupts));
        model.interrupts |= interrupts;
    }

    fn disable_interrupts(&mut self, interrupts: Interrupts) {
        let mut model = self.0.borrow_mut();
        model.log.borrow_mut().push(Op::DisableIt(interrupts));
        model.interrupts.remove(interrupts);
    }

    fn enable_dma_request(&mut self, direction: Direction) {
        self.0.borrow().log.borrow_mut().push(Op::EnableRequest(direction));
    }

    fn disable_dma_request(&mut self, direction: Direction) {
        self.0.borrow().log.borrow_mut().push(Op::DisableRequest(direction));
    }

    fn init_gpio(&mut self, _device: DeviceId) {
        self.0.borrow().log.borrow_mut().push(Op::InitGpio);
    }

    fn deinit_gpio(&mut self, _device: DeviceId) {
        self.0.borrow().log.borrow_mut().push(Op::DeinitGpio);
    }

    fn init_clock(&mut self, _device: DeviceId) {
        self.0.borrow().log.borrow_mut().push(Op::InitClock);
    }

    fn deinit_clock(&mut self, _device: DeviceId) {
        self.0.borrow().log.borrow_mut().push(Op::DeinitClock);
    }

    fn init_interrupts(&mut self, _device: DeviceId, _config: &Config) {
        self.0.borrow().log.borrow_mut().push(Op::InitInterrupts);
    }

    fn deinit_interrupts(&mut self, _device: DeviceId) {
        self.0.borrow().log.borrow_mut().push(Op::DeinitInterrupts);
    }
}

pub struct DmaModel {
    log: Log,
    pub tx_status: DmaStatus,
    pub rx_status: DmaStatus,
    /// Copied into the RX buffer when the channel is configured
    pub rx_payload: Vec<u8>,
}

pub struct MockDma(Rc<RefCell<DmaModel>>);

impl Dma for MockDma {
    fn init(&mut self, direction: Direction, options: Options) {
        self.0.borrow().log.borrow_mut().push(Op::DmaInit(direction, options));
    }

    fn deinit(&mut self, direction: Direction) {
        self.0.borrow().log.borrow_mut().push(Op::DmaDeinit(direction));
    }

    fn configure_tx(&mut self, buffer: &[u8]) {
        self.0.borrow().log.borrow_mut().push(Op::DmaConfigureTx(buffer.len()));
    }

    fn configure_rx(&mut self, buffer: &mut [u8]) {
        let model = self.0.borrow();
        model.log.borrow_mut().push(Op::DmaConfigureRx(buffer.len()));
        let len = model.rx_payload.len().min(buffer.len());
        buffer[..len].copy_from_slice(&model.rx_payload[..len]);
    }

    fn enable(&mut self, direction: Direction) {
        self.0.borrow().log.borrow_mut().push(Op::DmaEnable(direction));
    }

    fn disable(&mut self, direction: Direction) {
        self.0.borrow().log.borrow_mut().push(Op::DmaDisable(direction));
    }

    fn status(&self, direction: Direction) -> DmaStatus {
        let model = self.0.borrow();
        match direction {
            Direction::Tx => model.tx_status,
            Direction::Rx => model.rx_status,
            Direction::TxRx => model.tx_status | model.rx_status,
        }
    }

    fn clear(&mut self, direction: Direction) {
        let mut model = self.0.borrow_mut();
        model.log.borrow_mut().push(Op::DmaClear(direction));
        match direction {
            Direction::Tx => model.tx_status = DmaStatus::empty(),
            Direction::Rx => model.rx_status = DmaStatus::empty(),
            Direction::TxRx => {
                model.tx_status = DmaStatus::empty();
                model.rx_status = DmaStatus::empty();
            }
        }
    }
}

#[derive(Default)]
pub struct TimerModel {
    pub running: bool,
    pub masked: bool,
    pub restarts: usize,
    pub cleared: usize,
    /// Service a tick that fired right before `mask` took effect
    pub tick_on_mask: bool,
}

pub struct MockTimer {
    log: Log,
    model: Rc<RefCell<TimerModel>>,
    shared: &'static DeviceState,
    supervisor: RecordingCallbacks,
}

impl TickTimer for MockTimer {
    fn start(&mut self) {
        self.log.borrow_mut().push(Op::TimerStart);
        self.model.borrow_mut().running = true;
    }

    fn stop(&mut self) {
        self.log.borrow_mut().push(Op::TimerStop);
        self.model.borrow_mut().running = false;
    }

    fn mask(&mut self) {
        let late_tick = self.model.borrow().tick_on_mask
            && self.shared.timeout().value() == TIMEOUT_DETECTED;
        if late_tick {
            timeout_manager(DeviceId::I2c1, self.shared, &mut self.supervisor);
        }

        let mut model = self.model.borrow_mut();
        assert!(!model.masked, "tick interrupt masked twice");
        model.masked = true;
    }

    fn unmask(&mut self) {
        self.model.borrow_mut().masked = false;
    }

    fn restart(&mut self) {
        self.model.borrow_mut().restarts += 1;
    }

    fn clear_pending(&mut self) {
        self.model.borrow_mut().cleared += 1;
    }
}

/// Timer for arming a countdown outside of a handle
#[derive(Default)]
pub struct NullTimer;

impl TickTimer for NullTimer {
    fn start(&mut self) {}
    fn stop(&mut self) {}
    fn mask(&mut self) {}
    fn unmask(&mut self) {}
    fn restart(&mut self) {}
    fn clear_pending(&mut self) {}
}

pub struct RecordingCallbacks {
    log: Log,
    pub timeout_result: Result<(), Error>,
}

impl RecordingCallbacks {
    fn record(&self, cb: Cb) {
        self.log.borrow_mut().push(Op::Callback(cb));
    }
}

impl Callbacks for RecordingCallbacks {
    fn tx_complete(&mut self, _: DeviceId, _: &DeviceState) {
        self.record(Cb::TxComplete);
    }

    fn rx_complete(&mut self, _: DeviceId, _: &DeviceState) {
        self.record(Cb::RxComplete);
    }

    fn tx(&mut self, _: DeviceId, _: &DeviceState) {
        self.record(Cb::Tx);
    }

    fn rx(&mut self, _: DeviceId, _: &DeviceState) {
        self.record(Cb::Rx);
    }

    fn dma_tx_complete(&mut self, _: DeviceId, _: &DeviceState) {
        self.record(Cb::DmaTxComplete);
    }

    fn dma_tx_half_transfer(&mut self, _: DeviceId, _: &DeviceState) {
        self.record(Cb::DmaTxHalfTransfer);
    }

    fn dma_tx_error(&mut self, _: DeviceId, _: &DeviceState) {
        self.record(Cb::DmaTxError);
    }

    fn dma_rx_complete(&mut self, _: DeviceId, _: &DeviceState) {
        self.record(Cb::DmaRxComplete);
    }

    fn dma_rx_half_transfer(&mut self, _: DeviceId, _: &DeviceState) {
        self.record(Cb::DmaRxHalfTransfer);
    }

    fn dma_rx_error(&mut self, _: DeviceId, _: &DeviceState) {
        self.record(Cb::DmaRxError);
    }

    fn error(&mut self, _: DeviceId, error: DevError) {
        self.record(Cb::Error(error));
    }

    fn bus_error(&mut self, _: DeviceId) {
        self.record(Cb::BusError);
    }

    fn arbitration_loss(&mut self, _: DeviceId) {
        self.record(Cb::ArbitrationLoss);
    }

    fn overrun(&mut self, _: DeviceId) {
        self.record(Cb::Overrun);
    }

    fn not_acknowledged(&mut self, _: DeviceId) {
        self.record(Cb::NotAcknowledged);
    }

    fn timeout(&mut self, _: DeviceId, _: &DeviceState) -> Result<(), Error> {
        self.record(Cb::Timeout);
        self.timeout_result
    }
}

pub type TestCpal = Cpal<MockI2c, MockDma, MockTimer, RecordingCallbacks>;

pub struct Harness {
    pub cpal: TestCpal,
    pub i2c: Rc<RefCell<I2cModel>>,
    pub dma: Rc<RefCell<DmaModel>>,
    pub timer: Rc<RefCell<TimerModel>>,
    pub shared: &'static DeviceState,
    log: Log,
}

impl Harness {
    /// Handle configured with `config`, not initialized
    pub fn new(config: Config) -> Self {
        let log: Log = Rc::default();
        let shared: &'static DeviceState = Box::leak(Box::new(DeviceState::new()));

        let i2c = Rc::new(RefCell::new(I2cModel {
            log: log.clone(),
            shared,
            isr: Status::empty(),
            interrupts: Interrupts::empty(),
            address_acked: true,
            busy_stuck: false,
            status_reads: 0,
            ticks_per_read: 1,
            sent: Vec::new(),
            rx_fifo: VecDeque::new(),
            read: false,
            nbytes: 0,
            reload: false,
            autoend: false,
            count: 0,
        }));
        let dma = Rc::new(RefCell::new(DmaModel {
            log: log.clone(),
            tx_status: DmaStatus::empty(),
            rx_status: DmaStatus::empty(),
            rx_payload: Vec::new(),
        }));
        let timer = Rc::new(RefCell::new(TimerModel::default()));

        let cpal = Cpal::new(
            DeviceId::I2c1,
            MockI2c(i2c.clone()),
            MockDma(dma.clone()),
            MockTimer {
                log: log.clone(),
                model: timer.clone(),
                shared,
                supervisor: RecordingCallbacks {
                    log: log.clone(),
                    timeout_result: Err(Error::Timeout),
                },
            },
            shared,
            RecordingCallbacks {
                log: log.clone(),
                timeout_result: Err(Error::Timeout),
            },
        )
        .with_config(config);

        Harness {
            cpal,
            i2c,
            dma,
            timer,
            shared,
            log,
        }
    }

    /// Initialized handle with the log cleared
    pub fn ready(config: Config) -> Self {
        let mut harness = Self::new(config);
        harness.cpal.init().unwrap();
        harness.clear_ops();
        harness
    }

    pub fn ops(&self) -> Vec<Op> {
        self.log.borrow().clone()
    }

    pub fn clear_ops(&self) {
        self.log.borrow_mut().clear();
    }

    /// Callbacks run so far, in order
    pub fn callbacks(&self) -> Vec<Cb> {
        self.log
            .borrow()
            .iter()
            .filter_map(|op| match op {
                Op::Callback(cb) => Some(*cb),
                _ => None,
            })
            .collect()
    }

    /// Index of the first occurrence of `op` in the log
    pub fn position(&self, op: &Op) -> usize {
        self.log
            .borrow()
            .iter()
            .position(|o| o == op)
            .unwrap_or_else(|| panic!("{op:?} not in {:?}", self.log.borrow()))
    }

    pub fn cr2_writes(&self) -> Vec<Cr2> {
        self.log
            .borrow()
            .iter()
            .filter_map(|op| match op {
                Op::WriteCr2(cr2) => Some(*cr2),
                _ => None,
            })
            .collect()
    }
}

pub fn buffer(data: &[u8]) -> &'static mut [u8] {
    Box::leak(data.to_vec().into_boxed_slice())
}

pub fn interrupt_model() -> Config {
    Config::new().programming_model(stm32_i2c_cpal::cpal::ProgModel::Interrupt)
}
