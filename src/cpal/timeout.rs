//! Timeout supervision
//!
//! Every bounded wait arms a per-device countdown which a periodic timer
//! interrupt decrements through [`timeout_manager`]. The countdown has three
//! reserved values:
//!
//! - [`TIMEOUT_DEFAULT`]: disarmed, the tick leaves it alone;
//! - [`TIMEOUT_MIN`]: armed budget used up, a polling wait gives up here;
//! - [`TIMEOUT_DETECTED`]: reached one tick after `MIN`, the tick handler
//!   expires the device on the following tick.
//!
//! Arming stores `MIN + ticks`, so a wait always gets at least `ticks` full
//! tick edges.

use core::sync::atomic::{AtomicU32, Ordering};

use super::callbacks::Callbacks;
use super::hw::TickTimer;
use super::state::{DevError, DeviceState, State};
use super::DeviceId;

pub const TIMEOUT_DEFAULT: u32 = u32::MAX;
pub const TIMEOUT_MIN: u32 = 1;
pub const TIMEOUT_DETECTED: u32 = 0;

/// Default tick budget for each bounded wait
pub const DEFAULT_TICKS: u32 = 2;

/// Countdown shared by a polling wait and the supervisor tick
#[derive(Debug)]
pub struct TimeoutCounter(AtomicU32);

/// Outcome of one supervisor tick
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tick {
    /// Nothing armed
    Idle,
    /// Armed, one tick consumed
    Counting,
    /// The device was forced into the error state
    Expired,
}

/// Why a bounded wait gave up
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitError {
    /// Budget used up; the caller runs the timeout handling
    Fired,
    /// The supervisor already expired the device
    Expired,
}

impl TimeoutCounter {
    pub const fn new() -> Self {
        TimeoutCounter(AtomicU32::new(TIMEOUT_DEFAULT))
    }

    pub fn value(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_armed(&self) -> bool {
        self.value() != TIMEOUT_DEFAULT
    }

    fn store(&self, value: u32) {
        self.0.store(value, Ordering::Release);
    }

    /// Start a countdown of `ticks` with the tick interrupt held off
    pub fn arm<T: TickTimer>(&self, timer: &mut T, ticks: u32) {
        timer.mask();
        self.store(TIMEOUT_MIN.saturating_add(ticks).min(TIMEOUT_DEFAULT - 1));
        timer.restart();
        timer.clear_pending();
        timer.unmask();
    }

    /// Stop the countdown with the tick interrupt held off
    ///
    /// Returns `false` if the supervisor had already expired it, in which
    /// case the timeout has been handled there.
    pub fn disarm<T: TickTimer>(&self, timer: &mut T) -> bool {
        timer.mask();
        let armed = self.is_armed();
        self.store(TIMEOUT_DEFAULT);
        timer.unmask();
        armed
    }

    /// Disarm without the timer, from the tick context itself
    pub(crate) fn reset(&self) {
        self.store(TIMEOUT_DEFAULT);
    }

    /// Advance the countdown by one tick. Returns `true` when the countdown
    /// has expired and was disarmed.
    pub fn tick(&self) -> bool {
        match self.value() {
            TIMEOUT_DEFAULT => false,
            TIMEOUT_DETECTED => {
                self.reset();
                true
            }
            value => {
                self.store(value - 1);
                false
            }
        }
    }

    fn check(&self) -> Result<(), WaitError> {
        match self.value() {
            TIMEOUT_MIN | TIMEOUT_DETECTED => Err(WaitError::Fired),
            TIMEOUT_DEFAULT => Err(WaitError::Expired),
            _ => Ok(()),
        }
    }
}

impl Default for TimeoutCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Spin until `done` returns true or `ticks` supervisor ticks elapse
///
/// On success the countdown is disarmed again. If the supervisor expired
/// the device before the disarm, the wait reports [`WaitError::Expired`]
/// even though `done` came true. On failure the countdown is left as found
/// so the caller can tell who gave up.
pub fn wait_until<T, F>(
    counter: &TimeoutCounter,
    timer: &mut T,
    ticks: u32,
    mut done: F,
) -> Result<(), WaitError>
where
    T: TickTimer,
    F: FnMut() -> bool,
{
    counter.arm(timer, ticks);
    loop {
        if done() {
            if counter.disarm(timer) {
                return Ok(());
            }
            return Err(WaitError::Expired);
        }
        counter.check()?;
    }
}

/// Supervisor tick for one device
///
/// Call from the timer interrupt, once per device, after acknowledging the
/// timer. It only touches `shared`, so it never has to wait for whoever owns
/// the device handle.
///
/// The result of [`Callbacks::timeout`] is dropped here: there is no caller
/// to report it to, and the device is left in [`State::Error`] with
/// [`DevError::TIMEOUT`] either way.
pub fn timeout_manager<CB: Callbacks>(
    device: DeviceId,
    shared: &DeviceState,
    callbacks: &mut CB,
) -> Tick {
    let counter = shared.timeout();
    if !counter.is_armed() {
        return Tick::Idle;
    }
    if !counter.tick() {
        return Tick::Counting;
    }

    shared.set_state(State::Error);
    if shared.error().is_empty() {
        shared.set_error(DevError::TIMEOUT);

        #[cfg(feature = "log")]
        log::warn!("{:?}: timeout expired", device);

        #[cfg(feature = "defmt")]
        defmt::warn!("{}: timeout expired", device);

        let _ = callbacks.timeout(device, shared);
    }
    Tick::Expired
}
