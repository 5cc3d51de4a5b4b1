//! Basic timers as timeout supervisor tick source
//!
//! [`SupervisorTimer`] runs TIM6 or TIM7 as a periodic update interrupt and
//! implements [`TickTimer`] for the timeout supervisor. The interrupt handler
//! calls [`timeout_manager`](crate::cpal::timeout_manager):
//!
//! ```ignore
//! let tick = SupervisorTimer::new(dp.TIM6, 250.MHz(), 1.millis());
//!
//! #[interrupt]
//! fn TIM6() {
//!     TICK.clear_pending();
//!     timeout_manager(DeviceId::I2c1, &STATE, &mut CALLBACKS);
//! }
//! ```

use cortex_m::peripheral::NVIC;

use crate::cpal::hw::TickTimer;
use crate::stm32::{Interrupt, RCC, TIM6, TIM7};
use crate::time::{Hertz, MicroSeconds};

/// Periodic timer driving the timeout supervisor
#[derive(Debug)]
pub struct SupervisorTimer<TIM> {
    tim: TIM,
}

macro_rules! supervisor {
    ($($TIMX:ident: $en:ident, $rst:ident,)+) => {
        $(
            impl SupervisorTimer<$TIMX> {
                /// Configure `tim` to overflow every `period` of its kernel
                /// clock `ker_ck`, without starting it
                pub fn new(tim: $TIMX, ker_ck: Hertz, period: MicroSeconds) -> Self {
                    cortex_m::interrupt::free(|_| {
                        // Note (unsafe): only this timer's bits are touched
                        let rcc = unsafe { &*RCC::ptr() };
                        rcc.apb1lenr().modify(|_, w| w.$en().set_bit());
                        let _ = rcc.apb1lenr().read();
                        rcc.apb1lrstr().modify(|_, w| w.$rst().set_bit());
                        rcc.apb1lrstr().modify(|_, w| w.$rst().clear_bit());
                    });

                    let mut timer = SupervisorTimer { tim };
                    timer.pause();
                    // UEV event occours on next overflow
                    timer.tim.cr1().modify(|_, w| w.urs().counter_only());
                    timer.set_timeout_ticks(timeout_ticks(ker_ck, period));
                    // Load PSC and ARR now
                    timer.tim.egr().write(|w| w.ug().set_bit());
                    timer.clear_irq();
                    timer
                }

                fn set_timeout_ticks(&mut self, ticks: u32) {
                    let (psc, arr) = calculate_timeout_ticks_register_values(ticks);
                    #[allow(unused_unsafe)]
                    unsafe {
                        self.tim.psc().write(|w| w.psc().bits(psc));
                    }
                    #[allow(unused_unsafe)] // method is safe for some timers
                    self.tim.arr().write(|w| unsafe { w.bits(u32::from(arr)) });
                }

                fn pause(&mut self) {
                    self.tim.cr1().modify(|_, w| w.cen().clear_bit());
                }

                fn resume(&mut self) {
                    self.tim.cr1().modify(|_, w| w.cen().set_bit());
                }

                fn clear_irq(&mut self) {
                    self.tim.sr().modify(|_, w| w.uif().clear_bit());
                    interrupt_clear_clock_sync_delay!(self.tim.sr());
                }

                /// Releases the TIM peripheral
                pub fn free(mut self) -> $TIMX {
                    self.stop();
                    self.tim
                }
            }

            impl TickTimer for SupervisorTimer<$TIMX> {
                fn start(&mut self) {
                    self.tim.cnt().reset();
                    self.clear_irq();
                    self.tim.dier().write(|w| w.uie().set_bit());
                    NVIC::unpend(Interrupt::$TIMX);
                    // Note (unsafe): the handler only touches the shared device state
                    unsafe { NVIC::unmask(Interrupt::$TIMX) };
                    self.resume();
                }

                fn stop(&mut self) {
                    self.pause();
                    self.tim.dier().write(|w| w.uie().clear_bit());
                    NVIC::mask(Interrupt::$TIMX);
                    self.clear_pending();
                }

                fn mask(&mut self) {
                    NVIC::mask(Interrupt::$TIMX);
                }

                fn unmask(&mut self) {
                    // Note (unsafe): see start
                    unsafe { NVIC::unmask(Interrupt::$TIMX) };
                }

                fn restart(&mut self) {
                    self.tim.cnt().reset();
                }

                fn clear_pending(&mut self) {
                    self.clear_irq();
                    NVIC::unpend(Interrupt::$TIMX);
                }
            }
        )+
    }
}

supervisor! {
    TIM6: tim6en, tim6rst,
    TIM7: tim7en, tim7rst,
}

/// Kernel clock cycles per supervisor period, at least one
fn timeout_ticks(ker_ck: Hertz, period: MicroSeconds) -> u32 {
    let cycles = u64::from(ker_ck.raw()) * u64::from(period.to_micros())
        / 1_000_000;
    u32::try_from(cycles).unwrap_or(u32::MAX).max(1)
}

/// We want to have `ticks` amount of timer ticks before it reloads.
/// But `ticks` may have a higher value than what the timer can hold directly.
/// So we'll use the prescaler to extend the range.
///
/// The prescaler divides by `psc + 1`, chosen as the number of full 2^16
/// periods in `ticks`. The timer counts `0..=arr`, hence the final `- 1`.
///
/// This function returns the prescaler register value and auto reload register value.
fn calculate_timeout_ticks_register_values(ticks: u32) -> (u16, u16) {
    // ticks >> 16 always fits in 16 bits
    let psc = (ticks >> 16) as u16;
    let arr = u16::try_from(ticks / (u32::from(psc) + 1))
        .unwrap_or(u16::MAX)
        .saturating_sub(1);
    (psc, arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_ticks_register_values() {
        assert_eq!(calculate_timeout_ticks_register_values(0), (0, 0));
        assert_eq!(calculate_timeout_ticks_register_values(50000), (0, 49999));
        assert_eq!(calculate_timeout_ticks_register_values(100000), (1, 49999));
        assert_eq!(calculate_timeout_ticks_register_values(65535), (0, 65534));
        assert_eq!(calculate_timeout_ticks_register_values(65536), (1, 32767));
        assert_eq!(
            calculate_timeout_ticks_register_values(1000000),
            (15, 62499)
        );
        assert_eq!(
            calculate_timeout_ticks_register_values(u32::MAX),
            (u16::MAX, u16::MAX - 1)
        );
    }

    #[test]
    fn supervisor_period_in_kernel_cycles() {
        use fugit::RateExtU32;

        assert_eq!(
            timeout_ticks(250.MHz(), MicroSeconds::millis(1)),
            250_000
        );
        assert_eq!(timeout_ticks(1.MHz(), MicroSeconds::micros(0)), 1);
        assert_eq!(
            timeout_ticks(250.MHz(), MicroSeconds::secs(60)),
            u32::MAX
        );
    }
}
