use crate::cpal::DeviceId;
use crate::stm32::{i2c1, Interrupt, I2C1, I2C2, RCC};

use super::Instance;

// Implemented by all I2C instances
macro_rules! i2c {
    ($I2CX:ident: $Device:ident) => {
        paste::item! {
            impl Instance for $I2CX {
                const DEVICE: DeviceId = DeviceId::$Device;
                const EVENT_INTERRUPT: Interrupt = Interrupt::[<$I2CX _EV>];
                const ERROR_INTERRUPT: Interrupt = Interrupt::[<$I2CX _ER>];

                fn ptr() -> *const i2c1::RegisterBlock {
                    <$I2CX>::ptr() as *const _
                }

                fn enable_clock() {
                    cortex_m::interrupt::free(|_| {
                        // Note (unsafe): only this instance's bit is touched
                        let rcc = unsafe { &*RCC::ptr() };
                        rcc.apb1lenr().modify(|_, w| w.[<$I2CX:lower en>]().set_bit());
                        let _ = rcc.apb1lenr().read();
                    });
                }

                fn disable_clock() {
                    cortex_m::interrupt::free(|_| {
                        // Note (unsafe): only this instance's bit is touched
                        let rcc = unsafe { &*RCC::ptr() };
                        rcc.apb1lenr().modify(|_, w| w.[<$I2CX:lower en>]().clear_bit());
                    });
                }

                fn reset() {
                    cortex_m::interrupt::free(|_| {
                        // Note (unsafe): only this instance's bit is touched
                        let rcc = unsafe { &*RCC::ptr() };
                        rcc.apb1lrstr().modify(|_, w| w.[<$I2CX:lower rst>]().set_bit());
                        rcc.apb1lrstr().modify(|_, w| w.[<$I2CX:lower rst>]().clear_bit());
                    });
                }
            }

            impl crate::Sealed for $I2CX {}
        }
    };
}

i2c! { I2C1: I2c1 }
i2c! { I2C2: I2c2 }
