//! Event and error interrupt handling
//!
//! The event interrupt reads ISR once and runs, in order, every handler whose
//! flag is set in that snapshot. Several may run in the same invocation.

use super::config::ErrorCallbacks;
use super::hw::{Dma, Interrupts, Registers, Status, TickTimer};
use super::state::{DevError, State};
use super::transfer::{Chunk, Transfer, MAX_CHUNK};
use super::{Callbacks, Cpal};

type Handler<I2C, DMA, TIM, CB> = fn(&mut Cpal<I2C, DMA, TIM, CB>, Status);

impl<I2C, DMA, TIM, CB> Cpal<I2C, DMA, TIM, CB>
where
    I2C: Registers,
    DMA: Dma,
    TIM: TickTimer,
    CB: Callbacks,
{
    /// Event interrupt entry point
    ///
    /// Never fails; outcomes show up in [`state`](Self::state) and
    /// [`error`](Self::error).
    pub fn event_irq(&mut self) {
        let status = self.i2c.status();

        let handlers: [(Status, Handler<I2C, DMA, TIM, CB>); 6] = [
            (Status::TXIS, Self::on_transmit),
            (Status::RXNE, Self::on_receive),
            (Status::TCR, Self::on_reload),
            (Status::TC, Self::on_transfer_complete),
            (Status::STOPF, Self::on_stop),
            (Status::NACKF, Self::on_nack),
        ];

        for (flag, handler) in handlers {
            if status.contains(flag) {
                handler(self, status);
            }
        }
    }

    /// Error interrupt entry point
    pub fn error_irq(&mut self) {
        let flags = self.i2c.status() & Status::ERRORS;
        let error = DevError::from_bits_truncate(flags.bits());

        self.shared.set_error(error);
        self.shared.set_state(State::Error);

        // OVR leaves the data untouched so the last good byte can be read
        for flag in [Status::BERR, Status::ARLO, Status::OVR] {
            if flags.contains(flag) {
                self.i2c.clear(flag);
            }
        }

        #[cfg(feature = "log")]
        log::warn!("{:?}: bus error {:?}", self.device, error);

        #[cfg(feature = "defmt")]
        defmt::warn!("{}: bus error {}", self.device, error);

        match self.config.error_callbacks {
            ErrorCallbacks::None => {}
            ErrorCallbacks::Single => self.callbacks.error(self.device, error),
            ErrorCallbacks::PerKind => {
                if error.contains(DevError::BUS) {
                    self.callbacks.bus_error(self.device);
                }
                if error.contains(DevError::ARBITRATION) {
                    self.callbacks.arbitration_loss(self.device);
                }
                if error.contains(DevError::OVERRUN) {
                    self.callbacks.overrun(self.device);
                }
            }
        }
    }

    fn on_transmit(&mut self, _: Status) {
        if self.uses_dma() || self.state() != State::BusyTx {
            return;
        }
        let Some(byte) = self.tx.as_mut().and_then(Transfer::next_byte) else {
            return;
        };
        self.i2c.send(byte);
        self.callbacks.tx(self.device, self.shared);
    }

    fn on_receive(&mut self, _: Status) {
        if self.uses_dma() || self.state() != State::BusyRx {
            return;
        }
        // reading RXDR clears RXNE
        let byte = self.i2c.receive();
        if self.rx.as_mut().is_some_and(|rx| rx.push_byte(byte)) {
            self.callbacks.rx(self.device, self.shared);
        }
    }

    /// TCR: program the next chunk
    fn on_reload(&mut self, _: Status) {
        let dma = self.uses_dma();
        let transfer = if self.state() == State::BusyTx {
            self.tx.as_mut()
        } else {
            self.rx.as_mut()
        };
        let Some(transfer) = transfer else {
            return;
        };

        // per-byte handlers already counted the bytes in the interrupt model
        if dma {
            transfer.set_remaining(transfer.remaining().saturating_sub(MAX_CHUNK));
        }
        let chunk = Chunk::for_remaining(transfer.remaining());
        self.i2c.reload(chunk);
    }

    /// TC: last chunk done without automatic STOP
    fn on_transfer_complete(&mut self, _: Status) {
        self.i2c.disable_interrupts(Interrupts::all());
        let previous = self.state();
        self.shared.set_state(State::Ready);
        self.notify_complete(previous);
    }

    fn on_stop(&mut self, status: Status) {
        // a NACK in the same snapshot has not been recorded yet
        if self.error() == DevError::NACK || status.contains(Status::NACKF) {
            self.shared.set_state(State::Error);
            self.i2c.clear(Status::STOPF);
            return;
        }

        self.i2c.clear(Status::STOPF);
        self.i2c.disable_interrupts(Interrupts::all());

        let busy = self.config.timeouts.busy;
        if self
            .wait_status(busy, |s| !s.contains(Status::BUSY))
            .is_err()
        {
            return;
        }

        let previous = self.state();
        if matches!(previous, State::BusyTx | State::BusyRx) {
            self.shared.set_state(State::Ready);
            self.notify_complete(previous);
        }
    }

    fn on_nack(&mut self, _: Status) {
        self.shared.set_error(DevError::NACK);
        self.i2c.clear(Status::NACKF);

        #[cfg(feature = "log")]
        log::warn!("{:?}: not acknowledged", self.device);

        #[cfg(feature = "defmt")]
        defmt::warn!("{}: not acknowledged", self.device);

        match self.config.error_callbacks {
            ErrorCallbacks::None => {}
            ErrorCallbacks::Single => {
                self.callbacks.error(self.device, DevError::NACK)
            }
            ErrorCallbacks::PerKind => self.callbacks.not_acknowledged(self.device),
        }
    }

    fn notify_complete(&mut self, previous: State) {
        if previous == State::BusyTx {
            self.callbacks.tx_complete(self.device, self.shared);
        } else {
            self.callbacks.rx_complete(self.device, self.shared);
        }
    }
}
