use super::config::Options;
use super::hw::{Dma, DmaStatus, Registers, TickTimer};
use super::{Callbacks, Cpal, Direction};

impl<I2C, DMA, TIM, CB> Cpal<I2C, DMA, TIM, CB>
where
    I2C: Registers,
    DMA: Dma,
    TIM: TickTimer,
    CB: Callbacks,
{
    /// TX DMA channel interrupt entry point
    pub fn dma_tx_irq(&mut self) {
        let status = self.dma.status(Direction::Tx);

        if status.contains(DmaStatus::TRANSFER_COMPLETE) {
            if let Some(tx) = self.tx.as_mut() {
                tx.set_remaining(0);
            }
            // the callback sees the request still enabled
            self.callbacks.dma_tx_complete(self.device, self.shared);
            self.i2c.disable_dma_request(Direction::Tx);
            self.dma.disable(Direction::Tx);
        }
        if status.contains(DmaStatus::HALF_TRANSFER)
            && self.config.options.contains(Options::DMA_HT_IT)
        {
            self.callbacks.dma_tx_half_transfer(self.device, self.shared);
        }
        if status.contains(DmaStatus::TRANSFER_ERROR)
            && self.config.options.contains(Options::DMA_TE_IT)
        {
            self.callbacks.dma_tx_error(self.device, self.shared);
        }

        self.dma.clear(Direction::Tx);
    }

    /// RX DMA channel interrupt entry point
    pub fn dma_rx_irq(&mut self) {
        let status = self.dma.status(Direction::Rx);

        if status.contains(DmaStatus::TRANSFER_COMPLETE) {
            if let Some(rx) = self.rx.as_mut() {
                rx.set_remaining(0);
            }
            self.i2c.disable_dma_request(Direction::Rx);
            self.dma.disable(Direction::Rx);
            self.callbacks.dma_rx_complete(self.device, self.shared);
        }
        if status.contains(DmaStatus::HALF_TRANSFER)
            && self.config.options.contains(Options::DMA_HT_IT)
        {
            self.callbacks.dma_rx_half_transfer(self.device, self.shared);
        }
        if status.contains(DmaStatus::TRANSFER_ERROR)
            && self.config.options.contains(Options::DMA_TE_IT)
        {
            self.callbacks.dma_rx_error(self.device, self.shared);
        }

        self.dma.clear(Direction::Rx);
    }
}
