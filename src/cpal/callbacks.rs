//! Application hooks invoked by the driver
//!
//! Every method has an empty default, except [`Callbacks::timeout`] which
//! reports failure. Completion and error callbacks run in interrupt context;
//! keep them short.

use super::state::{DevError, DeviceState};
use super::{DeviceId, Error};

pub trait Callbacks {
    /// Write finished and the bus is released
    fn tx_complete(&mut self, _device: DeviceId, _shared: &DeviceState) {}

    /// Read finished and the bus is released
    fn rx_complete(&mut self, _device: DeviceId, _shared: &DeviceState) {}

    /// One byte written to the data register (interrupt model)
    fn tx(&mut self, _device: DeviceId, _shared: &DeviceState) {}

    /// One byte read from the data register (interrupt model)
    fn rx(&mut self, _device: DeviceId, _shared: &DeviceState) {}

    fn dma_tx_complete(&mut self, _device: DeviceId, _shared: &DeviceState) {}

    fn dma_tx_half_transfer(&mut self, _device: DeviceId, _shared: &DeviceState) {}

    fn dma_tx_error(&mut self, _device: DeviceId, _shared: &DeviceState) {}

    fn dma_rx_complete(&mut self, _device: DeviceId, _shared: &DeviceState) {}

    fn dma_rx_half_transfer(&mut self, _device: DeviceId, _shared: &DeviceState) {}

    fn dma_rx_error(&mut self, _device: DeviceId, _shared: &DeviceState) {}

    /// All error flags at once, with `ErrorCallbacks::Single`
    fn error(&mut self, _device: DeviceId, _error: DevError) {}

    fn bus_error(&mut self, _device: DeviceId) {}

    fn arbitration_loss(&mut self, _device: DeviceId) {}

    fn overrun(&mut self, _device: DeviceId) {}

    fn not_acknowledged(&mut self, _device: DeviceId) {}

    /// A bounded wait or the supervisor gave up. The device is already in
    /// the error state when this runs.
    fn timeout(&mut self, _device: DeviceId, _shared: &DeviceState) -> Result<(), Error> {
        Err(Error::Timeout)
    }
}

/// Callbacks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCallbacks;

impl Callbacks for NoCallbacks {}
