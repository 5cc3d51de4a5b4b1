use embedded_hal::i2c;

use super::{DevError, Error};

impl DevError {
    /// Most significant error kind among the flags
    pub fn kind(&self) -> i2c::ErrorKind {
        if self.contains(DevError::BUS) {
            i2c::ErrorKind::Bus
        } else if self.contains(DevError::ARBITRATION) {
            i2c::ErrorKind::ArbitrationLoss
        } else if self.contains(DevError::OVERRUN) {
            i2c::ErrorKind::Overrun
        } else if self.contains(DevError::NACK) {
            // the address and data phases are not told apart
            i2c::ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Unknown)
        } else {
            i2c::ErrorKind::Other
        }
    }
}

impl i2c::Error for Error {
    fn kind(&self) -> i2c::ErrorKind {
        match self {
            Error::Device(flags) => flags.kind(),
            _ => i2c::ErrorKind::Other,
        }
    }
}
