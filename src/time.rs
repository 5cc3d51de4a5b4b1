//! Time units

pub use fugit::{
    HertzU32 as Hertz, KilohertzU32 as KiloHertz, MegahertzU32 as MegaHertz,
    MicrosDurationU32 as MicroSeconds, MillisDurationU32 as MilliSeconds,
    NanosDurationU32 as NanoSeconds,
};

/// Number of timer periods of length `period` needed to cover at least
/// `duration`. Used to turn a wall-clock budget into supervisor ticks.
pub fn ticks_for(duration: MicroSeconds, period: MicroSeconds) -> u32 {
    let period = period.to_micros().max(1);
    duration.to_micros().div_ceil(period)
}
