pub mod testbus;

use anyhow::Result;
use num_traits::{PrimInt, WrappingAdd};

/// Main CPU address data type
pub type Address = u32;

/// Result of a bus read/write
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub enum BusResult<TD: PrimInt> {
    /// Bus access executed ok, result value encapsulated
    /// (ignore for writes)
    Ok(TD),

    /// DTACK not asserted, CPU needs to insert wait states and retry
    WaitState,
}

/// Flat emulated address space as seen by the CPU, one data unit per address.
pub trait Bus<TA: PrimInt + WrappingAdd, TD: PrimInt> {
    fn read(&mut self, addr: TA) -> BusResult<TD>;
    fn write(&mut self, addr: TA, val: TD) -> BusResult<TD>;
    fn get_mask(&self) -> TA;

    /// RESET line triggered by 68k RESET instruction (soft) or
    /// reset caused by CPU external reset (hard)
    fn reset(&mut self, hard: bool) -> Result<()>;
}

impl<TA, TD> core::fmt::Debug for dyn Bus<TA, TD> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Bus")
    }
}
