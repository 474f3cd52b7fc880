use anyhow::Result;

use crate::bus::Address;
use crate::cpu_m68k::CpuSized;
use crate::types::{Long, Word};

/// Services of the integer unit the FPU runs on
pub trait FpuHost {
    /// Reads memory, big endian
    fn read<T: CpuSized>(&mut self, addr: Address) -> Result<T>;

    /// Writes memory, big endian
    fn write<T: CpuSized>(&mut self, addr: Address, value: T) -> Result<()>;

    /// Fetches the next word from the instruction stream, advancing the PC
    fn next_iword(&mut self) -> Result<Word>;

    /// Fetches the next long from the instruction stream, advancing the PC
    fn next_ilong(&mut self) -> Result<Long> {
        let high = Long::from(self.next_iword()?);
        let low = Long::from(self.next_iword()?);
        Ok((high << 16) | low)
    }

    fn pc(&self) -> Address;
    fn set_pc(&mut self, pc: Address);

    fn dreg(&self, reg: usize) -> Long;
    fn set_dreg(&mut self, reg: usize, value: Long);

    /// Address register, A7 is the active stack pointer
    fn areg(&self, reg: usize) -> Long;
    fn set_areg(&mut self, reg: usize, value: Long);

    /// Takes the illegal instruction exception. The PC is at the opcode.
    fn illegal_instruction(&mut self, opcode: Word) -> Result<()>;

    /// Takes an exception, stacking `pc` as the return address
    fn exception(&mut self, vector: u8, pc: Address) -> Result<()>;
}
