use anyhow::Result;
use log::*;
use serde::{Deserialize, Serialize};

use crate::bus::{Address, Bus, BusResult};
use crate::types::{Long, Word};

use super::fpu::host::FpuHost;
use super::fpu::{Fpu, FpuModel};
use super::regs::RegisterFile;
use super::{CpuSized, FPU_COPROCESSOR_ID};

// Exception vectors
/// Stack pointer initialization
const VECTOR_SP: Address = 0x00000000;
/// Reset vector
const VECTOR_RESET: Address = 0x00000004;
/// Illegal instruction exception vector number
const VECTOR_ILLEGAL: u8 = 4;
/// Line 1111 / F exception vector number
const VECTOR_LINEF: u8 = 11;

/// Motorola 68020/68040 integer unit, as far as the FPU needs one
#[derive(Serialize, Deserialize)]
pub struct CpuM68k<TBus: Bus<Address, u8>, const ADDRESS_MASK: Address> {
    /// Exception occured this step
    pub step_exception: bool,

    /// External address/data bus
    pub bus: TBus,

    /// Register state
    pub regs: RegisterFile,

    /// Floating point coprocessor
    pub fpu: Fpu,
}

impl<TBus, const ADDRESS_MASK: Address> CpuM68k<TBus, ADDRESS_MASK>
where
    TBus: Bus<Address, u8>,
{
    pub fn new(bus: TBus, fpu_model: FpuModel) -> Self {
        Self {
            bus,
            regs: RegisterFile::new(),
            fpu: Fpu::new(fpu_model),
            step_exception: false,
        }
    }

    /// Resets the CPU and FPU, loads reset vector and initial SP
    pub fn reset(&mut self) -> Result<()> {
        self.regs = RegisterFile::new();
        self.fpu.reset();
        let init_ssp = self.read_mem(VECTOR_SP)?;
        let init_pc = self.read_mem(VECTOR_RESET)?;

        info!("Reset - SSP: {:08X}, PC: {:08X}", init_ssp, init_pc);
        self.regs.ssp = init_ssp;
        self.regs.sr.set_supervisor(true);
        self.regs.sr.set_int_prio_mask(7);
        self.regs.pc = init_pc;

        Ok(())
    }

    /// Splits the CPU into the FPU and the integer unit it runs on
    pub fn split(&mut self) -> (&mut Fpu, CpuPort<'_, TBus, ADDRESS_MASK>) {
        (
            &mut self.fpu,
            CpuPort {
                bus: &mut self.bus,
                regs: &mut self.regs,
                step_exception: &mut self.step_exception,
            },
        )
    }

    /// Reads a value from the bus (big endian)
    pub fn read_mem<T: CpuSized>(&mut self, addr: Address) -> Result<T> {
        self.split().1.read(addr)
    }

    /// Writes a value to the bus (big endian)
    pub fn write_mem<T: CpuSized>(&mut self, addr: Address, value: T) -> Result<()> {
        self.split().1.write(addr, value)
    }

    /// Executes a single instruction. Only line F coprocessor instructions
    /// for the FPU are implemented, anything else traps.
    pub fn step(&mut self) -> Result<()> {
        self.step_exception = false;

        let start_pc = self.regs.pc;
        let opcode: Word = self.read_mem(start_pc)?;
        self.regs.pc = start_pc.wrapping_add(2) & ADDRESS_MASK;

        let (fpu, mut port) = self.split();
        if opcode >> 12 != 0b1111 {
            trace!("Unimplemented opcode {:04X} @ {:08X}", opcode, start_pc);
            return port.exception(VECTOR_ILLEGAL, start_pc);
        }
        if (opcode >> 9) & 0b111 != FPU_COPROCESSOR_ID {
            trace!("Coprocessor {} absent @ {:08X}", (opcode >> 9) & 0b111, start_pc);
            return port.exception(VECTOR_LINEF, start_pc);
        }
        fpu.execute(&mut port, opcode)
    }
}

/// Integer unit view handed to the FPU while it executes
pub struct CpuPort<'a, TBus: Bus<Address, u8>, const ADDRESS_MASK: Address> {
    bus: &'a mut TBus,
    regs: &'a mut RegisterFile,
    step_exception: &'a mut bool,
}

impl<TBus, const ADDRESS_MASK: Address> FpuHost for CpuPort<'_, TBus, ADDRESS_MASK>
where
    TBus: Bus<Address, u8>,
{
    fn read<T: CpuSized>(&mut self, addr: Address) -> Result<T> {
        let len = std::mem::size_of::<T>();
        let mut result: T = T::zero();

        // Below converts from BE -> LE on the fly
        for a in 0..len {
            let byte_addr = addr.wrapping_add(a as Address) & ADDRESS_MASK;
            let b: T = loop {
                match self.bus.read(byte_addr) {
                    BusResult::Ok(b) => break b.into(),
                    BusResult::WaitState => continue,
                }
            };
            result = result.wrapping_shl(8) | b;
        }
        Ok(result)
    }

    fn write<T: CpuSized>(&mut self, addr: Address, value: T) -> Result<()> {
        let bytes = value.to_be_bytes();
        for (a, &b) in bytes.as_ref().iter().enumerate() {
            let byte_addr = addr.wrapping_add(a as Address) & ADDRESS_MASK;
            while let BusResult::WaitState = self.bus.write(byte_addr, b) {}
        }
        Ok(())
    }

    fn next_iword(&mut self) -> Result<Word> {
        let v = self.read(self.regs.pc)?;
        self.regs.pc = self.regs.pc.wrapping_add(2) & ADDRESS_MASK;
        Ok(v)
    }

    fn pc(&self) -> Address {
        self.regs.pc
    }

    fn set_pc(&mut self, pc: Address) {
        self.regs.pc = pc & ADDRESS_MASK;
    }

    fn dreg(&self, reg: usize) -> Long {
        self.regs.read_d(reg)
    }

    fn set_dreg(&mut self, reg: usize, value: Long) {
        self.regs.write_d(reg, value);
    }

    fn areg(&self, reg: usize) -> Long {
        self.regs.read_a(reg)
    }

    fn set_areg(&mut self, reg: usize, value: Long) {
        self.regs.write_a(reg, value);
    }

    fn illegal_instruction(&mut self, _opcode: Word) -> Result<()> {
        let pc = self.regs.pc;
        self.exception(VECTOR_ILLEGAL, pc)
    }

    /// Raises an exception in supervisor mode with a format 0 stack frame
    fn exception(&mut self, vector: u8, pc: Address) -> Result<()> {
        debug!("Exception {} @ PC = {:08X}, {}", vector, pc, self.regs);
        *self.step_exception = true;

        let saved_sr = self.regs.sr.sr();
        self.regs.sr.set_supervisor(true);
        self.regs.sr.set_trace(0);

        let vector_offset = Word::from(vector) * 4;
        let ssp = self.regs.ssp.wrapping_sub(8);
        self.regs.ssp = ssp;
        self.write(ssp, saved_sr)?;
        self.write(ssp.wrapping_add(2), pc)?;
        // Format 0, vector offset
        self.write(ssp.wrapping_add(6), vector_offset)?;

        let new_pc = self.read(Address::from(vector_offset))?;
        self.set_pc(new_pc);
        Ok(())
    }
}
