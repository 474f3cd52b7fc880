//! FPU operand resolution over the 68k effective addressing modes

use anyhow::{Result, bail};

use crate::bus::Address;
use crate::cpu_m68k::CpuSized;
use crate::types::{Byte, Long, Word};

use super::float80::Float80;
use super::host::FpuHost;
use super::instruction::{AddressingMode, FpuExtWord, IndexExtWord, MemoryIndirectAction, OperandSize};
use super::{Fpu, FpuError};

impl Fpu {
    /// Brief or full format indexed address (68020 and up)
    fn calc_index_addr(&self, host: &mut impl FpuHost, base: Address, opcode: Word) -> Result<Address> {
        let extword = IndexExtWord(host.next_iword()?);

        let index = {
            let v = if extword.index_is_a() {
                host.areg(extword.index_reg())
            } else {
                host.dreg(extword.index_reg())
            };
            let v = if extword.index_long() {
                v
            } else {
                (v as Word).expand_sign_extend()
            };
            v.wrapping_mul(1 << extword.scale())
        };

        if !extword.is_full() {
            let displacement = extword.brief_displacement().expand_sign_extend();
            return Ok(base.wrapping_add(displacement).wrapping_add(index));
        }

        let base = if extword.base_suppress() { 0 } else { base };
        let index = if extword.index_suppress() { 0 } else { index };
        let displacement = match extword.bd_size() {
            0b01 => 0,
            0b10 => host.next_iword()?.expand_sign_extend(),
            0b11 => host.next_ilong()?,
            _ => bail!(FpuError::InvalidAddressingMode(opcode)),
        };
        let disp_addr = base.wrapping_add(displacement);
        let pre_addr = disp_addr.wrapping_add(index);

        Ok(match extword.memory_indirect_action()? {
            MemoryIndirectAction::None => pre_addr,
            MemoryIndirectAction::Null => host.read(disp_addr)?,
            MemoryIndirectAction::Word => {
                let od = host.next_iword()?.expand_sign_extend();
                host.read::<Address>(disp_addr)?.wrapping_add(od)
            }
            MemoryIndirectAction::Long => {
                let od = host.next_ilong()?;
                host.read::<Address>(disp_addr)?.wrapping_add(od)
            }
            MemoryIndirectAction::PreIndexNull => host.read(pre_addr)?,
            MemoryIndirectAction::PreIndexWord => {
                let od = host.next_iword()?.expand_sign_extend();
                host.read::<Address>(pre_addr)?.wrapping_add(od)
            }
            MemoryIndirectAction::PreIndexLong => {
                let od = host.next_ilong()?;
                host.read::<Address>(pre_addr)?.wrapping_add(od)
            }
            MemoryIndirectAction::PostIndexNull => host.read::<Address>(disp_addr)?.wrapping_add(index),
            MemoryIndirectAction::PostIndexWord => {
                let od = host.next_iword()?.expand_sign_extend();
                host.read::<Address>(disp_addr)?
                    .wrapping_add(index)
                    .wrapping_add(od)
            }
            MemoryIndirectAction::PostIndexLong => {
                let od = host.next_ilong()?;
                host.read::<Address>(disp_addr)?
                    .wrapping_add(index)
                    .wrapping_add(od)
            }
        })
    }

    /// Calculates the address of a memory operand, fetching extension words.
    /// Postincrement and predecrement adjust An by `step` (A7 stays word aligned).
    fn calc_ea_addr(
        &self,
        host: &mut impl FpuHost,
        opcode: Word,
        mode: AddressingMode,
        reg: usize,
        size: OperandSize,
    ) -> Result<Address> {
        let step = if reg == 7 {
            size.stream_bytes()
        } else {
            size.bytes()
        };

        Ok(match mode {
            AddressingMode::Indirect => host.areg(reg),
            AddressingMode::IndirectPostInc => {
                let addr = host.areg(reg);
                host.set_areg(reg, addr.wrapping_add(step));
                addr
            }
            AddressingMode::IndirectPreDec => {
                let addr = host.areg(reg).wrapping_sub(step);
                host.set_areg(reg, addr);
                addr
            }
            AddressingMode::IndirectDisplacement => {
                let displacement = host.next_iword()?.expand_sign_extend();
                host.areg(reg).wrapping_add(displacement)
            }
            AddressingMode::IndirectIndex => {
                let base = host.areg(reg);
                self.calc_index_addr(host, base, opcode)?
            }
            AddressingMode::AbsoluteShort => host.next_iword()?.expand_sign_extend(),
            AddressingMode::AbsoluteLong => host.next_ilong()?,
            AddressingMode::PCDisplacement => {
                let pc = host.pc();
                pc.wrapping_add(host.next_iword()?.expand_sign_extend())
            }
            AddressingMode::PCIndex => {
                let pc = host.pc();
                self.calc_index_addr(host, pc, opcode)?
            }
            AddressingMode::Immediate => {
                let pc = host.pc();
                host.set_pc(pc.wrapping_add(size.stream_bytes()));
                // A byte immediate is the low-order byte of its word
                if size == OperandSize::Byte {
                    pc.wrapping_add(1)
                } else {
                    pc
                }
            }
            AddressingMode::DataRegister | AddressingMode::AddressRegister => {
                bail!(FpuError::InvalidAddressingMode(opcode))
            }
        })
    }

    /// Fetches the source operand of a general instruction
    pub(super) fn get_fp_value(
        &mut self,
        host: &mut impl FpuHost,
        opcode: Word,
        ext: FpuExtWord,
    ) -> Result<Float80> {
        if !ext.rm() {
            return Ok(self.regs.fp[usize::from(ext.src_spec())]);
        }

        let size = OperandSize::decode(ext.src_spec())?;
        let (mode, reg) = AddressingMode::decode(opcode)?;
        match mode {
            AddressingMode::DataRegister => match size {
                OperandSize::Byte | OperandSize::Word | OperandSize::Long | OperandSize::Single => {
                    self.load_operand(size, &[host.dreg(reg)])
                }
                _ => bail!(FpuError::InvalidOperandSize(size as u8)),
            },
            AddressingMode::AddressRegister => bail!(FpuError::InvalidAddressingMode(opcode)),
            _ => {
                let addr = self.calc_ea_addr(host, opcode, mode, reg, size)?;
                self.read_operand(host, addr, size)
            }
        }
    }

    /// Stores FPn to the destination of an FMOVE to memory/data register
    pub(super) fn put_fp_value(
        &mut self,
        host: &mut impl FpuHost,
        opcode: Word,
        ext: FpuExtWord,
        value: Float80,
    ) -> Result<()> {
        let size = OperandSize::decode(ext.src_spec())?;
        let (mode, reg) = AddressingMode::decode(opcode)?;
        match mode {
            AddressingMode::DataRegister => {
                let v = match size {
                    OperandSize::Byte => (self.store_operand(size, value)?[0] as Byte).replace_in(host.dreg(reg)),
                    OperandSize::Word => (self.store_operand(size, value)?[0] as Word).replace_in(host.dreg(reg)),
                    OperandSize::Long | OperandSize::Single => self.store_operand(size, value)?[0],
                    _ => bail!(FpuError::InvalidOperandSize(size as u8)),
                };
                host.set_dreg(reg, v);
                Ok(())
            }
            AddressingMode::AddressRegister
            | AddressingMode::Immediate
            | AddressingMode::PCDisplacement
            | AddressingMode::PCIndex => bail!(FpuError::InvalidAddressingMode(opcode)),
            _ => {
                let addr = self.calc_ea_addr(host, opcode, mode, reg, size)?;
                self.write_operand(host, addr, size, value)
            }
        }
    }

    /// Address of a memory operand without postincrement/predecrement side
    /// effects; the caller adjusts An.
    pub(super) fn get_fp_ad(&self, host: &mut impl FpuHost, opcode: Word) -> Result<Address> {
        let (mode, reg) = AddressingMode::decode(opcode)?;
        match mode {
            AddressingMode::Indirect | AddressingMode::IndirectPostInc | AddressingMode::IndirectPreDec => {
                Ok(host.areg(reg))
            }
            AddressingMode::DataRegister | AddressingMode::AddressRegister | AddressingMode::Immediate => {
                bail!(FpuError::InvalidAddressingMode(opcode))
            }
            _ => self.calc_ea_addr(host, opcode, mode, reg, OperandSize::Long),
        }
    }

    /// Writes the byte operand of FScc, with An side effects
    pub(super) fn put_byte(&self, host: &mut impl FpuHost, opcode: Word, value: Byte) -> Result<()> {
        let (mode, reg) = AddressingMode::decode(opcode)?;
        match mode {
            AddressingMode::DataRegister => {
                host.set_dreg(reg, value.replace_in(host.dreg(reg)));
                Ok(())
            }
            AddressingMode::AddressRegister
            | AddressingMode::Immediate
            | AddressingMode::PCDisplacement
            | AddressingMode::PCIndex => bail!(FpuError::InvalidAddressingMode(opcode)),
            _ => {
                let addr = self.calc_ea_addr(host, opcode, mode, reg, OperandSize::Byte)?;
                host.write(addr, value)
            }
        }
    }
}
