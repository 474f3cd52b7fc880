use anyhow::{Result, bail};
use log::trace;

use crate::bus::Address;
use crate::cpu_m68k::CpuSized;
use crate::types::Word;

use super::host::FpuHost;
use super::regs::{FpuAccruedExceptions, FpuExceptions};
use super::{Fpu, FpuError};

type EnableTest = fn(FpuExceptions) -> bool;
type AccruedTest = fn(FpuAccruedExceptions) -> bool;

/// Coprocessor pre-instruction exception vectors, by priority.
/// BSUN, OPERR and SNAN all accrue into IOP.
const PRE_INSTRUCTION_EXCEPTIONS: [(EnableTest, AccruedTest, u8); 7] = [
    (|e| e.bsun(), |a| a.iop(), 48),
    (|e| e.inex1() || e.inex2(), |a| a.inex(), 49),
    (|e| e.dz(), |a| a.dz(), 50),
    (|e| e.unfl(), |a| a.unfl(), 51),
    (|e| e.operr(), |a| a.iop(), 52),
    (|e| e.ovfl(), |a| a.ovfl(), 53),
    (|e| e.snan(), |a| a.iop(), 54),
];

/// FTRAPcc exception vector
const VECTOR_TRAPCC: u8 = 7;

impl Fpu {
    /// Evaluates a conditional predicate against the condition codes.
    /// The IEEE nonaware predicates raise BSUN on an unordered result.
    pub fn fpp_cond(&mut self, condition: Word) -> Result<bool> {
        let cc = self.regs.condition_codes();
        let nan = cc.fpcc_nan();
        let zero = cc.fpcc_z();
        let neg = cc.fpcc_n();

        let result = match condition & 0b11_1111 {
            // Miscellaneous Tests
            0b000000 | 0b010000 => false, // F: False, SF: Signaling False
            0b001111 | 0b011111 => true,  // T: True, ST: Signaling True
            0b000001 | 0b010001 => zero,  // EQ: Equal, SEQ: Signaling Equal
            0b001110 | 0b011110 => !zero, // NE: Not Equal, SNE: Signaling Not Equal

            // IEEE Aware Tests, mirrored by the IEEE Nonaware Tests
            0b000010 | 0b010010 => !(nan || zero || neg), // OGT / GT
            0b000011 | 0b010011 => zero || !(nan || neg), // OGE / GE
            0b000100 | 0b010100 => neg && !(nan || zero), // OLT / LT
            0b000101 | 0b010101 => zero || (neg && !nan), // OLE / LE
            0b000110 | 0b010110 => !(nan || zero),        // OGL / GL
            0b000111 | 0b010111 => !nan,                  // OR / GLE
            0b001000 | 0b011000 => nan,                   // UN / NGLE
            0b001001 | 0b011001 => nan || zero,           // UEQ / NGL
            0b001010 | 0b011010 => nan || !(neg || zero), // UGT / NLE
            0b001011 | 0b011011 => nan || zero || !neg,   // UGE / NLT
            0b001100 | 0b011100 => nan || (neg && !zero), // ULT / NGE
            0b001101 | 0b011101 => nan || zero || neg,    // ULE / NGT

            c => bail!(FpuError::InvalidCondition(c as u8)),
        };

        if nan && condition & 0b01_0000 != 0 {
            self.regs.fpsr.exs_mut().set_bsun(true);
            self.regs.fpsr.aexc_mut().set_iop(true);
        }
        Ok(result)
    }

    /// Enabled exception accrued since the last clear, if any
    fn pending_exception_vector(&self) -> Option<u8> {
        let enabled = *self.regs.fpcr.exc();
        let accrued = *self.regs.fpsr.aexc();
        PRE_INSTRUCTION_EXCEPTIONS
            .into_iter()
            .find(|(enable, accrued_test, _)| enable(enabled) && accrued_test(accrued))
            .map(|(_, _, vector)| vector)
    }

    /// FBcc
    pub(super) fn op_fbcc<const L: bool>(
        &mut self,
        host: &mut impl FpuHost,
        opcode: Word,
        start: Address,
    ) -> Result<()> {
        if let Some(vector) = self.pending_exception_vector() {
            trace!("FBcc pre-instruction exception {} @ {:08X}", vector, start);
            host.set_pc(start);
            return host.exception(vector, start);
        }

        // Displacement is relative to its own extension word
        let pc = host.pc();
        let displacement = if L {
            host.next_ilong()?
        } else {
            host.next_iword()?.expand_sign_extend()
        };

        if self.fpp_cond(opcode)? {
            host.set_pc(pc.wrapping_add(displacement));
        }
        Ok(())
    }

    /// FDBcc
    pub(super) fn op_fdbcc(&mut self, host: &mut impl FpuHost, opcode: Word, condition: Word) -> Result<()> {
        let reg = usize::from(opcode & 0b111);
        let pc = host.pc();
        let displacement = host.next_iword()?.expand_sign_extend();

        if self.fpp_cond(condition)? {
            return Ok(());
        }

        let count = (host.dreg(reg) as Word).wrapping_sub(1);
        host.set_dreg(reg, count.replace_in(host.dreg(reg)));
        if count != 0xFFFF {
            host.set_pc(pc.wrapping_add(displacement));
        }
        Ok(())
    }

    /// FScc.b
    pub(super) fn op_fscc(&mut self, host: &mut impl FpuHost, opcode: Word, condition: Word) -> Result<()> {
        let value = if self.fpp_cond(condition)? { 0xFF } else { 0 };
        self.put_byte(host, opcode, value)
    }

    /// FTRAPcc, with an optional word or long operand
    pub(super) fn op_ftrapcc(&mut self, host: &mut impl FpuHost, opcode: Word, condition: Word) -> Result<()> {
        match opcode & 0b111 {
            0b010 => {
                host.next_iword()?;
            }
            0b011 => {
                host.next_ilong()?;
            }
            0b100 => (),
            _ => bail!(FpuError::InvalidAddressingMode(opcode)),
        }

        if self.fpp_cond(condition)? {
            let pc = host.pc();
            trace!("FTRAPcc taken @ {:08X}", pc);
            return host.exception(VECTOR_TRAPCC, pc);
        }
        Ok(())
    }
}
