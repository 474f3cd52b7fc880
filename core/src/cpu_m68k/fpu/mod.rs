pub mod alu;
pub mod constants;
pub mod ea;
pub mod float80;
pub mod host;
pub mod instruction;
pub mod math;
pub mod ops_branch;
pub mod ops_generic;
pub mod ops_movem;
pub mod packed;
pub mod regs;
pub mod storage;
pub mod transcendental;

use anyhow::{Result, bail};
use rustc_apfloat::Status;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bus::Address;
use crate::debuggable::{Debuggable, DebuggableProperties, DebuggableProperty, DebuggablePropertyValue};
use crate::types::{Byte, Word};
use crate::{
    dbgprop_bool, dbgprop_byte_bin, dbgprop_enum, dbgprop_group, dbgprop_header, dbgprop_long,
    dbgprop_string,
};

use float80::Float80;
use host::FpuHost;
use instruction::FpuExtWord;
use math::Arith;
use regs::{FpuAccruedExceptions, FpuExceptions, FpuRegisterFile};

/// FPU implementation being emulated
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
pub enum FpuModel {
    #[strum(serialize = "68881")]
    M68881,
    #[strum(serialize = "68882")]
    M68882,
    /// Integrated FPU of the 68040
    #[strum(serialize = "68040")]
    M68040,
}

impl FpuModel {
    /// The 68040 FPU, which has the single/double rounded instruction forms
    pub fn is_integral(self) -> bool {
        self == Self::M68040
    }
}

/// Decode failures, these end up as an illegal instruction exception
#[derive(Error, Debug)]
pub enum FpuError {
    #[error("Invalid addressing mode in opcode {0:04X}")]
    InvalidAddressingMode(Word),

    #[error("Invalid operand size {0}")]
    InvalidOperandSize(u8),

    #[error("Invalid extension word {0:04X}")]
    InvalidExtensionWord(Word),

    #[error("Unknown condition predicate {0:02X}")]
    InvalidCondition(u8),

    #[error("Unimplemented opmode {0:02X}")]
    UnimplementedOpmode(u8),

    #[error("Invalid instruction type {0:03b}")]
    InvalidInstructionType(u8),
}

/// Floating point unit, coprocessor ID 1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fpu {
    pub regs: FpuRegisterFile,
    model: FpuModel,

    /// Exceptions raised by the arithmetic since the last status update
    flags: FpuExceptions,
}

impl Fpu {
    pub fn new(model: FpuModel) -> Self {
        Self {
            regs: FpuRegisterFile::default(),
            model,
            flags: FpuExceptions::default(),
        }
    }

    pub fn model(&self) -> FpuModel {
        self.model
    }

    /// Resets to the power-on state
    pub fn reset(&mut self) {
        self.regs = FpuRegisterFile::default();
        self.flags = FpuExceptions::default();
    }

    /// Executes an FPU instruction. The host PC points past the opcode word.
    pub fn execute(&mut self, host: &mut impl FpuHost, opcode: Word) -> Result<()> {
        let start = host.pc().wrapping_sub(2);

        match self.dispatch(host, opcode, start) {
            Ok(()) => Ok(()),
            Err(e) => match e.downcast_ref::<FpuError>() {
                Some(err) => {
                    log::warn!("Illegal FPU instruction {:04X} @ {:08X}: {}", opcode, start, err);
                    self.flags = FpuExceptions::default();
                    host.set_pc(start);
                    host.illegal_instruction(opcode)
                }
                None => Err(e),
            },
        }
    }

    fn dispatch(&mut self, host: &mut impl FpuHost, opcode: Word, start: Address) -> Result<()> {
        match (opcode >> 6) & 0b111 {
            0b000 => {
                let ext = FpuExtWord(host.next_iword()?);
                self.op_general(host, opcode, ext, start)
            }
            0b001 => {
                let condition = host.next_iword()?;
                let mode = (opcode >> 3) & 0b111;
                let reg = opcode & 0b111;
                match (mode, reg) {
                    (0b001, _) => self.op_fdbcc(host, opcode, condition),
                    (0b111, 0b010..=0b100) => self.op_ftrapcc(host, opcode, condition),
                    _ => self.op_fscc(host, opcode, condition),
                }
            }
            0b010 => self.op_fbcc::<false>(host, opcode, start),
            0b011 => self.op_fbcc::<true>(host, opcode, start),
            0b100 => self.op_fsave(host, opcode),
            0b101 => self.op_frestore(host, opcode),
            t => bail!(FpuError::InvalidInstructionType(t as u8)),
        }
    }

    /// General instruction group, selected by the command word class
    fn op_general(
        &mut self,
        host: &mut impl FpuHost,
        opcode: Word,
        ext: FpuExtWord,
        start: Address,
    ) -> Result<()> {
        match ext.opclass() {
            0b000 | 0b010 => {
                self.regs.fpiar = start;
                if ext.is_fmovecr() {
                    self.op_fmovecr(ext)
                } else {
                    self.op_arithmetic(host, opcode, ext)
                }
            }
            0b011 => {
                self.regs.fpiar = start;
                self.op_fmove_out(host, opcode, ext)
            }
            0b100 | 0b101 => self.op_fmove_control(host, opcode, ext),
            0b110 | 0b111 => {
                self.regs.fpiar = start;
                self.op_fmovem(host, opcode, ext)
            }
            _ => bail!(FpuError::InvalidExtensionWord(ext.0)),
        }
    }

    /// Arithmetic context of the current FPCR
    pub(super) fn arith(&self) -> Arith {
        Arith::from_fpcr(self.regs.fpcr)
    }

    /// Records exceptions raised by the arithmetic
    pub(super) fn raise(&mut self, status: Status) {
        self.flags = FpuExceptions(self.flags.0 | FpuExceptions::from(status).0);
    }

    pub(super) fn raise_snan(&mut self) {
        self.flags.set_snan(true);
        self.flags.set_operr(true);
    }

    /// Stores the result for the condition codes and folds the pending
    /// exceptions into the status register
    pub fn make_fpsr(&mut self, value: Float80) {
        self.regs.result = value;
        self.commit_exceptions();
    }

    /// Folds the pending exceptions into exception status and accrued byte
    pub(super) fn commit_exceptions(&mut self) {
        let flags = std::mem::take(&mut self.flags);
        self.regs.set_exception_status(flags);
    }

    /// Accrued exception byte, including exceptions not yet folded
    pub fn accrued_exception(&self) -> Byte {
        self.regs.fpsr.aexc().0 | self.flags.accrued().0
    }

    pub fn set_accrued_exception(&mut self, value: Byte) {
        self.regs.fpsr.set_aexc(FpuAccruedExceptions(value));
        if value == 0 {
            self.flags = FpuExceptions::default();
        }
    }

    pub fn exception_status(&self) -> Byte {
        self.regs.fpsr.exs().0
    }

    pub fn set_exception_status(&mut self, value: Byte) {
        self.regs.fpsr.set_exs(FpuExceptions(value));
        self.flags = FpuExceptions::default();
    }
}

impl Debuggable for Fpu {
    fn get_debug_properties(&self) -> DebuggableProperties {
        let cc = self.regs.condition_codes();
        let exs = self.regs.fpsr.exs();
        let aexc = self.regs.fpsr.aexc();

        let mut result = vec![dbgprop_enum!("Model", self.model)];
        result.extend(
            self.regs
                .fp
                .iter()
                .enumerate()
                .map(|(i, fp)| dbgprop_string!(format!("FP{}", i), fp.to_string())),
        );
        result.extend([
            dbgprop_long!("FPCR", self.regs.fpcr()),
            dbgprop_long!("FPSR", self.regs.fpsr()),
            dbgprop_long!("FPIAR", self.regs.fpiar),
            dbgprop_header!("Status"),
            dbgprop_group!(
                "Condition codes",
                vec![
                    dbgprop_bool!("N", cc.fpcc_n()),
                    dbgprop_bool!("Z", cc.fpcc_z()),
                    dbgprop_bool!("I", cc.fpcc_i()),
                    dbgprop_bool!("NaN", cc.fpcc_nan()),
                ]
            ),
            dbgprop_byte_bin!("Exception status", exs.0),
            dbgprop_group!(
                "Accrued exceptions",
                vec![
                    dbgprop_bool!("IOP", aexc.iop()),
                    dbgprop_bool!("OVFL", aexc.ovfl()),
                    dbgprop_bool!("UNFL", aexc.unfl()),
                    dbgprop_bool!("DZ", aexc.dz()),
                    dbgprop_bool!("INEX", aexc.inex()),
                ]
            ),
            dbgprop_byte_bin!("Quotient", self.regs.fpsr.quotient()),
        ]);
        result
    }
}
