
use anyhow::{Result, bail};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use proc_bitfield::bitfield;

use crate::types::Word;

use super::FpuError;
use super::transcendental::Transcendental;

/// Addressing modes
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum AddressingMode {
    DataRegister,
    AddressRegister,
    Indirect,
    IndirectPostInc,
    IndirectPreDec,
    IndirectDisplacement,
    IndirectIndex,
    PCDisplacement,
    PCIndex,
    AbsoluteShort,
    AbsoluteLong,
    Immediate,
}

impl AddressingMode {
    /// Decodes the mode and register fields (bits 5..0) of an opcode
    pub fn decode(opcode: Word) -> Result<(Self, usize)> {
        let mode = (opcode >> 3) & 0b111;
        let reg = usize::from(opcode & 0b111);
        Ok((
            match (mode, reg) {
                (0b000, _) => Self::DataRegister,
                (0b001, _) => Self::AddressRegister,
                (0b010, _) => Self::Indirect,
                (0b011, _) => Self::IndirectPostInc,
                (0b100, _) => Self::IndirectPreDec,
                (0b101, _) => Self::IndirectDisplacement,
                (0b110, _) => Self::IndirectIndex,
                (0b111, 0b000) => Self::AbsoluteShort,
                (0b111, 0b001) => Self::AbsoluteLong,
                (0b111, 0b010) => Self::PCDisplacement,
                (0b111, 0b011) => Self::PCIndex,
                (0b111, 0b100) => Self::Immediate,
                _ => bail!(FpuError::InvalidAddressingMode(opcode)),
            },
            reg,
        ))
    }
}

bitfield! {
    /// FPU general instruction command word
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct FpuExtWord(pub Word): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Instruction class
        pub opclass: u8 @ 13..=15,

        /// (EA to register) R/M: source is the effective address
        pub rm: bool @ 14,

        /// (EA to register) Source specifier
        pub src_spec: u8 @ 10..=12,

        /// (EA to register) Destination register
        pub dst_reg: usize @ 7..=9,

        /// (EA to register) Opmode
        pub opmode: u8 @ 0..=6,

        /// (FMOVECR) ROM offset
        pub rom_offset: usize @ 0..=6,

        /// (FSINCOS) Cosine destination register
        pub sincos_reg: usize @ 0..=2,

        /// (FMOVE to EA) Packed k-factor
        pub k_factor: u8 @ 0..=6,

        /// (Control register) Direction: 1 = register to EA
        pub dr: bool @ 13,

        /// (Control register) Register select
        pub ctrl_regs: u8 @ 10..=12,

        /// (FMOVEM) Mode field: bit 1 = postincrement/control, bit 0 = dynamic list
        pub movem_mode: u8 @ 11..=12,

        /// (FMOVEM) Register list mask
        pub movem_reglist: u8 @ 0..=7,

        /// (FMOVEM) Data register holding a dynamic list
        pub movem_dyn_reg: usize @ 4..=6,
    }
}

impl FpuExtWord {
    /// FMOVECR is encoded as a load from EA with source specifier 111
    pub fn is_fmovecr(&self) -> bool {
        self.0 & 0xFC00 == 0x5C00
    }
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, strum::Display)]
pub enum FmoveControlReg {
    FPCR = 0b100,
    FPSR = 0b010,
    FPIAR = 0b001,
}

impl FmoveControlReg {
    /// Transfer order of a register select mask
    pub const ORDER: [Self; 3] = [Self::FPCR, Self::FPSR, Self::FPIAR];
}

/// Operand format of the source specifier / destination format field
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, strum::Display)]
pub enum OperandSize {
    Long = 0,
    Single = 1,
    Extended = 2,
    Packed = 3,
    Word = 4,
    Double = 5,
    Byte = 6,
    PackedDynamic = 7,
}

impl OperandSize {
    pub fn decode(spec: u8) -> Result<Self> {
        match Self::from_u8(spec) {
            Some(Self::PackedDynamic) | None => bail!(FpuError::InvalidOperandSize(spec)),
            Some(s) => Ok(s),
        }
    }

    /// Size in memory
    pub fn bytes(self) -> u32 {
        match self {
            Self::Long | Self::Single => 4,
            Self::Extended | Self::Packed => 12,
            Self::Word => 2,
            Self::Double => 8,
            Self::Byte => 1,
            Self::PackedDynamic => 0,
        }
    }

    /// Size on the stack and in the instruction stream, bytes are padded to a word
    pub fn stream_bytes(self) -> u32 {
        match self {
            Self::Byte => 2,
            s => s.bytes(),
        }
    }
}

/// General arithmetic opmodes
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FpuOp {
    FMOVE,
    FINT,
    FINTRZ,
    FSQRT,
    FABS,
    FNEG,
    FGETEXP,
    FGETMAN,
    FDIV,
    FMOD,
    FADD,
    FMUL,
    FSGLDIV,
    FREM,
    FSCALE,
    FSGLMUL,
    FSUB,
    FCMP,
    FTST,
    FSINCOS,
    #[strum(to_string = "F{0}")]
    Transcendental(Transcendental),

    // 68040 single/double rounded variants
    FSMOVE,
    FSSQRT,
    FDMOVE,
    FDSQRT,
    FSABS,
    FSNEG,
    FDABS,
    FDNEG,
    FSDIV,
    FSADD,
    FSMUL,
    FDDIV,
    FDADD,
    FDMUL,
    FSSUB,
    FDSUB,
}

impl FpuOp {
    /// Decodes an opmode. The single/double rounded forms exist on the 68040 only.
    pub fn decode(opmode: u8, integral: bool) -> Option<Self> {
        use Transcendental as T;

        Some(match opmode {
            0x00 => Self::FMOVE,
            0x01 => Self::FINT,
            0x02 => Self::Transcendental(T::Sinh),
            0x03 => Self::FINTRZ,
            0x04 => Self::FSQRT,
            0x06 => Self::Transcendental(T::Lognp1),
            0x08 => Self::Transcendental(T::Etoxm1),
            0x09 => Self::Transcendental(T::Tanh),
            0x0A => Self::Transcendental(T::Atan),
            0x0C => Self::Transcendental(T::Asin),
            0x0D => Self::Transcendental(T::Atanh),
            0x0E => Self::Transcendental(T::Sin),
            0x0F => Self::Transcendental(T::Tan),
            0x10 => Self::Transcendental(T::Etox),
            0x11 => Self::Transcendental(T::Twotox),
            0x12 => Self::Transcendental(T::Tentox),
            0x14 => Self::Transcendental(T::Logn),
            0x15 => Self::Transcendental(T::Log10),
            0x16 => Self::Transcendental(T::Log2),
            0x18 => Self::FABS,
            0x19 => Self::Transcendental(T::Cosh),
            0x1A => Self::FNEG,
            0x1C => Self::Transcendental(T::Acos),
            0x1D => Self::Transcendental(T::Cos),
            0x1E => Self::FGETEXP,
            0x1F => Self::FGETMAN,
            0x20 => Self::FDIV,
            0x21 => Self::FMOD,
            0x22 => Self::FADD,
            0x23 => Self::FMUL,
            0x24 => Self::FSGLDIV,
            0x25 => Self::FREM,
            0x26 => Self::FSCALE,
            0x27 => Self::FSGLMUL,
            0x28 => Self::FSUB,
            0x30..=0x37 => Self::FSINCOS,
            0x38 => Self::FCMP,
            0x3A => Self::FTST,
            0x40 if integral => Self::FSMOVE,
            0x41 if integral => Self::FSSQRT,
            0x44 if integral => Self::FDMOVE,
            0x45 if integral => Self::FDSQRT,
            0x58 if integral => Self::FSABS,
            0x5A if integral => Self::FSNEG,
            0x5C if integral => Self::FDABS,
            0x5E if integral => Self::FDNEG,
            0x60 if integral => Self::FSDIV,
            0x62 if integral => Self::FSADD,
            0x63 if integral => Self::FSMUL,
            0x64 if integral => Self::FDDIV,
            0x66 if integral => Self::FDADD,
            0x67 if integral => Self::FDMUL,
            0x68 if integral => Self::FSSUB,
            0x6C if integral => Self::FDSUB,
            _ => return None,
        })
    }
}

/// I/IS Memory Indirect Actions for full extension words
#[derive(Debug, Clone, Copy)]
pub enum MemoryIndirectAction {
    None,
    PreIndexNull,
    PreIndexWord,
    PreIndexLong,
    PostIndexNull,
    PostIndexWord,
    PostIndexLong,
    Null,
    Word,
    Long,
}

bitfield! {
    /// Brief and full format index extension word
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct IndexExtWord(pub Word): Debug, FromStorage, IntoStorage, DerefStorage {
        /// (Brief) 8-bit displacement
        pub brief_displacement: u8 @ 0..=7,

        /// (Full) Index/indirect selection
        pub iis: u8 @ 0..=2,

        /// (Full) Base displacement size
        pub bd_size: u8 @ 4..=5,

        /// (Full) Index suppress
        pub index_suppress: bool @ 6,

        /// (Full) Base register suppress
        pub base_suppress: bool @ 7,

        /// Full extension word format
        pub is_full: bool @ 8,

        /// Index scale (1 << scale)
        pub scale: u8 @ 9..=10,

        /// Index size is long
        pub index_long: bool @ 11,

        /// Index register number
        pub index_reg: usize @ 12..=14,

        /// Index register is an address register
        pub index_is_a: bool @ 15,
    }
}

impl IndexExtWord {
    pub fn memory_indirect_action(&self) -> Result<MemoryIndirectAction> {
        match (self.index_suppress(), self.iis()) {
            (_, 0b000) => Ok(MemoryIndirectAction::None),
            (false, 0b001) => Ok(MemoryIndirectAction::PreIndexNull),
            (false, 0b010) => Ok(MemoryIndirectAction::PreIndexWord),
            (false, 0b011) => Ok(MemoryIndirectAction::PreIndexLong),
            (false, 0b101) => Ok(MemoryIndirectAction::PostIndexNull),
            (false, 0b110) => Ok(MemoryIndirectAction::PostIndexWord),
            (false, 0b111) => Ok(MemoryIndirectAction::PostIndexLong),

            (true, 0b001) => Ok(MemoryIndirectAction::Null),
            (true, 0b010) => Ok(MemoryIndirectAction::Word),
            (true, 0b011) => Ok(MemoryIndirectAction::Long),

            _ => bail!(FpuError::InvalidExtensionWord(self.0)),
        }
    }
}
