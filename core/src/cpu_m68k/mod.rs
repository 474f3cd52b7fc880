pub mod cpu;
pub mod fpu;
pub mod regs;

#[cfg(test)]
mod tests;

use num_traits::{AsPrimitive, PrimInt, ToBytes, WrappingAdd, WrappingShl};

use crate::bus::Address;
use crate::types::Long;

/// Motorola 68020 with a coprocessor interface on line F
pub type CpuM68020Fpu<TBus> = cpu::CpuM68k<TBus, M68020_ADDRESS_MASK>;
pub const M68020_ADDRESS_MASK: Address = 0xFFFFFFFF;
pub const M68020_SR_MASK: u16 = 0b1111011100011111;

/// Motorola 68040 with on-chip FPU, 32-bit address bus
pub type CpuM68040<TBus> = cpu::CpuM68k<TBus, M68040_ADDRESS_MASK>;
pub const M68040_ADDRESS_MASK: Address = 0xFFFFFFFF;

/// Coprocessor ID the FPU answers to on line F
pub const FPU_COPROCESSOR_ID: u16 = 1;

/// Trait to deal with the differently sized operands for:
/// Byte (u8)
/// Word (u16)
/// Long (u32)
pub trait CpuSized:
    PrimInt
    + ToBytes
    + WrappingAdd
    + WrappingShl
    + std::convert::Into<Long>
    + std::convert::From<u8>
    + std::fmt::Display
    + std::fmt::UpperHex
    + 'static
{
    /// Expands the value in the generic to a full register's width
    fn expand(self) -> Long;

    /// Expands the value in the generic to a full register's width,
    /// with sign extension.
    fn expand_sign_extend(self) -> Long;

    /// Replaces the lower bytes of the given value for types < Long
    /// or the full value for Long.
    fn replace_in(self, value: Long) -> Long;

    /// Downcasts to T from Long, discarding excess bits.
    fn chop(value: Long) -> Self;

    /// Returns the most significant bit as one
    fn msb() -> Self;
}

impl<T> CpuSized for T
where
    T: PrimInt
        + ToBytes
        + WrappingAdd
        + WrappingShl
        + std::convert::Into<Long>
        + std::convert::From<u8>
        + std::fmt::Display
        + std::fmt::UpperHex
        + 'static,
    Long: AsPrimitive<T>,
{
    #[inline(always)]
    fn replace_in(self, value: Long) -> Long {
        let mask = match std::mem::size_of::<T>() {
            1 => 0xFFFFFF00,
            2 => 0xFFFF0000,
            _ => 0x00000000,
        };
        (value & mask) | self.expand()
    }

    #[inline(always)]
    fn expand(self) -> Long {
        self.into()
    }

    #[inline(always)]
    fn expand_sign_extend(self) -> Long {
        let l = self.expand();
        if l & T::msb().expand() != 0 {
            match std::mem::size_of::<T>() {
                1 => l | 0xFFFFFF00,
                2 => l | 0xFFFF0000,
                _ => l,
            }
        } else {
            l
        }
    }

    #[inline(always)]
    fn chop(value: Long) -> T {
        value.as_()
    }

    #[inline(always)]
    fn msb() -> Self {
        let shift = std::mem::size_of::<T>() * 8 - 1;
        T::one() << shift
    }
}
