use anyhow::{Result, bail};
use proc_bitfield::bitfield;
use rustc_apfloat::ieee::{Double, Single, X87DoubleExtended};
use rustc_apfloat::{Float, FloatConvert, Status, StatusAnd};

use crate::bus::Address;
use crate::types::{Byte, Long, Word};

use super::float80::{EXPONENT_MAX, Float80};
use super::host::FpuHost;
use super::instruction::OperandSize;
use super::math::Arith;
use super::{Fpu, FpuError};

bitfield! {
    /// Raw (storage) bit representation of the extended-precision real format
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct BitsExtReal(pub u128): Debug, FromStorage, IntoStorage, DerefStorage {
        /// f (Fraction)
        pub f: u64 @ 0..=62,

        /// Explicit integer bit
        pub i: bool @ 63,

        /// Raw mantissa (f + i)
        pub raw_mantissa: u64 @ 0..=63,

        /// e (Biased exponent)
        pub e: u16 @ 80..=94,

        /// s (Sign bit)
        pub s: bool @ 95,

        /// Sign and exponent
        pub sign_exp: u16 @ 80..=95,

        pub low: u32 @ 0..=31,
        pub mid: u32 @ 32..=63,
        pub high: u32 @ 64..=95,
    }
}

impl BitsExtReal {
    pub fn from_longs(longs: [Long; 3]) -> Self {
        Self::default()
            .with_high(longs[0])
            .with_mid(longs[1])
            .with_low(longs[2])
    }

    pub fn longs(&self) -> [Long; 3] {
        [self.high(), self.mid(), self.low()]
    }

    pub fn is_nan(&self) -> bool {
        // PRM 1.6.5
        self.e() == EXPONENT_MAX && self.f() != 0
    }

    pub fn is_signaling(&self) -> bool {
        self.is_nan() && self.f() & (1 << 62) == 0
    }
}

impl From<BitsExtReal> for Float80 {
    fn from(value: BitsExtReal) -> Self {
        if value.e() == 0 && value.raw_mantissa() == 0 {
            Self::zero(value.s())
        } else if value.is_nan() {
            Self::DEFAULT_NAN
        } else {
            Self::from_parts(value.sign_exp(), value.raw_mantissa()).normalized()
        }
    }
}

impl From<Float80> for BitsExtReal {
    fn from(value: Float80) -> Self {
        if value.is_zero() {
            Self::default().with_s(value.sign())
        } else {
            Self::default()
                .with_sign_exp(value.high())
                .with_raw_mantissa(value.low())
        }
    }
}

impl Arith {
    pub fn from_single(bits: Long) -> StatusAnd<Float80> {
        let mut loses_info = false;
        let StatusAnd { status, value } = FloatConvert::<X87DoubleExtended>::convert(
            Single::from_bits(u128::from(bits)),
            &mut loses_info,
        );
        status.and(Float80::from_x87(value))
    }

    pub fn to_single(self, v: Float80) -> StatusAnd<Long> {
        let mut loses_info = false;
        let StatusAnd { status, value } =
            FloatConvert::<Single>::convert_r(v.to_x87(), self.round, &mut loses_info);
        status.and(value.to_bits() as Long)
    }

    pub fn from_double(high: Long, low: Long) -> StatusAnd<Float80> {
        let mut loses_info = false;
        let bits = (u128::from(high) << 32) | u128::from(low);
        let StatusAnd { status, value } =
            FloatConvert::<X87DoubleExtended>::convert(Double::from_bits(bits), &mut loses_info);
        status.and(Float80::from_x87(value))
    }

    pub fn to_double(self, v: Float80) -> StatusAnd<(Long, Long)> {
        let mut loses_info = false;
        let StatusAnd { status, value } =
            FloatConvert::<Double>::convert_r(v.to_x87(), self.round, &mut loses_info);
        let bits = value.to_bits();
        status.and(((bits >> 32) as Long, bits as Long))
    }

    /// Rounds to single precision and range
    pub fn round_single(self, v: Float80) -> StatusAnd<Float80> {
        let StatusAnd { status, value } = self.to_single(v);
        if v.is_nan() {
            return status.and(v.quieted());
        }
        status.and(Self::from_single(value).value)
    }

    /// Rounds to double precision and range
    pub fn round_double(self, v: Float80) -> StatusAnd<Float80> {
        let StatusAnd { status, value } = self.to_double(v);
        if v.is_nan() {
            return status.and(v.quieted());
        }
        status.and(Self::from_double(value.0, value.1).value)
    }
}

impl Fpu {
    /// Converts an operand read from memory, the instruction stream or a
    /// data register.
    pub(super) fn load_operand(&mut self, size: OperandSize, raw: &[Long]) -> Result<Float80> {
        let arith = self.arith();
        Ok(match (size, raw) {
            (OperandSize::Byte, &[v]) => Float80::from_i32(i32::from(v as Byte as i8)),
            (OperandSize::Word, &[v]) => Float80::from_i32(i32::from(v as Word as i16)),
            (OperandSize::Long, &[v]) => Float80::from_i32(v as i32),
            (OperandSize::Single, &[v]) => {
                let r = Arith::from_single(v);
                self.raise_conversion(r.status);
                r.value
            }
            (OperandSize::Double, &[high, low]) => {
                let r = Arith::from_double(high, low);
                self.raise_conversion(r.status);
                r.value
            }
            (OperandSize::Extended, &[a, b, c]) => {
                let bits = BitsExtReal::from_longs([a, b, c]);
                if bits.is_signaling() {
                    self.raise_snan();
                }
                bits.into()
            }
            (OperandSize::Packed, &[a, b, c]) => {
                let r = arith.from_packed([a, b, c]);
                self.flags.set_inex1(r.status.contains(Status::INEXACT));
                self.raise(r.status & !Status::INEXACT);
                r.value
            }
            _ => bail!(FpuError::InvalidOperandSize(size as u8)),
        })
    }

    /// Library flags of a widening conversion, invalid means a signaling NaN
    fn raise_conversion(&mut self, status: Status) {
        if status.contains(Status::INVALID_OP) {
            self.raise_snan();
        }
    }

    /// Converts a value to a memory or data register format, as longs
    pub(super) fn store_operand(&mut self, size: OperandSize, value: Float80) -> Result<Vec<Long>> {
        let arith = self.arith();
        let (status, longs) = match size {
            OperandSize::Byte | OperandSize::Word | OperandSize::Long => {
                let width = size.bytes() * 8;
                let StatusAnd { status, value } = arith.to_int(value, width);
                (status, vec![value as Long])
            }
            OperandSize::Single => {
                let StatusAnd { status, value } = arith.to_single(value);
                (status, vec![value])
            }
            OperandSize::Double => {
                let StatusAnd { status, value } = arith.to_double(value);
                (status, vec![value.0, value.1])
            }
            OperandSize::Extended => (Status::OK, BitsExtReal::from(value).longs().to_vec()),
            OperandSize::Packed => {
                let StatusAnd { status, value } = arith.to_packed(value);
                (status, value.to_vec())
            }
            OperandSize::PackedDynamic => bail!(FpuError::InvalidOperandSize(size as u8)),
        };
        if value.is_signaling() {
            self.raise_snan();
        }
        self.raise(status);
        Ok(longs)
    }

    /// Reads an operand of the given size from memory
    pub(super) fn read_operand(
        &mut self,
        host: &mut impl FpuHost,
        addr: Address,
        size: OperandSize,
    ) -> Result<Float80> {
        let raw = match size {
            OperandSize::Byte => vec![Long::from(host.read::<Byte>(addr)?)],
            OperandSize::Word => vec![Long::from(host.read::<Word>(addr)?)],
            _ => (0..size.bytes() / 4)
                .map(|i| host.read::<Long>(addr.wrapping_add(i * 4)))
                .collect::<Result<Vec<_>>>()?,
        };
        self.load_operand(size, &raw)
    }

    /// Writes an operand of the given size to memory
    pub(super) fn write_operand(
        &mut self,
        host: &mut impl FpuHost,
        addr: Address,
        size: OperandSize,
        value: Float80,
    ) -> Result<()> {
        let longs = self.store_operand(size, value)?;
        match size {
            OperandSize::Byte => host.write(addr, longs[0] as Byte),
            OperandSize::Word => host.write(addr, longs[0] as Word),
            _ => {
                for (i, l) in longs.into_iter().enumerate() {
                    host.write(addr.wrapping_add(i as Address * 4), l)?;
                }
                Ok(())
            }
        }
    }
}
