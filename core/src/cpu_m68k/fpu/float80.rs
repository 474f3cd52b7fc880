use std::fmt;

use proc_bitfield::bitfield;
use rustc_apfloat::ieee::{Double, X87DoubleExtended};
use rustc_apfloat::{Float, FloatConvert};
use serde::{Deserialize, Serialize};

/// Extended precision exponent bias
pub const EXPONENT_BIAS: i32 = 16383;

/// Biased exponent of infinities and NaNs
pub const EXPONENT_MAX: u16 = 0x7FFF;

bitfield! {
    /// Extended precision floating point register value (PRM 1.6.4)
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    pub struct Float80(pub u128): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Full significand, including the explicit integer bit
        pub low: u64 @ 0..=63,

        /// Fraction (significand without integer bit)
        pub fraction: u64 @ 0..=62,

        /// Explicit integer bit
        pub integer: bool @ 63,

        /// Sign and biased exponent
        pub high: u16 @ 64..=79,

        /// Biased exponent
        pub exp: u16 @ 64..=78,

        /// Sign
        pub sign: bool @ 79,
    }
}

impl Float80 {
    /// NaN synthesized by the FPU when no operand NaN is propagated
    pub const DEFAULT_NAN: Self = Self::from_parts(0xFFFF, u64::MAX);
    pub const ZERO: Self = Self::from_parts(0, 0);
    pub const ONE: Self = Self::from_parts(0x3FFF, 1 << 63);

    pub const fn from_parts(high: u16, low: u64) -> Self {
        Self(((high as u128) << 64) | low as u128)
    }

    pub const fn zero(sign: bool) -> Self {
        Self::from_parts(if sign { 0x8000 } else { 0 }, 0)
    }

    pub const fn inf(sign: bool) -> Self {
        Self::from_parts(EXPONENT_MAX | if sign { 0x8000 } else { 0 }, 0)
    }

    pub const fn one(sign: bool) -> Self {
        Self::from_parts(0x3FFF | if sign { 0x8000 } else { 0 }, 1 << 63)
    }

    pub fn is_nan(&self) -> bool {
        self.exp() == EXPONENT_MAX && self.fraction() != 0
    }

    /// Signaling NaN (most significant fraction bit clear)
    pub fn is_signaling(&self) -> bool {
        self.is_nan() && self.low() & (1 << 62) == 0
    }

    pub fn is_inf(&self) -> bool {
        self.exp() == EXPONENT_MAX && self.fraction() == 0
    }

    pub fn is_zero(&self) -> bool {
        self.exp() == 0 && self.low() == 0
    }

    pub fn is_denormal(&self) -> bool {
        self.exp() == 0 && self.low() != 0
    }

    pub fn abs(self) -> Self {
        self.with_sign(false)
    }

    pub fn neg(self) -> Self {
        self.with_sign(!self.sign())
    }

    /// Quiets a NaN, keeping its payload
    pub fn quieted(self) -> Self {
        if self.is_nan() {
            Self(self.0 | (0b11 << 62))
        } else {
            self
        }
    }

    /// Returns the value in canonical form: infinities with a zero significand,
    /// NaNs with the integer bit set, unnormals shifted up and pseudo-denormals
    /// re-biased.
    pub fn normalized(self) -> Self {
        let sign = if self.sign() { 0x8000 } else { 0 };

        if self.exp() == EXPONENT_MAX {
            return if self.fraction() == 0 {
                Self::inf(self.sign())
            } else {
                self.with_integer(true)
            };
        }
        if self.low() == 0 {
            return Self::zero(self.sign());
        }

        let exp = self.exp();
        if exp == 0 {
            // Pseudo-denormal carries the same weight as exponent 1
            return if self.integer() { self.with_exp(1) } else { self };
        }
        if self.integer() {
            return self;
        }

        // Unnormal, shift up as far as the exponent allows
        let lz = self.low().leading_zeros() as u16;
        if lz < exp {
            Self::from_parts(sign | (exp - lz), self.low() << lz)
        } else {
            Self::from_parts(sign, self.low() << (exp - 1))
        }
    }

    /// Splits a finite value in a significand and a binary exponent so that
    /// value = significand * 2^exponent
    pub fn significand_exponent(self) -> (u64, i32) {
        let v = self.normalized();
        let exp = if v.exp() == 0 { 1 } else { i32::from(v.exp()) };
        (v.low(), exp - EXPONENT_BIAS - 63)
    }

    /// Unbiased exponent of a finite, non-zero value
    pub fn unbiased_exponent(self) -> i32 {
        let (significand, exp) = self.significand_exponent();
        exp + 63 - significand.leading_zeros() as i32
    }

    pub fn to_x87(self) -> X87DoubleExtended {
        let v = self.normalized();
        if v.is_inf() {
            // The library expects the integer bit on infinities
            X87DoubleExtended::from_bits(v.with_integer(true).0)
        } else {
            X87DoubleExtended::from_bits(v.0)
        }
    }

    pub fn from_x87(value: X87DoubleExtended) -> Self {
        if value.is_infinite() {
            Self::inf(value.is_negative())
        } else {
            Self(value.to_bits())
        }
    }

    pub fn from_i32(value: i32) -> Self {
        Self::from_x87(X87DoubleExtended::from_i128(i128::from(value)).value)
    }

    /// Widens a host double, exact
    pub fn from_f64(value: f64) -> Self {
        let mut loses_info = false;
        let d = Double::from_bits(u128::from(value.to_bits()));
        let x: X87DoubleExtended = d.convert(&mut loses_info).value;
        Self::from_x87(x)
    }

    /// Narrows to a host double (nearest)
    pub fn to_f64(self) -> f64 {
        let mut loses_info = false;
        let d: Double = self.to_x87().convert(&mut loses_info).value;
        f64::from_bits(d.to_bits() as u64)
    }
}

impl fmt::Display for Float80 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:016X}", self.high(), self.low())?;
        if self.is_nan() {
            write!(f, " (nan)")
        } else {
            write!(f, " ({})", self.to_f64())
        }
    }
}
