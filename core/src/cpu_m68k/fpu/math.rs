use num::bigint::BigUint;
use num::{Integer, ToPrimitive, Zero};
use rustc_apfloat::ieee::X87DoubleExtended;
use rustc_apfloat::{Float, Round, Status, StatusAnd};

use super::float80::{EXPONENT_MAX, Float80};
use super::regs::RegisterFPCR;

/// Rounding precision (FPCR PREC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum RoundingPrecision {
    Extended,
    Single,
    Double,
}

impl RoundingPrecision {
    pub fn significand_bits(self) -> u32 {
        match self {
            Self::Extended => 64,
            Self::Single => 24,
            Self::Double => 53,
        }
    }
}

/// Remainder kinds of FMOD/FREM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainderKind {
    /// Quotient rounded toward zero
    Modulo,
    /// Quotient rounded to nearest (IEEE remainder)
    Ieee,
}

/// Result of FMOD/FREM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remainder {
    pub value: Float80,
    /// Low 7 bits of the absolute integer quotient
    pub quotient: u8,
}

/// Arithmetic context of one operation
#[derive(Debug, Clone, Copy)]
pub struct Arith {
    pub round: Round,
    pub precision: RoundingPrecision,
}

impl Arith {
    pub fn from_fpcr(fpcr: RegisterFPCR) -> Self {
        // 3.5.2 Rounding modes
        // Table 3-21
        let round = match fpcr.rnd() {
            0b00 => Round::NearestTiesToEven,
            0b01 => Round::TowardZero,
            0b10 => Round::TowardNegative,
            _ => Round::TowardPositive,
        };
        let precision = match fpcr.prec() {
            0b01 => RoundingPrecision::Single,
            0b10 => RoundingPrecision::Double,
            // 11 is undefined, behaves as extended
            _ => RoundingPrecision::Extended,
        };
        Self { round, precision }
    }

    pub fn with_precision(self, precision: RoundingPrecision) -> Self {
        Self { precision, ..self }
    }

    pub fn with_round(self, round: Round) -> Self {
        Self { round, ..self }
    }

    /// Commits a library result: synthesized NaNs become the default NaN and
    /// the precision rounding is applied.
    fn finish(self, operands: &[Float80], result: StatusAnd<X87DoubleExtended>) -> StatusAnd<Float80> {
        let StatusAnd { mut status, value } = result;
        if operands.iter().any(Float80::is_signaling) {
            status |= Status::INVALID_OP;
        }
        if value.is_nan() {
            let value = match operands.iter().find(|o| o.is_nan()) {
                Some(nan) => nan.quieted(),
                None => Float80::DEFAULT_NAN,
            };
            return status.and(value);
        }
        let StatusAnd {
            status: round_status,
            value,
        } = self.round_to_precision(Float80::from_x87(value));
        (status | round_status).and(value)
    }

    pub fn add(self, a: Float80, b: Float80) -> StatusAnd<Float80> {
        self.finish(&[a, b], a.to_x87().add_r(b.to_x87(), self.round))
    }

    pub fn sub(self, a: Float80, b: Float80) -> StatusAnd<Float80> {
        self.finish(&[a, b], a.to_x87().sub_r(b.to_x87(), self.round))
    }

    pub fn mul(self, a: Float80, b: Float80) -> StatusAnd<Float80> {
        self.finish(&[a, b], a.to_x87().mul_r(b.to_x87(), self.round))
    }

    pub fn div(self, a: Float80, b: Float80) -> StatusAnd<Float80> {
        self.finish(&[a, b], a.to_x87().div_r(b.to_x87(), self.round))
    }

    /// Rounds to the current precision, keeping the extended exponent range
    pub fn round_to_precision(self, v: Float80) -> StatusAnd<Float80> {
        let bits = self.precision.significand_bits();
        if bits >= 64 || v.is_nan() || v.is_inf() || v.is_zero() {
            return Status::OK.and(v);
        }

        let v = v.normalized();
        let drop = 64 - bits;
        let mask = (1u64 << drop) - 1;
        let rem = v.low() & mask;
        if rem == 0 {
            return Status::OK.and(v);
        }

        let half = 1u64 << (drop - 1);
        let truncated = v.low() & !mask;
        let up = match self.round {
            Round::NearestTiesToEven => rem > half || (rem == half && truncated & (1 << drop) != 0),
            Round::NearestTiesToAway => rem >= half,
            Round::TowardZero => false,
            Round::TowardPositive => !v.sign(),
            Round::TowardNegative => v.sign(),
        };

        let mut status = Status::INEXACT;
        let (low, mut exp) = if up {
            match truncated.overflowing_add(1 << drop) {
                (_, true) => (1u64 << 63, v.exp() + 1),
                (sum, false) => (sum, v.exp()),
            }
        } else {
            (truncated, v.exp())
        };
        if exp == 0 && low >> 63 != 0 {
            // Denormal rounded up into the normal range
            exp = 1;
        }
        if exp == 0 {
            status |= Status::UNDERFLOW;
        }
        if exp >= EXPONENT_MAX {
            status |= Status::OVERFLOW;
            return status.and(self.overflow_value(v.sign()));
        }
        status.and(v.with_exp(exp).with_low(low))
    }

    /// Value delivered on overflow in the current rounding mode
    fn overflow_value(self, sign: bool) -> Float80 {
        let to_inf = match self.round {
            Round::NearestTiesToEven | Round::NearestTiesToAway => true,
            Round::TowardZero => false,
            Round::TowardPositive => !sign,
            Round::TowardNegative => sign,
        };
        if to_inf {
            Float80::inf(sign)
        } else {
            let drop = 64 - self.precision.significand_bits();
            Float80::from_parts(0x7FFE, u64::MAX << drop).with_sign(sign)
        }
    }

    pub fn round_to_integral(self, v: Float80, round: Round) -> StatusAnd<Float80> {
        self.finish(&[v], v.to_x87().round_to_integral(round))
    }

    /// Square root, exact through an integer root with a sticky bit and
    /// rounded once.
    pub fn sqrt(self, v: Float80) -> StatusAnd<Float80> {
        if v.is_nan() {
            let status = if v.is_signaling() {
                Status::INVALID_OP
            } else {
                Status::OK
            };
            return status.and(v.quieted());
        }
        if v.is_zero() {
            return Status::OK.and(v);
        }
        if v.sign() {
            return Status::INVALID_OP.and(Float80::DEFAULT_NAN);
        }
        if v.is_inf() {
            return Status::OK.and(v);
        }

        let (significand, mut exp) = v.significand_exponent();
        let mut m = BigUint::from(significand);
        if exp.rem_euclid(2) != 0 {
            m <<= 1;
            exp -= 1;
        }
        // Enough extra bits for a 64-bit root plus guard bits
        m <<= 128;
        exp -= 128;

        let root = m.sqrt();
        let exact = &root * &root == m;
        let Some(mut q) = root.to_u128() else {
            return Status::INVALID_OP.and(Float80::DEFAULT_NAN);
        };
        if !exact {
            q |= 1;
        }
        let result = self.scaled(false, q, exp / 2);
        self.finish(&[v], result)
    }

    /// Builds (-1)^neg * q * 2^scale, rounded once in the current mode
    pub fn scaled(self, neg: bool, q: u128, scale: i32) -> StatusAnd<X87DoubleExtended> {
        // Keep q within i128 while preserving inexactness
        let (q, scale) = if q >> 126 != 0 {
            ((q >> 2) | u128::from(q & 0b11 != 0), scale + 2)
        } else {
            (q, scale)
        };
        let q = q as i128;
        let StatusAnd { status, value } =
            X87DoubleExtended::from_i128_r(if neg { -q } else { q }, self.round);
        let mut scale_status = Status::OK;
        let scaled = value.scalbn_r(scale, self.round);
        if scaled.is_infinite() && !value.is_infinite() {
            scale_status = Status::OVERFLOW | Status::INEXACT;
        } else if (scaled.is_denormal() || scaled.is_zero())
            && !value.is_zero()
            && scaled.scalbn_r(-scale, self.round) != value
        {
            scale_status = Status::UNDERFLOW | Status::INEXACT;
        }
        (status | scale_status).and(scaled)
    }

    /// FSCALE: dst * 2^trunc(src)
    pub fn scale(self, dst: Float80, src: Float80) -> StatusAnd<Float80> {
        if src.is_nan() || dst.is_nan() {
            let nan = if dst.is_nan() { dst } else { src };
            let status = if src.is_signaling() || dst.is_signaling() {
                Status::INVALID_OP
            } else {
                Status::OK
            };
            return status.and(nan.quieted());
        }
        if src.is_inf() {
            return Status::INVALID_OP.and(Float80::DEFAULT_NAN);
        }
        if dst.is_zero() || dst.is_inf() {
            return Status::OK.and(dst);
        }

        let StatusAnd { value: n, .. } = self.with_round(Round::TowardZero).to_int(src, 32);
        // Anything beyond this range already over- or underflows
        let n = n.clamp(-0x10000, 0x10000);

        let (significand, exp) = dst.significand_exponent();
        let result = self.scaled(dst.sign(), u128::from(significand), exp + n);
        self.finish(&[dst], result)
    }

    /// FCMP: dst - src for condition codes, only invalid operations are flagged
    pub fn compare(self, dst: Float80, src: Float80) -> StatusAnd<Float80> {
        if dst.is_inf() && src.is_inf() && dst.sign() == src.sign() {
            return Status::OK.and(Float80::zero(dst.sign()));
        }
        let StatusAnd { status, value } =
            self.with_precision(RoundingPrecision::Extended).sub(dst, src);
        let mut flags = Status::OK;
        if status.contains(Status::INVALID_OP) {
            flags |= Status::INVALID_OP;
        }
        flags.and(value)
    }

    /// Converts to a signed integer of the given width, saturating with an
    /// invalid operation on overflow and NaN.
    pub fn to_int(self, v: Float80, width: u32) -> StatusAnd<i32> {
        let max = (1i64 << (width - 1)) - 1;
        let min = -(1i64 << (width - 1));
        if v.is_nan() {
            return Status::INVALID_OP.and(max as i32);
        }

        let StatusAnd { status, value } = v.to_x87().round_to_integral(self.round);
        let upper = X87DoubleExtended::from_i128(i128::from(max)).value;
        let lower = X87DoubleExtended::from_i128(i128::from(min)).value;
        if value > upper {
            return Status::INVALID_OP.and(max as i32);
        }
        if value < lower {
            return Status::INVALID_OP.and(min as i32);
        }

        let mut exact = false;
        let StatusAnd { value: n, .. } = value.to_i128_r(64, Round::TowardZero, &mut exact);
        status.and(n as i32)
    }

    /// FMOD/FREM with an exact integer quotient
    pub fn remainder(self, dst: Float80, src: Float80, kind: RemainderKind) -> StatusAnd<Remainder> {
        let plain = |status: Status, value: Float80| status.and(Remainder { value, quotient: 0 });

        if dst.is_nan() || src.is_nan() {
            let nan = if dst.is_nan() { dst } else { src };
            let status = if dst.is_signaling() || src.is_signaling() {
                Status::INVALID_OP
            } else {
                Status::OK
            };
            return plain(status, nan.quieted());
        }
        if dst.is_inf() || src.is_zero() {
            return plain(Status::INVALID_OP, Float80::DEFAULT_NAN);
        }
        if src.is_inf() || dst.is_zero() {
            return plain(Status::OK, dst);
        }

        let (mx, ex) = dst.significand_exponent();
        let (my, ey) = src.significand_exponent();
        let e = ex.min(ey);
        let x = BigUint::from(mx) << (ex - e) as usize;
        let y = BigUint::from(my) << (ey - e) as usize;

        let (mut n, mut r) = x.div_rem(&y);
        let mut flip = false;
        if kind == RemainderKind::Ieee {
            let twice = &r << 1usize;
            if twice > y || (twice == y && n.is_odd()) {
                n += 1u32;
                r = &y - &r;
                flip = true;
            }
        }
        let quotient = (n & BigUint::from(0x7Fu8)).to_u8().unwrap_or(0);

        if r.is_zero() {
            return Status::OK.and(Remainder {
                value: Float80::zero(dst.sign()),
                quotient,
            });
        }
        let Some(r) = r.to_u128() else {
            return plain(Status::INVALID_OP, Float80::DEFAULT_NAN);
        };
        let StatusAnd { status, value } = self.finish(&[], self.scaled(dst.sign() ^ flip, r, e));
        status.and(Remainder { value, quotient })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arith() -> Arith {
        Arith::from_fpcr(RegisterFPCR(0))
    }

    fn f(v: f64) -> Float80 {
        Float80::from_f64(v)
    }

    #[test]
    fn rounding_modes_from_fpcr() {
        let a = Arith::from_fpcr(RegisterFPCR(0b0101_0000));
        assert_eq!(a.round, Round::TowardZero);
        assert_eq!(a.precision, RoundingPrecision::Single);
        let a = Arith::from_fpcr(RegisterFPCR(0b1111_0000));
        assert_eq!(a.round, Round::TowardPositive);
        assert_eq!(a.precision, RoundingPrecision::Extended);
    }

    #[test]
    fn basic_ops() {
        let a = arith();
        assert_eq!(a.add(f(1.5), f(2.25)).value, f(3.75));
        assert_eq!(a.sub(f(1.5), f(2.25)).value, f(-0.75));
        assert_eq!(a.mul(f(1.5), f(-2.0)).value, f(-3.0));
        assert_eq!(a.div(f(1.0), f(4.0)).value, f(0.25));
    }

    #[test]
    fn div_by_zero() {
        let r = arith().div(f(1.0), Float80::ZERO);
        assert!(r.status.contains(Status::DIV_BY_ZERO));
        assert_eq!(r.value, Float80::inf(false));
    }

    #[test]
    fn invalid_synthesizes_default_nan() {
        let r = arith().sub(Float80::inf(false), Float80::inf(false));
        assert!(r.status.contains(Status::INVALID_OP));
        assert_eq!(r.value, Float80::DEFAULT_NAN);
    }

    #[test]
    fn nan_propagates() {
        let nan = Float80::from_parts(0x7FFF, 0xC000_0000_1234_0000);
        let r = arith().add(f(1.0), nan);
        assert_eq!(r.value, nan);
        assert!(!r.status.contains(Status::INVALID_OP));

        let snan = Float80::from_parts(0x7FFF, 0x8000_0000_1234_0000);
        let r = arith().add(snan, f(1.0));
        assert_eq!(r.value, nan);
        assert!(r.status.contains(Status::INVALID_OP));
    }

    #[test]
    fn sqrt() {
        let a = arith();
        assert_eq!(a.sqrt(f(16.0)).value, f(4.0));
        assert_eq!(a.sqrt(f(16.0)).status, Status::OK);
        assert_eq!(a.sqrt(f(0.25)).value, f(0.5));
        // sqrt(2) = 1.6A09E667F3BCC908B2FB1366...
        let r = a.sqrt(f(2.0));
        assert_eq!(r.value, Float80::from_parts(0x3FFF, 0xB504_F333_F9DE_6484));
        assert!(r.status.contains(Status::INEXACT));
        assert_eq!(a.sqrt(f(-1.0)).value, Float80::DEFAULT_NAN);
        assert_eq!(a.sqrt(Float80::zero(true)).value, Float80::zero(true));
    }

    #[test]
    fn precision_single() {
        let a = arith().with_precision(RoundingPrecision::Single);
        let r = a.div(f(1.0), f(3.0));
        assert_eq!(r.value.to_f64(), f64::from(1.0f32 / 3.0f32));
        assert!(r.status.contains(Status::INEXACT));
    }

    #[test]
    fn precision_double() {
        let a = arith().with_precision(RoundingPrecision::Double);
        assert_eq!(a.div(f(1.0), f(3.0)).value, f(1.0 / 3.0));
    }

    #[test]
    fn precision_keeps_exponent_range() {
        let a = arith().with_precision(RoundingPrecision::Single);
        let big = Float80::from_parts(0x7000, 0x8000_0000_0000_0000);
        let r = a.mul(big, f(1.5));
        assert_eq!(r.value.exp(), 0x7000);
        assert_eq!(r.status, Status::OK);
    }

    #[test]
    fn round_to_integral() {
        let a = arith();
        assert_eq!(a.round_to_integral(f(2.5), Round::NearestTiesToEven).value, f(2.0));
        assert_eq!(a.round_to_integral(f(-2.5), Round::TowardZero).value, f(-2.0));
        assert_eq!(a.round_to_integral(f(2.1), Round::TowardPositive).value, f(3.0));
    }

    #[test]
    fn to_int() {
        let a = arith();
        assert_eq!(a.to_int(f(-3.5), 32).value, -4);
        assert_eq!(a.to_int(f(1e10), 32).value, i32::MAX);
        assert!(a.to_int(f(1e10), 32).status.contains(Status::INVALID_OP));
        assert_eq!(a.to_int(f(200.0), 8).value, 127);
        assert_eq!(a.to_int(f(-129.0), 8).value, -128);
        assert_eq!(a.to_int(f(-128.0), 8).status, Status::OK);
        assert!(a.to_int(f(0.5), 16).status.contains(Status::INEXACT));
    }

    #[test]
    fn fmod_frem() {
        let a = arith();
        let r = a.remainder(f(7.0), f(2.0), RemainderKind::Modulo).value;
        assert_eq!(r.value, f(1.0));
        assert_eq!(r.quotient, 3);

        let r = a.remainder(f(7.0), f(2.0), RemainderKind::Ieee).value;
        assert_eq!(r.value, f(-1.0));
        assert_eq!(r.quotient, 4);

        let r = a.remainder(f(-7.5), f(2.0), RemainderKind::Modulo).value;
        assert_eq!(r.value, f(-1.5));
        assert_eq!(r.quotient, 3);

        let r = a.remainder(f(1.0), f(1e300), RemainderKind::Ieee).value;
        assert_eq!(r.value, f(1.0));
        assert_eq!(r.quotient, 0);
    }

    #[test]
    fn fmod_rounds_to_precision() {
        let x = f(1.0 + 2f64.powi(-40));
        let r = arith().remainder(x, f(4.0), RemainderKind::Modulo);
        assert_eq!(r.status, Status::OK);
        assert_eq!(r.value.value, x);

        // Single precision
        let a = Arith::from_fpcr(RegisterFPCR(0b0100_0000));
        let r = a.remainder(x, f(4.0), RemainderKind::Modulo);
        assert!(r.status.contains(Status::INEXACT));
        assert_eq!(r.value.value, f(1.0));
        assert_eq!(r.value.quotient, 0);

        let r = a.remainder(f(7.0), f(2.0), RemainderKind::Ieee);
        assert_eq!(r.status, Status::OK);
        assert_eq!(r.value.value, f(-1.0));
    }

    #[test]
    fn fmod_special() {
        let a = arith();
        let r = a.remainder(Float80::inf(false), f(2.0), RemainderKind::Modulo);
        assert!(r.status.contains(Status::INVALID_OP));
        assert_eq!(r.value.value, Float80::DEFAULT_NAN);

        let r = a.remainder(f(3.0), Float80::inf(true), RemainderKind::Ieee);
        assert_eq!(r.value.value, f(3.0));
        assert_eq!(r.value.quotient, 0);
    }

    #[test]
    fn fscale() {
        let a = arith();
        assert_eq!(a.scale(f(3.0), f(4.7)).value, f(48.0));
        assert_eq!(a.scale(f(3.0), f(-1.9)).value, f(1.5));
        let r = a.scale(f(1.0), f(20000.0));
        assert!(r.status.contains(Status::OVERFLOW));
        assert!(r.value.is_inf());
        assert_eq!(a.scale(f(1.0), Float80::inf(false)).value, Float80::DEFAULT_NAN);
    }

    #[test]
    fn compare() {
        let a = arith();
        assert!(a.compare(f(1.0), f(2.0)).value.sign());
        assert!(a.compare(f(2.0), f(2.0)).value.is_zero());
        assert!(a.compare(Float80::inf(true), Float80::inf(true)).value.is_zero());
        // Inexact differences are not flagged
        assert_eq!(a.compare(f(1e300), f(1e-300)).status, Status::OK);
    }
}
