//! Packed decimal real format (PRM 1.6.6)
//!
//! Three longs: sign, exponent sign, 3-digit BCD exponent and the integer
//! digit in the first long, 16 BCD fraction digits in the other two.

use std::f64::consts::LOG10_2;

use num::bigint::BigUint;
use num::{Integer, One, ToPrimitive, Zero};
use proc_bitfield::bitfield;
use rustc_apfloat::{Round, Status, StatusAnd};

use crate::types::Long;

use super::float80::{EXPONENT_MAX, Float80};
use super::math::Arith;

/// Significant decimal digits of a packed real
const DIGITS: u32 = 17;

bitfield! {
    /// First long of a packed decimal real
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct PackedHead(pub Long): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Integer digit of the mantissa
        pub integer_digit: u8 @ 0..=3,

        /// Thousands digit of the exponent (written only)
        pub exp3: u8 @ 12..=15,

        /// 3-digit BCD exponent
        pub exponent_bcd: u16 @ 16..=27,

        /// Exponent including sign and YY, all ones for infinity/NaN
        pub exponent_field: u16 @ 16..=30,

        pub yy: u8 @ 28..=29,

        /// Exponent sign
        pub se: bool @ 30,

        /// Mantissa sign
        pub sm: bool @ 31,
    }
}

fn from_bcd(bcd: u64, digits: u32) -> u64 {
    (0..digits)
        .rev()
        .fold(0, |acc, i| acc * 10 + ((bcd >> (i * 4)) & 0xF))
}

fn to_bcd(mut value: u64, digits: u32) -> u64 {
    let mut bcd = 0;
    for i in 0..digits {
        bcd |= (value % 10) << (i * 4);
        value /= 10;
    }
    bcd
}

/// Rounds a quotient q + r/d, returns whether it was incremented
fn round_up(round: Round, sign: bool, q: &BigUint, r: &BigUint, d: &BigUint) -> bool {
    if r.is_zero() {
        return false;
    }
    let twice: BigUint = r << 1usize;
    match round {
        Round::NearestTiesToEven => twice > *d || (twice == *d && q.is_odd()),
        Round::NearestTiesToAway => twice >= *d,
        Round::TowardZero => false,
        Round::TowardPositive => !sign,
        Round::TowardNegative => sign,
    }
}

impl Arith {
    /// (-1)^neg * n * 2^scale, rounded once to extended precision
    fn scaled_big(self, neg: bool, n: BigUint, scale: i32) -> StatusAnd<Float80> {
        let bits = n.bits();
        let (q, scale) = if bits > 126 {
            let shift = bits - 126;
            let sticky = n.trailing_zeros().is_some_and(|tz| tz < shift);
            let q = (n >> shift).to_u128().unwrap_or(0) | u128::from(sticky);
            (q, scale.saturating_add(shift as i32))
        } else {
            (n.to_u128().unwrap_or(0), scale)
        };
        let StatusAnd { status, value } = self.scaled(neg, q, scale);
        status.and(Float80::from_x87(value))
    }

    /// Converts a packed decimal real, INEXACT reports an inexact decimal input
    pub fn from_packed(self, longs: [Long; 3]) -> StatusAnd<Float80> {
        let head = PackedHead(longs[0]);
        let sign = head.sm();

        if head.exponent_field() == EXPONENT_MAX {
            return if longs[1] == 0 && longs[2] == 0 {
                Status::OK.and(Float80::inf(sign))
            } else {
                Status::OK.and(Float80::DEFAULT_NAN)
            };
        }

        let fraction = (u64::from(longs[1]) << 32) | u64::from(longs[2]);
        let mantissa = u64::from(head.integer_digit()) * 10u64.pow(DIGITS - 1)
            + from_bcd(fraction, DIGITS - 1);
        if mantissa == 0 {
            return Status::OK.and(Float80::zero(sign));
        }

        let exponent = i32::from(head.exp3()) * 1000
            + from_bcd(u64::from(head.exponent_bcd()), 3) as i32;
        let exponent = if head.se() { -exponent } else { exponent };
        let e = exponent - (DIGITS as i32 - 1);

        let m = BigUint::from(mantissa);
        if e >= 0 {
            return self.scaled_big(sign, m * BigUint::from(10u32).pow(e as u32), 0);
        }

        let divisor = BigUint::from(10u32).pow(e.unsigned_abs());
        // Enough quotient bits for extended precision plus guard bits
        let k = (divisor.bits() + 128).saturating_sub(m.bits());
        let (q, r) = (m << k).div_rem(&divisor);
        let q = if r.is_zero() { q } else { q | BigUint::one() };
        self.scaled_big(sign, q, -(k as i32))
    }

    /// Converts to a packed decimal real with 17 significant digits.
    /// Exponents beyond 3 digits set the thousands digit and OPERR.
    pub fn to_packed(self, v: Float80) -> StatusAnd<[Long; 3]> {
        let sign = if v.sign() { 0x8000_0000 } else { 0 };

        if v.is_nan() {
            let low = v.low();
            return Status::OK.and([sign | 0x7FFF_0000, (low >> 32) as Long, low as Long]);
        }
        if v.is_inf() {
            return Status::OK.and([sign | 0x7FFF_0000, 0, 0]);
        }
        if v.is_zero() {
            return Status::OK.and([sign, 0, 0]);
        }

        let (m, e2) = v.significand_exponent();
        let lower = BigUint::from(10u32).pow(DIGITS - 1);
        let upper = BigUint::from(10u32).pow(DIGITS);

        let mut exponent = (f64::from(v.unbiased_exponent()) * LOG10_2).floor() as i32;
        let mut result = None;
        for _ in 0..4 {
            let p = exponent - (DIGITS as i32 - 1);
            let mut n = BigUint::from(m);
            let mut d = BigUint::one();
            if e2 >= 0 {
                n <<= e2 as usize;
            } else {
                d <<= e2.unsigned_abs() as usize;
            }
            if p >= 0 {
                d *= BigUint::from(10u32).pow(p as u32);
            } else {
                n *= BigUint::from(10u32).pow(p.unsigned_abs());
            }

            let (mut q, r) = n.div_rem(&d);
            let inexact = !r.is_zero();
            let in_range = q >= lower && q < upper;
            if round_up(self.round, v.sign(), &q, &r, &d) {
                q += 1u32;
            }
            if q >= upper {
                if in_range {
                    // Rounded up into the next decade
                    result = Some((lower.clone(), exponent + 1, inexact));
                    break;
                }
                exponent += 1;
            } else if q < lower {
                exponent -= 1;
            } else {
                result = Some((q, exponent, inexact));
                break;
            }
        }
        let Some((digits, exponent, inexact)) = result else {
            log::warn!("Packed conversion of {} did not converge", v);
            return Status::INVALID_OP.and([sign | 0x7FFF_0000, 0, 0]);
        };
        let digits = digits.to_u64().unwrap_or(0);

        let mut status = if inexact { Status::INEXACT } else { Status::OK };
        let magnitude = exponent.unsigned_abs();
        if magnitude >= 1000 {
            status |= Status::INVALID_OP;
        }

        let pow = 10u64.pow(DIGITS - 1);
        let head = PackedHead(sign)
            .with_se(exponent < 0)
            .with_exponent_bcd(to_bcd(u64::from(magnitude % 1000), 3) as u16)
            .with_exp3((magnitude / 1000 % 10) as u8)
            .with_integer_digit((digits / pow) as u8);
        let fraction = to_bcd(digits % pow, DIGITS - 1);
        status.and([head.0, (fraction >> 32) as Long, fraction as Long])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_m68k::fpu::regs::RegisterFPCR;

    fn arith() -> Arith {
        Arith::from_fpcr(RegisterFPCR(0))
    }

    #[test]
    fn bcd() {
        assert_eq!(to_bcd(931, 3), 0x931);
        assert_eq!(from_bcd(0x2500_0000_0000_0000, 16), 2500_0000_0000_0000);
    }

    #[test]
    fn to_packed_exact() {
        let a = arith();
        let r = a.to_packed(Float80::ONE);
        assert_eq!(r.value, [0x0000_0001, 0, 0]);
        assert_eq!(r.status, Status::OK);

        let r = a.to_packed(Float80::from_f64(-12.5));
        assert_eq!(r.value, [0x8001_0001, 0x2500_0000, 0]);
        assert_eq!(r.status, Status::OK);

        let r = a.to_packed(Float80::from_f64(0.03125));
        assert_eq!(r.value, [0x4002_0003, 0x1250_0000, 0]);
    }

    #[test]
    fn to_packed_inexact() {
        let tenth = arith().div(Float80::ONE, Float80::from_i32(10)).value;
        let r = arith().to_packed(tenth);
        assert_eq!(r.value, [0x4001_0001, 0, 0]);
        assert!(r.status.contains(Status::INEXACT));
    }

    #[test]
    fn to_packed_special() {
        let a = arith();
        assert_eq!(a.to_packed(Float80::zero(true)).value, [0x8000_0000, 0, 0]);
        assert_eq!(a.to_packed(Float80::inf(false)).value, [0x7FFF_0000, 0, 0]);
        assert_eq!(
            a.to_packed(Float80::DEFAULT_NAN).value,
            [0xFFFF_0000, 0xFFFF_FFFF, 0xFFFF_FFFF]
        );
    }

    #[test]
    fn to_packed_large_exponent() {
        // 2^16383, about 5.9e4931
        let r = arith().to_packed(Float80::from_parts(0x7FFE, 0x8000_0000_0000_0000));
        assert_eq!(r.value[0], 0x0931_4005);
        assert!(r.status.contains(Status::INVALID_OP));
    }

    #[test]
    fn from_packed() {
        let a = arith();
        let r = a.from_packed([0x8001_0001, 0x2500_0000, 0]);
        assert_eq!(r.value, Float80::from_f64(-12.5));
        assert_eq!(r.status, Status::OK);

        let r = a.from_packed([0x4001_0001, 0, 0]);
        assert_eq!(r.value, a.div(Float80::ONE, Float80::from_i32(10)).value);
        assert!(r.status.contains(Status::INEXACT));

        assert_eq!(a.from_packed([0x8000_0000, 0, 0]).value, Float80::zero(true));
        assert_eq!(a.from_packed([0x7FFF_0000, 0, 0]).value, Float80::inf(false));
        assert!(a.from_packed([0x7FFF_0000, 0, 1]).value.is_nan());
    }

    #[test]
    fn from_packed_range() {
        let a = arith();
        // 9.9E999
        let r = a.from_packed([0x0999_0009, 0x9000_0000, 0]);
        assert!(!r.value.is_inf());
        assert_eq!(a.to_packed(r.value).value, [0x0999_0009, 0x9000_0000, 0]);

        // 1E-999 is within the extended range
        let r = a.from_packed([0x4999_0001, 0, 0]);
        assert!(!r.value.is_zero());
        assert!(r.status.contains(Status::INEXACT));
    }
}
