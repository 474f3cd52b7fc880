use anyhow::{Result, bail};
use log::trace;
use rustc_apfloat::{Round, Status, StatusAnd};

use crate::types::Word;

use super::constants::rom_constant;
use super::float80::{EXPONENT_BIAS, Float80};
use super::host::FpuHost;
use super::instruction::{FpuExtWord, FpuOp};
use super::math::{Arith, RemainderKind, RoundingPrecision};
use super::transcendental::Transcendental;
use super::{Fpu, FpuError};

impl Fpu {
    /// FMOVECR: loads a constant from the on-chip ROM
    pub(super) fn op_fmovecr(&mut self, ext: FpuExtWord) -> Result<()> {
        let value = rom_constant(ext.rom_offset());
        trace!("FMOVECR #{:02X},FP{} = {}", ext.rom_offset(), ext.dst_reg(), value);
        self.regs.fp[ext.dst_reg()] = value;
        self.make_fpsr(value);
        Ok(())
    }

    /// Stores an operation result to FPn and updates the status register
    fn store_result(&mut self, reg: usize, result: StatusAnd<Float80>) {
        self.raise(result.status);
        self.regs.fp[reg] = result.value;
        self.make_fpsr(result.value);
    }

    /// General arithmetic instructions, <ea>/FPm to FPn
    pub(super) fn op_arithmetic(
        &mut self,
        host: &mut impl FpuHost,
        opcode: Word,
        ext: FpuExtWord,
    ) -> Result<()> {
        let Some(op) = FpuOp::decode(ext.opmode(), self.model.is_integral()) else {
            bail!(FpuError::UnimplementedOpmode(ext.opmode()));
        };

        let src = self.get_fp_value(host, opcode, ext)?;
        let reg = ext.dst_reg();
        let dst = self.regs.fp[reg];
        trace!("{} {} -> FP{} ({})", op, src, reg, dst);

        if src.is_signaling() {
            self.raise_snan();
        }
        let arith = self.arith();
        let extended = arith.with_precision(RoundingPrecision::Extended);

        let result = match op {
            FpuOp::FMOVE => monadic(src, |v| arith.round_to_precision(v)),
            FpuOp::FINT => arith.round_to_integral(src, arith.round),
            FpuOp::FINTRZ => arith.round_to_integral(src, Round::TowardZero),
            FpuOp::FSQRT => arith.sqrt(src),
            FpuOp::FABS => monadic(src, |v| arith.round_to_precision(v.abs())),
            FpuOp::FNEG => monadic(src, |v| arith.round_to_precision(v.neg())),
            FpuOp::FGETEXP => get_exponent(src),
            FpuOp::FGETMAN => get_mantissa(src),
            FpuOp::FADD => arith.add(dst, src),
            FpuOp::FSUB => arith.sub(dst, src),
            FpuOp::FMUL => arith.mul(dst, src),
            FpuOp::FDIV => arith.div(dst, src),
            FpuOp::FSGLMUL => arith.with_precision(RoundingPrecision::Single).mul(dst, src),
            FpuOp::FSGLDIV => arith.with_precision(RoundingPrecision::Single).div(dst, src),
            FpuOp::FSCALE => arith.scale(dst, src),
            FpuOp::FMOD | FpuOp::FREM => {
                let kind = if op == FpuOp::FMOD {
                    RemainderKind::Modulo
                } else {
                    RemainderKind::Ieee
                };
                let StatusAnd { status, value } = arith.remainder(dst, src, kind);
                self.regs.make_quotient(value.quotient, dst.sign() ^ src.sign());
                status.and(value.value)
            }
            FpuOp::FCMP => {
                if dst.is_signaling() {
                    self.raise_snan();
                }
                let StatusAnd { status, value } = arith.compare(dst, src);
                self.raise(status);
                self.make_fpsr(value);
                return Ok(());
            }
            FpuOp::FTST => {
                self.make_fpsr(src);
                return Ok(());
            }
            FpuOp::FSINCOS => {
                let cos = transcendental(arith, Transcendental::Cos, src);
                let sin = transcendental(arith, Transcendental::Sin, src);
                self.regs.fp[ext.sincos_reg()] = cos.value;
                self.store_result(reg, (cos.status | sin.status).and(sin.value));
                return Ok(());
            }
            FpuOp::Transcendental(t) => transcendental(arith, t, src),

            FpuOp::FSMOVE => narrow(extended, RoundingPrecision::Single, Status::OK.and(src)),
            FpuOp::FDMOVE => narrow(extended, RoundingPrecision::Double, Status::OK.and(src)),
            FpuOp::FSSQRT => narrow(extended, RoundingPrecision::Single, extended.sqrt(src)),
            FpuOp::FDSQRT => narrow(extended, RoundingPrecision::Double, extended.sqrt(src)),
            FpuOp::FSABS => narrow(extended, RoundingPrecision::Single, Status::OK.and(src.abs())),
            FpuOp::FDABS => narrow(extended, RoundingPrecision::Double, Status::OK.and(src.abs())),
            FpuOp::FSNEG => narrow(extended, RoundingPrecision::Single, Status::OK.and(src.neg())),
            FpuOp::FDNEG => narrow(extended, RoundingPrecision::Double, Status::OK.and(src.neg())),
            FpuOp::FSADD => narrow(extended, RoundingPrecision::Single, extended.add(dst, src)),
            FpuOp::FDADD => narrow(extended, RoundingPrecision::Double, extended.add(dst, src)),
            FpuOp::FSSUB => narrow(extended, RoundingPrecision::Single, extended.sub(dst, src)),
            FpuOp::FDSUB => narrow(extended, RoundingPrecision::Double, extended.sub(dst, src)),
            FpuOp::FSMUL => narrow(extended, RoundingPrecision::Single, extended.mul(dst, src)),
            FpuOp::FDMUL => narrow(extended, RoundingPrecision::Double, extended.mul(dst, src)),
            FpuOp::FSDIV => narrow(extended, RoundingPrecision::Single, extended.div(dst, src)),
            FpuOp::FDDIV => narrow(extended, RoundingPrecision::Double, extended.div(dst, src)),
        };

        if matches!(
            op,
            FpuOp::FADD
                | FpuOp::FSUB
                | FpuOp::FMUL
                | FpuOp::FDIV
                | FpuOp::FSGLMUL
                | FpuOp::FSGLDIV
                | FpuOp::FMOD
                | FpuOp::FREM
                | FpuOp::FSCALE
        ) && dst.is_signaling()
        {
            self.raise_snan();
        }
        self.store_result(reg, result);
        Ok(())
    }

    /// FMOVE FPn to <ea>
    pub(super) fn op_fmove_out(
        &mut self,
        host: &mut impl FpuHost,
        opcode: Word,
        ext: FpuExtWord,
    ) -> Result<()> {
        let value = self.regs.fp[ext.dst_reg()];
        trace!("FMOVE FP{} -> <ea> {:04X} ({})", ext.dst_reg(), opcode, value);
        self.put_fp_value(host, opcode, ext, value)?;
        self.commit_exceptions();
        Ok(())
    }
}

/// Evaluates a transcendental function in host double precision. The operand
/// is narrowed to double first, losing extended range and precision.
fn transcendental(arith: Arith, f: Transcendental, src: Float80) -> StatusAnd<Float80> {
    let StatusAnd {
        status: conversion,
        value: (high, low),
    } = arith.with_round(Round::NearestTiesToEven).to_double(src);
    let x = f64::from_bits((u64::from(high) << 32) | u64::from(low));

    let StatusAnd { status, value } = f.evaluate(x);
    let value = if !value.is_nan() {
        Float80::from_f64(value)
    } else if src.is_nan() {
        src.quieted()
    } else {
        Float80::DEFAULT_NAN
    };
    let rounded = arith.round_to_precision(value);
    let conversion = conversion & (Status::INEXACT | Status::INVALID_OP);
    (conversion | status | rounded.status).and(rounded.value)
}

/// Single-operand operation, NaNs pass through quieted
fn monadic(src: Float80, f: impl FnOnce(Float80) -> StatusAnd<Float80>) -> StatusAnd<Float80> {
    if src.is_nan() {
        Status::OK.and(src.quieted())
    } else {
        f(src)
    }
}

/// Rounds an extended result to single/double precision and range
fn narrow(arith: Arith, precision: RoundingPrecision, result: StatusAnd<Float80>) -> StatusAnd<Float80> {
    let StatusAnd { status, value } = result;
    let narrowed = match precision {
        RoundingPrecision::Single => arith.round_single(value),
        RoundingPrecision::Double => arith.round_double(value),
        RoundingPrecision::Extended => Status::OK.and(value),
    };
    (status | narrowed.status).and(narrowed.value)
}

/// FGETEXP: unbiased exponent as a value
fn get_exponent(src: Float80) -> StatusAnd<Float80> {
    if src.is_nan() {
        Status::OK.and(src.quieted())
    } else if src.is_inf() {
        Status::INVALID_OP.and(Float80::DEFAULT_NAN)
    } else if src.is_zero() {
        Status::OK.and(src)
    } else {
        Status::OK.and(Float80::from_i32(src.unbiased_exponent()))
    }
}

/// FGETMAN: mantissa scaled to 1.0 <= |m| < 2.0
fn get_mantissa(src: Float80) -> StatusAnd<Float80> {
    if src.is_nan() {
        Status::OK.and(src.quieted())
    } else if src.is_inf() {
        Status::INVALID_OP.and(Float80::DEFAULT_NAN)
    } else if src.is_zero() {
        Status::OK.and(src)
    } else {
        let (significand, _) = src.significand_exponent();
        let significand = significand << significand.leading_zeros();
        Status::OK.and(Float80::from_parts(EXPONENT_BIAS as u16, significand).with_sign(src.sign()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_m68k::fpu::FpuModel;
    use crate::cpu_m68k::tests::testcpu;

    fn f(v: f64) -> Float80 {
        Float80::from_f64(v)
    }

    /// Runs FPm,FPn for the given opmode
    fn run(model: FpuModel, opmode: u8, dst: Float80, src: Float80) -> (Fpu, Float80) {
        let mut cpu = testcpu(model, &[]);
        cpu.fpu.regs.fp[1] = src;
        cpu.fpu.regs.fp[2] = dst;
        let ext = FpuExtWord(0)
            .with_src_spec(1)
            .with_dst_reg(2)
            .with_opmode(opmode);
        let (fpu, mut port) = cpu.split();
        fpu.op_arithmetic(&mut port, 0xF200, ext).unwrap();
        let result = fpu.regs.fp[2];
        (cpu.fpu, result)
    }

    #[test]
    fn fadd() {
        let (fpu, r) = run(FpuModel::M68881, 0x22, f(1.5), f(2.0));
        assert_eq!(r, f(3.5));
        assert_eq!(fpu.exception_status(), 0);
        assert_eq!(fpu.regs.fpsr() >> 24, 0);
    }

    #[test]
    fn fdiv_by_zero() {
        let (fpu, r) = run(FpuModel::M68881, 0x20, f(-1.0), Float80::ZERO);
        assert_eq!(r, Float80::inf(true));
        assert!(fpu.regs.fpsr.exs().dz());
        assert!(fpu.regs.fpsr.aexc().dz());
        // N and I
        assert_eq!(fpu.regs.fpsr() >> 24, 0b1010);
    }

    #[test]
    fn fsub_invalid() {
        let (fpu, r) = run(FpuModel::M68881, 0x28, Float80::inf(false), Float80::inf(false));
        assert_eq!(r, Float80::DEFAULT_NAN);
        assert!(fpu.regs.fpsr.exs().operr());
        assert!(fpu.regs.fpsr.aexc().iop());
        assert_eq!(fpu.regs.fpsr() >> 24, 0b0001);
    }

    #[test]
    fn signaling_nan_operand() {
        let snan = Float80::from_parts(0x7FFF, 0x8000_0000_0000_0001);
        let (fpu, r) = run(FpuModel::M68881, 0x22, f(1.0), snan);
        assert_eq!(r, snan.quieted());
        assert!(fpu.regs.fpsr.exs().snan());
        assert!(fpu.regs.fpsr.exs().operr());
    }

    #[test]
    fn fcmp_leaves_destination() {
        let (fpu, r) = run(FpuModel::M68881, 0x38, f(1.0), f(2.0));
        assert_eq!(r, f(1.0));
        assert_eq!(fpu.regs.fpsr() >> 24, 0b1000);

        let (fpu, _) = run(FpuModel::M68881, 0x38, f(2.0), f(2.0));
        assert_eq!(fpu.regs.fpsr() >> 24, 0b0100);
    }

    #[test]
    fn ftst() {
        let (fpu, r) = run(FpuModel::M68881, 0x3A, f(1.0), Float80::zero(true));
        assert_eq!(r, f(1.0));
        assert_eq!(fpu.regs.fpsr() >> 24, 0b1100);
    }

    #[test]
    fn fmod_quotient() {
        let (fpu, r) = run(FpuModel::M68881, 0x21, f(-7.0), f(2.0));
        assert_eq!(r, f(-1.0));
        assert_eq!(fpu.regs.fpsr.quotient(), 3);
        assert!(fpu.regs.fpsr.quotient_s());

        let (fpu, r) = run(FpuModel::M68881, 0x25, f(7.0), f(2.0));
        assert_eq!(r, f(-1.0));
        assert_eq!(fpu.regs.fpsr.quotient(), 4);
        assert!(!fpu.regs.fpsr.quotient_s());
    }

    #[test]
    fn fgetexp_fgetman() {
        let (_, r) = run(FpuModel::M68881, 0x1E, Float80::ZERO, f(12.0));
        assert_eq!(r, f(3.0));
        let (_, r) = run(FpuModel::M68881, 0x1F, Float80::ZERO, f(-12.0));
        assert_eq!(r, f(-1.5));

        // Denormal
        let denormal = Float80::from_parts(0, 1);
        let (_, r) = run(FpuModel::M68881, 0x1E, Float80::ZERO, denormal);
        assert_eq!(r, Float80::from_i32(-16445));
        let (_, r) = run(FpuModel::M68881, 0x1F, Float80::ZERO, denormal);
        assert_eq!(r, Float80::ONE);

        let (fpu, r) = run(FpuModel::M68881, 0x1E, Float80::ZERO, Float80::inf(false));
        assert_eq!(r, Float80::DEFAULT_NAN);
        assert!(fpu.regs.fpsr.exs().operr());
    }

    #[test]
    fn fint_uses_rounding_mode() {
        let (_, r) = run(FpuModel::M68881, 0x01, Float80::ZERO, f(2.5));
        assert_eq!(r, f(2.0));
        let (_, r) = run(FpuModel::M68881, 0x03, Float80::ZERO, f(-2.7));
        assert_eq!(r, f(-2.0));
    }

    #[test]
    fn fsglmul() {
        let third = Arith::from_fpcr(Default::default())
            .div(Float80::ONE, f(3.0))
            .value;
        let (fpu, r) = run(FpuModel::M68881, 0x27, third, f(1.0));
        assert_eq!(r.to_f64(), f64::from(1.0f32 / 3.0));
        assert!(fpu.regs.fpsr.exs().inex2());
    }

    #[test]
    fn fsincos_shared_register() {
        let mut cpu = testcpu(FpuModel::M68882, &[]);
        cpu.fpu.regs.fp[1] = f(0.5);
        // FSINCOS FP1,FP1:FP1, sine wins
        let ext = FpuExtWord(0).with_src_spec(1).with_dst_reg(1).with_opmode(0x31);
        let (fpu, mut port) = cpu.split();
        fpu.op_arithmetic(&mut port, 0xF200, ext).unwrap();
        assert_eq!(fpu.regs.fp[1], f(0.5f64.sin()));

        fpu.regs.fp[1] = f(0.5);
        let ext = FpuExtWord(0).with_src_spec(1).with_dst_reg(2).with_opmode(0x33);
        fpu.op_arithmetic(&mut port, 0xF200, ext).unwrap();
        assert_eq!(fpu.regs.fp[2], f(0.5f64.sin()));
        assert_eq!(fpu.regs.fp[3], f(0.5f64.cos()));

        // FSINCOS FP1,FP3:FP1, source is the sine destination
        fpu.regs.fp[1] = f(0.5);
        fpu.regs.fp[3] = Float80::ZERO;
        let ext = FpuExtWord(0).with_src_spec(1).with_dst_reg(1).with_opmode(0x33);
        fpu.op_arithmetic(&mut port, 0xF200, ext).unwrap();
        assert_eq!(fpu.regs.fp[1], f(0.5f64.sin()));
        assert_eq!(fpu.regs.fp[3], f(0.5f64.cos()));

        // FSINCOS FP1,FP1:FP2, source is the cosine destination
        fpu.regs.fp[1] = f(0.5);
        let ext = FpuExtWord(0).with_src_spec(1).with_dst_reg(2).with_opmode(0x31);
        fpu.op_arithmetic(&mut port, 0xF200, ext).unwrap();
        assert_eq!(fpu.regs.fp[2], f(0.5f64.sin()));
        assert_eq!(fpu.regs.fp[1], f(0.5f64.cos()));
    }

    #[test]
    fn transcendental_flags() {
        let (fpu, r) = run(FpuModel::M68881, 0x14, Float80::ZERO, Float80::ZERO);
        assert_eq!(r, Float80::inf(true));
        assert!(fpu.regs.fpsr.exs().dz());

        let (fpu, r) = run(FpuModel::M68881, 0x0C, Float80::ZERO, f(2.0));
        assert_eq!(r, Float80::DEFAULT_NAN);
        assert!(fpu.regs.fpsr.exs().operr());
    }

    #[test]
    fn transcendental_outside_double_range() {
        // 2^-13300, far below the smallest double
        let tiny = Float80::from_parts(0x0C0B, 1 << 63);
        let (fpu, r) = run(FpuModel::M68882, 0x14, Float80::ZERO, tiny);
        assert_eq!(r, Float80::inf(true));
        assert!(fpu.regs.fpsr.exs().dz());
    }

    #[test]
    fn integral_forms() {
        let (fpu, r) = run(FpuModel::M68040, 0x62, f(1.0), f(1e-10));
        assert_eq!(r, f(1.0));
        assert!(fpu.regs.fpsr.exs().inex2());

        let (_, r) = run(FpuModel::M68040, 0x64, f(1.0), f(3.0));
        assert_eq!(r, f(1.0 / 3.0));
    }

    #[test]
    fn integral_forms_illegal_on_6888x() {
        let mut cpu = testcpu(FpuModel::M68882, &[]);
        let ext = FpuExtWord(0).with_src_spec(1).with_dst_reg(2).with_opmode(0x62);
        let (fpu, mut port) = cpu.split();
        let err = fpu.op_arithmetic(&mut port, 0xF200, ext).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FpuError>(),
            Some(FpuError::UnimplementedOpmode(0x62))
        ));
    }

    #[test]
    fn fmovecr() {
        let mut fpu = Fpu::new(FpuModel::M68881);
        fpu.op_fmovecr(FpuExtWord(0x5C00 | (3 << 7) | 0x0C)).unwrap();
        assert_eq!(fpu.regs.fp[3], rom_constant(0x0C));
        assert_eq!(fpu.regs.fpsr() >> 24, 0);
        fpu.op_fmovecr(FpuExtWord(0x5C00 | (3 << 7) | 0x0F)).unwrap();
        assert_eq!(fpu.regs.fp[3], Float80::ZERO);
        assert_eq!(fpu.regs.fpsr() >> 24, 0b0100);
    }
}
