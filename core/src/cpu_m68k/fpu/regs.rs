use proc_bitfield::bitfield;
use rustc_apfloat::Status;
use serde::{Deserialize, Serialize};

use crate::bus::Address;
use crate::types::{Byte, Long};

use super::float80::Float80;

bitfield! {
    /// Exception bitfields
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    pub struct FpuExceptions(pub u8): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Inexact Decimal Input
        pub inex1: bool @ 0,

        /// Inexact Operation
        pub inex2: bool @ 1,

        /// Division by zero
        pub dz: bool @ 2,

        /// Underflow
        pub unfl: bool @ 3,

        /// Overflow
        pub ovfl: bool @ 4,

        /// Operand error
        pub operr: bool @ 5,

        /// Signaling Not-a-Number
        pub snan: bool @ 6,

        /// Branch/set on unordered
        pub bsun: bool @ 7,
    }
}

impl FpuExceptions {
    /// Accrued exception bits this exception status contributes (PRM 1.6.5)
    pub fn accrued(self) -> FpuAccruedExceptions {
        FpuAccruedExceptions(0)
            .with_iop(self.operr() || self.snan() || self.bsun())
            .with_ovfl(self.ovfl())
            .with_unfl(self.unfl())
            .with_dz(self.dz())
            .with_inex(self.inex1() || self.inex2())
    }
}

impl From<Status> for FpuExceptions {
    fn from(status: Status) -> Self {
        Self(0)
            .with_operr(status.contains(Status::INVALID_OP))
            .with_dz(status.contains(Status::DIV_BY_ZERO))
            .with_ovfl(status.contains(Status::OVERFLOW))
            .with_unfl(status.contains(Status::UNDERFLOW))
            .with_inex2(status.contains(Status::INEXACT))
    }
}

bitfield! {
    /// Accrued exception bitfields
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    pub struct FpuAccruedExceptions(pub u8): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Inexact
        pub inex: bool @ 3,

        /// Division by zero
        pub dz: bool @ 4,

        /// Underflow
        pub unfl: bool @ 5,

        /// Overflow
        pub ovfl: bool @ 6,

        /// Invalid operation
        pub iop: bool @ 7,
    }
}

bitfield! {
    /// Floating Point Control Register
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    pub struct RegisterFPCR(pub Long): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Full mode control byte
        pub mode: Byte @ 0..=7,

        /// Rounding mode
        pub rnd: u8 @ 4..=5,

        /// Rounding precision
        pub prec: u8 @ 6..=7,

        /// Exception enable byte
        pub exc: nested FpuExceptions @ 8..=15,
    }
}

bitfield! {
    /// Floating Point Status Register
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    pub struct RegisterFPSR(pub Long): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Condition code nibble
        pub fpcc: u8 @ 24..=27,

        /// Condition code: Not-a-number or unordered
        pub fpcc_nan: bool @ 24,

        /// Condition code: Infinity
        pub fpcc_i: bool @ 25,

        /// Condition code: Zero
        pub fpcc_z: bool @ 26,

        /// Condition code: Negative
        pub fpcc_n: bool @ 27,

        /// 7 least significant bits of quotient
        pub quotient: u8 @ 16..=22,

        /// Sign of quotient
        pub quotient_s: bool @ 23,

        /// Full exception status
        pub exs: nested FpuExceptions @ 8..=15,

        /// Accrued exception byte
        pub aexc: nested FpuAccruedExceptions @ 0..=7,
    }
}

/// FPU programmer's model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpuRegisterFile {
    pub fp: [Float80; 8],
    pub fpcr: RegisterFPCR,
    /// Status register without condition codes, which derive from `result`
    pub fpsr: RegisterFPSR,
    pub fpiar: Address,
    /// Last result, source of the condition codes
    pub result: Float80,
}

impl FpuRegisterFile {
    /// FPCR as visible to the program, upper word reads as zero
    pub fn fpcr(&self) -> Long {
        self.fpcr.0 & 0xFFFF
    }

    pub fn set_fpcr(&mut self, value: Long) {
        self.fpcr = RegisterFPCR(value & 0xFFFF);
    }

    /// Condition codes of the last result (PRM 3.6.2)
    pub fn condition_codes(&self) -> RegisterFPSR {
        let r = self.result;
        let nan = r.is_nan();
        RegisterFPSR(0)
            .with_fpcc_nan(nan)
            .with_fpcc_i(!nan && r.is_inf())
            .with_fpcc_z(!nan && r.is_zero())
            .with_fpcc_n(!nan && r.sign())
    }

    pub fn fpsr(&self) -> Long {
        (self.fpsr.0 & 0x00FF_FFFF) | self.condition_codes().0
    }

    /// Writes FPSR; the condition codes written synthesize the last result.
    pub fn set_fpsr(&mut self, value: Long) {
        let v = RegisterFPSR(value);
        self.result = if v.fpcc_nan() {
            Float80::DEFAULT_NAN
        } else if v.fpcc_z() {
            Float80::zero(v.fpcc_n())
        } else if v.fpcc_i() {
            Float80::inf(v.fpcc_n())
        } else {
            Float80::one(v.fpcc_n())
        };
        self.fpsr = RegisterFPSR(value & 0x00FF_FFFF);
    }

    /// Packs the quotient byte of FMOD/FREM
    pub fn make_quotient(&mut self, quotient: u8, sign: bool) {
        self.fpsr.set_quotient(quotient & 0x7F);
        self.fpsr.set_quotient_s(sign);
    }

    /// Sets the exception status of the current operation and accrues it
    pub fn set_exception_status(&mut self, exs: FpuExceptions) {
        self.fpsr.set_exs(exs);
        let aexc = self.fpsr.aexc().0 | exs.accrued().0;
        self.fpsr.set_aexc(FpuAccruedExceptions(aexc));
    }
}

impl Default for FpuRegisterFile {
    fn default() -> Self {
        Self {
            fp: [Float80::DEFAULT_NAN; 8],
            fpcr: RegisterFPCR(0),
            fpsr: RegisterFPSR(0),
            fpiar: 0,
            result: Float80::ONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fpcr_upper_word_reads_zero() {
        let mut r = FpuRegisterFile::default();
        r.set_fpcr(0xFFFF_FFFF);
        assert_eq!(r.fpcr(), 0xFFFF);
        assert_eq!(r.fpcr.rnd(), 0b11);
        assert!(r.fpcr.exc().bsun());
    }

    #[test]
    fn condition_codes_from_result() {
        let mut r = FpuRegisterFile::default();
        assert_eq!(r.fpsr(), 0);

        r.result = Float80::zero(true);
        assert_eq!(r.fpsr() >> 24, 0b1100);
        r.result = Float80::inf(false);
        assert_eq!(r.fpsr() >> 24, 0b0010);
        // NaN forces N and Z off
        r.result = Float80::DEFAULT_NAN;
        assert_eq!(r.fpsr() >> 24, 0b0001);
    }

    #[test]
    fn fpsr_write_synthesizes_result() {
        let mut r = FpuRegisterFile::default();
        for cc in 0..16u32 {
            let value = (cc << 24) | 0x0012_3450;
            r.set_fpsr(value);
            let cc_read = r.fpsr() >> 24;
            if cc & 0b0001 != 0 {
                assert_eq!(cc_read, 0b0001);
            } else if cc & 0b0100 != 0 {
                assert_eq!(cc_read, cc & 0b1100);
            } else {
                assert_eq!(cc_read, cc & 0b1010);
            }
            assert_eq!(r.fpsr() & 0x00FF_FFFF, 0x0012_3450);
        }
    }

    #[test]
    fn quotient() {
        let mut r = FpuRegisterFile::default();
        r.make_quotient(0xFF, true);
        assert_eq!(r.fpsr() & 0x00FF_0000, 0x00FF_0000);
        r.make_quotient(3, false);
        assert_eq!(r.fpsr.quotient(), 3);
        assert!(!r.fpsr.quotient_s());
    }

    #[test]
    fn accrued_folding() {
        let mut r = FpuRegisterFile::default();
        r.set_exception_status(FpuExceptions(0).with_snan(true).with_inex1(true));
        assert!(r.fpsr.aexc().iop());
        assert!(r.fpsr.aexc().inex());
        r.set_exception_status(FpuExceptions(0).with_dz(true));
        assert!(r.fpsr.exs().dz());
        assert!(!r.fpsr.exs().snan());
        assert_eq!(r.fpsr.aexc().0, 0b1001_1000);
    }

    #[test]
    fn status_mapping() {
        let e = FpuExceptions::from(Status::INVALID_OP | Status::INEXACT);
        assert!(e.operr());
        assert!(e.inex2());
        assert!(!e.snan());
        assert_eq!(e.accrued().0, 0b1000_1000);
    }
}
