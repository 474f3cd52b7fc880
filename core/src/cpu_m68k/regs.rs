use proc_bitfield::bitfield;
use serde::{Deserialize, Serialize};

use super::{CpuSized, M68020_SR_MASK};
use crate::bus::Address;
use crate::types::Long;

use std::fmt;

bitfield! {
    /// SR register bitfield
    #[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RegisterSR(pub u16): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Full SR (with masking)
        pub sr: u16 [set_fn (|v| v & M68020_SR_MASK)] @ ..,

        /// Interrupt priority mask
        pub int_prio_mask: u8 @ 8..=10,

        /// Supervisor mode
        pub supervisor: bool @ 13,

        /// Trace mode (T0 and T1)
        pub trace: u8 @ 14..=15,
    }
}

/// Integer register file of the host CPU
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct RegisterFile {
    /// Dx
    pub d: [Long; 8],

    /// Ax
    pub a: [Long; 7],

    /// User Stack Pointer
    pub usp: Address,

    /// Supervisor Stack Pointer
    pub ssp: Address,

    /// Status Register
    pub sr: RegisterSR,

    /// Program counter
    pub pc: Address,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self {
            a: [0; 7],
            d: [0; 8],
            usp: 0,
            ssp: 0,
            sr: RegisterSR(0),
            pc: 0,
        }
    }

    /// Read an An register
    pub fn read_a<T: CpuSized>(&self, a: usize) -> T {
        T::chop(if a == 7 {
            if self.sr.supervisor() {
                self.ssp
            } else {
                self.usp
            }
        } else {
            self.a[a]
        })
    }

    /// Write an An register
    pub fn write_a<T: CpuSized>(&mut self, a: usize, val: T) {
        // Writes to A as Byte or Word are sign extended
        let adj_val = val.expand_sign_extend();

        if a == 7 {
            if self.sr.supervisor() {
                self.ssp = adj_val;
            } else {
                self.usp = adj_val;
            }
        } else {
            self.a[a] = adj_val;
        }
    }

    /// Read a Dn register
    pub fn read_d<T: CpuSized>(&self, d: usize) -> T {
        T::chop(self.d[d])
    }

    /// Write a Dn register
    pub fn write_d<T: CpuSized>(&mut self, d: usize, val: T) {
        self.d[d] = val.replace_in(self.d[d]);
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "A: {:X?} D: {:X?} USP: {:08X} SSP: {:08X} PC: {:08X} SR: {:04X}",
            self.a,
            self.d,
            self.usp,
            self.ssp,
            self.pc,
            self.sr.sr()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Byte, Long, Word};

    #[test]
    fn read_d() {
        let mut r = RegisterFile::new();
        r.d[0] = 0x11223344;

        assert_eq!(r.read_d::<Byte>(0), 0x44);
        assert_eq!(r.read_d::<Word>(0), 0x3344);
        assert_eq!(r.read_d::<Long>(0), 0x11223344);
    }

    #[test]
    fn write_d_merges_low_part() {
        let mut r = RegisterFile::new();
        r.d[3] = 0x11223344;

        r.write_d(3, 0xAA_u8);
        assert_eq!(r.d[3], 0x112233AA);
        r.write_d(3, 0xBBCC_u16);
        assert_eq!(r.d[3], 0x1122BBCC);
        r.write_d(3, 0xDEADBEEF_u32);
        assert_eq!(r.d[3], 0xDEADBEEF);
    }

    #[test]
    fn write_a() {
        let mut r = RegisterFile::new();
        r.write_a(0, 0x11223344_u32);
        assert_eq!(r.a[0], 0x11223344);
        r.write_a(0, 0x3344_u16);
        assert_eq!(r.a[0], 0x00003344);
        r.write_a(0, 0xB344_u16);
        assert_eq!(r.a[0], 0xFFFFB344);
        r.write_a(0, 0xB4_u8);
        assert_eq!(r.a[0], 0xFFFFFFB4);
    }

    #[test]
    fn a7_follows_supervisor_bit() {
        let mut r = RegisterFile::new();
        r.sr.set_supervisor(false);
        r.write_a(7, 0x11223344_u32);
        assert_eq!(r.usp, 0x11223344);
        assert_eq!(r.ssp, 0);

        r.sr.set_supervisor(true);
        r.write_a(7, 0x55667788_u32);
        assert_eq!(r.ssp, 0x55667788);
        assert_eq!(r.read_a::<Long>(7), 0x55667788);
        assert_eq!(r.usp, 0x11223344);
    }

    #[test]
    fn display() {
        let mut r = RegisterFile::new();
        r.pc = 0x0001_0004;
        r.sr.set_supervisor(true);
        let s = r.to_string();
        assert!(s.contains("PC: 00010004"));
        assert!(s.contains("SR: 2000"));
    }

    #[test]
    fn sr_mask() {
        let mut r = RegisterFile::new();
        r.sr.set_sr(0xFFFF);
        assert_eq!(r.sr.sr(), M68020_SR_MASK);
    }
}
