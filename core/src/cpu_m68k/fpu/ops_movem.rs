use anyhow::{Result, bail};
use arrayvec::ArrayVec;
use itertools::Itertools;
use log::debug;

use crate::bus::Address;
use crate::types::{Long, Word};

use super::float80::Float80;
use super::host::FpuHost;
use super::instruction::{AddressingMode, FmoveControlReg, FpuExtWord};
use super::storage::BitsExtReal;
use super::{Fpu, FpuError};

impl Fpu {
    fn read_control(&self, reg: FmoveControlReg) -> Long {
        match reg {
            FmoveControlReg::FPCR => self.regs.fpcr(),
            FmoveControlReg::FPSR => self.regs.fpsr(),
            FmoveControlReg::FPIAR => self.regs.fpiar,
        }
    }

    fn write_control(&mut self, reg: FmoveControlReg, value: Long) {
        match reg {
            FmoveControlReg::FPCR => self.regs.set_fpcr(value),
            FmoveControlReg::FPSR => {
                self.regs.set_fpsr(value);
                self.flags = Default::default();
            }
            FmoveControlReg::FPIAR => self.regs.fpiar = value,
        }
    }

    /// FMOVE/FMOVEM to and from the control registers
    pub(super) fn op_fmove_control(
        &mut self,
        host: &mut impl FpuHost,
        opcode: Word,
        ext: FpuExtWord,
    ) -> Result<()> {
        let regs = FmoveControlReg::ORDER
            .into_iter()
            .filter(|&r| ext.ctrl_regs() & r as u8 != 0)
            .collect::<ArrayVec<_, 3>>();
        let to_ea = ext.dr();
        let (mode, reg) = AddressingMode::decode(opcode)?;

        debug!(
            "FMOVEM {} {} {:?} {}",
            regs.iter().join("/"),
            if to_ea { "->" } else { "<-" },
            mode,
            reg
        );

        match mode {
            AddressingMode::DataRegister | AddressingMode::AddressRegister => {
                // Exactly one register, An only with FPIAR
                let r = match regs.as_slice() {
                    &[r] if mode == AddressingMode::DataRegister || r == FmoveControlReg::FPIAR => r,
                    _ => bail!(FpuError::InvalidAddressingMode(opcode)),
                };
                match (to_ea, mode) {
                    (true, AddressingMode::DataRegister) => host.set_dreg(reg, self.read_control(r)),
                    (true, _) => host.set_areg(reg, self.read_control(r)),
                    (false, AddressingMode::DataRegister) => self.write_control(r, host.dreg(reg)),
                    (false, _) => self.write_control(r, host.areg(reg)),
                }
            }
            AddressingMode::Immediate => {
                if to_ea {
                    bail!(FpuError::InvalidAddressingMode(opcode));
                }
                for &r in &regs {
                    let value = host.next_ilong()?;
                    self.write_control(r, value);
                }
            }
            _ => {
                let size = 4 * regs.len() as Address;
                let mut addr = self.get_fp_ad(host, opcode)?;
                if mode == AddressingMode::IndirectPreDec {
                    addr = addr.wrapping_sub(size);
                }
                let start = addr;

                for &r in &regs {
                    if to_ea {
                        host.write(addr, self.read_control(r))?;
                    } else {
                        let value = host.read(addr)?;
                        self.write_control(r, value);
                    }
                    addr = addr.wrapping_add(4);
                }

                match mode {
                    AddressingMode::IndirectPostInc => host.set_areg(reg, addr),
                    AddressingMode::IndirectPreDec => host.set_areg(reg, start),
                    _ => (),
                }
            }
        }
        Ok(())
    }

    /// FMOVEM of data registers FP0-FP7
    pub(super) fn op_fmovem(&mut self, host: &mut impl FpuHost, opcode: Word, ext: FpuExtWord) -> Result<()> {
        let (mode, reg) = AddressingMode::decode(opcode)?;
        let to_ea = ext.dr();
        let list = if ext.movem_mode() & 0b01 != 0 {
            host.dreg(ext.movem_dyn_reg()) as u8
        } else {
            ext.movem_reglist()
        };
        let predecrement = ext.movem_mode() & 0b10 == 0;
        let mut addr = self.get_fp_ad(host, opcode)?;

        debug!(
            "FMOVEM {:08b} {} {:?} {} @ {:08X}",
            list,
            if to_ea { "->" } else { "<-" },
            mode,
            reg,
            addr
        );

        if predecrement {
            // Bit 0 is FP0, stored from FP7 down
            for fpreg in (0..8).rev() {
                if list & (1 << fpreg) == 0 {
                    continue;
                }
                addr = addr.wrapping_sub(12);
                if to_ea {
                    self.write_extended(host, addr, self.regs.fp[fpreg])?;
                } else {
                    self.regs.fp[fpreg] = self.read_extended(host, addr)?;
                }
            }
        } else {
            // Bit 7 is FP0
            for fpreg in 0..8 {
                if list & (0x80 >> fpreg) == 0 {
                    continue;
                }
                if to_ea {
                    self.write_extended(host, addr, self.regs.fp[fpreg])?;
                } else {
                    self.regs.fp[fpreg] = self.read_extended(host, addr)?;
                }
                addr = addr.wrapping_add(12);
            }
        }

        if matches!(mode, AddressingMode::IndirectPostInc | AddressingMode::IndirectPreDec) {
            host.set_areg(reg, addr);
        }
        Ok(())
    }

    fn read_extended(&self, host: &mut impl FpuHost, addr: Address) -> Result<Float80> {
        let longs = [
            host.read(addr)?,
            host.read(addr.wrapping_add(4))?,
            host.read(addr.wrapping_add(8))?,
        ];
        Ok(BitsExtReal::from_longs(longs).into())
    }

    fn write_extended(&self, host: &mut impl FpuHost, addr: Address, value: Float80) -> Result<()> {
        for (i, l) in BitsExtReal::from(value).longs().into_iter().enumerate() {
            host.write(addr.wrapping_add(i as Address * 4), l)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_m68k::fpu::FpuModel;
    use crate::cpu_m68k::tests::testcpu;

    #[test]
    fn control_to_data_register() {
        let mut cpu = testcpu(FpuModel::M68882, &[]);
        cpu.fpu.regs.set_fpcr(0x0000_0030);
        let (fpu, mut port) = cpu.split();
        // FMOVE.L FPCR,D3
        fpu.op_fmove_control(&mut port, 0xF203, FpuExtWord(0xB000)).unwrap();
        assert_eq!(port.dreg(3), 0x30);
        // FMOVE.L D3,FPIAR
        fpu.op_fmove_control(&mut port, 0xF203, FpuExtWord(0x8400)).unwrap();
        assert_eq!(fpu.regs.fpiar, 0x30);
    }

    #[test]
    fn control_register_direct_forms() {
        let mut cpu = testcpu(FpuModel::M68882, &[]);
        cpu.regs.write_d::<Long>(0, 0x1111_1111);
        cpu.regs.write_a::<Address>(1, 0x2222_2222);
        cpu.fpu.regs.fpiar = 0x0000_4000;
        let (fpu, mut port) = cpu.split();
        // FMOVEM.L FPCR/FPSR,D0
        let err = fpu.op_fmove_control(&mut port, 0xF200, FpuExtWord(0xB800)).unwrap_err();
        assert!(matches!(err.downcast_ref::<FpuError>(), Some(FpuError::InvalidAddressingMode(_))));
        assert_eq!(port.dreg(0), 0x1111_1111);
        // FMOVE.L A1,FPCR
        assert!(fpu.op_fmove_control(&mut port, 0xF209, FpuExtWord(0x9000)).is_err());
        assert_eq!(fpu.regs.fpcr(), 0);
        // FMOVE.L FPIAR,A1
        fpu.op_fmove_control(&mut port, 0xF209, FpuExtWord(0xA400)).unwrap();
        assert_eq!(port.areg(1), 0x4000);
    }

    #[test]
    fn control_immediate() {
        let mut cpu = testcpu(FpuModel::M68882, &[0x0000, 0x0010, 0x0F00, 0x0008]);
        let (fpu, mut port) = cpu.split();
        // FMOVEM.L #..,#..,FPCR/FPSR
        fpu.op_fmove_control(&mut port, 0xF23C, FpuExtWord(0x9800)).unwrap();
        assert_eq!(fpu.regs.fpcr(), 0x10);
        assert_eq!(fpu.regs.fpsr(), 0x0100_0008);
    }

    #[test]
    fn control_predecrement() {
        let mut cpu = testcpu(FpuModel::M68882, &[]);
        cpu.regs.write_a::<Address>(2, 0x1000);
        cpu.fpu.regs.set_fpcr(0x1234);
        cpu.fpu.regs.fpiar = 0xCAFE_BABE;
        let (fpu, mut port) = cpu.split();
        // FMOVEM.L FPCR/FPIAR,-(A2)
        fpu.op_fmove_control(&mut port, 0xF222, FpuExtWord(0xB400)).unwrap();
        assert_eq!(port.areg(2), 0x0FF8);
        assert_eq!(cpu.read_mem::<Long>(0x0FF8).unwrap(), 0x1234);
        assert_eq!(cpu.read_mem::<Long>(0x0FFC).unwrap(), 0xCAFE_BABE);
    }

    #[test]
    fn control_postincrement_load() {
        let mut cpu = testcpu(FpuModel::M68882, &[]);
        cpu.regs.write_a::<Address>(2, 0x1000);
        cpu.write_mem::<Long>(0x1000, 0xFFFF_0010).unwrap();
        cpu.write_mem::<Long>(0x1004, 0x0000_0000).unwrap();
        cpu.write_mem::<Long>(0x1008, 0x0000_4000).unwrap();
        let (fpu, mut port) = cpu.split();
        // FMOVEM.L (A2)+,FPCR/FPSR/FPIAR
        fpu.op_fmove_control(&mut port, 0xF21A, FpuExtWord(0x9C00)).unwrap();
        assert_eq!(port.areg(2), 0x100C);
        assert_eq!(fpu.regs.fpcr(), 0x0010);
        assert_eq!(fpu.regs.fpsr(), 0);
        assert_eq!(fpu.regs.fpiar, 0x4000);
    }

    #[test]
    fn fmovem_predecrement_store() {
        let mut cpu = testcpu(FpuModel::M68882, &[]);
        cpu.regs.write_a::<Address>(7, 0x2000);
        cpu.fpu.regs.fp[0] = Float80::ONE;
        cpu.fpu.regs.fp[7] = Float80::from_f64(-2.0);
        let (fpu, mut port) = cpu.split();
        // FMOVEM.X FP0/FP7,-(A7)
        fpu.op_fmovem(&mut port, 0xF227, FpuExtWord(0xE081)).unwrap();
        assert_eq!(port.areg(7), 0x2000 - 24);
        // FP0 at the lowest address
        assert_eq!(cpu.read_mem::<Long>(0x2000 - 24).unwrap(), 0x3FFF_0000);
        assert_eq!(cpu.read_mem::<Long>(0x2000 - 20).unwrap(), 0x8000_0000);
        assert_eq!(cpu.read_mem::<Long>(0x2000 - 12).unwrap(), 0xC000_0000);
    }

    #[test]
    fn fmovem_postincrement_load() {
        let mut cpu = testcpu(FpuModel::M68882, &[]);
        cpu.regs.write_a::<Address>(1, 0x3000);
        cpu.write_mem::<Long>(0x3000, 0x3FFF_0000).unwrap();
        cpu.write_mem::<Long>(0x3004, 0x8000_0000).unwrap();
        cpu.write_mem::<Long>(0x300C, 0x4000_0000).unwrap();
        cpu.write_mem::<Long>(0x3010, 0x8000_0000).unwrap();
        let (fpu, mut port) = cpu.split();
        // FMOVEM.X (A1)+,FP2/FP5
        fpu.op_fmovem(&mut port, 0xF219, FpuExtWord(0xD024)).unwrap();
        assert_eq!(port.areg(1), 0x3018);
        assert_eq!(fpu.regs.fp[2], Float80::ONE);
        assert_eq!(fpu.regs.fp[5], Float80::from_f64(2.0));
        assert_eq!(fpu.regs.fp[0], Float80::DEFAULT_NAN);
    }

    #[test]
    fn fmovem_dynamic_list() {
        let mut cpu = testcpu(FpuModel::M68882, &[]);
        cpu.regs.write_a::<Address>(1, 0x3000);
        cpu.regs.write_d::<Long>(5, 0x0000_0080);
        cpu.fpu.regs.fp[0] = Float80::ONE;
        let (fpu, mut port) = cpu.split();
        // FMOVEM.X D5,(A1)
        fpu.op_fmovem(&mut port, 0xF211, FpuExtWord(0xF850)).unwrap();
        assert_eq!(port.areg(1), 0x3000);
        assert_eq!(cpu.read_mem::<Long>(0x3000).unwrap(), 0x3FFF_0000);
    }
}
