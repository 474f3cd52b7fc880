use anyhow::Result;
use log::{debug, warn};

use crate::bus::Address;
use crate::types::{Long, Word};

use super::host::FpuHost;
use super::instruction::AddressingMode;
use super::Fpu;

/// 68040 IDLE frame, version 0x41, no body
const FRAME_IDLE_68040: [Long; 1] = [0x4100_0000];

/// 68881/68882 IDLE frame, version 0x1F, 24 byte body
const FRAME_IDLE_6888X: [Long; 7] = [
    0x1F18_0000,
    0x0000_0000,
    0x0000_0000,
    0x0000_0000,
    0x0000_0000,
    0x0000_0000,
    0x7000_0000,
];

impl Fpu {
    /// State frame written by FSAVE
    fn state_frame(&self) -> &'static [Long] {
        if self.model.is_integral() {
            &FRAME_IDLE_68040
        } else {
            &FRAME_IDLE_6888X
        }
    }

    /// Size of the body following a state frame header, in bytes
    fn frame_body_size(&self, header: Long) -> Address {
        let size = (header >> 16) & 0xFF;
        let known = if self.model.is_integral() {
            matches!(size, 0x00 | 0x30 | 0x60)
        } else {
            matches!(size, 0x18 | 0x38 | 0xB4 | 0xD4)
        };
        if known {
            size
        } else {
            warn!("Unknown FPU state frame {:08X}, skipping header only", header);
            0
        }
    }

    /// FSAVE
    pub(super) fn op_fsave(&mut self, host: &mut impl FpuHost, opcode: Word) -> Result<()> {
        let (mode, reg) = AddressingMode::decode(opcode)?;
        let mut addr = self.get_fp_ad(host, opcode)?;
        let frame = self.state_frame();
        debug!("FSAVE {:?} {} @ {:08X}, {} bytes", mode, reg, addr, frame.len() * 4);

        if mode == AddressingMode::IndirectPreDec {
            for &l in frame.iter().rev() {
                addr = addr.wrapping_sub(4);
                host.write(addr, l)?;
            }
        } else {
            for &l in frame {
                host.write(addr, l)?;
                addr = addr.wrapping_add(4);
            }
        }

        if matches!(mode, AddressingMode::IndirectPostInc | AddressingMode::IndirectPreDec) {
            host.set_areg(reg, addr);
        }
        Ok(())
    }

    /// FRESTORE. No internal state is taken from the frame, the body is skipped.
    pub(super) fn op_frestore(&mut self, host: &mut impl FpuHost, opcode: Word) -> Result<()> {
        let (mode, reg) = AddressingMode::decode(opcode)?;
        let mut addr = self.get_fp_ad(host, opcode)?;
        let predecrement = mode == AddressingMode::IndirectPreDec;

        if predecrement {
            addr = addr.wrapping_sub(4);
        }
        let header: Long = host.read(addr)?;
        if !predecrement {
            addr = addr.wrapping_add(4);
        }

        if header >> 24 == 0 {
            debug!("FRESTORE NULL frame @ {:08X}", addr);
        } else {
            let size = self.frame_body_size(header);
            debug!("FRESTORE frame {:08X}, skipping {} bytes", header, size);
            addr = if predecrement {
                addr.wrapping_sub(size)
            } else {
                addr.wrapping_add(size)
            };
        }

        if matches!(mode, AddressingMode::IndirectPostInc | AddressingMode::IndirectPreDec) {
            host.set_areg(reg, addr);
        }
        Ok(())
    }
}
