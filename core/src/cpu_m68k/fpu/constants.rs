use super::float80::Float80;

/// FMOVECR on-chip constant ROM. Offsets without a constant load +0.
pub fn rom_constant(offset: usize) -> Float80 {
    let (high, low) = match offset {
        0x00 => (0x4000, 0xC90F_DAA2_2168_C235), // Pi
        0x0B => (0x3FFD, 0x9A20_9A84_FBCF_F798), // Log10(2)
        0x0C => (0x4000, 0xADF8_5458_A2BB_4A9A), // e
        0x0D => (0x3FFF, 0xB8AA_3B29_5C17_F0BC), // Log2(e)
        0x0E => (0x3FFD, 0xDE5B_D8A9_3728_7195), // Log10(e)
        0x30 => (0x3FFE, 0xB172_17F7_D1CF_79AC), // ln(2)
        0x31 => (0x4000, 0x935D_8DDD_AAA8_AC17), // ln(10)
        0x32 => (0x3FFF, 0x8000_0000_0000_0000), // 10^0
        0x33 => (0x4002, 0xA000_0000_0000_0000), // 10^1
        0x34 => (0x4005, 0xC800_0000_0000_0000), // 10^2
        0x35 => (0x400C, 0x9C40_0000_0000_0000), // 10^4
        0x36 => (0x4019, 0xBEBC_2000_0000_0000), // 10^8
        0x37 => (0x4034, 0x8E1B_C9BF_0400_0000), // 10^16
        0x38 => (0x4069, 0x9DC5_ADA8_2B70_B59E), // 10^32
        0x39 => (0x40D3, 0xC278_1F49_FFCF_A6D5), // 10^64
        0x3A => (0x41A8, 0x93BA_47C9_80E9_8CE0), // 10^128
        0x3B => (0x4351, 0xAA7E_EBFB_9DF9_DE8E), // 10^256
        0x3C => (0x46A3, 0xE319_A0AE_A60E_91C7), // 10^512
        0x3D => (0x4D48, 0xC976_7586_8175_0C17), // 10^1024
        0x3E => (0x5A92, 0x9E8B_3B5D_C53D_5DE5), // 10^2048
        0x3F => (0x7525, 0xC460_5202_8A20_979B), // 10^4096
        _ => return Float80::ZERO,
    };
    Float80::from_parts(high, low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pi() {
        assert_eq!(rom_constant(0).high(), 0x4000);
        assert_eq!(rom_constant(0).low(), 0xC90F_DAA2_2168_C235);
        assert_eq!(rom_constant(0).to_f64(), std::f64::consts::PI);
    }

    #[test]
    fn powers_of_ten() {
        for (offset, v) in [(0x32, 1.0), (0x33, 10.0), (0x34, 100.0), (0x35, 1e4), (0x36, 1e8), (0x37, 1e16)] {
            assert_eq!(rom_constant(offset).to_f64(), v);
        }
        assert_eq!(rom_constant(0x38).to_f64(), 1e32);
        assert_eq!(rom_constant(0x3B).to_f64(), 1e256);
    }

    #[test]
    fn unused_slots_are_zero() {
        for offset in (0x01..=0x0A).chain(0x0F..=0x2F).chain(0x40..=0x7F) {
            assert_eq!(rom_constant(offset), Float80::ZERO, "{:02X}", offset);
        }
    }
}
