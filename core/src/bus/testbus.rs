use anyhow::Result;
use num_traits::{PrimInt, WrappingAdd};

use super::Bus;
use crate::bus::BusResult;

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Sparse memory bus for tests
pub struct Testbus<TA: PrimInt + WrappingAdd + Hash + Debug, TD: PrimInt> {
    pub mem: HashMap<TA, TD>,
    mask: TA,
}

impl<TA, TD> Testbus<TA, TD>
where
    TA: PrimInt + WrappingAdd + Hash + Debug,
    TD: PrimInt,
{
    pub fn new(mask: TA) -> Self {
        Self {
            mem: HashMap::new(),
            mask,
        }
    }
}

impl<TA, TD> Bus<TA, TD> for Testbus<TA, TD>
where
    TA: PrimInt + WrappingAdd + Hash + Debug,
    TD: PrimInt,
{
    fn get_mask(&self) -> TA {
        self.mask
    }

    fn read(&mut self, addr: TA) -> BusResult<TD> {
        assert_eq!(addr & self.mask, addr);

        #[allow(clippy::or_fun_call)]
        let val = *self.mem.get(&addr).unwrap_or(&TD::zero());
        BusResult::Ok(val)
    }

    fn write(&mut self, addr: TA, val: TD) -> BusResult<TD> {
        assert_eq!(addr & self.mask, addr);
        self.mem.insert(addr, val);
        BusResult::Ok(val)
    }

    fn reset(&mut self, _hard: bool) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testbus() {
        let mut b = Testbus::<u16, u8>::new(u16::MAX);

        for a in 0..=u16::MAX {
            assert_eq!(b.read(a), BusResult::Ok(0));
        }
        for a in 0..=u16::MAX {
            assert_eq!(b.write(a, a as u8), BusResult::Ok(a as u8));
        }
        for a in 0..=u16::MAX {
            assert_eq!(b.read(a), BusResult::Ok(a as u8));
        }
    }

    #[test]
    #[should_panic]
    fn out_mask() {
        let mut b = Testbus::<u16, u8>::new(u8::MAX.into());

        let _ = b.write(0x100, 1);
    }
}
