//! Whole-instruction tests on the reference host


use crate::bus::Address;
use crate::bus::testbus::Testbus;
use crate::cpu_m68k::fpu::FpuModel;
use crate::cpu_m68k::{CpuM68020Fpu, CpuSized};
use crate::types::Word;

pub(crate) type TestCpu = CpuM68020Fpu<Testbus<Address, u8>>;

/// Address the test code is loaded at
pub(crate) const CODE_START: Address = 0x0001_0000;
/// Initial supervisor stack pointer
pub(crate) const STACK_TOP: Address = 0x0000_F000;

/// Handler address installed for an exception vector
pub(crate) fn handler(vector: u8) -> Address {
    0x0002_0000 + Address::from(vector) * 0x10
}

/// Initializes a test system with code at the reset PC and a vector table
/// pointing every exception at its own handler
pub(crate) fn testcpu(model: FpuModel, code: &[Word]) -> TestCpu {
    let bus = Testbus::new(Address::MAX);
    let mut cpu = TestCpu::new(bus, model);

    cpu.write_mem::<Address>(0, STACK_TOP).unwrap();
    cpu.write_mem::<Address>(4, CODE_START).unwrap();
    for vector in 2..=63 {
        cpu.write_mem::<Address>(Address::from(vector) * 4, handler(vector))
            .unwrap();
    }
    for (i, &word) in code.iter().enumerate() {
        cpu.write_mem(CODE_START + i as Address * 2, word).unwrap();
    }

    cpu.reset().unwrap();
    cpu
}

/// Runs a number of instructions
pub(crate) fn run(cpu: &mut TestCpu, steps: usize) {
    for _ in 0..steps {
        cpu.step().unwrap();
    }
}

/// Reads back a value pushed to the exception stack frame
pub(crate) fn stacked<T: CpuSized>(cpu: &mut TestCpu, offset: Address) -> T {
    let ssp = cpu.regs.ssp;
    cpu.read_mem(ssp + offset).unwrap()
}
