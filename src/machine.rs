use rand::Rng;

use crate::address::{ADDR_MASK, decode_address};
use crate::instruction::{Instruction, Opcode};
use crate::metrics::armed_cell_count;

/// Default number of cells on the tape.
pub const DEFAULT_SIZE: usize = 128;

/// A circular tape of 16-bit cells executed one cell at a time, round-robin.
///
/// Each cell is both data and an instruction. On every [`step`](Self::step)
/// the cell under the cursor executes if its exec flag (bit 15) is set, then
/// the cursor advances by one, wrapping at the end of the tape. There is no
/// halt state.
///
/// All operand addresses are relative to the executing cell. Arithmetic is
/// on `u16`: `add` wraps, `ssub` saturates at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiberMachine {
    memory: Vec<u16>,
    cursor: usize,
}

impl FiberMachine {
    /// Create a machine with `size` zeroed cells and the cursor at 0.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "machine needs at least one cell");
        Self {
            memory: vec![0; size],
            cursor: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.memory.len()
    }

    /// Index of the next cell to execute.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn memory(&self) -> &[u16] {
        &self.memory
    }

    /// # Panics
    ///
    /// Panics if `index >= size`.
    pub fn cell(&self, index: usize) -> u16 {
        assert!(index < self.size(), "cell {index} out of range for {} cells", self.size());
        self.memory[index]
    }

    /// # Panics
    ///
    /// Panics if `index >= size`.
    pub fn set_cell(&mut self, index: usize, value: u16) {
        assert!(index < self.size(), "cell {index} out of range for {} cells", self.size());
        self.memory[index] = value;
    }

    /// Write `words` into consecutive cells starting at `offset`, wrapping.
    pub fn load(&mut self, offset: usize, words: &[u16]) {
        let size = self.size();
        for (i, &w) in words.iter().enumerate() {
            self.memory[(offset + i) % size] = w;
        }
    }

    /// Zero every cell and move the cursor back to 0.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.memory.fill(0);
    }

    /// Fill the first `count` cells (capped at the tape size) with random words.
    pub fn randomize<R: Rng>(&mut self, count: usize, rng: &mut R) {
        let count = count.min(self.size());
        rng.fill(&mut self.memory[..count]);
    }

    /// Number of cells with the exec flag set.
    pub fn armed_count(&self) -> usize {
        armed_cell_count(&self.memory)
    }

    /// Execute the cell under the cursor (if armed) and advance the cursor.
    pub fn step(&mut self) {
        let inst = Instruction::decode(self.memory[self.cursor]);
        if inst.armed {
            let op1 = inst.op1.resolve(self.size(), self.cursor);
            let op2 = inst.op2.resolve(self.size(), self.cursor);
            self.execute(inst.opcode, op1, op2);
        }
        self.cursor = (self.cursor + 1) % self.size();
    }

    pub fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    /// One full pass: every cell gets exactly one turn.
    pub fn sweep(&mut self) {
        self.run(self.size());
    }

    /// Apply `opcode` to the already-resolved operand cells.
    ///
    /// For `ld`/`st`, the value at `op2` is reinterpreted as a relative
    /// address (low six bits only) from the cursor cell to find the real
    /// source or destination.
    ///
    /// # Panics
    ///
    /// Panics if `op1` or `op2` is out of range.
    pub fn execute(&mut self, opcode: Opcode, op1: usize, op2: usize) {
        let mem = &mut self.memory;
        match opcode {
            Opcode::Mov => mem[op1] = mem[op2],
            Opcode::Add => mem[op1] = mem[op1].wrapping_add(mem[op2]),
            Opcode::Cshl => mem[op1] = cyclic_shift_left(mem[op1], mem[op2]),
            Opcode::Or => mem[op1] |= mem[op2],
            Opcode::And => mem[op1] &= mem[op2],
            Opcode::Ssub => mem[op1] = mem[op1].saturating_sub(mem[op2]),
            Opcode::Ld => {
                let src = self.pointer_target(op2);
                self.memory[op1] = self.memory[src];
            }
            Opcode::St => {
                let dst = self.pointer_target(op2);
                self.memory[dst] = self.memory[op1];
            }
        }
    }

    /// The single cell the instruction under the cursor would write, or
    /// `None` if that cell is inert.
    ///
    /// Mirrors [`execute`](Self::execute): `st` writes through its pointer,
    /// every other opcode (including `ld`) writes its own operand 1.
    pub fn written_address(&self) -> Option<usize> {
        let inst = Instruction::decode(self.memory[self.cursor]);
        if !inst.armed {
            return None;
        }
        let op1 = inst.op1.resolve(self.size(), self.cursor);
        let dst = match inst.opcode {
            Opcode::Mov
            | Opcode::Add
            | Opcode::Cshl
            | Opcode::Or
            | Opcode::And
            | Opcode::Ssub
            | Opcode::Ld => op1,
            Opcode::St => self.pointer_target(inst.op2.resolve(self.size(), self.cursor)),
        };
        Some(dst)
    }

    /// Second level of `ld`/`st` indirection: the value at `slot` read as a
    /// relative address from the cursor.
    fn pointer_target(&self, slot: usize) -> usize {
        let addr6 = (self.memory[slot] & ADDR_MASK as u16) as u8;
        decode_address(self.size(), self.cursor, addr6)
    }
}

/// Rotate `value` left by `amount % 16`; bits leaving the top re-enter at the bottom.
pub fn cyclic_shift_left(value: u16, amount: u16) -> u16 {
    value.rotate_left(u32::from(amount % 16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::encode_address;
    use crate::instruction::assemble;

    fn asm(line: &str) -> u16 {
        assemble(line).unwrap()
    }

    #[test]
    fn test_new_is_zeroed() {
        let m = FiberMachine::new(DEFAULT_SIZE);
        assert_eq!(m.size(), 128);
        assert_eq!(m.cursor(), 0);
        assert!(m.memory().iter().all(|&w| w == 0));
    }

    #[test]
    #[should_panic]
    fn test_zero_size_panics() {
        let _ = FiberMachine::new(0);
    }

    #[test]
    #[should_panic]
    fn test_cell_out_of_range_panics() {
        let m = FiberMachine::new(4);
        let _ = m.cell(4);
    }

    #[test]
    fn test_step_advances_over_inert_cells() {
        let mut m = FiberMachine::new(3);
        m.set_cell(1, 0x7FFF);
        m.step();
        m.step();
        assert_eq!(m.cursor(), 2);
        m.step();
        assert_eq!(m.cursor(), 0);
        assert_eq!(m.memory(), &[0, 0x7FFF, 0]);
    }

    #[test]
    fn test_mov() {
        let mut m = FiberMachine::new(8);
        m.set_cell(0, asm("mov +1 +2"));
        m.set_cell(2, 1234);
        m.step();
        assert_eq!(m.cell(1), 1234);
        assert_eq!(m.cell(2), 1234);
    }

    #[test]
    fn test_add_wraps() {
        let mut m = FiberMachine::new(8);
        m.set_cell(0, asm("add +1 +2"));
        m.set_cell(1, 0xFFFF);
        m.set_cell(2, 3);
        m.step();
        assert_eq!(m.cell(1), 2);
    }

    #[test]
    fn test_cshl_wraps_high_bits() {
        let mut m = FiberMachine::new(8);
        m.set_cell(0, asm("cshl +1 +2"));
        m.set_cell(1, 0x8001);
        m.set_cell(2, 4);
        m.step();
        assert_eq!(m.cell(1), 0x0018);
    }

    #[test]
    fn test_cshl_amount_taken_mod_16() {
        assert_eq!(cyclic_shift_left(0x1234, 16), 0x1234);
        assert_eq!(cyclic_shift_left(0x1234, 20), cyclic_shift_left(0x1234, 4));
        assert_eq!(cyclic_shift_left(0x1234, 0), 0x1234);
    }

    #[test]
    fn test_or_and() {
        let mut m = FiberMachine::new(8);
        m.load(0, &[asm("or +2 +3"), asm("and +2 +3"), 0b1100, 0b1010]);
        m.step();
        assert_eq!(m.cell(2), 0b1110);
        // Cell 1 addresses relative to itself: op1 = 3, op2 = 4.
        m.step();
        assert_eq!(m.cell(3), 0);
        m.set_cell(3, 0b1010);
        m.set_cell(4, 0b0110);
        m.execute(Opcode::And, 3, 4);
        assert_eq!(m.cell(3), 0b0010);
    }

    #[test]
    fn test_ssub_saturates() {
        let mut m = FiberMachine::new(8);
        m.set_cell(0, asm("ssub +1 +2"));
        m.set_cell(1, 5);
        m.set_cell(2, 9);
        m.step();
        assert_eq!(m.cell(1), 0);

        m.execute(Opcode::Ssub, 3, 4);
        assert_eq!(m.cell(3), 0);
        m.set_cell(3, 9);
        m.set_cell(4, 5);
        m.execute(Opcode::Ssub, 3, 4);
        assert_eq!(m.cell(3), 4);
    }

    #[test]
    fn test_load_double_indirection() {
        let mut m = FiberMachine::new(16);
        m.set_cursor_for_test(5);
        m.set_cell(5, asm("ld +1 [+2]"));
        // Pointer at 7 says "+4" from the executing cell, i.e. cell 9.
        // Upper bits must be ignored.
        m.set_cell(7, 0xFFC0 | encode_address(4) as u16);
        m.set_cell(9, 4242);
        m.step();
        assert_eq!(m.cell(6), 4242);
        assert_eq!(m.cursor(), 6);
    }

    #[test]
    fn test_store_double_indirection() {
        let mut m = FiberMachine::new(16);
        m.set_cursor_for_test(5);
        m.set_cell(5, asm("st +1 [+2]"));
        m.set_cell(6, 777);
        m.set_cell(7, encode_address(-3) as u16);
        m.step();
        assert_eq!(m.cell(2), 777);
    }

    #[test]
    fn test_addresses_relative_to_cursor_wrap() {
        let mut m = FiberMachine::new(4);
        m.set_cursor_for_test(3);
        m.set_cell(3, asm("mov +1 -1"));
        m.set_cell(2, 99);
        m.step();
        assert_eq!(m.cell(0), 99);
        assert_eq!(m.cursor(), 0);
    }

    #[test]
    fn test_self_modification() {
        // Cell 0 overwrites cell 1 with a copy of itself before cell 1 runs.
        let mut m = FiberMachine::new(4);
        m.set_cell(0, asm("mov +1 -4"));
        m.step();
        assert_eq!(m.cell(1), m.cell(0));
    }

    #[test]
    fn test_written_address() {
        let mut m = FiberMachine::new(16);
        assert_eq!(m.written_address(), None);
        m.set_cell(0, asm("add -2 +3"));
        assert_eq!(m.written_address(), Some(14));
        m.set_cell(0, asm("ld +5 [+1]"));
        m.set_cell(1, encode_address(9) as u16);
        assert_eq!(m.written_address(), Some(5));
        m.set_cell(0, asm("st +5 [+1]"));
        assert_eq!(m.written_address(), Some(9));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut m = FiberMachine::new(8);
        m.set_cell(0, asm("mov +1 +2"));
        m.set_cell(2, 3);
        let snapshot = m.clone();
        m.step();
        assert_eq!(snapshot.cursor(), 0);
        assert_eq!(snapshot.cell(1), 0);
        assert_eq!(m.cell(1), 3);
    }

    #[test]
    fn test_reset() {
        let mut m = FiberMachine::new(8);
        m.load(6, &[1, 2, 3]);
        assert_eq!(m.cell(0), 3);
        m.run(5);
        m.reset();
        assert_eq!(m, FiberMachine::new(8));
    }

    #[test]
    fn test_randomize_is_seeded_and_capped() {
        use rand::SeedableRng;
        use rand::rngs::SmallRng;

        let mut a = FiberMachine::new(16);
        let mut b = FiberMachine::new(16);
        a.randomize(10, &mut SmallRng::seed_from_u64(7));
        b.randomize(10, &mut SmallRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert!(a.memory()[10..].iter().all(|&w| w == 0));

        let mut c = FiberMachine::new(4);
        c.randomize(100, &mut SmallRng::seed_from_u64(7));
        assert_eq!(c.size(), 4);
    }

    impl FiberMachine {
        fn set_cursor_for_test(&mut self, cursor: usize) {
            self.cursor = cursor;
        }
    }
}
