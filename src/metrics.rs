use crate::instruction::{Instruction, is_armed};
use crate::machine::FiberMachine;

/// Compute the high-order entropy (HOE) of a byte slice.
///
/// HOE = compressed_size / raw_size, where compression uses brotli at quality 2.
/// This approximates the normalized Kolmogorov complexity of the data.
///
/// Returns a value typically between 0 and 1, where:
/// - ~1.0 means the data is incompressible (random)
/// - <<1.0 means the data is highly structured/repetitive
pub fn high_order_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut compressed = Vec::new();
    let params = brotli::enc::BrotliEncoderParams {
        quality: 2,
        ..Default::default()
    };
    if brotli::BrotliCompress(&mut &data[..], &mut compressed, &params).is_err() {
        // Vec writer never errors.
        return 1.0;
    }

    compressed.len() as f64 / data.len() as f64
}

/// Memory as little-endian bytes, two per cell.
pub fn memory_bytes(memory: &[u16]) -> Vec<u8> {
    memory.iter().flat_map(|w| w.to_le_bytes()).collect()
}

pub fn armed_cell_count(memory: &[u16]) -> usize {
    memory.iter().filter(|&&w| is_armed(w)).count()
}

/// Counts of armed cells per opcode, indexed by opcode number.
pub fn opcode_histogram(memory: &[u16]) -> [usize; 8] {
    let mut hist = [0usize; 8];
    for inst in memory.iter().map(|&w| Instruction::decode(w)) {
        if inst.armed {
            hist[inst.opcode.bits() as usize] += 1;
        }
    }
    hist
}

/// Count the number of machines with distinct memory contents.
pub fn unique_memory_count(machines: &[FiberMachine]) -> usize {
    use std::collections::HashSet;
    let set: HashSet<&[u16]> = machines.iter().map(|m| m.memory()).collect();
    set.len()
}

/// Summary of a connectivity report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    /// Number of reported groups.
    pub groups: usize,
    /// Cells belonging to any group.
    pub grouped_cells: usize,
    /// Size of the largest group, 0 if none.
    pub largest: usize,
}

impl GroupStats {
    pub fn from_groups(groups: &[Vec<usize>]) -> Self {
        Self {
            groups: groups.len(),
            grouped_cells: groups.iter().map(Vec::len).sum(),
            largest: groups.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

    /// Combine stats from independent machines.
    pub fn merge(self, other: Self) -> Self {
        Self {
            groups: self.groups + other.groups,
            grouped_cells: self.grouped_cells + other.grouped_cells,
            largest: self.largest.max(other.largest),
        }
    }
}
