use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::connectivity::analyze_single_sweep;
use crate::machine::{DEFAULT_SIZE, FiberMachine};
use crate::metrics::{memory_bytes, opcode_histogram, unique_memory_count};

/// Sample from geometric distribution via CDF inversion.
/// Returns the number of cells to skip before the next mutation.
/// `inv_log` should be `1.0 / ln(1 - mutation_rate)` (precomputed).
fn geometric_skip(rng: &mut SmallRng, inv_log: f64) -> usize {
    let u: f64 = rng.r#gen::<f64>();
    if u < 1e-300 {
        return usize::MAX;
    }
    (u.ln() * inv_log) as usize
}

/// Configuration for a batch of independent machines.
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    /// Number of machines.
    pub population_size: usize,
    /// Cells per machine.
    pub cell_count: usize,
    /// Leading cells of each machine filled with random words at start.
    pub random_cells: usize,
    /// Per-cell bit-flip probability per sweep (0.0 to disable).
    pub mutation_rate: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            population_size: 1,
            cell_count: DEFAULT_SIZE,
            random_cells: DEFAULT_SIZE,
            mutation_rate: 0.0,
        }
    }
}

/// Independent machines run side by side. They never share cells.
pub struct Ensemble {
    pub machines: Vec<FiberMachine>,
    pub config: EnsembleConfig,
    pub rng: SmallRng,
}

impl Ensemble {
    /// Create the machines, each with its leading `random_cells` cells randomized.
    ///
    /// # Panics
    ///
    /// Panics if `cell_count` is zero.
    pub fn new(config: EnsembleConfig, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let machines = (0..config.population_size)
            .map(|_| {
                let mut m = FiberMachine::new(config.cell_count);
                m.randomize(config.random_cells, &mut rng);
                m
            })
            .collect();
        info!(
            population = config.population_size,
            cells = config.cell_count,
            seed,
            "ensemble created"
        );
        Self {
            machines,
            config,
            rng,
        }
    }

    /// Write `words` at cell 0 of every machine.
    pub fn load_all(&mut self, words: &[u16]) {
        for m in &mut self.machines {
            m.load(0, words);
        }
    }

    /// One full sweep on every machine, in parallel.
    pub fn run_sweep(&mut self) {
        self.machines.par_iter_mut().for_each(FiberMachine::sweep);
    }

    /// Apply background mutation: flip random bits with the configured probability.
    ///
    /// Uses geometric distribution to skip directly to the next mutation site,
    /// reducing RNG calls from O(total_cells) to O(total_cells * mutation_rate).
    pub fn mutate(&mut self) {
        if self.config.mutation_rate <= 0.0 {
            return;
        }
        let cells = self.config.cell_count;
        let total_cells = self.machines.len() * cells;
        let inv_log = 1.0 / (1.0 - self.config.mutation_rate).ln();

        let mut flips = 0usize;
        let mut pos = geometric_skip(&mut self.rng, inv_log);
        while pos < total_cells {
            let machine = &mut self.machines[pos / cells];
            let idx = pos % cells;
            let bit = 1u16 << self.rng.gen_range(0..16);
            machine.set_cell(idx, machine.cell(idx) ^ bit);
            flips += 1;
            pos = pos.saturating_add(1).saturating_add(geometric_skip(&mut self.rng, inv_log));
        }
        debug!(flips, "mutated");
    }

    /// Connectivity groups of every machine, in machine order.
    pub fn analyze(&self) -> Vec<Vec<Vec<usize>>> {
        self.machines.par_iter().map(analyze_single_sweep).collect()
    }

    /// All memories concatenated as little-endian bytes.
    pub fn memory_bytes(&self) -> Vec<u8> {
        self.machines.iter().flat_map(|m| memory_bytes(m.memory())).collect()
    }

    pub fn armed_count(&self) -> usize {
        self.machines.iter().map(FiberMachine::armed_count).sum()
    }

    /// Armed cells per opcode, summed over all machines.
    pub fn opcode_histogram(&self) -> [usize; 8] {
        let mut total = [0usize; 8];
        for hist in self.machines.iter().map(|m| opcode_histogram(m.memory())) {
            for (t, h) in total.iter_mut().zip(hist) {
                *t += h;
            }
        }
        total
    }

    /// Number of machines whose memories differ from each other.
    pub fn unique_count(&self) -> usize {
        unique_memory_count(&self.machines)
    }
}
