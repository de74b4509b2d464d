use std::path::{Path, PathBuf};

use clap::Parser;
use fiber::ensemble::{Ensemble, EnsembleConfig};
use fiber::instruction::{Opcode, assemble, assemble_program, disassemble_listing};
use fiber::metrics::{GroupStats, high_order_entropy};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fiber", about = "Fiber: a circular tape of self-modifying 16-bit cells")]
struct Cli {
    /// Random seed for reproducibility.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Number of sweeps to run (one sweep = one turn for every cell).
    #[arg(long)]
    sweeps: usize,

    /// Number of independent machines.
    #[arg(long, default_value_t = 1)]
    population_size: usize,

    /// Cells per machine.
    #[arg(long, default_value_t = 128)]
    cell_count: usize,

    /// Leading cells filled with random words before the run.
    #[arg(long, default_value_t = 128)]
    random_cells: usize,

    /// Per-cell bit-flip probability per sweep (0 to disable).
    #[arg(long, default_value_t = 0.0)]
    mutation_rate: f64,

    /// Listing file (instructions and hex data cells) loaded at cell 0 of every machine.
    #[arg(long)]
    program: Option<PathBuf>,

    /// Instruction loaded after the listing, one cell each (repeatable).
    #[arg(long = "asm")]
    asm: Vec<String>,

    /// Compute and output metrics every N sweeps.
    #[arg(long, default_value_t = 1)]
    metrics_interval: usize,

    /// Run in benchmark mode: suppress CSV, print throughput stats.
    #[arg(long)]
    benchmark: bool,

    /// Print the cell listing of the first machine after the run.
    #[arg(long)]
    dump: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.cell_count == 0 {
        eprintln!("--cell-count must be positive");
        std::process::exit(1);
    }
    if cli.metrics_interval == 0 {
        eprintln!("--metrics-interval must be positive");
        std::process::exit(1);
    }

    let program = match load_program(cli.program.as_deref(), &cli.asm) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let config = EnsembleConfig {
        population_size: cli.population_size,
        cell_count: cli.cell_count,
        random_cells: cli.random_cells,
        mutation_rate: cli.mutation_rate,
    };
    let mut ensemble = Ensemble::new(config, cli.seed);
    ensemble.load_all(&program);

    if cli.benchmark {
        run_benchmark(&mut ensemble, cli.sweeps);
    } else {
        run_simulation(&mut ensemble, cli.sweeps, cli.metrics_interval);
    }

    if cli.dump {
        if let Some(m) = ensemble.machines.first() {
            print!("{}", disassemble_listing(m.memory(), m.cursor()));
        }
    }
}

/// Assemble the listing file (if any) followed by the `--asm` lines.
fn load_program(path: Option<&Path>, asm: &[String]) -> Result<Vec<u16>, String> {
    let mut words = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            assemble_program(&text).map_err(|e| format!("{}: {e}", path.display()))?
        }
        None => Vec::new(),
    };
    for (i, line) in asm.iter().enumerate() {
        let word = assemble(line).map_err(|e| format!("--asm #{}: '{line}': {e}", i + 1))?;
        words.push(word);
    }
    Ok(words)
}

fn csv_header() -> String {
    let mut header = String::from("sweep,hoe,armed,unique,groups,largest_group");
    for op in Opcode::ALL {
        header.push_str(",op_");
        header.push_str(op.mnemonic());
    }
    header
}

fn print_metrics(sweep: usize, ensemble: &Ensemble) {
    let hoe = high_order_entropy(&ensemble.memory_bytes());
    let stats = ensemble
        .analyze()
        .iter()
        .map(|groups| GroupStats::from_groups(groups))
        .fold(GroupStats::default(), GroupStats::merge);
    let hist: Vec<String> = ensemble
        .opcode_histogram()
        .iter()
        .map(|n| n.to_string())
        .collect();
    println!(
        "{sweep},{hoe:.6},{},{},{},{},{}",
        ensemble.armed_count(),
        ensemble.unique_count(),
        stats.groups,
        stats.largest,
        hist.join(",")
    );
}

fn run_simulation(ensemble: &mut Ensemble, sweeps: usize, metrics_interval: usize) {
    println!("{}", csv_header());
    print_metrics(0, ensemble);

    for sweep in 1..=sweeps {
        ensemble.run_sweep();
        ensemble.mutate();

        if sweep % metrics_interval == 0 {
            print_metrics(sweep, ensemble);
        }

        if sweep % 100 == 0 || sweep == sweeps {
            eprint!("\rsweep {sweep}/{sweeps}");
        }
    }
    eprintln!();
}

fn run_benchmark(ensemble: &mut Ensemble, sweeps: usize) {
    let machines = ensemble.machines.len();
    let cells = ensemble.config.cell_count;

    let start = std::time::Instant::now();
    for _ in 0..sweeps {
        ensemble.run_sweep();
        ensemble.mutate();
    }
    let elapsed = start.elapsed();

    let total_steps = sweeps as u64 * machines as u64 * cells as u64;
    let sweeps_per_sec = sweeps as f64 / elapsed.as_secs_f64();
    let steps_per_sec = total_steps as f64 / elapsed.as_secs_f64();

    eprintln!("Benchmark results:");
    eprintln!("  Sweeps:            {sweeps}");
    eprintln!("  Machines:          {machines}");
    eprintln!("  Cells per machine: {cells}");
    eprintln!("  Total steps:       {total_steps}");
    eprintln!("  Elapsed:           {elapsed:.2?}");
    eprintln!("  Sweeps/sec:        {sweeps_per_sec:.1}");
    eprintln!("  Steps/sec:         {steps_per_sec:.0}");
}
