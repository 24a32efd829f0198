mod affinity;
mod driver;
mod error;
mod fixture;
mod matrix;
mod mutator;
mod parquet_out;
mod slot;
mod tag;

use std::time::Duration;

use clap::Parser;

use crate::driver::RunBudget;
use crate::matrix::DEFAULT_SWEEP_LIMIT;

#[derive(Parser, Debug)]
#[command(name = "rpc_bench")]
#[command(about = "Unary ping-pong RPC benchmark over a tag-correlated completion queue")]
struct Cli {
    /// Run only benchmarks whose name contains this substring
    filter: Option<String>,

    /// Timed iterations per configuration
    #[arg(short = 'n', long, default_value = "1000")]
    iterations: u64,

    /// Untimed warmup iterations per configuration
    #[arg(long, default_value = "10")]
    warmup: u64,

    /// Per-configuration time budget in milliseconds (stops the timed loop early)
    #[arg(long)]
    max_time_ms: Option<u64>,

    /// Upper bound in bytes for the payload size sweep
    #[arg(long, default_value_t = DEFAULT_SWEEP_LIMIT)]
    sweep_limit: u64,

    /// RNG seed for the metadata mutators
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Output parquet file path
    #[arg(short = 'o', long, default_value = "rpc_bench.parquet")]
    output: String,

    /// Pin the driver thread to this CPU core
    #[arg(long)]
    pin_core: Option<usize>,

    /// List matching benchmark names without running them
    #[arg(long)]
    list: bool,
}

fn main() {
    let cli = Cli::parse();

    affinity::pin_if_configured(cli.pin_core);

    let budget = RunBudget {
        warmup: cli.warmup,
        iterations: cli.iterations,
        max_time: cli.max_time_ms.map(Duration::from_millis),
    };

    let configs: Vec<_> = matrix::benchmarks(cli.sweep_limit)
        .into_iter()
        .filter(|c| match &cli.filter {
            Some(f) => c.name().contains(f.as_str()),
            None => true,
        })
        .collect();

    if cli.list {
        for cfg in &configs {
            println!("{}", cfg.name());
        }
        return;
    }
    if configs.is_empty() {
        eprintln!("no benchmarks match the filter");
        return;
    }

    let mut rows = Vec::with_capacity(configs.len());
    for cfg in &configs {
        let name = cfg.name();
        match driver::run_config(cfg, &budget, cli.seed) {
            Ok(outcome) => {
                let row = parquet_out::row_from_outcome(cfg, &outcome);
                let mib_per_sec = outcome.bytes_processed as f64
                    / (1024.0 * 1024.0)
                    / outcome.elapsed.as_secs_f64().max(f64::EPSILON);
                eprintln!(
                    "  {}: {} iters in {:.3}s ({:.0} rps, {:.2} MiB/s)",
                    name,
                    outcome.iterations,
                    outcome.elapsed.as_secs_f64(),
                    row.rps,
                    mib_per_sec
                );
                rows.push(row);
            }
            Err(e) => {
                eprintln!("{}: {}", name, e);
                std::process::exit(2);
            }
        }
    }

    if let Err(e) = parquet_out::write_parquet(&cli.output, &rows) {
        eprintln!("Error writing parquet: {}", e);
        std::process::exit(1);
    } else if !rows.is_empty() {
        eprintln!("Results written to {}", cli.output);
    }
}
