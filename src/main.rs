mod report;
mod sieve;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "eratos")]
#[command(about = "Parallel Sieve of Eratosthenes with a summary report", long_about = None)]
struct Cli {
    #[arg(default_value_t = 100_000_000, help = "The upper limit to search for primes")]
    bound: usize,
    #[arg(
        short,
        long,
        default_value_t = 8,
        help = "Number of worker threads for the parallel sieve"
    )]
    workers: usize,
    #[arg(
        short,
        long,
        default_value_t = 10,
        help = "How many of the highest primes to include in the report"
    )]
    top: usize,
    #[arg(
        short,
        long,
        help = "Report file path (defaults to report.txt in the data directory)"
    )]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    println!(
        "Sieving primes up to {} with {} workers...",
        report::group_thousands(cli.bound as u64),
        cli.workers
    );

    let result = match sieve::compute_primes(cli.bound, cli.workers, cli.top) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let duration_us = result.elapsed.as_micros();
    println!(
        "Found {} primes in {}us ({:.2}ms)",
        report::group_thousands(result.prime_count as u64),
        duration_us,
        duration_us as f64 / 1000.0
    );

    match report::write_report(&result, cli.bound, cli.workers, cli.output.as_deref()) {
        Ok(path) => println!("Report written to {}", path.display()),
        Err(e) => {
            eprintln!("Error writing report: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if let Err(e) = report::log_execution(cli.bound, cli.workers, duration_us) {
        eprintln!("Warning: Failed to log execution: {}", e);
    }

    ExitCode::SUCCESS
}
