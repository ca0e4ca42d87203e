use chrono::Local;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::sieve::SieveResult;

pub fn get_data_dir() -> PathBuf {
    let xdg_data_home = env::var("XDG_DATA_HOME")
        .ok()
        .and_then(|path| {
            if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            }
        })
        .or_else(|| {
            env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".local/share"))
        })
        .expect("Could not determine data directory");

    xdg_data_home.join("eratos")
}

/// Format an integer with comma thousands separators ("5,761,455").
/// Grouping is fixed en-US style; the report is not locale-aware.
pub fn group_thousands(value: u64) -> String {
    let mut itoa_buf = itoa::Buffer::new();
    let digits = itoa_buf.format(value);

    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out
}

/// Render the human-readable report body.
fn render_report(result: &SieveResult, bound: usize, workers: usize) -> String {
    let duration_us = result.elapsed.as_micros();

    let mut body = String::new();
    body.push_str("Prime sieve report\n");
    body.push_str(&format!("Bound: {}\n", group_thousands(bound as u64)));
    body.push_str(&format!("Workers: {}\n", workers));
    body.push_str(&format!(
        "Elapsed: {}us ({:.2}ms)\n",
        duration_us,
        duration_us as f64 / 1000.0
    ));
    body.push_str(&format!(
        "Prime count: {}\n",
        group_thousands(result.prime_count as u64)
    ));
    body.push_str(&format!(
        "Prime sum: {}\n",
        group_thousands(result.prime_sum)
    ));

    body.push_str(&format!("Top {} primes:\n", result.last_primes.len()));
    let mut itoa_buf = itoa::Buffer::new();
    for &prime in &result.last_primes {
        body.push_str(itoa_buf.format(prime));
        body.push('\n');
    }

    body
}

/// Write the report to `output`, or to report.txt in the data directory
/// when no path is given. Returns the path written.
pub fn write_report(
    result: &SieveResult,
    bound: usize,
    workers: usize,
    output: Option<&Path>,
) -> std::io::Result<PathBuf> {
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => {
            let data_dir = get_data_dir();
            fs::create_dir_all(&data_dir)?;
            data_dir.join("report.txt")
        }
    };

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)?;

    let mut writer = BufWriter::new(file);
    writer.write_all(render_report(result, bound, workers).as_bytes())?;
    writer.flush()?;

    Ok(path)
}

/// Append one run to execution_log.txt in the data directory.
pub fn log_execution(bound: usize, workers: usize, duration_us: u128) -> std::io::Result<()> {
    let data_dir = get_data_dir();
    fs::create_dir_all(&data_dir)?;

    let log_path = data_dir.join("execution_log.txt");
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");

    writeln!(
        file,
        "{} | sieve | bound={} | workers={} | {}us",
        timestamp, bound, workers, duration_us
    )?;

    Ok(())
}
