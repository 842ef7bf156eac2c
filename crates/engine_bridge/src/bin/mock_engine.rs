//! Stand-in for the annotation engine, driven by environment variables.
//!
//! * `MOCK_ENGINE_MODE`: `echo` (default) answers `N:<line>`, `annotate` adds
//!   an `EFF` entry to the INFO column, `hang` never answers, `exit` exits
//!   with `MOCK_ENGINE_EXIT_CODE` on the first record, `flood` answers the
//!   first record with `MOCK_ENGINE_FLOOD` lines and ignores the rest.
//! * `MOCK_ENGINE_BANNER=1` interleaves comment and banner lines with answers.
//!
//! Header lines (starting with `#`) are echoed back like SnpEff does.
//! Command-line arguments are ignored.

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

const PEDIGREE_BANNER: &str = "Reading cancer samples pedigree from VCF header";
const MOCK_EFFECT: &str = "NON_SYNONYMOUS_CODING(MODERATE|MISSENSE|Gca/Aca|A12T|393|TP53|protein_coding|CODING|ENST00000269305|5|2-1)";

fn main() -> anyhow::Result<()> {
    let mode = env::var("MOCK_ENGINE_MODE").unwrap_or_else(|_| "echo".to_string());
    let banner = env::var("MOCK_ENGINE_BANNER").map(|v| v == "1").unwrap_or(false);
    let exit_code: i32 = env::var("MOCK_ENGINE_EXIT_CODE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let flood: usize = env::var("MOCK_ENGINE_FLOOD")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(300);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    eprintln!("mock engine started in {mode} mode");
    if banner {
        writeln!(out, "# mock engine 0.1")?;
        out.flush()?;
    }

    let mut seq = 0usize;
    for line in stdin.lock().lines() {
        let line = line?;
        if line.starts_with('#') {
            writeln!(out, "{line}")?;
            out.flush()?;
            continue;
        }

        seq += 1;
        eprintln!("processing record {seq}");

        if banner {
            writeln!(out, "{PEDIGREE_BANNER}")?;
            writeln!(out, "# record {seq}")?;
        }

        match mode.as_str() {
            "hang" => continue,
            "exit" => {
                eprintln!("mock engine exiting with {exit_code}");
                process::exit(exit_code);
            }
            "flood" => {
                if seq == 1 {
                    for i in 1..=flood {
                        writeln!(out, "flood-{i}")?;
                        out.flush()?;
                    }
                }
                continue;
            }
            "annotate" => writeln!(out, "{}", annotate(&line))?,
            _ => writeln!(out, "{seq}:{line}")?,
        }
        out.flush()?;
    }

    eprintln!("mock engine input closed after {seq} records");
    Ok(())
}

fn annotate(line: &str) -> String {
    let mut columns: Vec<String> = line.split('\t').map(str::to_string).collect();
    if columns.len() < 8 {
        return line.to_string();
    }
    columns[7] = if columns[7] == "." {
        format!("EFF={MOCK_EFFECT}")
    } else {
        format!("{};EFF={MOCK_EFFECT}", columns[7])
    };
    columns.join("\t")
}
