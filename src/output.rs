use std::io::Write;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisRun, BinAverage};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One line per bin, then the elapsed time
    #[default]
    Text,
    /// A single JSON document with bins and run summary
    Json,
    /// `frequency,average_amplitude` rows
    Csv,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    bins: &'a [BinAverage],
    blocks_total: usize,
    blocks_completed: usize,
    complete: bool,
    failures: Vec<String>,
    elapsed_secs: f64,
}

pub fn write_report<W: Write>(
    out: &mut W,
    format: OutputFormat,
    bins: &[BinAverage],
    run: &AnalysisRun,
) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for bin in bins {
                writeln!(
                    out,
                    "Frequency: {} Hz, average amplitude: {}",
                    bin.frequency, bin.average
                )?;
            }
            if !run.is_complete() {
                writeln!(
                    out,
                    "Warning: {} of {} blocks aggregated, analysis may be incomplete.",
                    run.blocks_completed, run.blocks_total
                )?;
            }
            writeln!(out, "Analysis took {} seconds.", run.elapsed.as_secs_f64())?;
        }
        OutputFormat::Json => {
            let report = JsonReport {
                bins,
                blocks_total: run.blocks_total,
                blocks_completed: run.blocks_completed,
                complete: run.is_complete(),
                failures: run.failures.iter().map(|f| f.to_string()).collect(),
                elapsed_secs: run.elapsed.as_secs_f64(),
            };
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => {
            writeln!(out, "frequency,average_amplitude")?;
            for bin in bins {
                writeln!(out, "{},{}", bin.frequency, bin.average)?;
            }
        }
    }
    Ok(())
}
