use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::{AnalysisConfig, ReportOrder};
use crate::audio::synth::DEFAULT_SAMPLE_RATE;
use crate::config::{self, Config};
use crate::error::{AnalysisError, AnalysisResult};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "specavg",
    about = "Average spectral amplitude per frequency bin of an audio file"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze an audio file and print bins above the threshold
    Analyze(AnalyzeArgs),
    /// Write a sine test tone WAV, one channel per frequency
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Input audio file (WAV, FLAC, MP3, OGG)
    pub input: PathBuf,

    /// Samples per block [default: 1024]
    #[arg(short, long, allow_negative_numbers = true)]
    pub block_size: Option<i64>,

    /// Samples between block starts [default: 512]
    #[arg(long, allow_negative_numbers = true)]
    pub hop_size: Option<i64>,

    /// Report bins whose average amplitude is above this [default: 0.01]
    #[arg(short, long, allow_negative_numbers = true)]
    pub threshold: Option<f64>,

    /// Worker threads; 1 runs sequentially unless --parallel is given [default: 1]
    #[arg(short = 'j', long, allow_negative_numbers = true)]
    pub threads: Option<i64>,

    /// Seconds to wait for the worker pool before reporting partial results [default: 60]
    #[arg(long, allow_negative_numbers = true)]
    pub timeout: Option<f64>,

    /// Use the worker pool (with its timeout) even for a single thread
    #[arg(long)]
    pub parallel: bool,

    /// Reject block sizes that are not a power of two
    #[arg(long)]
    pub power_of_two: bool,

    /// Output ordering [default: frequency]
    #[arg(long, value_enum)]
    pub order: Option<ReportOrder>,

    /// Output format [default: text]
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Config file (defaults to ./specavg.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Output WAV file
    #[arg(default_value = "output.wav")]
    pub output: PathBuf,

    /// Duration in seconds
    #[arg(short, long, default_value_t = 5.0)]
    pub duration: f64,

    /// Frequency per channel in Hz (comma-separated)
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub frequencies: Vec<f64>,

    /// Sample rate in Hz
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,
}

/// Everything `analyze` needs once CLI, config file and defaults are merged.
#[derive(Debug, PartialEq)]
pub struct ResolvedAnalyze {
    pub analysis: AnalysisConfig,
    pub order: ReportOrder,
    pub format: OutputFormat,
}

impl AnalyzeArgs {
    /// CLI values win over the config file, which wins over built-in defaults.
    pub fn resolve(&self, cfg: &Config) -> AnalysisResult<ResolvedAnalyze> {
        let a = &cfg.analysis;
        let timeout_secs = self
            .timeout
            .or(a.timeout_secs)
            .unwrap_or_else(config::default_timeout_secs);
        let timeout = Duration::try_from_secs_f64(timeout_secs).map_err(|_| {
            AnalysisError::invalid(format!("timeout must be non-negative, got {timeout_secs}"))
        })?;

        let analysis = AnalysisConfig::new(
            self.block_size.or(a.block_size).unwrap_or_else(config::default_block_size),
            self.hop_size.or(a.hop_size).unwrap_or_else(config::default_hop_size),
            self.threshold.or(a.threshold).unwrap_or_else(config::default_threshold),
            self.threads.or(a.threads).unwrap_or_else(config::default_threads),
            timeout,
        )?
        .with_power_of_two(self.power_of_two || a.power_of_two.unwrap_or(false))
        .with_parallel(self.parallel || a.parallel.unwrap_or(false));

        Ok(ResolvedAnalyze {
            analysis,
            order: self.order.or(cfg.output.order).unwrap_or_default(),
            format: self.format.or(cfg.output.format).unwrap_or_default(),
        })
    }
}
