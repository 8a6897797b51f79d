mod analysis;
mod audio;
mod cli;
mod config;
mod error;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use analysis::report;
use audio::synth::{generate_tone, ToneSpec};
use cli::{AnalyzeArgs, Cli, Command, GenerateArgs};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => analyze(args),
        Command::Generate(args) => generate(args),
    }
}

fn analyze(args: AnalyzeArgs) -> Result<()> {
    // Config file: --config, ./specavg.toml or the user config dir
    let cfg = match config::discover(args.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(err) if args.config.is_some() => {
                return Err(err)
                    .with_context(|| format!("Failed to load config {}", path.display()));
            }
            Err(err) => {
                log::warn!("Ignoring config {}: {}", path.display(), err);
                config::Config::default()
            }
        },
        None => config::Config::default(),
    };

    // Validated before the input is touched
    let resolved = args.resolve(&cfg).context("Configuration error")?;
    let settings = &resolved.analysis;

    log::info!("specavg - spectral amplitude averaging");
    log::info!("Input: {}", args.input.display());
    log::info!(
        "Block: {}, hop: {}, threshold: {}, workers: {}",
        settings.block_size,
        settings.hop_size,
        settings.threshold,
        settings.workers
    );

    // 1. Decode
    log::info!("Decoding audio...");
    let audio = audio::decode::decode_audio(&args.input).context("Decode stage failed")?;

    // 2. Analyze
    let pb = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} blocks ({eta} remaining)",
                )
                .context("Invalid progress template")?
                .progress_chars("=>-"),
        );
        pb
    };

    log::info!(
        "Analyzing ({})...",
        if settings.is_parallel() { "parallel" } else { "sequential" }
    );
    let run = analysis::run(&audio, settings, &pb).context("Analysis stage failed")?;
    pb.finish_and_clear();

    if !run.is_complete() {
        log::warn!(
            "{} block(s) failed{}; reporting partial results",
            run.failures.len() - usize::from(run.timed_out()),
            if run.timed_out() { " and the worker pool timed out" } else { "" }
        );
    }
    if run.snapshot.is_empty() {
        if run.blocks_total == 0 {
            log::warn!(
                "No block of {} samples fits in {} decoded samples",
                settings.block_size,
                audio.samples.len()
            );
        } else {
            log::warn!("No block was aggregated");
        }
    }
    log::info!(
        "Aggregated {}/{} blocks into {} bins in {:.3}s",
        run.blocks_completed,
        run.blocks_total,
        run.snapshot.len(),
        run.elapsed.as_secs_f64()
    );

    // 3. Report
    let bins: Vec<_> = report(&run.snapshot, settings.threshold, resolved.order).collect();
    let stdout = std::io::stdout();
    output::write_report(&mut stdout.lock(), resolved.format, &bins, &run)
        .context("Failed to write report")?;

    Ok(())
}

fn generate(args: GenerateArgs) -> Result<()> {
    let spec = ToneSpec {
        duration_secs: args.duration,
        sample_rate: args.sample_rate,
        frequencies: args.frequencies,
    };
    generate_tone(&args.output, &spec)
        .with_context(|| format!("Failed to generate {}", args.output.display()))?;
    log::info!("Done! Output: {}", args.output.display());
    Ok(())
}
