use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::RecvTimeoutError;
use indicatif::ProgressBar;
use parking_lot::RwLock;

use super::aggregate::Aggregator;
use super::bins::{map_bins, BinObservation};
use super::transform::SpectralTransformer;
use super::window::{self, BlockOffsets};
use super::{AnalysisConfig, AnalysisRun};
use crate::audio::decode::AudioData;
use crate::error::{AnalysisError, AnalysisResult};

/// Picks the sequential or parallel scheduler from `config.workers` and
/// `config.parallel`.
pub fn run(
    audio: &AudioData,
    config: &AnalysisConfig,
    progress: &ProgressBar,
) -> AnalysisResult<AnalysisRun> {
    if config.is_parallel() {
        run_parallel(audio, config, progress)
    } else {
        run_sequential(audio, config, progress)
    }
}

/// Transform one block and map its spectrum. Nothing is aggregated here, so
/// a failing block contributes no observations at all.
fn analyze_block(
    samples: &[f64],
    offset: usize,
    transformer: &SpectralTransformer,
    sample_rate: f64,
) -> AnalysisResult<Vec<BinObservation>> {
    let block = window::block(samples, offset, transformer.block_size());
    let spectrum = transformer.transform(block)?;
    Ok(map_bins(&spectrum, sample_rate).collect())
}

/// Validates the block size and plans the transform. Returns `None` when no
/// block fits the signal; the plan is never built in that case, since its
/// size grows with the block and not with the input.
fn prepare(
    audio: &AudioData,
    config: &AnalysisConfig,
) -> AnalysisResult<Option<(SpectralTransformer, BlockOffsets)>> {
    SpectralTransformer::check_block_size(config.block_size, config.power_of_two)?;
    let offsets = BlockOffsets::new(audio.samples.len(), config.block_size, config.hop_size)?;
    log::info!(
        "{} blocks of {} samples, hop {} ({:.2} Hz per bin)",
        offsets.len(),
        config.block_size,
        config.hop_size,
        audio.sample_rate / config.block_size as f64
    );
    if offsets.len() == 0 {
        return Ok(None);
    }
    let transformer = SpectralTransformer::new(config.block_size, config.power_of_two)?;
    Ok(Some((transformer, offsets)))
}

fn empty_run(started: Instant) -> AnalysisRun {
    AnalysisRun {
        snapshot: Aggregator::new().snapshot(),
        blocks_total: 0,
        blocks_completed: 0,
        failures: Vec::new(),
        elapsed: started.elapsed(),
    }
}

pub fn run_sequential(
    audio: &AudioData,
    config: &AnalysisConfig,
    progress: &ProgressBar,
) -> AnalysisResult<AnalysisRun> {
    let started = Instant::now();
    let Some((transformer, offsets)) = prepare(audio, config)? else {
        return Ok(empty_run(started));
    };
    let blocks_total = offsets.len();
    progress.set_length(blocks_total as u64);

    let aggregator = Aggregator::new();
    let mut blocks_completed = 0;
    let mut failures = Vec::new();

    for offset in offsets {
        match analyze_block(&audio.samples, offset, &transformer, audio.sample_rate) {
            Ok(observations) => {
                aggregator.observe_all(&observations);
                blocks_completed += 1;
            }
            Err(e) => {
                log::warn!("Skipping block at offset {}: {}", offset, e);
                failures.push(AnalysisError::TaskFailed {
                    offset,
                    reason: e.to_string(),
                });
            }
        }
        progress.inc(1);
    }

    Ok(AnalysisRun {
        snapshot: aggregator.snapshot(),
        blocks_total,
        blocks_completed,
        failures,
        elapsed: started.elapsed(),
    })
}

enum BlockOutcome {
    Done,
    Failed(AnalysisError),
}

/// One task per block on a pool of `config.workers` threads, joined with a
/// deadline of `config.timeout`.
///
/// If the deadline passes, blocks that have not been committed are cancelled
/// and whatever has been aggregated so far is returned along with a
/// [`AnalysisError::TaskTimeout`] failure: the analysis may be incomplete.
/// A block's observations and its `completed` tick are committed together
/// under `commit`, so the returned snapshot holds exactly
/// `blocks_completed` whole blocks.
pub fn run_parallel(
    audio: &AudioData,
    config: &AnalysisConfig,
    progress: &ProgressBar,
) -> AnalysisResult<AnalysisRun> {
    let started = Instant::now();
    let Some((transformer, offsets)) = prepare(audio, config)? else {
        return Ok(empty_run(started));
    };
    let blocks_total = offsets.len();
    progress.set_length(blocks_total as u64);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .thread_name(|i| format!("specavg-worker-{i}"))
        .build()
        .map_err(|e| AnalysisError::WorkerPool(e.to_string()))?;
    log::debug!("Worker pool started with {} threads", config.workers);

    let aggregator = Arc::new(Aggregator::new());
    let cancelled = Arc::new(AtomicBool::new(false));
    let completed = Arc::new(AtomicUsize::new(0));
    let commit = Arc::new(RwLock::new(()));
    let (tx, rx) = crossbeam_channel::unbounded::<BlockOutcome>();
    let sample_rate = audio.sample_rate;

    for offset in offsets {
        let samples = Arc::clone(&audio.samples);
        let transformer = transformer.clone();
        let aggregator = Arc::clone(&aggregator);
        let cancelled = Arc::clone(&cancelled);
        let completed = Arc::clone(&completed);
        let commit = Arc::clone(&commit);
        let tx = tx.clone();

        pool.spawn(move || {
            if cancelled.load(Ordering::Acquire) {
                return;
            }
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                analyze_block(&samples, offset, &transformer, sample_rate)
            }));
            let outcome = match result {
                Ok(Ok(observations)) => {
                    let _commit = commit.read();
                    if cancelled.load(Ordering::Acquire) {
                        return;
                    }
                    aggregator.observe_all(&observations);
                    completed.fetch_add(1, Ordering::AcqRel);
                    BlockOutcome::Done
                }
                Ok(Err(e)) => BlockOutcome::Failed(AnalysisError::TaskFailed {
                    offset,
                    reason: e.to_string(),
                }),
                Err(payload) => BlockOutcome::Failed(AnalysisError::TaskFailed {
                    offset,
                    reason: panic_message(payload.as_ref()),
                }),
            };
            // The receiver is gone once the deadline has passed.
            let _ = tx.send(outcome);
        });
    }
    drop(tx);

    let deadline = Instant::now() + config.timeout;
    let mut finished = 0;
    let mut failures = Vec::new();
    let mut timed_out = false;

    while finished < blocks_total {
        if Instant::now() >= deadline {
            timed_out = true;
            break;
        }
        match rx.recv_deadline(deadline) {
            Ok(BlockOutcome::Done) => {}
            Ok(BlockOutcome::Failed(e)) => {
                log::warn!("{}", e);
                failures.push(e);
            }
            Err(RecvTimeoutError::Timeout) => {
                timed_out = true;
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
        finished += 1;
        progress.inc(1);
    }

    if timed_out {
        cancelled.store(true, Ordering::Release);
    }
    let (snapshot, blocks_completed) = {
        // Waits out in-flight commits; later ones see `cancelled` and skip.
        let _commit = commit.write();
        (aggregator.snapshot(), completed.load(Ordering::Acquire))
    };

    if timed_out {
        let timeout = AnalysisError::TaskTimeout {
            timeout: config.timeout,
            completed: blocks_completed,
            total: blocks_total,
        };
        log::warn!("{}; analysis may be incomplete", timeout);
        failures.push(timeout);
    }

    Ok(AnalysisRun {
        snapshot,
        blocks_total,
        blocks_completed,
        failures,
        elapsed: started.elapsed(),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregate::Snapshot;
    use crate::analysis::{report, ReportOrder, DEFAULT_TIMEOUT};
    use std::f64::consts::PI;
    use std::time::Duration;

    const RATE: f64 = 8000.0;

    /// Two tones plus a deterministic wobble so every bin gets energy.
    fn test_signal(len: usize) -> AudioData {
        let samples = (0..len)
            .map(|i| {
                let t = i as f64 / RATE;
                0.5 * (2.0 * PI * 500.0 * t).sin()
                    + 0.25 * (2.0 * PI * 1250.0 * t).sin()
                    + 0.05 * ((i * i % 97) as f64 / 97.0 - 0.5)
            })
            .collect();
        AudioData::new(samples, RATE)
    }

    fn config(block: i64, hop: i64, workers: i64) -> AnalysisConfig {
        AnalysisConfig::new(block, hop, 0.0, workers, DEFAULT_TIMEOUT).unwrap()
    }

    fn hidden() -> ProgressBar {
        ProgressBar::hidden()
    }

    fn assert_equivalent(a: &Snapshot, b: &Snapshot) {
        assert_eq!(a.len(), b.len());
        for (bin, ea) in a.entries() {
            let eb = b.get(bin).unwrap_or_else(|| panic!("bin {bin} missing"));
            assert_eq!(ea.frequency.to_bits(), eb.frequency.to_bits());
            assert_eq!(ea.count, eb.count);
            let (x, y) = (ea.average(), eb.average());
            assert!(
                (x - y).abs() <= 1e-9 * x.abs().max(y.abs()).max(f64::MIN_POSITIVE),
                "bin {bin}: {x} vs {y}"
            );
        }
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let audio = test_signal(20_000);
        let seq = run_sequential(&audio, &config(256, 100, 1), &hidden()).unwrap();
        let par = run_parallel(&audio, &config(256, 100, 4), &hidden()).unwrap();

        assert!(seq.is_complete());
        assert!(par.is_complete());
        assert_eq!(seq.blocks_total, par.blocks_total);
        assert_eq!(seq.blocks_completed, par.blocks_completed);
        assert_eq!(seq.snapshot.len(), 128);
        assert_equivalent(&seq.snapshot, &par.snapshot);
    }

    #[test]
    fn every_bin_counts_every_block() {
        let audio = test_signal(1000);
        let run = run_sequential(&audio, &config(64, 32, 1), &hidden()).unwrap();
        // offsets 0, 32, ..., 928
        assert_eq!(run.blocks_total, 30);
        assert!(run.snapshot.entries().all(|(_, e)| e.count == 30));
    }

    #[test]
    fn tone_bins_dominate_the_average() {
        let audio = test_signal(16_384);
        let run = run_parallel(&audio, &config(512, 256, 3), &hidden()).unwrap();
        // 500 Hz and 1250 Hz land on bins 32 and 80 at 8 kHz / 512.
        let loud: Vec<f64> = report(&run.snapshot, 0.1, ReportOrder::Frequency)
            .map(|b| b.frequency)
            .collect();
        assert_eq!(loud, vec![500.0, 1250.0]);
    }

    #[test]
    fn block_longer_than_signal_yields_empty_snapshot() {
        let audio = test_signal(100);
        for workers in [1, 4] {
            let run = run(&audio, &config(128, 16, workers), &hidden()).unwrap();
            assert_eq!(run.blocks_total, 0);
            assert!(run.snapshot.is_empty());
            assert!(run.is_complete());
            assert_eq!(report(&run.snapshot, f64::MIN, ReportOrder::Frequency).count(), 0);
        }
    }

    #[test]
    fn failed_blocks_are_omitted_not_fatal() {
        let mut samples = test_signal(2048).samples.to_vec();
        samples[300] = f64::NAN;
        let audio = AudioData::new(samples, RATE);

        let seq = run_sequential(&audio, &config(256, 256, 1), &hidden()).unwrap();
        let par = run_parallel(&audio, &config(256, 256, 4), &hidden()).unwrap();

        for run in [&seq, &par] {
            assert_eq!(run.blocks_total, 8);
            assert_eq!(run.blocks_completed, 7);
            assert!(!run.is_complete());
            assert_eq!(
                run.failures,
                vec![AnalysisError::TaskFailed {
                    offset: 256,
                    reason: "non-finite sample at index 44 of block".into(),
                }]
            );
            assert!(run.snapshot.entries().all(|(_, e)| e.count == 7));
        }
        assert_equivalent(&seq.snapshot, &par.snapshot);
    }

    #[test]
    fn zero_timeout_reports_partial_results() {
        let audio = test_signal(200_000);
        let mut cfg = config(256, 64, 1);
        cfg.workers = 2;
        cfg.timeout = Duration::ZERO;

        let run = run_parallel(&audio, &cfg, &hidden()).unwrap();
        assert!(run.timed_out());
        assert!(!run.is_complete());
        assert!(run.blocks_completed <= run.blocks_total);
        assert!(matches!(
            run.failures.last(),
            Some(AnalysisError::TaskTimeout { total, .. }) if *total == run.blocks_total
        ));
        for (_, e) in run.snapshot.entries() {
            assert_eq!(e.count, run.blocks_completed as u64);
            assert!(e.average().is_finite());
        }
    }

    #[test]
    fn huge_block_on_short_input_is_empty_without_planning() {
        let audio = test_signal(100);
        for workers in [1, 4] {
            let cfg = config(1 << 45, 1, workers);
            let seq = run_sequential(&audio, &cfg, &hidden()).unwrap();
            let par = run_parallel(&audio, &cfg, &hidden()).unwrap();
            for run in [seq, par] {
                assert_eq!(run.blocks_total, 0);
                assert!(run.snapshot.is_empty());
                assert!(run.is_complete());
            }
        }
    }

    #[test]
    fn size_requirement_holds_even_when_no_block_fits() {
        let audio = test_signal(100);
        let cfg = config(1000, 500, 2).with_power_of_two(true);
        assert!(matches!(
            run_parallel(&audio, &cfg, &hidden()),
            Err(AnalysisError::UnsupportedBlockSize { size: 1000, .. })
        ));
        assert!(matches!(
            run_sequential(&audio, &cfg, &hidden()),
            Err(AnalysisError::UnsupportedBlockSize { size: 1000, .. })
        ));
    }

    #[test]
    fn power_of_two_requirement_fails_before_any_block() {
        let audio = test_signal(4096);
        let cfg = config(1000, 500, 1).with_power_of_two(true);
        assert!(matches!(
            run(&audio, &cfg, &hidden()),
            Err(AnalysisError::UnsupportedBlockSize { size: 1000, .. })
        ));
    }

    #[test]
    fn parallel_flag_uses_pool_with_one_worker() {
        let audio = test_signal(50_000);
        let mut cfg = config(256, 64, 1);
        cfg.timeout = Duration::ZERO;

        let sequential = run(&audio, &cfg, &hidden()).unwrap();
        assert!(sequential.is_complete());

        let pooled = run(&audio, &cfg.clone().with_parallel(true), &hidden()).unwrap();
        assert!(pooled.timed_out());
    }

    #[test]
    fn progress_tracks_blocks() {
        let audio = test_signal(4096);
        let bar = hidden();
        run_parallel(&audio, &config(512, 512, 2), &bar).unwrap();
        assert_eq!(bar.length(), Some(8));
        assert_eq!(bar.position(), 8);
    }

    #[test]
    fn panic_payloads_are_described() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "panicked: boom");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "panicked");
    }
}
