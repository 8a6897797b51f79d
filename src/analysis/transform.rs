use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::{AnalysisError, AnalysisResult};

pub type Spectrum = Vec<Complex<f64>>;

/// Forward DFT of fixed-length real blocks.
///
/// The plan is built once and shared; [`transform`](Self::transform) takes
/// `&self` and allocates its own buffer, so one transformer can be used from
/// any number of worker threads at once.
#[derive(Clone)]
pub struct SpectralTransformer {
    fft: Arc<dyn Fft<f64>>,
    block_size: usize,
}

impl SpectralTransformer {
    /// Plans the transform after [`check_block_size`](Self::check_block_size).
    pub fn new(block_size: usize, power_of_two: bool) -> AnalysisResult<Self> {
        Self::check_block_size(block_size, power_of_two)?;

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(block_size);
        log::debug!("Planned forward FFT of length {}", block_size);

        Ok(Self { fft, block_size })
    }

    /// Size checks that need no plan. `power_of_two` rejects sizes a radix-2
    /// transform could not handle instead of padding them.
    pub fn check_block_size(block_size: usize, power_of_two: bool) -> AnalysisResult<()> {
        if block_size == 0 {
            return Err(AnalysisError::UnsupportedBlockSize {
                size: block_size,
                reason: "block size must be positive".into(),
            });
        }
        if power_of_two && !block_size.is_power_of_two() {
            return Err(AnalysisError::UnsupportedBlockSize {
                size: block_size,
                reason: "power-of-two block size required".into(),
            });
        }
        Ok(())
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// `spectrum[k] = sum_n block[n] * e^(-2*pi*i*k*n/L)`, unnormalized.
    pub fn transform(&self, block: &[f64]) -> AnalysisResult<Spectrum> {
        if block.len() != self.block_size {
            return Err(AnalysisError::UnsupportedBlockSize {
                size: block.len(),
                reason: format!("transformer was planned for {} samples", self.block_size),
            });
        }
        if let Some(index) = block.iter().position(|s| !s.is_finite()) {
            return Err(AnalysisError::NonFiniteSample { index });
        }

        let mut buffer: Spectrum = block.iter().map(|&s| Complex::new(s, 0.0)).collect();
        self.fft.process(&mut buffer);
        Ok(buffer)
    }
}

impl std::fmt::Debug for SpectralTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralTransformer")
            .field("block_size", &self.block_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(len: usize, cycles: f64) -> Vec<f64> {
        (0..len)
            .map(|n| (2.0 * PI * cycles * n as f64 / len as f64).sin())
            .collect()
    }

    /// Direct O(n^2) evaluation of the transform definition.
    fn naive_dft(block: &[f64]) -> Spectrum {
        let len = block.len();
        (0..len)
            .map(|k| {
                block
                    .iter()
                    .enumerate()
                    .map(|(n, &x)| {
                        let angle = -2.0 * PI * (k * n) as f64 / len as f64;
                        Complex::new(x * angle.cos(), x * angle.sin())
                    })
                    .sum()
            })
            .collect()
    }

    #[test]
    fn matches_definition() {
        let block = [0.5, -0.25, 1.0, 0.0, -1.0, 0.75, 0.125, -0.5, 0.3, 0.2, -0.1, 0.9];
        let fast = SpectralTransformer::new(block.len(), false)
            .unwrap()
            .transform(&block)
            .unwrap();
        let slow = naive_dft(&block);
        assert_eq!(fast.len(), block.len());
        for (a, b) in fast.iter().zip(&slow) {
            assert!((a - b).norm() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn transform_is_deterministic() {
        let block = sine(256, 7.0);
        let t = SpectralTransformer::new(256, true).unwrap();
        let first = t.transform(&block).unwrap();
        let second = t.transform(&block).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn pure_tone_peaks_at_its_bin() {
        let len = 512;
        let k = 37;
        let spectrum = SpectralTransformer::new(len, true)
            .unwrap()
            .transform(&sine(len, k as f64))
            .unwrap();

        let peak = spectrum[k].norm();
        assert!((peak - len as f64 / 2.0).abs() < 1e-6);
        for (j, c) in spectrum[..len / 2].iter().enumerate() {
            if j != k {
                assert!(c.norm() < 1e-6 * peak, "bin {j} = {}", c.norm());
            }
        }
    }

    #[test]
    fn concurrent_use_is_consistent() {
        let t = SpectralTransformer::new(128, true).unwrap();
        let block = sine(128, 5.0);
        let expected = t.transform(&block).unwrap();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| assert_eq!(t.transform(&block).unwrap(), expected));
            }
        });
    }

    #[test]
    fn non_power_of_two_is_rejected_when_required() {
        assert!(SpectralTransformer::new(1000, false).is_ok());
        assert!(matches!(
            SpectralTransformer::new(1000, true),
            Err(AnalysisError::UnsupportedBlockSize { size: 1000, .. })
        ));
    }

    #[test]
    fn size_check_does_not_plan() {
        // Planning this length would need gigabytes of twiddle factors.
        assert!(SpectralTransformer::check_block_size(1 << 45, true).is_ok());
        assert!(matches!(
            SpectralTransformer::check_block_size((1 << 45) + 1, true),
            Err(AnalysisError::UnsupportedBlockSize { .. })
        ));
    }

    #[test]
    fn wrong_block_length_is_rejected() {
        let t = SpectralTransformer::new(8, true).unwrap();
        assert!(matches!(
            t.transform(&[0.0; 4]),
            Err(AnalysisError::UnsupportedBlockSize { size: 4, .. })
        ));
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let t = SpectralTransformer::new(4, true).unwrap();
        assert_eq!(
            t.transform(&[0.0, 1.0, f64::NAN, 0.0]),
            Err(AnalysisError::NonFiniteSample { index: 2 })
        );
    }
}
