use rustfft::num_complex::Complex;

/// One `(frequency, amplitude)` reading taken from one block's spectrum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BinObservation {
    pub bin: usize,
    pub frequency: f64,
    pub amplitude: f64,
}

/// Physical frequency of `bin` for a transform of `block_size` samples.
pub fn bin_frequency(bin: usize, sample_rate: f64, block_size: usize) -> f64 {
    bin as f64 * sample_rate / block_size as f64
}

/// Maps the lower half of `spectrum` (the mirror half is dropped) to
/// frequencies and magnitudes scaled by `L/2`.
pub fn map_bins(
    spectrum: &[Complex<f64>],
    sample_rate: f64,
) -> impl Iterator<Item = BinObservation> + '_ {
    let len = spectrum.len();
    let half = len / 2;
    let scale = half as f64;
    spectrum[..half]
        .iter()
        .enumerate()
        .map(move |(bin, c)| BinObservation {
            bin,
            frequency: bin_frequency(bin, sample_rate, len),
            amplitude: c.norm() / scale,
        })
}
