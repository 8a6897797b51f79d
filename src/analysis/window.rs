use crate::error::{AnalysisError, AnalysisResult};

/// Start offsets `0, hop, 2*hop, ...` of every block that fits entirely
/// inside a signal of `len` samples.
///
/// Cloning restarts the sequence from the clone's current position.
#[derive(Clone, Debug)]
pub struct BlockOffsets {
    next: usize,
    last_start: Option<usize>,
    hop_size: usize,
}

impl BlockOffsets {
    pub fn new(len: usize, block_size: usize, hop_size: usize) -> AnalysisResult<Self> {
        if block_size == 0 {
            return Err(AnalysisError::invalid("block size must be positive"));
        }
        if hop_size == 0 {
            return Err(AnalysisError::invalid("hop size must be positive"));
        }
        Ok(Self {
            next: 0,
            last_start: len.checked_sub(block_size),
            hop_size,
        })
    }
}

impl Iterator for BlockOffsets {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let last = self.last_start?;
        if self.next > last {
            return None;
        }
        let offset = self.next;
        match offset.checked_add(self.hop_size) {
            Some(next) => self.next = next,
            None => self.last_start = None,
        }
        Some(offset)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = match self.last_start {
            Some(last) if self.next <= last => (last - self.next) / self.hop_size + 1,
            _ => 0,
        };
        (n, Some(n))
    }
}

impl ExactSizeIterator for BlockOffsets {}

/// Borrowed view of the block starting at `offset`.
pub fn block(samples: &[f64], offset: usize, block_size: usize) -> &[f64] {
    &samples[offset..offset + block_size]
}
