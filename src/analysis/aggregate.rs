use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::bins::BinObservation;

/// Running amplitude total for one frequency bin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AggregateEntry {
    pub frequency: f64,
    pub sum: f64,
    pub count: u64,
    /// Creation order of the entry within its run.
    pub discovered: u64,
}

impl AggregateEntry {
    fn first(obs: &BinObservation, discovered: u64) -> Self {
        Self {
            frequency: obs.frequency,
            sum: obs.amplitude,
            count: 1,
            discovered,
        }
    }

    pub fn average(&self) -> f64 {
        self.sum / self.count as f64
    }

    /// Pointwise combination; keeps the earlier discovery.
    #[cfg(test)]
    pub fn merge(self, other: Self) -> Self {
        Self {
            frequency: self.frequency,
            sum: self.sum + other.sum,
            count: self.count + other.count,
            discovered: self.discovered.min(other.discovered),
        }
    }
}

/// Concurrent per-bin accumulator.
///
/// Entries are keyed by bin index. Within one run the frequency is a pure
/// function of the bin (sample rate and block size are fixed), so this is
/// the same grouping as keying by the derived frequency. An entry's `sum`
/// and `count` are updated under one shard lock, so readers never see half
/// of an observation.
#[derive(Debug, Default)]
pub struct Aggregator {
    entries: DashMap<usize, AggregateEntry>,
    discovered: AtomicU64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, obs: &BinObservation) {
        self.entries
            .entry(obs.bin)
            .and_modify(|e| {
                debug_assert_eq!(e.frequency.to_bits(), obs.frequency.to_bits());
                e.sum += obs.amplitude;
                e.count += 1;
            })
            .or_insert_with(|| {
                AggregateEntry::first(obs, self.discovered.fetch_add(1, Ordering::Relaxed))
            });
    }

    pub fn observe_all<'a>(&self, observations: impl IntoIterator<Item = &'a BinObservation>) {
        for obs in observations {
            self.observe(obs);
        }
    }

    /// Copies out every entry. Intended for after all `observe` calls have
    /// returned; if workers are still running each entry is still whole.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self
                .entries
                .iter()
                .map(|e| (*e.key(), *e.value()))
                .collect(),
        }
    }
}

/// Frozen aggregate state, ordered by bin (and therefore by frequency).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    entries: BTreeMap<usize, AggregateEntry>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, bin: usize) -> Option<&AggregateEntry> {
        self.entries.get(&bin)
    }

    pub fn entries(&self) -> impl Iterator<Item = (usize, &AggregateEntry)> + '_ {
        self.entries.iter().map(|(bin, e)| (*bin, e))
    }

    /// Folds `other` into `self` bin by bin.
    #[cfg(test)]
    pub fn merge(mut self, other: Snapshot) -> Snapshot {
        for (bin, entry) in other.entries {
            self.entries
                .entry(bin)
                .and_modify(|e| *e = e.merge(entry))
                .or_insert(entry);
        }
        self
    }
}

impl FromIterator<(usize, AggregateEntry)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (usize, AggregateEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
