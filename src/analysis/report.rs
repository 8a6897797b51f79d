use serde::{Deserialize, Serialize};

use super::aggregate::{AggregateEntry, Snapshot};

/// Averaged amplitude of one frequency bin that cleared the threshold.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BinAverage {
    pub frequency: f64,
    #[serde(rename = "average_amplitude")]
    pub average: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportOrder {
    /// Ascending frequency.
    #[default]
    Frequency,
    /// Order in which each bin was first observed.
    Discovery,
}

/// Bins whose average amplitude is strictly above `threshold`.
pub fn report(
    snapshot: &Snapshot,
    threshold: f64,
    order: ReportOrder,
) -> impl Iterator<Item = BinAverage> + '_ {
    let mut entries: Vec<&AggregateEntry> = snapshot.entries().map(|(_, e)| e).collect();
    if order == ReportOrder::Discovery {
        entries.sort_by_key(|e| e.discovered);
    }
    entries.into_iter().filter_map(move |e| {
        let average = e.average();
        (average > threshold).then_some(BinAverage {
            frequency: e.frequency,
            average,
        })
    })
}
