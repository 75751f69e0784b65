//! Turn event tallies into CLEAR MOT and identity scores.

use serde::{Serialize, Serializer};

use super::accumulator::ClassTally;
use super::identity::merged_true_positives;

/// Names of the exported metric columns, in export order.
pub const METRIC_COLUMNS: [&str; 10] = [
    "MOTA", "MOTP", "IDF1", "FP", "FN", "IDSw", "MT", "PT", "ML", "FM",
];

/// Value exported for a metric that is undefined.
pub const UNDEFINED: f64 = -1.0;

fn serialize_score<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.unwrap_or(UNDEFINED))
}

/// Scores of one result row. Percentages are `None` when undefined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Scores {
    #[serde(rename = "MOTA", serialize_with = "serialize_score")]
    pub mota: Option<f64>,
    #[serde(rename = "MOTP", serialize_with = "serialize_score")]
    pub motp: Option<f64>,
    #[serde(rename = "IDF1", serialize_with = "serialize_score")]
    pub idf1: Option<f64>,
    #[serde(rename = "FP")]
    pub num_false_positives: u64,
    #[serde(rename = "FN")]
    pub num_misses: u64,
    #[serde(rename = "IDSw")]
    pub num_switches: u64,
    #[serde(rename = "MT")]
    pub mostly_tracked: u64,
    #[serde(rename = "PT")]
    pub partially_tracked: u64,
    #[serde(rename = "ML")]
    pub mostly_lost: u64,
    #[serde(rename = "FM")]
    pub num_fragmentations: u64,
}

impl Scores {
    /// Compute the scores of a tally.
    ///
    /// * MOTA = 100 * (1 - (FN + FP + IDSw) / num_gt), undefined without ground truth
    /// * MOTP = 100 * (1 - mean distance of matched pairs), undefined without matches
    /// * IDF1 = 100 * 2 * IDTP / (num_gt + num_pred), undefined when both are zero
    pub fn from_tally(tally: &ClassTally) -> Self {
        let c = &tally.counts;

        let mota = (c.num_objects > 0).then(|| {
            let errors = c.num_misses + c.num_false_positives + c.num_switches;
            100.0 * (1.0 - errors as f64 / c.num_objects as f64)
        });
        let motp = (c.num_matches > 0)
            .then(|| 100.0 * (1.0 - c.total_distance / c.num_matches as f64));
        let idf1 = (c.num_objects + c.num_predictions > 0).then(|| {
            let idtp = merged_true_positives(&tally.identities);
            100.0 * 2.0 * idtp as f64 / (c.num_objects + c.num_predictions) as f64
        });

        Self {
            mota,
            motp,
            idf1,
            num_false_positives: c.num_false_positives,
            num_misses: c.num_misses,
            num_switches: c.num_switches,
            mostly_tracked: c.mostly_tracked,
            partially_tracked: c.partially_tracked,
            mostly_lost: c.mostly_lost,
            num_fragmentations: c.num_fragmentations,
        }
    }

    /// Unweighted mean over classes.
    ///
    /// Percentages average the classes where they are defined, counts are summed.
    pub fn average<'a>(scores: impl IntoIterator<Item = &'a Scores>) -> Scores {
        let scores: Vec<&Scores> = scores.into_iter().collect();
        let mean = |get: fn(&Scores) -> Option<f64>| {
            let defined: Vec<f64> = scores.iter().filter_map(|s| get(s)).collect();
            (!defined.is_empty()).then(|| defined.iter().sum::<f64>() / defined.len() as f64)
        };

        Scores {
            mota: mean(|s| s.mota),
            motp: mean(|s| s.motp),
            idf1: mean(|s| s.idf1),
            num_false_positives: scores.iter().map(|s| s.num_false_positives).sum(),
            num_misses: scores.iter().map(|s| s.num_misses).sum(),
            num_switches: scores.iter().map(|s| s.num_switches).sum(),
            mostly_tracked: scores.iter().map(|s| s.mostly_tracked).sum(),
            partially_tracked: scores.iter().map(|s| s.partially_tracked).sum(),
            mostly_lost: scores.iter().map(|s| s.mostly_lost).sum(),
            num_fragmentations: scores.iter().map(|s| s.num_fragmentations).sum(),
        }
    }

    /// Values in [`METRIC_COLUMNS`] order, undefined percentages as [`UNDEFINED`].
    pub fn values(&self) -> [f64; 10] {
        [
            self.mota.unwrap_or(UNDEFINED),
            self.motp.unwrap_or(UNDEFINED),
            self.idf1.unwrap_or(UNDEFINED),
            self.num_false_positives as f64,
            self.num_misses as f64,
            self.num_switches as f64,
            self.mostly_tracked as f64,
            self.partially_tracked as f64,
            self.mostly_lost as f64,
            self.num_fragmentations as f64,
        ]
    }
}

/// Tally and scores of a class (or a union of classes).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetric {
    pub name: String,
    pub tally: ClassTally,
    pub scores: Scores,
}

impl ClassMetric {
    pub fn compute(name: impl Into<String>, tally: ClassTally) -> Self {
        let scores = Scores::from_tally(&tally);
        Self {
            name: name.into(),
            tally,
            scores,
        }
    }

    /// Pool the events of several classes and score the union.
    ///
    /// This is not the mean of the parts: classes with more ground truth weigh more.
    pub fn merged<'a>(
        name: impl Into<String>,
        parts: impl IntoIterator<Item = &'a ClassMetric>,
    ) -> Self {
        let tally = ClassTally::merged(parts.into_iter().map(|m| &m.tally));
        Self::compute(name, tally)
    }
}
