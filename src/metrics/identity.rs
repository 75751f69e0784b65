//! Identity co-occurrence bookkeeping for IDF1.

use std::collections::BTreeMap;

use nalgebra::DMatrix;

use crate::internal::optimize::maximum_weight_assignment;

/// How often identities were seen, alone and together, within one video.
///
/// A (gt, pred) pair co-occurs in a frame when both are present and their
/// distance is finite. Tables of different videos never share identities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityTable {
    gt_occurrences: BTreeMap<u32, u64>,
    pred_occurrences: BTreeMap<u32, u64>,
    co_occurrences: BTreeMap<(u32, u32), u64>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the identities of one frame.
    ///
    /// # Arguments
    /// * `gt_ids` - Ground truth identities present in the frame
    /// * `pred_ids` - Predicted identities present in the frame
    /// * `distances` - (gt x pred) matrix, non-finite for inadmissible pairs
    pub fn record_frame(&mut self, gt_ids: &[u32], pred_ids: &[u32], distances: &DMatrix<f64>) {
        for &gt in gt_ids {
            *self.gt_occurrences.entry(gt).or_insert(0) += 1;
        }
        for &pred in pred_ids {
            *self.pred_occurrences.entry(pred).or_insert(0) += 1;
        }
        for (i, &gt) in gt_ids.iter().enumerate() {
            for (j, &pred) in pred_ids.iter().enumerate() {
                if distances[(i, j)].is_finite() {
                    *self.co_occurrences.entry((gt, pred)).or_insert(0) += 1;
                }
            }
        }
    }

    /// Total number of ground truth occurrences.
    pub fn num_gt(&self) -> u64 {
        self.gt_occurrences.values().sum()
    }

    /// Total number of predicted occurrences.
    pub fn num_pred(&self) -> u64 {
        self.pred_occurrences.values().sum()
    }

    pub fn co_occurrence(&self, gt: u32, pred: u32) -> u64 {
        self.co_occurrences.get(&(gt, pred)).copied().unwrap_or(0)
    }

    /// Identity true positives under the best one-to-one identity mapping.
    ///
    /// Each gt identity is mapped to at most one predicted identity (and vice
    /// versa) so that the summed co-occurrence is maximal. Pairs that never
    /// co-occur weigh zero: they may be mapped but never add to the total.
    pub fn true_positives(&self) -> u64 {
        if self.co_occurrences.is_empty() {
            return 0;
        }

        let gts: Vec<u32> = self.gt_occurrences.keys().copied().collect();
        let preds: Vec<u32> = self.pred_occurrences.keys().copied().collect();
        let weights = DMatrix::from_fn(gts.len(), preds.len(), |i, j| {
            self.co_occurrence(gts[i], preds[j]) as f64
        });

        maximum_weight_assignment(&weights)
            .assignments
            .iter()
            .map(|a| self.co_occurrence(gts[a.row_idx], preds[a.col_idx]))
            .sum()
    }
}

/// Identity true positives of the union of several tables.
///
/// Tables come from different videos (or classes) and share no identity, so
/// the merged co-occurrence matrix is block diagonal and its global optimum is
/// the sum of the per-table optima.
pub fn merged_true_positives(tables: &[IdentityTable]) -> u64 {
    tables.iter().map(IdentityTable::true_positives).sum()
}
