//! Per-frame association problems: mask cost matrices and the ignore filter.

use nalgebra::DMatrix;

use crate::extract::Detection;
use crate::internal::optimize::linear_sum_assignment;
use crate::mask::{iof_matrix, iou_matrix, Mask};
use crate::Result;

/// Association problem of one class in one frame.
///
/// Rows of `distances` follow `gt_ids`, columns follow `pred_ids`. Entries are
/// `1 - IoU`, or infinite when the pair is not admissible.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMatch {
    pub gt_ids: Vec<u32>,
    pub pred_ids: Vec<u32>,
    pub distances: DMatrix<f64>,
}

/// Builds [`FrameMatch`]es from ground truth and predicted detections.
#[derive(Debug, Clone, Copy)]
pub struct FrameMatcher {
    /// Minimum IoU for a pair to be matchable.
    pub iou_threshold: f64,
    /// Minimum IoF for a false positive to be swallowed by an ignore region.
    pub ignore_iof_threshold: f64,
}

impl FrameMatcher {
    pub fn new(iou_threshold: f64, ignore_iof_threshold: f64) -> Self {
        Self {
            iou_threshold,
            ignore_iof_threshold,
        }
    }

    /// Build the association problem of one class in one frame.
    ///
    /// # Arguments
    /// * `gts` - Ground truth detections of the class
    /// * `preds` - Predicted detections of the class
    /// * `ignore_regions` - Crowd / ignored ground truth regions of the frame
    ///
    /// # Returns
    /// `None` when there is nothing to account for: no ground truth and no
    /// surviving prediction. An accumulator must not see such frames.
    pub fn match_frame(
        &self,
        gts: &[&Detection],
        preds: &[&Detection],
        ignore_regions: &[Mask],
    ) -> Result<Option<FrameMatch>> {
        if gts.is_empty() && preds.is_empty() {
            return Ok(None);
        }

        let distances = self.cost_matrix(gts, preds)?;
        let mut frame = FrameMatch {
            gt_ids: gts.iter().map(|d| d.track_id).collect(),
            pred_ids: preds.iter().map(|d| d.track_id).collect(),
            distances,
        };

        if !ignore_regions.is_empty() && !preds.is_empty() {
            let pred_masks: Vec<&Mask> = preds.iter().map(|d| &d.mask).collect();
            frame = filter_ignored(frame, &pred_masks, ignore_regions, self.ignore_iof_threshold)?;
        }

        if frame.distances.shape() == (0, 0) {
            return Ok(None);
        }
        Ok(Some(frame))
    }

    /// `1 - IoU` for every (gt, pred) pair, infinite above `1 - iou_threshold`.
    pub fn cost_matrix(&self, gts: &[&Detection], preds: &[&Detection]) -> Result<DMatrix<f64>> {
        let gt_masks: Vec<&Mask> = gts.iter().map(|d| &d.mask).collect();
        let pred_masks: Vec<&Mask> = preds.iter().map(|d| &d.mask).collect();
        let max_distance = 1.0 - self.iou_threshold;

        let ious = iou_matrix(&gt_masks, &pred_masks)?;
        Ok(ious.map(|iou| {
            let distance = 1.0 - iou;
            if distance > max_distance {
                f64::INFINITY
            } else {
                distance
            }
        }))
    }
}

/// Drop predictions that are false positives only because they cover an ignore region.
///
/// Ground truth and predictions are assigned first, so an ignore region can
/// never take away a legitimate match. Every prediction left without a finite
/// partner whose IoF with some region exceeds `iof_threshold` is removed,
/// together with its column of the cost matrix.
pub fn filter_ignored(
    frame: FrameMatch,
    pred_masks: &[&Mask],
    ignore_regions: &[Mask],
    iof_threshold: f64,
) -> Result<FrameMatch> {
    let assignment = linear_sum_assignment(&frame.distances);
    let mut matched = vec![false; frame.pred_ids.len()];
    for a in &assignment.assignments {
        matched[a.col_idx] = true;
    }

    let regions: Vec<&Mask> = ignore_regions.iter().collect();
    let iofs = iof_matrix(pred_masks, &regions)?;

    let keep: Vec<usize> = (0..frame.pred_ids.len())
        .filter(|&j| matched[j] || !iofs.row(j).iter().any(|&iof| iof > iof_threshold))
        .collect();
    if keep.len() == frame.pred_ids.len() {
        return Ok(frame);
    }

    log::trace!(
        "Ignore regions swallowed {} prediction(s)",
        frame.pred_ids.len() - keep.len()
    );
    Ok(FrameMatch {
        gt_ids: frame.gt_ids,
        pred_ids: keep.iter().map(|&j| frame.pred_ids[j]).collect(),
        distances: frame.distances.select_columns(keep.iter()),
    })
}
