//! Dataset-level evaluation: validation, parallel accumulation and result rows.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use super::accumulator::{ClassTally, TrackAccumulator};
use super::summary::{ClassMetric, Scores, METRIC_COLUMNS};
use crate::extract::{IdRegistry, ObjectExtractor};
use crate::label::{
    leaf_categories, parent_categories, sorted_frames, Config, Frame, ImageSize, Video,
};
use crate::matching::FrameMatcher;
use crate::{Error, Result};

/// Name of the row holding the unweighted mean over leaf classes.
pub const AVERAGE_ROW: &str = "AVERAGE";
/// Name of the row pooling the events of every leaf class.
pub const OVERALL_ROW: &str = "OVERALL";

/// Evaluation options.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOptions {
    /// Minimum IoU for a ground truth / prediction pair to be matchable.
    pub iou_threshold: f64,

    /// Minimum IoF for an unmatched prediction to be swallowed by an ignore region.
    pub ignore_iof_threshold: f64,

    /// Drop labels of unknown categories instead of failing.
    pub ignore_unknown_categories: bool,

    /// Size of the worker pool.
    pub num_workers: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self::new(0.5, 0.5)
    }
}

impl EvalOptions {
    /// Create options with the given thresholds.
    ///
    /// # Arguments
    /// * `iou_threshold` - Minimum IoU of a match
    /// * `ignore_iof_threshold` - IoF above which a false positive is ignored
    pub fn new(iou_threshold: f64, ignore_iof_threshold: f64) -> Self {
        Self {
            iou_threshold,
            ignore_iof_threshold,
            ignore_unknown_categories: false,
            num_workers: num_cpus::get(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(Error::Config(format!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.ignore_iof_threshold) {
            return Err(Error::Config(format!(
                "ignore_iof_threshold must be within [0, 1], got {}",
                self.ignore_iof_threshold
            )));
        }
        if self.num_workers == 0 {
            return Err(Error::Config("num_workers must be positive".to_string()));
        }
        Ok(())
    }
}

/// Evaluate tracking predictions against ground truth.
///
/// # Arguments
/// * `gts` - Ground truth videos
/// * `preds` - Predicted videos, aligned with `gts` video by video
/// * `config` - Category hierarchy and optional canvas size
/// * `options` - Thresholds, unknown-category policy and pool size
///
/// # Returns
/// Per-class, per-super-class, AVERAGE and OVERALL metrics.
pub fn evaluate(
    gts: &[Video],
    preds: &[Video],
    config: &Config,
    options: &EvalOptions,
) -> Result<EvalResult> {
    options.validate()?;
    check_alignment(gts, preds)?;

    let classes: Vec<String> = leaf_categories(&config.categories)
        .iter()
        .map(|c| c.name.clone())
        .collect();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.num_workers)
        .build()?;

    let start = Instant::now();
    log::info!(
        "Accumulating {} videos over {} classes on {} workers",
        gts.len(),
        classes.len(),
        options.num_workers
    );

    let per_video: Vec<Vec<ClassTally>> = pool.install(|| {
        gts.par_iter()
            .zip(preds.par_iter())
            .map(|(gt, pred)| accumulate_video(gt, pred, &classes, config.image_size, options))
            .collect::<Result<Vec<_>>>()
    })?;

    let mut tallies = vec![ClassTally::default(); classes.len()];
    for video in per_video {
        for (total, tally) in tallies.iter_mut().zip(video) {
            total.merge(tally);
        }
    }
    log::info!("Accumulation finished in {:.2?}", start.elapsed());

    let class_metrics: Vec<ClassMetric> = pool.install(|| {
        classes
            .par_iter()
            .zip(tallies.into_par_iter())
            .map(|(name, tally)| ClassMetric::compute(name.clone(), tally))
            .collect()
    });

    let super_classes: Vec<ClassMetric> = parent_categories(&config.categories)
        .into_iter()
        .map(|(parent, leaves)| {
            let parts = class_metrics
                .iter()
                .filter(|m| leaves.iter().any(|leaf| leaf.name == m.name));
            ClassMetric::merged(parent.name.clone(), parts)
        })
        .collect();

    let average = Scores::average(class_metrics.iter().map(|m| &m.scores));
    let overall = ClassMetric::merged(OVERALL_ROW, &class_metrics);
    log::info!("Evaluation finished in {:.2?}", start.elapsed());

    Ok(EvalResult {
        classes: class_metrics,
        super_classes,
        average,
        overall,
    })
}

/// Videos must pair up one to one with identical frame indices.
fn check_alignment(gts: &[Video], preds: &[Video]) -> Result<()> {
    if gts.len() != preds.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} ground truth videos but {} prediction videos",
            gts.len(),
            preds.len()
        )));
    }

    for (video, (gt, pred)) in gts.iter().zip(preds).enumerate() {
        let gt_indices: Vec<u32> = sorted_frames(gt).iter().map(|f| f.index()).collect();
        let pred_indices: Vec<u32> = sorted_frames(pred).iter().map(|f| f.index()).collect();
        if gt_indices != pred_indices {
            let name = gt
                .first()
                .and_then(|f| f.video_name.as_deref())
                .unwrap_or_default();
            return Err(Error::ShapeMismatch(format!(
                "video {} '{}': {} ground truth frames do not line up with {} prediction frames",
                video,
                name,
                gt_indices.len(),
                pred_indices.len()
            )));
        }
    }
    Ok(())
}

/// Run the per-class accumulators over one video.
///
/// Frames of both sides are visited in frame index order. The returned
/// tallies follow the order of `classes`.
pub fn accumulate_video(
    gt: &[Frame],
    pred: &[Frame],
    classes: &[String],
    image_size: Option<ImageSize>,
    options: &EvalOptions,
) -> Result<Vec<ClassTally>> {
    let extractor = ObjectExtractor::new(classes, options.ignore_unknown_categories, image_size);
    let matcher = FrameMatcher::new(options.iou_threshold, options.ignore_iof_threshold);
    let mut gt_ids = IdRegistry::new();
    let mut pred_ids = IdRegistry::new();
    let mut accumulators: Vec<TrackAccumulator> =
        classes.iter().map(|_| TrackAccumulator::new()).collect();

    for (gt_frame, pred_frame) in sorted_frames(gt).into_iter().zip(sorted_frames(pred)) {
        let index = gt_frame.index();
        let gt_objects = extractor.extract(gt_frame.labels(), index, &mut gt_ids)?;
        let pred_objects = extractor.extract(pred_frame.labels(), index, &mut pred_ids)?;

        for (class_index, accumulator) in accumulators.iter_mut().enumerate() {
            let gts = gt_objects.of_class(class_index);
            let preds = pred_objects.of_class(class_index);
            if let Some(problem) = matcher.match_frame(&gts, &preds, &gt_objects.ignore_regions)? {
                accumulator.update(index, &problem);
            }
        }
    }

    log::debug!(
        "Video {:?}: {} frames, {} gt tracks, {} predicted tracks",
        gt.first().and_then(|f| f.video_name.as_deref()),
        gt.len(),
        gt_ids.len(),
        pred_ids.len()
    );

    Ok(accumulators.into_iter().map(TrackAccumulator::finish).collect())
}

/// One line of the result table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub name: String,
    /// Values in [`METRIC_COLUMNS`] order.
    pub values: [f64; 10],
}

impl MetricRow {
    /// Value of a column by name.
    pub fn get(&self, column: &str) -> Option<f64> {
        METRIC_COLUMNS
            .iter()
            .position(|&c| c == column)
            .map(|i| self.values[i])
    }
}

/// Outcome of an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalResult {
    /// Leaf classes, in hierarchy order.
    pub classes: Vec<ClassMetric>,
    /// Non-leaf categories, in hierarchy order.
    pub super_classes: Vec<ClassMetric>,
    /// Unweighted mean over leaf classes.
    pub average: Scores,
    /// Pooled events of all leaf classes.
    pub overall: ClassMetric,
}

impl EvalResult {
    /// Table rows: leaf classes, super-classes, AVERAGE, OVERALL.
    pub fn rows(&self) -> Vec<MetricRow> {
        let mut rows: Vec<MetricRow> = self
            .classes
            .iter()
            .chain(&self.super_classes)
            .map(|m| MetricRow {
                name: m.name.clone(),
                values: m.scores.values(),
            })
            .collect();
        rows.push(MetricRow {
            name: AVERAGE_ROW.to_string(),
            values: self.average.values(),
        });
        rows.push(MetricRow {
            name: OVERALL_ROW.to_string(),
            values: self.overall.scores.values(),
        });
        rows
    }

    /// First row with the given name.
    pub fn row(&self, name: &str) -> Option<MetricRow> {
        self.rows().into_iter().find(|r| r.name == name)
    }

    /// Headline numbers: OVERALL columns plus `mIDF1`, `mMOTA`, `mMOTP` from AVERAGE.
    pub fn summary(&self) -> BTreeMap<String, f64> {
        let mut summary: BTreeMap<String, f64> = METRIC_COLUMNS
            .iter()
            .zip(self.overall.scores.values())
            .map(|(column, value)| (column.to_string(), value))
            .collect();

        let average = self.average.values();
        summary.insert("mMOTA".to_string(), average[0]);
        summary.insert("mMOTP".to_string(), average[1]);
        summary.insert("mIDF1".to_string(), average[2]);
        summary
    }

    /// Pretty-printed JSON export.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for EvalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<16}", "")?;
        for column in METRIC_COLUMNS {
            write!(f, "{:>8}", column)?;
        }
        writeln!(f)?;

        for row in self.rows() {
            write!(f, "{:<16}", row.name)?;
            for (i, value) in row.values.iter().enumerate() {
                if i < 3 {
                    write!(f, "{:>8.1}", value)?;
                } else {
                    write!(f, "{:>8}", *value as i64)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
