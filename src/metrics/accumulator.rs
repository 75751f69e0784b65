//! CLEAR MOT event accumulation for one class of one video.

use std::collections::BTreeMap;

use nalgebra::DMatrix;
use serde::Serialize;

use super::identity::IdentityTable;
use crate::internal::optimize::linear_sum_assignment;
use crate::matching::FrameMatch;

/// A single MOT event.
#[derive(Debug, Clone, PartialEq)]
pub struct MOTEvent {
    /// Frame index
    pub frame: u32,
    /// Event type
    pub event_type: MOTEventType,
    /// Ground truth identity (if applicable)
    pub gt_id: Option<u32>,
    /// Predicted identity (if applicable)
    pub pred_id: Option<u32>,
    /// Distance of the matched pair (if applicable)
    pub distance: Option<f64>,
}

/// Types of MOT events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MOTEventType {
    /// Pair matched to the same prediction as last time (or first match)
    Match,
    /// Pair matched, but the ground truth was last matched to another prediction
    Switch,
    /// Ground truth without prediction
    Miss,
    /// Prediction without ground truth
    FalsePositive,
    /// Ground truth tracked again after being lost
    Fragmentation,
}

/// Event totals of a class, ready to be merged across videos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EventCounts {
    pub num_frames: u64,
    pub num_objects: u64,
    pub num_predictions: u64,
    pub num_matches: u64,
    pub num_switches: u64,
    pub num_misses: u64,
    pub num_false_positives: u64,
    pub num_fragmentations: u64,
    /// Sum of `1 - IoU` over matched pairs.
    pub total_distance: f64,
    pub mostly_tracked: u64,
    pub partially_tracked: u64,
    pub mostly_lost: u64,
}

impl EventCounts {
    pub fn merge(&mut self, other: &EventCounts) {
        self.num_frames += other.num_frames;
        self.num_objects += other.num_objects;
        self.num_predictions += other.num_predictions;
        self.num_matches += other.num_matches;
        self.num_switches += other.num_switches;
        self.num_misses += other.num_misses;
        self.num_false_positives += other.num_false_positives;
        self.num_fragmentations += other.num_fragmentations;
        self.total_distance += other.total_distance;
        self.mostly_tracked += other.mostly_tracked;
        self.partially_tracked += other.partially_tracked;
        self.mostly_lost += other.mostly_lost;
    }
}

/// Everything a class needs to compute its metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassTally {
    #[serde(flatten)]
    pub counts: EventCounts,
    /// One co-occurrence table per accumulated video.
    #[serde(skip)]
    pub identities: Vec<IdentityTable>,
}

impl ClassTally {
    pub fn merge(&mut self, other: ClassTally) {
        self.counts.merge(&other.counts);
        self.identities.extend(other.identities);
    }

    /// Union of several tallies.
    pub fn merged<'a>(tallies: impl IntoIterator<Item = &'a ClassTally>) -> ClassTally {
        let mut total = ClassTally::default();
        for tally in tallies {
            total.merge(tally.clone());
        }
        total
    }
}

/// Coverage classification of a ground truth trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    /// Matched in at least 80% of its frames
    MostlyTracked,
    PartiallyTracked,
    /// Matched in at most 20% of its frames
    MostlyLost,
}

/// History of one ground truth identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityTrack {
    pub frames_present: u64,
    pub frames_matched: u64,
    /// Prediction of the most recent match.
    pub last_pred: Option<u32>,
    /// Missed since it was last matched.
    interrupted: bool,
}

impl IdentityTrack {
    /// Record a match. Returns `(switched, fragmented)`.
    fn record_match(&mut self, pred_id: u32) -> (bool, bool) {
        self.frames_present += 1;
        self.frames_matched += 1;

        let switched = matches!(self.last_pred, Some(prev) if prev != pred_id);
        let fragmented = self.interrupted;

        self.interrupted = false;
        self.last_pred = Some(pred_id);
        (switched, fragmented)
    }

    fn record_miss(&mut self) {
        self.frames_present += 1;
        if self.last_pred.is_some() {
            self.interrupted = true;
        }
    }

    pub fn status(&self) -> TrackStatus {
        // Integer form of matched / present >= 0.8 and <= 0.2
        if self.frames_matched * 5 >= self.frames_present * 4 {
            TrackStatus::MostlyTracked
        } else if self.frames_matched * 5 <= self.frames_present {
            TrackStatus::MostlyLost
        } else {
            TrackStatus::PartiallyTracked
        }
    }
}

/// Accumulator for CLEAR MOT events of one class in one video.
///
/// Frames must be fed in increasing frame order. Frames with neither ground
/// truth nor predictions must not be fed at all.
#[derive(Debug, Default)]
pub struct TrackAccumulator {
    counts: EventCounts,
    tracks: BTreeMap<u32, IdentityTrack>,
    identities: IdentityTable,
    /// Only kept when requested through [`with_event_log`](Self::with_event_log).
    events: Option<Vec<MOTEvent>>,
}

impl TrackAccumulator {
    /// Create a new accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an accumulator that also keeps every per-frame event.
    pub fn with_event_log() -> Self {
        Self {
            events: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Logged events, empty unless created with [`with_event_log`](Self::with_event_log).
    pub fn events(&self) -> &[MOTEvent] {
        self.events.as_deref().unwrap_or(&[])
    }

    fn log(&mut self, event: MOTEvent) {
        if let Some(events) = self.events.as_mut() {
            events.push(event);
        }
    }

    /// Update the accumulator with the association problem of one frame.
    ///
    /// Ground truth keeps its previous prediction whenever that pair is still
    /// admissible. The rest is solved as a minimum-cost assignment, and a pair
    /// whose ground truth was last matched to another prediction is a switch.
    ///
    /// # Arguments
    /// * `frame` - Frame index, only used to tag logged events
    /// * `problem` - Identities and `(gt x pred)` distance matrix of the frame
    pub fn update(&mut self, frame: u32, problem: &FrameMatch) {
        let FrameMatch {
            gt_ids,
            pred_ids,
            distances,
        } = problem;
        let (n, m) = (gt_ids.len(), pred_ids.len());

        self.identities.record_frame(gt_ids, pred_ids, distances);
        self.counts.num_frames += 1;
        self.counts.num_objects += n as u64;
        self.counts.num_predictions += m as u64;

        let mut gt_done = vec![false; n];
        let mut pred_done = vec![false; m];

        // Keep last frame's pairs alive where possible
        for i in 0..n {
            let Some(prev) = self.tracks.get(&gt_ids[i]).and_then(|t| t.last_pred) else {
                continue;
            };
            let Some(j) = (0..m).find(|&j| !pred_done[j] && pred_ids[j] == prev) else {
                continue;
            };
            if distances[(i, j)].is_finite() {
                gt_done[i] = true;
                pred_done[j] = true;
                self.record_match(frame, gt_ids[i], pred_ids[j], distances[(i, j)]);
            }
        }

        let rows: Vec<usize> = (0..n).filter(|&i| !gt_done[i]).collect();
        let cols: Vec<usize> = (0..m).filter(|&j| !pred_done[j]).collect();
        if !rows.is_empty() && !cols.is_empty() {
            let sub = DMatrix::from_fn(rows.len(), cols.len(), |r, c| {
                distances[(rows[r], cols[c])]
            });
            for a in linear_sum_assignment(&sub).assignments {
                let (i, j) = (rows[a.row_idx], cols[a.col_idx]);
                gt_done[i] = true;
                pred_done[j] = true;
                self.record_match(frame, gt_ids[i], pred_ids[j], distances[(i, j)]);
            }
        }

        for i in (0..n).filter(|&i| !gt_done[i]) {
            self.tracks.entry(gt_ids[i]).or_default().record_miss();
            self.counts.num_misses += 1;
            self.log(MOTEvent {
                frame,
                event_type: MOTEventType::Miss,
                gt_id: Some(gt_ids[i]),
                pred_id: None,
                distance: None,
            });
        }

        for j in (0..m).filter(|&j| !pred_done[j]) {
            self.counts.num_false_positives += 1;
            self.log(MOTEvent {
                frame,
                event_type: MOTEventType::FalsePositive,
                gt_id: None,
                pred_id: Some(pred_ids[j]),
                distance: None,
            });
        }
    }

    fn record_match(&mut self, frame: u32, gt_id: u32, pred_id: u32, distance: f64) {
        let (switched, fragmented) = self.tracks.entry(gt_id).or_default().record_match(pred_id);

        self.counts.num_matches += 1;
        self.counts.total_distance += distance;
        if switched {
            self.counts.num_switches += 1;
        }
        if fragmented {
            self.counts.num_fragmentations += 1;
            self.log(MOTEvent {
                frame,
                event_type: MOTEventType::Fragmentation,
                gt_id: Some(gt_id),
                pred_id: None,
                distance: None,
            });
        }

        self.log(MOTEvent {
            frame,
            event_type: if switched {
                MOTEventType::Switch
            } else {
                MOTEventType::Match
            },
            gt_id: Some(gt_id),
            pred_id: Some(pred_id),
            distance: Some(distance),
        });
    }

    /// Running totals. Track coverage classes are only filled in by [`finish`](Self::finish).
    pub fn counts(&self) -> &EventCounts {
        &self.counts
    }

    #[cfg(test)]
    fn track(&self, gt_id: u32) -> Option<&IdentityTrack> {
        self.tracks.get(&gt_id)
    }

    /// Close the video and classify every ground truth trajectory.
    pub fn finish(self) -> ClassTally {
        let mut counts = self.counts;
        for track in self.tracks.values() {
            match track.status() {
                TrackStatus::MostlyTracked => counts.mostly_tracked += 1,
                TrackStatus::PartiallyTracked => counts.partially_tracked += 1,
                TrackStatus::MostlyLost => counts.mostly_lost += 1,
            }
        }

        ClassTally {
            counts,
            identities: vec![self.identities],
        }
    }
}
