//! Decoded Scalabel-style labels and the category hierarchy.
//!
//! These are the inputs of the evaluation. They are plain data with serde
//! derives, so a caller can deserialize Scalabel JSON straight into them.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Compressed RLE exactly as it appears in a label file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RleLabel {
    /// COCO compressed run counts.
    pub counts: String,
    /// Canvas size as `[height, width]`.
    pub size: [u32; 2],
}

/// A 2D polygon outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poly2d {
    pub vertices: Vec<[f64; 2]>,
    /// Vertex types, `L` for line and `C` for bezier control points.
    #[serde(default)]
    pub types: String,
    #[serde(default = "default_closed")]
    pub closed: bool,
}

fn default_closed() -> bool {
    true
}

/// Where the mask of a label comes from.
#[derive(Debug, Clone, Copy)]
pub enum MaskSource<'a> {
    Rle(&'a RleLabel),
    Polygons(&'a [Poly2d]),
}

/// A single labeled object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Label {
    /// Track identity, unique within a video.
    pub id: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
    #[serde(default)]
    pub rle: Option<RleLabel>,
    #[serde(default)]
    pub poly2d: Option<Vec<Poly2d>>,
}

impl Label {
    /// Create a label carrying an RLE mask.
    pub fn with_rle(id: impl Into<String>, category: impl Into<String>, rle: RleLabel) -> Self {
        Self {
            id: id.into(),
            category: Some(category.into()),
            rle: Some(rle),
            ..Default::default()
        }
    }

    /// Create a label carrying polygon outlines.
    pub fn with_polygons(
        id: impl Into<String>,
        category: impl Into<String>,
        polygons: Vec<Poly2d>,
    ) -> Self {
        Self {
            id: id.into(),
            category: Some(category.into()),
            poly2d: Some(polygons),
            ..Default::default()
        }
    }

    /// Set a boolean attribute such as `crowd` or `ignored`.
    pub fn with_flag(mut self, name: &str, value: bool) -> Self {
        self.attributes.insert(name.to_string(), Value::Bool(value));
        self
    }

    /// The mask source of this label. RLE wins over polygons.
    pub fn mask_source(&self) -> Option<MaskSource<'_>> {
        match (&self.rle, &self.poly2d) {
            (Some(rle), _) => Some(MaskSource::Rle(rle)),
            (None, Some(polygons)) => Some(MaskSource::Polygons(polygons)),
            (None, None) => None,
        }
    }

    fn flag(&self, name: &str) -> bool {
        self.attributes
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_crowd(&self) -> bool {
        self.flag("crowd")
    }

    pub fn is_ignored(&self) -> bool {
        self.flag("ignored") || self.flag("ignore")
    }
}

/// One annotated frame of a video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub video_name: Option<String>,
    #[serde(default)]
    pub frame_index: Option<u32>,
    #[serde(default)]
    pub labels: Option<Vec<Label>>,
}

impl Frame {
    pub fn new(frame_index: u32, labels: Vec<Label>) -> Self {
        Self {
            frame_index: Some(frame_index),
            labels: Some(labels),
            ..Default::default()
        }
    }

    /// Frame index, frames without one count as index 0.
    pub fn index(&self) -> u32 {
        self.frame_index.unwrap_or(0)
    }

    pub fn labels(&self) -> &[Label] {
        self.labels.as_deref().unwrap_or(&[])
    }
}

/// Frames of one video.
pub type Video = Vec<Frame>;

/// Frames of a video ordered by frame index (stable for equal indices).
pub fn sorted_frames(video: &[Frame]) -> Vec<&Frame> {
    let mut frames: Vec<&Frame> = video.iter().collect();
    frames.sort_by_key(|f| f.index());
    frames
}

/// Group a flat frame list into videos.
///
/// Videos are ordered by name and frames inside a video by frame index.
pub fn group_and_sort(frames: Vec<Frame>) -> Vec<Video> {
    let mut videos: BTreeMap<String, Video> = BTreeMap::new();
    for frame in frames {
        videos
            .entry(frame.video_name.clone().unwrap_or_default())
            .or_default()
            .push(frame);
    }
    videos
        .into_values()
        .map(|mut video| {
            video.sort_by_key(|f| f.index());
            video
        })
        .collect()
}

/// Canvas size used to rasterize polygons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Node of the category hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub subcategories: Option<Vec<Category>>,
}

impl Category {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subcategories: None,
        }
    }

    pub fn parent(name: impl Into<String>, subcategories: Vec<Category>) -> Self {
        Self {
            name: name.into(),
            subcategories: Some(subcategories),
        }
    }

    fn children(&self) -> &[Category] {
        self.subcategories.as_deref().unwrap_or(&[])
    }
}

/// Dataset configuration: category hierarchy and optional canvas size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub image_size: Option<ImageSize>,
    pub categories: Vec<Category>,
}

/// Leaf categories of the hierarchy, depth first.
pub fn leaf_categories(categories: &[Category]) -> Vec<&Category> {
    let mut leaves = Vec::new();
    for category in categories {
        if category.children().is_empty() {
            leaves.push(category);
        } else {
            leaves.extend(leaf_categories(category.children()));
        }
    }
    leaves
}

/// Every non-leaf category with the leaf categories below it, depth first.
pub fn parent_categories(categories: &[Category]) -> Vec<(&Category, Vec<&Category>)> {
    let mut parents = Vec::new();
    for category in categories {
        if !category.children().is_empty() {
            parents.push((category, leaf_categories(category.children())));
            parents.extend(parent_categories(category.children()));
        }
    }
    parents
}
