//! Turn the labels of a frame into class-bucketed detections and ignore regions.

use std::collections::HashMap;

use crate::label::{ImageSize, Label, MaskSource};
use crate::mask::Mask;
use crate::{Error, Result};

/// An object taking part in the association.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub mask: Mask,
    /// Position of the category in the active class list.
    pub class_index: usize,
    /// Interned track id, see [`IdRegistry`].
    pub track_id: u32,
    pub frame_index: u32,
}

/// Extracted content of one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameObjects {
    pub detections: Vec<Detection>,
    /// Crowd / ignored regions of any active class.
    pub ignore_regions: Vec<Mask>,
}

impl FrameObjects {
    /// Detections of a single class, in label order.
    pub fn of_class(&self, class_index: usize) -> Vec<&Detection> {
        self.detections
            .iter()
            .filter(|d| d.class_index == class_index)
            .collect()
    }
}

/// Maps string track ids of one video to dense integer ids.
#[derive(Debug, Default)]
pub struct IdRegistry {
    ids: HashMap<String, u32>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Integer id for `key`, allocating the next free one on first sight.
    pub fn intern(&mut self, key: &str) -> u32 {
        if let Some(&id) = self.ids.get(key) {
            return id;
        }
        let id = self.ids.len() as u32;
        self.ids.insert(key.to_string(), id);
        id
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Classifies labels against the active class list.
#[derive(Debug, Clone)]
pub struct ObjectExtractor<'a> {
    classes: &'a [String],
    ignore_unknown_categories: bool,
    image_size: Option<ImageSize>,
}

impl<'a> ObjectExtractor<'a> {
    /// Create a new extractor.
    ///
    /// # Arguments
    /// * `classes` - Active class names; a detection's class index points into this list
    /// * `ignore_unknown_categories` - Drop labels of unknown categories instead of failing
    /// * `image_size` - Canvas used to rasterize polygon labels
    pub fn new(
        classes: &'a [String],
        ignore_unknown_categories: bool,
        image_size: Option<ImageSize>,
    ) -> Self {
        Self {
            classes,
            ignore_unknown_categories,
            image_size,
        }
    }

    /// Extract the detections and ignore regions of one frame.
    ///
    /// Labels without any mask are skipped. The first label with an unknown
    /// category fails the extraction unless unknown categories are ignored.
    pub fn extract(
        &self,
        labels: &[Label],
        frame_index: u32,
        ids: &mut IdRegistry,
    ) -> Result<FrameObjects> {
        let mut objects = FrameObjects::default();

        for label in labels {
            let Some(source) = label.mask_source() else {
                continue;
            };

            let mask = self.resolve_mask(source)?;
            let category = label.category.as_deref().unwrap_or_default();
            let Some(class_index) = self.classes.iter().position(|c| c == category) else {
                if self.ignore_unknown_categories {
                    log::debug!("Dropping label {} of unknown category '{}'", label.id, category);
                    continue;
                }
                return Err(Error::UnknownCategory(category.to_string()));
            };

            if label.is_crowd() || label.is_ignored() {
                objects.ignore_regions.push(mask);
            } else {
                objects.detections.push(Detection {
                    mask,
                    class_index,
                    track_id: ids.intern(&label.id),
                    frame_index,
                });
            }
        }

        Ok(objects)
    }

    fn resolve_mask(&self, source: MaskSource<'_>) -> Result<Mask> {
        match source {
            MaskSource::Rle(rle) => Mask::from_compressed(&rle.counts, rle.size[0], rle.size[1]),
            MaskSource::Polygons(polygons) => {
                let size = self.image_size.ok_or_else(|| {
                    Error::Config("image size is required to rasterize polygon labels".to_string())
                })?;
                let outlines: Vec<Vec<[f64; 2]>> =
                    polygons.iter().map(|p| p.vertices.clone()).collect();
                Ok(Mask::from_polygons(&outlines, size.height, size.width))
            }
        }
    }
}
