//! Canonical segmentation masks.
//!
//! Every label mask, whatever its origin, is turned into a [`Mask`]: a
//! column-major run-length encoding in the COCO convention. Runs alternate
//! background/foreground and always start with a (possibly empty)
//! background run, so pixel `(x, y)` lives at offset `y + height * x`.

use nalgebra::DMatrix;

use crate::{Error, Result};

/// Run-length encoded binary mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    height: u32,
    width: u32,
    counts: Vec<u32>,
}

impl Mask {
    /// Create a mask from uncompressed run counts.
    ///
    /// The runs must cover exactly `height * width` pixels.
    pub fn from_counts(counts: Vec<u32>, height: u32, width: u32) -> Result<Self> {
        let covered: u64 = counts.iter().map(|&c| c as u64).sum();
        let expected = height as u64 * width as u64;
        if covered != expected {
            return Err(Error::InvalidMask(format!(
                "run counts cover {} pixels, canvas {}x{} has {}",
                covered, height, width, expected
            )));
        }
        Ok(Self {
            height,
            width,
            counts,
        })
    }

    /// Decode a COCO compressed RLE string.
    ///
    /// Each count is a little-endian sequence of 5-bit groups offset by 48,
    /// with bit 5 flagging continuation. From the fourth count on, values are
    /// stored as a delta to the count two positions earlier.
    pub fn from_compressed(s: &str, height: u32, width: u32) -> Result<Self> {
        let bytes = s.as_bytes();
        let mut counts: Vec<u32> = Vec::new();
        let mut p = 0;

        while p < bytes.len() {
            let mut x: i64 = 0;
            let mut k = 0;
            let mut more = true;
            while more {
                let byte = *bytes
                    .get(p)
                    .ok_or_else(|| Error::InvalidMask("truncated RLE string".to_string()))?;
                if byte < 48 || k >= 12 {
                    return Err(Error::InvalidMask(format!(
                        "malformed RLE string at byte {}",
                        p
                    )));
                }
                let c = (byte - 48) as i64;
                x |= (c & 0x1f) << (5 * k);
                more = c & 0x20 != 0;
                p += 1;
                k += 1;
                if !more && c & 0x10 != 0 {
                    x |= -1i64 << (5 * k);
                }
            }
            if counts.len() > 2 {
                x += counts[counts.len() - 2] as i64;
            }
            let count = u32::try_from(x)
                .map_err(|_| Error::InvalidMask(format!("RLE count {} out of range", x)))?;
            counts.push(count);
        }

        Self::from_counts(counts, height, width)
    }

    /// Create a mask from a column-major binary image (non-zero is foreground).
    pub fn from_binary(data: &[u8], height: u32, width: u32) -> Result<Self> {
        let expected = height as usize * width as usize;
        if data.len() != expected {
            return Err(Error::InvalidMask(format!(
                "binary mask has {} pixels, canvas {}x{} has {}",
                data.len(),
                height,
                width,
                expected
            )));
        }
        Ok(Self {
            height,
            width,
            counts: encode_runs(data),
        })
    }

    /// Rasterize one or more polygons onto a `height x width` canvas.
    ///
    /// A pixel is foreground when its center lies inside any of the polygons
    /// (even-odd rule per polygon). Polygons with fewer than three vertices
    /// cover nothing.
    pub fn from_polygons(polygons: &[Vec<[f64; 2]>], height: u32, width: u32) -> Self {
        let h = height as usize;
        let w = width as usize;
        let mut data = vec![0u8; h * w];
        let mut crossings: Vec<f64> = Vec::new();

        for polygon in polygons.iter().filter(|p| p.len() >= 3) {
            for y in 0..h {
                let yc = y as f64 + 0.5;
                crossings.clear();
                for (k, a) in polygon.iter().enumerate() {
                    let b = &polygon[(k + 1) % polygon.len()];
                    if (a[1] <= yc) != (b[1] <= yc) {
                        crossings.push(a[0] + (yc - a[1]) * (b[0] - a[0]) / (b[1] - a[1]));
                    }
                }
                crossings.sort_by(|l, r| l.total_cmp(r));

                for span in crossings.chunks_exact(2) {
                    let start = (span[0] - 0.5).ceil().max(0.0) as usize;
                    let end = ((span[1] - 0.5).ceil().max(0.0) as usize).min(w);
                    for x in start..end {
                        data[y + h * x] = 1;
                    }
                }
            }
        }

        Self {
            height,
            width,
            counts: encode_runs(&data),
        }
    }

    /// Encode into the COCO compressed RLE string format.
    pub fn to_compressed(&self) -> String {
        let mut s = String::new();
        for (i, &count) in self.counts.iter().enumerate() {
            let mut x = count as i64;
            if i > 2 {
                x -= self.counts[i - 2] as i64;
            }
            loop {
                let mut c = x & 0x1f;
                x >>= 5;
                let more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
                if more {
                    c |= 0x20;
                }
                s.push((c as u8 + 48) as char);
                if !more {
                    break;
                }
            }
        }
        s
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Uncompressed run counts.
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> u64 {
        self.counts.iter().skip(1).step_by(2).map(|&c| c as u64).sum()
    }

    /// Number of pixels that are foreground in both masks.
    pub fn intersection_area(&self, other: &Mask) -> Result<u64> {
        if self.height != other.height || self.width != other.width {
            return Err(Error::InvalidMask(format!(
                "cannot compare {}x{} mask with {}x{} mask",
                self.height, self.width, other.height, other.width
            )));
        }

        let a: Vec<(u64, u64)> = self.foreground_runs().collect();
        let b: Vec<(u64, u64)> = other.foreground_runs().collect();
        let (mut i, mut j) = (0, 0);
        let mut total = 0u64;
        while i < a.len() && j < b.len() {
            let start = a[i].0.max(b[j].0);
            let end = a[i].1.min(b[j].1);
            if end > start {
                total += end - start;
            }
            if a[i].1 < b[j].1 {
                i += 1;
            } else {
                j += 1;
            }
        }
        Ok(total)
    }

    /// Half-open pixel offset ranges of the foreground runs.
    fn foreground_runs(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        let mut offset = 0u64;
        self.counts.iter().enumerate().filter_map(move |(i, &c)| {
            let start = offset;
            offset += c as u64;
            (i % 2 == 1 && c > 0).then_some((start, offset))
        })
    }
}

fn encode_runs(data: &[u8]) -> Vec<u32> {
    let mut counts = Vec::new();
    let mut current = 0u8;
    let mut run = 0u32;
    for &v in data {
        let v = u8::from(v != 0);
        if v != current {
            counts.push(run);
            run = 0;
            current = v;
        }
        run += 1;
    }
    counts.push(run);
    counts
}

/// Compute the IoU matrix between ground truth and predicted masks.
///
/// # Returns
/// Matrix of shape (gts.len(), preds.len()); an empty union yields 0.
pub fn iou_matrix(gts: &[&Mask], preds: &[&Mask]) -> Result<DMatrix<f64>> {
    let mut result = DMatrix::zeros(gts.len(), preds.len());
    let pred_areas: Vec<u64> = preds.iter().map(|m| m.area()).collect();

    for (i, gt) in gts.iter().enumerate() {
        let gt_area = gt.area();
        for (j, pred) in preds.iter().enumerate() {
            let inter = gt.intersection_area(pred)?;
            let union = gt_area + pred_areas[j] - inter;
            result[(i, j)] = if union > 0 {
                inter as f64 / union as f64
            } else {
                0.0
            };
        }
    }
    Ok(result)
}

/// Compute the intersection-over-foreground matrix of predictions against regions.
///
/// Entry `(i, j)` is the fraction of prediction `i` covered by region `j`.
pub fn iof_matrix(preds: &[&Mask], regions: &[&Mask]) -> Result<DMatrix<f64>> {
    let mut result = DMatrix::zeros(preds.len(), regions.len());

    for (i, pred) in preds.iter().enumerate() {
        let area = pred.area();
        if area == 0 {
            continue;
        }
        for (j, region) in regions.iter().enumerate() {
            result[(i, j)] = pred.intersection_area(region)? as f64 / area as f64;
        }
    }
    Ok(result)
}
