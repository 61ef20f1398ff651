use ndarray::{ArrayView2, ArrayView3};
use serde::{Deserialize, Serialize};

/// Inclusive pixel box `(x_min, y_min, x_max, y_max)`.
///
/// Coordinates are signed so a relaxed, zero-padded window may reach
/// outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

impl BoundingBox {
    pub fn new(x_min: i64, y_min: i64, x_max: i64, y_max: i64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Tight box around the nonzero pixels of `mask`, `None` if there are none.
    pub fn from_mask(mask: ArrayView2<f32>) -> Option<Self> {
        let mut found: Option<Self> = None;
        for ((y, x), &v) in mask.indexed_iter() {
            if v != 0.0 {
                let (x, y) = (x as i64, y as i64);
                found = Some(match found {
                    None => Self::new(x, y, x, y),
                    Some(b) => Self::new(
                        b.x_min.min(x),
                        b.y_min.min(y),
                        b.x_max.max(x),
                        b.y_max.max(y),
                    ),
                });
            }
        }
        found
    }

    /// Union box over every instance channel of a `(H, W, N)` mask.
    pub fn from_instances(masks: ArrayView3<f32>) -> Option<Self> {
        masks
            .axis_iter(ndarray::Axis(2))
            .filter_map(Self::from_mask)
            .reduce(|a, b| a.union(&b))
    }

    pub fn union(&self, other: &Self) -> Self {
        Self::new(
            self.x_min.min(other.x_min),
            self.y_min.min(other.y_min),
            self.x_max.max(other.x_max),
            self.y_max.max(other.y_max),
        )
    }

    /// `x_max - x_min`; a one-pixel-wide object has width 0.
    pub fn width(&self) -> i64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> i64 {
        self.y_max - self.y_min
    }

    /// Largest side, the object size the crop policy zooms on.
    pub fn extent(&self) -> i64 {
        self.width().max(self.height())
    }

    /// Number of columns covered (inclusive).
    pub fn cols(&self) -> usize {
        (self.x_max - self.x_min + 1).max(0) as usize
    }

    /// Number of rows covered (inclusive).
    pub fn rows(&self) -> usize {
        (self.y_max - self.y_min + 1).max(0) as usize
    }

    fn clip(&self, height: usize, width: usize) -> Self {
        Self::new(
            self.x_min.max(0),
            self.y_min.max(0),
            self.x_max.min(width as i64 - 1),
            self.y_max.min(height as i64 - 1),
        )
    }
}

/// Tight box of a mask, the zero box for an all-background mask.
pub fn bbox(mask: ArrayView2<f32>) -> BoundingBox {
    BoundingBox::from_mask(mask).unwrap_or_default()
}

/// Amount by which a crop window extends past each image border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Padding {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl Padding {
    pub fn is_zero(&self) -> bool {
        *self == Padding::default()
    }
}

/// A relaxed box ready for cropping.
///
/// `window` is the region the crop covers; `valid` is its intersection with
/// the image, the part that is copied from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub window: BoundingBox,
    pub valid: BoundingBox,
}

impl CropWindow {
    /// Top-left corner `(x, y)` of the crop in source coordinates.
    pub fn origin(&self) -> (i64, i64) {
        (self.window.x_min, self.window.y_min)
    }

    /// Crop size as `(rows, cols)`.
    pub fn size(&self) -> (usize, usize) {
        (self.window.rows(), self.window.cols())
    }

    pub fn padding(&self) -> Padding {
        Padding {
            top: (self.valid.y_min - self.window.y_min) as usize,
            bottom: (self.window.y_max - self.valid.y_max) as usize,
            left: (self.valid.x_min - self.window.x_min) as usize,
            right: (self.window.x_max - self.valid.x_max) as usize,
        }
    }
}

/// Grows `bbox` by `relax` pixels on every side.
///
/// With `zero_pad` the window keeps its full size and may leave the image
/// (the crop fills the outside); otherwise the window is clipped to the
/// `(height, width)` image.
pub fn apply_relax(
    bbox: &BoundingBox,
    relax: i64,
    (height, width): (usize, usize),
    zero_pad: bool,
) -> CropWindow {
    let grown = BoundingBox::new(
        bbox.x_min - relax,
        bbox.y_min - relax,
        bbox.x_max + relax,
        bbox.y_max + relax,
    );
    let valid = grown.clip(height, width);
    CropWindow {
        window: if zero_pad { grown } else { valid },
        valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array2, Array3};

    #[test]
    fn test_bbox_tight() {
        let mut mask = Array2::zeros((10, 12));
        mask.slice_mut(s![2..5, 3..9]).fill(1.0);
        let b = bbox(mask.view());
        assert_eq!(b, BoundingBox::new(3, 2, 8, 4));
        assert_eq!(b.width(), 5);
        assert_eq!(b.height(), 2);
        assert_eq!(b.extent(), 5);
        assert_eq!((b.rows(), b.cols()), (3, 6));
    }

    #[test]
    fn test_bbox_empty_is_zero_box() {
        let mask = Array2::<f32>::zeros((4, 4));
        assert_eq!(bbox(mask.view()), BoundingBox::default());
        assert!(BoundingBox::from_mask(mask.view()).is_none());
    }

    #[test]
    fn test_union_over_instances() {
        let mut masks = Array3::zeros((10, 10, 2));
        masks[[1, 1, 0]] = 1.0;
        masks[[8, 6, 1]] = 1.0;
        let b = BoundingBox::from_instances(masks.view()).unwrap();
        assert_eq!(b, BoundingBox::new(1, 1, 6, 8));
    }

    #[test]
    fn test_relax_clipped_without_zero_pad() {
        let b = BoundingBox::new(1, 2, 5, 6);
        let w = apply_relax(&b, 3, (8, 8), false);
        assert_eq!(w.window, BoundingBox::new(0, 0, 7, 7));
        assert!(w.padding().is_zero());
        assert_eq!(w.size(), (8, 8));
    }

    #[test]
    fn test_relax_padding_with_zero_pad() {
        let b = BoundingBox::new(1, 2, 5, 6);
        let w = apply_relax(&b, 3, (8, 8), true);
        assert_eq!(w.window, BoundingBox::new(-2, -1, 8, 9));
        assert_eq!(w.origin(), (-2, -1));
        assert_eq!(w.size(), (11, 11));
        assert_eq!(
            w.padding(),
            Padding {
                top: 1,
                bottom: 2,
                left: 2,
                right: 1
            }
        );
    }
}
