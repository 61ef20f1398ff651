use crate::error::TransformError;
use crate::geometry::{BoundingBox, Point};
use anyhow::Result;
use ndarray::Array3;
use std::collections::HashMap;
use std::fmt;

/// What a spatial array represents. Decides interpolation, fill value
/// and which transforms may read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    /// Continuous-valued image, any range.
    Image,
    /// Binary-like mask, one channel per object instance, background 0.
    Mask,
    /// Mask whose background is 255 (outside the region of interest).
    InverseMask,
    /// Single-channel confidence map.
    Heatmap,
}

impl ArrayKind {
    /// Value used for pixels that fall outside the source array.
    pub fn fill_value(self) -> f32 {
        match self {
            ArrayKind::InverseMask => 255.0,
            _ => 0.0,
        }
    }
}

/// The kind tag reported for an [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Image,
    Mask,
    MultiInstanceMask,
    InverseMask,
    Heatmap,
    Stack,
    Points,
    BBox,
    Scalar,
    Metadata,
}

impl EntryKind {
    pub fn name(self) -> &'static str {
        match self {
            EntryKind::Image => "Image",
            EntryKind::Mask => "Mask",
            EntryKind::MultiInstanceMask => "MultiInstanceMask",
            EntryKind::InverseMask => "InverseMask",
            EntryKind::Heatmap => "Heatmap",
            EntryKind::Stack => "Stack",
            EntryKind::Points => "Points",
            EntryKind::BBox => "BBox",
            EntryKind::Scalar => "Scalar",
            EntryKind::Metadata => "Metadata",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single tagged value stored in a [`Sample`].
///
/// Spatial arrays are always `(height, width, channels)`. Masks keep one
/// channel per object instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Array { kind: ArrayKind, data: Array3<f32> },
    /// One crop per object instance. Items may differ in size.
    Stack {
        kind: ArrayKind,
        items: Vec<Array3<f32>>,
    },
    Points(Vec<Point>),
    BBox(BoundingBox),
    Scalar(f64),
    Scalars(Vec<f64>),
    Metadata(String),
}

impl Entry {
    pub fn image(data: Array3<f32>) -> Self {
        Entry::Array {
            kind: ArrayKind::Image,
            data,
        }
    }

    pub fn mask(data: Array3<f32>) -> Self {
        Entry::Array {
            kind: ArrayKind::Mask,
            data,
        }
    }

    pub fn heatmap(data: Array3<f32>) -> Self {
        Entry::Array {
            kind: ArrayKind::Heatmap,
            data,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Array { kind, data } => match kind {
                ArrayKind::Image => EntryKind::Image,
                ArrayKind::Mask if data.dim().2 > 1 => EntryKind::MultiInstanceMask,
                ArrayKind::Mask => EntryKind::Mask,
                ArrayKind::InverseMask => EntryKind::InverseMask,
                ArrayKind::Heatmap => EntryKind::Heatmap,
            },
            Entry::Stack { .. } => EntryKind::Stack,
            Entry::Points(_) => EntryKind::Points,
            Entry::BBox(_) => EntryKind::BBox,
            Entry::Scalar(_) | Entry::Scalars(_) => EntryKind::Scalar,
            Entry::Metadata(_) => EntryKind::Metadata,
        }
    }

    /// True for entries that geometric transforms move with the image.
    pub fn is_spatial(&self) -> bool {
        matches!(self, Entry::Array { .. } | Entry::Stack { .. })
    }

    /// Applies `f` to every spatial array held by this entry.
    /// Non-spatial entries are left untouched.
    pub fn map_arrays<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(ArrayKind, &Array3<f32>) -> Result<Array3<f32>>,
    {
        match self {
            Entry::Array { kind, data } => {
                *data = f(*kind, data)?;
            }
            Entry::Stack { kind, items } => {
                for item in items.iter_mut() {
                    *item = f(*kind, item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// A single training example: feature names mapped to tagged entries.
///
/// Transforms take the sample by value, create, overwrite or delete
/// entries, and hand it back.
///
/// # Examples:
/// - `{"image": Image(H, W, 3), "gt": Mask(H, W, 1), "id": Metadata("2008_000123")}`
/// - after cropping:
///   `{"crop_image": Image(h, w, 3), "crop_gt": Mask(h, w, 1), "crop_relax": Scalar(22)}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    pub features: HashMap<String, Entry>,
}

impl Sample {
    /// Creates a new `Sample` from a full feature map.
    pub fn new(features: HashMap<String, Entry>) -> Self {
        Self { features }
    }

    /// Creates a `Sample` from a single `(feature_name, entry)` pair.
    ///
    /// Chain with [`with_feature`](Self::with_feature) to add more features.
    pub fn from_single(name: impl Into<String>, entry: Entry) -> Self {
        Self {
            features: HashMap::from([(name.into(), entry)]),
        }
    }

    /// Adds or overwrites a feature in the `Sample`.
    pub fn with_feature(mut self, name: impl Into<String>, entry: Entry) -> Self {
        self.features.insert(name.into(), entry);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: Entry) -> Option<Entry> {
        self.features.insert(name.into(), entry)
    }

    pub fn remove(&mut self, name: &str) -> Option<Entry> {
        self.features.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    /// Returns a reference to the entry by feature name.
    pub fn get(&self, feature: &str) -> Result<&Entry> {
        self.features
            .get(feature)
            .ok_or_else(|| TransformError::MissingFeature(feature.to_string()).into())
    }

    pub fn get_mut(&mut self, feature: &str) -> Result<&mut Entry> {
        self.features
            .get_mut(feature)
            .ok_or_else(|| TransformError::MissingFeature(feature.to_string()).into())
    }

    /// Returns the spatial array stored under `feature` together with its kind.
    pub fn array(&self, feature: &str) -> Result<(ArrayKind, &Array3<f32>)> {
        match self.get(feature)? {
            Entry::Array { kind, data } => Ok((*kind, data)),
            other => Err(TransformError::UnexpectedKind {
                key: feature.to_string(),
                expected: "Array",
                found: other.kind().name(),
            }
            .into()),
        }
    }

    /// Sample identifier used in log messages, if one was attached.
    pub fn id(&self) -> Option<&str> {
        match self.features.get("id") {
            Some(Entry::Metadata(id)) => Some(id.as_str()),
            _ => None,
        }
    }

    /// Returns an iterator over all feature names in this `Sample`.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    /// Keys of all spatial entries, sorted for deterministic iteration.
    pub fn spatial_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .features
            .iter()
            .filter(|(_, entry)| entry.is_spatial())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}
