use super::bbox::{apply_relax, BoundingBox, CropWindow};
use crate::transforms::vision::raster::{resize, Interpolation};
use anyhow::{ensure, Result};
use ndarray::{s, Array3, ArrayView2, ArrayView3, Axis};

/// Copies the `window` region of `source` into a new array.
///
/// Pixels of the window lying outside `source` are set to `fill`.
pub fn crop_from_bbox(source: ArrayView3<f32>, window: &CropWindow, fill: f32) -> Array3<f32> {
    let (rows, cols) = window.size();
    let channels = source.dim().2;
    let mut crop = Array3::from_elem((rows, cols, channels), fill);

    let valid = window.valid;
    let oy = (valid.y_min - window.window.y_min) as usize;
    let ox = (valid.x_min - window.window.x_min) as usize;
    let (vr, vc) = (valid.rows(), valid.cols());
    if vr > 0 && vc > 0 {
        crop.slice_mut(s![oy..oy + vr, ox..ox + vc, ..]).assign(&source.slice(s![
            valid.y_min as usize..=valid.y_max as usize,
            valid.x_min as usize..=valid.x_max as usize,
            ..
        ]));
    }
    crop
}

/// Crops `source` around the foreground of `mask`, grown by `relax` pixels.
///
/// A mask without foreground yields an all-zero array shaped like `source`.
/// A mask of a different spatial size is first resized to `source` with
/// nearest-neighbour interpolation.
pub fn crop_from_mask(
    source: ArrayView3<f32>,
    mask: ArrayView2<f32>,
    relax: i64,
    zero_pad: bool,
    fill: f32,
) -> Result<Array3<f32>> {
    let (height, width, _) = source.dim();
    let resized;
    let mask = if mask.dim() != (height, width) {
        resized = resize(
            &mask.to_owned().insert_axis(Axis(2)),
            (height, width),
            Interpolation::Nearest,
        )?;
        resized.index_axis(Axis(2), 0)
    } else {
        mask.view()
    };

    Ok(match BoundingBox::from_mask(mask) {
        Some(b) => {
            let window = apply_relax(&b, relax, (height, width), zero_pad);
            crop_from_bbox(source, &window, fill)
        }
        None => Array3::zeros(source.raw_dim()),
    })
}

/// Crops `source` once per instance channel of `masks`, each instance with
/// its own bounding box and `relax[k]` margin.
pub fn crop_instances(
    source: ArrayView3<f32>,
    masks: ArrayView3<f32>,
    relax: &[i64],
    zero_pad: bool,
    fill: f32,
) -> Result<Vec<Array3<f32>>> {
    ensure!(
        relax.len() == masks.dim().2,
        "Expected one relax value per instance ({} instances, got {})",
        masks.dim().2,
        relax.len()
    );
    masks
        .axis_iter(Axis(2))
        .zip(relax)
        .map(|(mask, &r)| crop_from_mask(source, mask, r, zero_pad, fill))
        .collect()
}

/// Places `crop` back into a `(height, width)` canvas at the position it was
/// taken from. Pixels the crop does not cover are set to `fill`.
pub fn uncrop(
    crop: ArrayView3<f32>,
    window: &CropWindow,
    (height, width): (usize, usize),
    fill: f32,
) -> Result<Array3<f32>> {
    let (rows, cols, channels) = crop.dim();
    ensure!(
        (rows, cols) == window.size(),
        "Crop of size {:?} does not match its window {:?}",
        (rows, cols),
        window.size()
    );
    let mut canvas = Array3::from_elem((height, width, channels), fill);

    let valid = window.valid;
    let oy = (valid.y_min - window.window.y_min) as usize;
    let ox = (valid.x_min - window.window.x_min) as usize;
    let (vr, vc) = (valid.rows(), valid.cols());
    if vr > 0 && vc > 0 {
        canvas
            .slice_mut(s![
                valid.y_min as usize..=valid.y_max as usize,
                valid.x_min as usize..=valid.x_max as usize,
                ..
            ])
            .assign(&crop.slice(s![oy..oy + vr, ox..ox + vc, ..]));
    }
    Ok(canvas)
}
