use crate::config::Mode;
use crate::error::TransformError;
use crate::worker_rng::worker_gen_range;

/// Object-size adaptive crop margin.
///
/// After cropping with the computed relax and resizing to a `d × d` square,
/// the object's largest side measures about `dz` pixels. `dz` is
/// `floor(sqrt(d² / 2))` in validation and drawn per call from
/// `[floor(sqrt(0.45 d²)), floor(sqrt(0.6 d²)))` in training.
///
/// Tiny objects would otherwise get almost no context, so the margin never
/// drops below `thresh`, the margin that gives an object of side `d / 5`
/// the validation zoom.
#[derive(Debug, Clone)]
pub struct DynamicRelax {
    d: f64,
    thresh: f64,
    inner: InnerSize,
}

#[derive(Debug, Clone)]
enum InnerSize {
    Fixed(f64),
    Sampled { min: i64, max: i64 },
}

impl DynamicRelax {
    pub fn new(d: usize, mode: Mode) -> Result<Self, TransformError> {
        if d < 2 {
            return Err(TransformError::config(format!(
                "dynamic relax needs an output side of at least 2 pixels (got {d})"
            )));
        }
        let d2 = (d * d) as f64;
        let dz = (d2 * 0.5).sqrt().floor();
        let d = d as f64;
        let thresh = (d - dz) * (d / 5.0) / (2.0 * dz);

        let inner = match mode {
            Mode::Val => InnerSize::Fixed(dz),
            Mode::Train => {
                let min = (d2 * 0.45).sqrt().floor() as i64;
                let max = (d2 * 0.6).sqrt().floor() as i64;
                if min >= max {
                    return Err(TransformError::config(format!(
                        "output side {d} leaves no inner sizes to sample from [{min}, {max})"
                    )));
                }
                InnerSize::Sampled { min, max }
            }
        };
        Ok(Self { d, thresh, inner })
    }

    /// Lower bound applied to every computed margin.
    pub fn thresh(&self) -> f64 {
        self.thresh
    }

    /// Target inner object size for one sample. Draws from the worker RNG
    /// in training mode, constant in validation mode.
    pub fn inner_size(&self) -> f64 {
        match self.inner {
            InnerSize::Fixed(dz) => dz,
            InnerSize::Sampled { min, max } => worker_gen_range(min..max) as f64,
        }
    }

    /// Margin for an object whose largest bounding-box side is `extent`,
    /// given the inner size `dz` of the current sample.
    ///
    /// Extents below one pixel carry no size information; they get the
    /// threshold margin.
    pub fn relax_for(&self, extent: f64, dz: f64) -> i64 {
        if extent < 1.0 {
            return self.thresh.ceil() as i64;
        }
        let zoom = dz / extent;
        let relax = (self.d - extent * zoom) / (2.0 * zoom);
        relax.max(self.thresh).ceil() as i64
    }
}
