use crate::sample::Sample;
use crate::worker_rng::worker_id;
use anyhow::{Context, Result};
use std::marker::PhantomData;
use tracing::debug;

/// Defines the core `Transform` trait for composable data processing pipelines.
///
/// The `Transform<I, O>` trait represents an operation converting an input of
/// type `I` to an output of type `O`. Sample transforms are
/// `Transform<Sample, Sample>`: they take the sample by value, edit its
/// entries and return it.
///
/// Multiple `Transform` steps can be chained together via `.then(...)`
/// to form a single, inlined preprocessing pipeline.
///
/// Note: `then()` works only when:
/// 1. **Types align**: `self: Transform<I, O>`, `next: Transform<O, M>`
/// 2. **Owned**: `Self::Sized` (no trait objects, must be concrete)
/// 3. **Thread-safe**: intermediate and output types must be `Send`
pub trait Transform<I, O>: Send + Sync {
    /// Applies the transformation to the input
    fn apply(&self, input: I) -> Result<O>;

    #[inline]
    fn then<T, M>(self, next: T) -> Chain<Self, T, O>
    where
        Self: Sized,
        T: Transform<O, M>,
        O: Send,
        M: Send,
    {
        Chain {
            first: self,
            second: next,
            _marker: PhantomData,
        }
    }
}

impl<I, O> Transform<I, O> for Box<dyn Transform<I, O>> {
    fn apply(&self, input: I) -> Result<O> {
        (**self).apply(input)
    }
}

/// A chain of two transforms (`A` -> `B`)
/// - `PhantomData<M>` enforces intermediate type alignment.
#[derive(Debug)]
pub struct Chain<A, B, M> {
    first: A,
    second: B,
    _marker: PhantomData<fn() -> M>,
}

impl<A, B, M> Chain<A, B, M> {
    /// Creates a new transform chain.
    /// Use [`Transform::then`] for better ergonomics; [`Compose`] covers
    /// pipelines assembled at runtime.
    pub fn new(first: A, second: B) -> Self {
        Self {
            first,
            second,
            _marker: PhantomData,
        }
    }
}

impl<I, M, O, A, B> Transform<I, O> for Chain<A, B, M>
where
    A: Transform<I, M>,
    B: Transform<M, O>,
    M: Send,
{
    fn apply(&self, input: I) -> Result<O> {
        self.first
            .apply(input)
            .and_then(|mid| self.second.apply(mid))
            .with_context(|| {
                format!(
                    "Transform chain failed: {} → {} → {}",
                    std::any::type_name::<A>(),
                    std::any::type_name::<B>(),
                    std::any::type_name::<O>()
                )
            })
    }
}

/// An ordered list of sample transforms built at runtime, e.g. from a
/// [`PipelineConfig`](crate::config::PipelineConfig).
#[derive(Default)]
pub struct Compose {
    steps: Vec<(String, Box<dyn Transform<Sample, Sample>>)>,
}

impl Compose {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a named step.
    pub fn push(
        mut self,
        name: impl Into<String>,
        step: impl Transform<Sample, Sample> + 'static,
    ) -> Self {
        self.steps.push((name.into(), Box::new(step)));
        self
    }

    pub fn push_boxed(
        &mut self,
        name: impl Into<String>,
        step: Box<dyn Transform<Sample, Sample>>,
    ) {
        self.steps.push((name.into(), step));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|(name, _)| name.as_str())
    }
}

impl std::fmt::Debug for Compose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Transform<Sample, Sample> for Compose {
    fn apply(&self, mut sample: Sample) -> Result<Sample> {
        let id = sample.id().unwrap_or("<no id>").to_string();
        let worker = worker_id();
        for (index, (name, step)) in self.steps.iter().enumerate() {
            debug!(worker, step = %name, index, sample = %id, "applying transform");
            sample = step.apply(sample).with_context(|| {
                format!("Pipeline step {} ({}) failed for sample {}", index, name, id)
            })?;
        }
        Ok(sample)
    }
}
