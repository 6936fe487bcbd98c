//! Munge pipeline: ordered, named transforms applied to one feed's series.
//!
//! Steps are resolved by `(MungeKind, name)` through `MungeRegistry`. Series
//! methods live in `methods`, library functions in `library`, and the
//! calendar resampler in `resample`.

pub mod library;
pub mod methods;
pub mod resample;

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{ArgError, Kwargs, MungeKind, MungeStep, Series};
use crate::factory::FactoryError;

#[derive(Debug, Error)]
pub enum MungeError {
    #[error("unknown munge {kind} '{name}'")]
    Unknown { kind: MungeKind, name: String },

    #[error(transparent)]
    Args(#[from] ArgError),

    #[error("{0}")]
    Invalid(String),

    #[error("munge step {order} ({method}) failed: {source}")]
    Step {
        order: usize,
        method: String,
        #[source]
        source: Box<MungeError>,
    },
}

/// A registered transform.
pub type MungeFn = Arc<dyn Fn(Series, &Kwargs) -> Result<Series, MungeError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct MungeRegistry {
    entries: HashMap<(MungeKind, String), MungeFn>,
}

impl MungeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        methods::register(&mut reg);
        library::register(&mut reg);
        reg.register(MungeKind::SeriesMethod, "resample", resample::resample);
        reg
    }

    pub fn register<F>(&mut self, kind: MungeKind, name: &str, f: F)
    where
        F: Fn(Series, &Kwargs) -> Result<Series, MungeError> + Send + Sync + 'static,
    {
        self.entries.insert((kind, name.to_string()), Arc::new(f));
    }

    pub fn contains(&self, kind: MungeKind, name: &str) -> bool {
        self.entries.contains_key(&(kind, name.to_string()))
    }

    /// Registered names of one kind, sorted.
    pub fn names(&self, kind: MungeKind) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, n)| n.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    fn resolve(&self, kind: MungeKind, name: &str) -> Result<&MungeFn, MungeError> {
        self.entries
            .get(&(kind, name.to_string()))
            .ok_or_else(|| MungeError::Unknown {
                kind,
                name: name.to_string(),
            })
    }

    /// Check that every step resolves and accepts its arguments.
    ///
    /// Arguments are checked by a dry run against an empty series.
    pub fn validate(&self, steps: &[MungeStep]) -> Result<(), FactoryError> {
        for step in steps {
            let f = self
                .resolve(step.kind, &step.method)
                .map_err(|_| FactoryError::UnknownMunge {
                    kind: step.kind,
                    name: step.method.clone(),
                })?;
            if let Err(MungeError::Args(source)) = f(Series::empty("dry-run"), &step.kwargs) {
                return Err(FactoryError::BadArgs {
                    component: step.method.clone(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Apply steps strictly in the order given. Step `i+1` sees the output
    /// of step `i`; the first failure stops the pipeline.
    pub fn apply(&self, series: Series, steps: &[&MungeStep]) -> Result<Series, MungeError> {
        let name = series.name.clone();
        let mut current = series;
        for step in steps {
            let wrap = |e: MungeError| MungeError::Step {
                order: step.order,
                method: step.method.clone(),
                source: Box::new(e),
            };
            let f = self.resolve(step.kind, &step.method).map_err(wrap)?;
            current = f(current, &step.kwargs).map_err(wrap)?;
            tracing::trace!(series = %name, step = %step.method, rows = current.len(), "munged");
        }
        Ok(current.renamed(name))
    }
}

impl std::fmt::Debug for MungeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MungeRegistry")
            .field("methods", &self.names(MungeKind::SeriesMethod))
            .field("functions", &self.names(MungeKind::LibraryFunction))
            .finish()
    }
}
