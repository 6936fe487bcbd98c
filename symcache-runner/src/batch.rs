//! Batch caching: many Symbols in one call.
//!
//! Symbols are independent, so they run on the rayon pool. A Symbol whose
//! cache call escalates is recorded as a `SymbolFailure`; its siblings carry
//! on. Storage serializes writes per Symbol.

use rayon::prelude::*;

use symcache_core::report::{BatchReport, SymbolFailure, SymbolReport};
use symcache_core::{Pipeline, PipelineError};

/// Outcome of one Symbol within a batch.
pub type SymbolOutcome = Result<SymbolReport, PipelineError>;

pub struct BatchCache {
    pipeline: Pipeline,
    parallel: bool,
    check_validity: bool,
}

impl BatchCache {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            parallel: true,
            check_validity: true,
        }
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_validity(mut self, check_validity: bool) -> Self {
        self.check_validity = check_validity;
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn run(&self, name: &str, symbols: &[String]) -> BatchReport {
        self.run_with_progress(name, symbols, |_, _, _, _| {})
    }

    /// Cache every stored Symbol.
    pub fn run_all(&self, name: &str) -> Result<BatchReport, PipelineError> {
        let symbols = self.pipeline.storage().symbol_names()?;
        Ok(self.run(name, &symbols))
    }

    /// Cache `symbols`, calling `progress(index, total, symbol, outcome)`
    /// after each one finishes. Reports keep the input order.
    pub fn run_with_progress<F>(&self, name: &str, symbols: &[String], progress: F) -> BatchReport
    where
        F: Fn(usize, usize, &str, &SymbolOutcome) + Send + Sync,
    {
        let total = symbols.len();
        let _span = tracing::info_span!("batch", batch = name, total).entered();
        let one = |(idx, symbol): (usize, &String)| {
            let outcome = self.pipeline.cache(symbol, self.check_validity);
            progress(idx, total, symbol, &outcome);
            (symbol.clone(), outcome)
        };

        let outcomes: Vec<(String, SymbolOutcome)> = if self.parallel {
            symbols.par_iter().enumerate().map(one).collect()
        } else {
            symbols.iter().enumerate().map(one).collect()
        };

        let mut report = BatchReport::new(name);
        for (symbol, outcome) in outcomes {
            match outcome {
                Ok(symbol_report) => report.symbols.push(symbol_report),
                Err(e) => {
                    tracing::warn!(symbol = %symbol, "cache failed: {e}");
                    report.failures.push(SymbolFailure {
                        symbol,
                        checkpoint: e.checkpoint(),
                        error: e.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            cached = report.symbols.len(),
            failed = report.failures.len(),
            "batch complete"
        );
        report
    }
}

impl std::fmt::Debug for BatchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCache")
            .field("parallel", &self.parallel)
            .field("check_validity", &self.check_validity)
            .finish_non_exhaustive()
    }
}
