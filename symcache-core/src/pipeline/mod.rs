//! Symbol caching orchestration.
//!
//! ```text
//! SOURCING → CONCATENATING → AGGREGATING → PERSISTING → VALIDATING → DONE
//! ```
//!
//! Each state may absorb failures through the owning Symbol's or Feed's
//! handle and carry on with partial data. An escalation aborts the call for
//! this Symbol only; the final table is written once, in PERSISTING, so an
//! escalation before that leaves the previous table untouched.

pub mod feed_stage;
pub mod merge;

pub use feed_stage::{FeedFailure, FeedStage};
pub use merge::{assemble, Assembled, FeedColumn, MergeError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::aggregate::aggregate_table;
use crate::domain::{column_name, Series, Symbol};
use crate::error::PipelineError;
use crate::factory::Registries;
use crate::handling::{Cause, CheckpointHandler, Fault, SymbolCheckpoint};
use crate::report::{ReportPoint, SymbolReport};
use crate::settings::Settings;
use crate::storage::{Storage, StorageError, SymbolSnapshot};
use crate::table::AlignedTable;
use crate::validity::run_validators;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheState {
    Sourcing,
    Concatenating,
    Aggregating,
    Persisting,
    Validating,
    Done,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheState::Sourcing => "SOURCING",
            CacheState::Concatenating => "CONCATENATING",
            CacheState::Aggregating => "AGGREGATING",
            CacheState::Persisting => "PERSISTING",
            CacheState::Validating => "VALIDATING",
            CacheState::Done => "DONE",
        };
        f.write_str(s)
    }
}

/// Runs cache calls against one storage backend.
#[derive(Clone)]
pub struct Pipeline {
    storage: Arc<dyn Storage>,
    registries: Arc<Registries>,
    settings: Arc<Settings>,
    handler: CheckpointHandler,
}

impl Pipeline {
    pub fn new(storage: Arc<dyn Storage>, registries: Arc<Registries>, settings: Settings) -> Self {
        Self {
            storage,
            registries,
            settings: Arc::new(settings),
            handler: CheckpointHandler::default(),
        }
    }

    pub fn with_handler(mut self, handler: CheckpointHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn checkpoint(
        &self,
        symbol: &Symbol,
        report: &mut SymbolReport,
        checkpoint: SymbolCheckpoint,
        message: String,
        cause: Cause,
    ) -> Result<(), PipelineError> {
        let outcome = self.handler.process(
            symbol.handle.policy(checkpoint),
            checkpoint,
            &symbol.name,
            message,
            cause,
        )?;
        report.absorb(outcome);
        Ok(())
    }

    fn enter(&self, report: &mut SymbolReport, state: CacheState) {
        tracing::debug!(symbol = %report.symbol, %state, "entering");
        report.reached = state;
    }

    /// Cache one Symbol end to end.
    pub fn cache(&self, name: &str, check_validity: bool) -> Result<SymbolReport, PipelineError> {
        let _span = tracing::info_span!("cache", symbol = name).entered();
        let snapshot = SymbolSnapshot::load(self.storage.as_ref(), name)?;
        if snapshot.feeds.is_empty() {
            return Err(PipelineError::NoFeeds(name.to_string()));
        }
        let symbol = &snapshot.symbol;
        let mut report = SymbolReport::new(name);

        self.enter(&mut report, CacheState::Sourcing);
        let stage = FeedStage {
            registries: &self.registries,
            settings: &self.settings,
            handler: &self.handler,
        };
        let mut columns = Vec::new();
        for feed in snapshot.feeds.iter().filter(|f| f.is_on()) {
            match stage.cache(feed, symbol) {
                Ok((series, feed_report)) => {
                    report.feeds.push(feed_report);
                    columns.push(FeedColumn {
                        fnum: feed.fnum,
                        series,
                    });
                }
                Err(FeedFailure::Escalated(e)) => return Err(e),
                Err(FeedFailure::Munge {
                    report: feed_report,
                    error,
                }) => {
                    report.feeds.push(feed_report);
                    self.checkpoint(
                        symbol,
                        &mut report,
                        SymbolCheckpoint::Caching,
                        format!("munging {} failed", feed.owner()),
                        Box::new(error),
                    )?;
                    columns.push(FeedColumn {
                        fnum: feed.fnum,
                        series: Series::empty(column_name(feed.fnum)),
                    });
                }
            }
        }

        self.enter(&mut report, CacheState::Concatenating);
        let assembled = assemble(
            symbol.index.kind,
            &columns,
            &snapshot.overrides,
            &snapshot.failsafes,
        );
        for problem in assembled.problems {
            self.checkpoint(
                symbol,
                &mut report,
                SymbolCheckpoint::Concatenation,
                format!("cannot align {}", problem_column(&problem)),
                Box::new(problem),
            )?;
        }
        let mut table = assembled.table;

        self.enter(&mut report, CacheState::Aggregating);
        self.aggregate(symbol, &mut table, &mut report)?;

        self.enter(&mut report, CacheState::Persisting);
        let outcome = self
            .storage
            .write_final_table(name, &table.to_storage(symbol.data_kind))?;
        if outcome.schema_changed {
            tracing::info!(symbol = name, "schema changed, table recreated");
            report.add_point(ReportPoint::new("persist", "schema_changed", true));
        }
        report.rows = table.len();
        report.table_hash = Some(table.fingerprint()?);

        if check_validity {
            self.enter(&mut report, CacheState::Validating);
            let valid = self.validate(symbol, &table, &[], &mut report)?;
            report.valid = Some(valid);
            if !valid {
                self.checkpoint(
                    symbol,
                    &mut report,
                    SymbolCheckpoint::ValidityCheck,
                    format!("{name} is not valid"),
                    Fault::boxed(format!("{name} failed one or more validators")),
                )?;
            }
        }

        self.enter(&mut report, CacheState::Done);
        report.add_point(
            ReportPoint::new("finish", "cache", true)
                .with_extra(table.final_series(name).tail_summary(3)),
        );
        tracing::info!(
            symbol = name,
            rows = report.rows,
            hash = report.table_hash.as_deref().unwrap_or(""),
            clean = report.is_clean(),
            "cached"
        );
        Ok(report)
    }

    fn aggregate(
        &self,
        symbol: &Symbol,
        table: &mut AlignedTable,
        report: &mut SymbolReport,
    ) -> Result<(), PipelineError> {
        let aggregator = match self.registries.aggregators.get(&symbol.agg_method) {
            Ok(aggregator) => aggregator,
            Err(e) => {
                return self.checkpoint(
                    symbol,
                    report,
                    SymbolCheckpoint::Aggregation,
                    format!("no aggregator '{}'", symbol.agg_method),
                    Box::new(e),
                );
            }
        };
        let aggregated = aggregate_table(table, aggregator.as_ref());
        table.final_values = aggregated.values;
        let failed = aggregated.failures.len();
        if let Some(first) = aggregated.failures.into_iter().next() {
            self.checkpoint(
                symbol,
                report,
                SymbolCheckpoint::Aggregation,
                format!("{failed} of {} rows failed to aggregate", table.len()),
                Box::new(first),
            )?;
        }
        Ok(())
    }

    /// Run validators, routing any that cannot run to `validity_check`.
    fn validate(
        &self,
        symbol: &Symbol,
        table: &AlignedTable,
        checks: &[String],
        report: &mut SymbolReport,
    ) -> Result<bool, PipelineError> {
        let selected = symbol.selected_validators(checks);
        let outcome = run_validators(&self.registries.validators, &selected, table);
        for point in outcome.points {
            report.add_point(point);
        }
        for failure in outcome.failures {
            self.checkpoint(
                symbol,
                report,
                SymbolCheckpoint::ValidityCheck,
                format!(
                    "validator {} (vid {}) could not run",
                    failure.validator, failure.vid
                ),
                Box::new(failure.error),
            )?;
        }
        Ok(outcome.valid)
    }

    /// Run a Symbol's validators against its stored table. An empty `checks`
    /// list runs all of them.
    pub fn check_validity(
        &self,
        name: &str,
        checks: &[String],
    ) -> Result<(bool, Vec<ReportPoint>), PipelineError> {
        let symbol = self.storage.load_symbol(name)?;
        let stored = self
            .storage
            .read_final_table(name)?
            .ok_or_else(|| StorageError::NoTable(name.to_string()))?;
        let table = AlignedTable::from_storage(&stored)?;
        let mut report = SymbolReport::new(name);
        let valid = self.validate(&symbol, &table, checks, &mut report)?;
        Ok((valid, report.points))
    }
}

fn problem_column(problem: &MergeError) -> String {
    match problem {
        MergeError::IndexKindMismatch { column, .. } => column.name(),
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("registries", &self.registries)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
