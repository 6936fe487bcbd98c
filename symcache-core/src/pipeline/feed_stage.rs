//! Feed cache stage: source → shape checks → munge → type coercion.

use crate::domain::kwargs::render;
use crate::domain::{Feed, Point, Series, Symbol};
use crate::error::PipelineError;
use crate::factory::Registries;
use crate::handling::{Cause, CheckpointHandler, Fault, FeedCheckpoint};
use crate::munge::MungeError;
use crate::report::{FeedReport, ReportPoint};
use crate::settings::Settings;

/// Why a feed did not produce a series.
#[derive(Debug)]
pub enum FeedFailure {
    /// A feed checkpoint escalated; the Symbol's cache call aborts.
    Escalated(PipelineError),
    /// A munge step failed. The Symbol's `caching` policy decides.
    Munge {
        report: FeedReport,
        error: MungeError,
    },
}

impl From<PipelineError> for FeedFailure {
    fn from(e: PipelineError) -> Self {
        FeedFailure::Escalated(e)
    }
}

pub struct FeedStage<'a> {
    pub registries: &'a Registries,
    pub settings: &'a Settings,
    pub handler: &'a CheckpointHandler,
}

impl FeedStage<'_> {
    fn checkpoint(
        &self,
        feed: &Feed,
        report: &mut FeedReport,
        checkpoint: FeedCheckpoint,
        message: String,
        cause: Cause,
    ) -> Result<(), PipelineError> {
        let outcome = self.handler.process(
            feed.handle.policy(checkpoint),
            checkpoint,
            &feed.owner(),
            message,
            cause,
        )?;
        report.absorb(outcome);
        Ok(())
    }

    /// Fetch the raw series. Failures go to `api_failure`; when absorbed
    /// the feed continues with an empty series.
    fn source(&self, feed: &Feed, report: &mut FeedReport) -> Result<Series, PipelineError> {
        let spec = &feed.source;
        let params =
            match self
                .settings
                .resolve_params(&spec.source_type, spec.sourcing_key.as_deref(), &spec.params)
            {
                Ok(params) => params,
                Err(e) => {
                    self.checkpoint(
                        feed,
                        report,
                        FeedCheckpoint::ApiFailure,
                        format!("cannot resolve parameters for {}", spec.source_type),
                        Box::new(e),
                    )?;
                    return Ok(Series::empty(feed.column_name()));
                }
            };

        let extra = match &spec.sourcing_key {
            Some(key) => format!("{} via '{key}'", render(&params)),
            None => render(&params),
        };
        report.add_point(
            ReportPoint::new("readmeta", "sourcing", spec.source_type.clone()).with_extra(extra),
        );

        match self.registries.sources.fetch(&spec.source_type, &params) {
            Ok(series) => Ok(series),
            Err(e) => {
                self.checkpoint(
                    feed,
                    report,
                    FeedCheckpoint::ApiFailure,
                    format!("fetch from {} failed", spec.source_type),
                    Box::new(e),
                )?;
                Ok(Series::empty(feed.column_name()))
            }
        }
    }

    pub fn cache(&self, feed: &Feed, symbol: &Symbol) -> Result<(Series, FeedReport), FeedFailure> {
        let mut report = FeedReport::new(feed.fnum);
        let owner = feed.owner();

        let raw = self.source(feed, &mut report)?;
        tracing::debug!(feed = %owner, rows = raw.len(), "fetched");

        if raw.is_empty() {
            self.checkpoint(
                feed,
                &mut report,
                FeedCheckpoint::EmptyFeed,
                "feed returned no rows".into(),
                Fault::boxed(format!("{} returned an empty series", feed.source.source_type)),
            )?;
        }

        if let Some(pos) = raw.monounique_violation() {
            self.checkpoint(
                feed,
                &mut report,
                FeedCheckpoint::Monounique,
                "index is not strictly increasing and unique".into(),
                Fault::boxed(format!(
                    "row {pos}: {} follows {}",
                    raw.points[pos].index,
                    raw.points[pos - 1].index
                )),
            )?;
        }

        let munged = match self.registries.munges.apply(raw, &feed.steps()) {
            Ok(series) => series,
            Err(error) => return Err(FeedFailure::Munge { report, error }),
        };

        let typed = self.coerce(feed, symbol, munged, &mut report)?;
        let series = typed.renamed(feed.column_name());

        report.add_point(
            ReportPoint::new("finish", "cache", true).with_extra(series.tail_summary(3)),
        );
        Ok((series, report))
    }

    /// Coerce index values to the Symbol's index kind and values to its
    /// data kind. Absorbed index failures drop the row; absorbed value
    /// failures leave the value missing.
    fn coerce(
        &self,
        feed: &Feed,
        symbol: &Symbol,
        series: Series,
        report: &mut FeedReport,
    ) -> Result<Series, PipelineError> {
        let index_kind = symbol.index.kind;
        let data_kind = symbol.data_kind;

        let mut points = Vec::with_capacity(series.len());
        let mut index_errors = Vec::new();
        let mut data_errors = Vec::new();
        for point in series.points {
            let index = match index_kind.coerce(point.index) {
                Ok(index) => index,
                Err(e) => {
                    index_errors.push(e);
                    continue;
                }
            };
            let value = match data_kind.coerce(point.value) {
                Ok(value) => value,
                Err(e) => {
                    data_errors.push(e);
                    None
                }
            };
            points.push(Point { index, value });
        }

        if let Some(first) = index_errors.first() {
            self.checkpoint(
                feed,
                report,
                FeedCheckpoint::IndexTypeProblem,
                format!(
                    "{} index values could not be coerced to {index_kind}",
                    index_errors.len()
                ),
                Box::new(first.clone()),
            )?;
        }
        if let Some(first) = data_errors.first() {
            self.checkpoint(
                feed,
                report,
                FeedCheckpoint::DataTypeProblem,
                format!(
                    "{} values could not be coerced to {data_kind}",
                    data_errors.len()
                ),
                Box::new(first.clone()),
            )?;
        }
        Ok(Series::new(series.name, points))
    }
}
