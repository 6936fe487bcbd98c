//! Validity stage: pluggable checks run against a Symbol's final table.
//!
//! The overall result is the AND of every validator that ran. An empty
//! selection is vacuously valid. A validator that cannot run counts as
//! failed and is reported separately so the caller can route it.

pub mod checks;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{ArgError, IndexError, Kwargs, ValidatorSpec};
use crate::factory::FactoryError;
use crate::report::ReportPoint;
use crate::table::AlignedTable;

#[derive(Debug, Error)]
pub enum ValidityError {
    #[error("table has no column '{0}'")]
    MissingColumn(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Factory(#[from] FactoryError),
}

/// Result of one validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    pub evidence: String,
}

impl Verdict {
    pub fn pass(evidence: impl Into<String>) -> Self {
        Self {
            passed: true,
            evidence: evidence.into(),
        }
    }

    pub fn fail(evidence: impl Into<String>) -> Self {
        Self {
            passed: false,
            evidence: evidence.into(),
        }
    }
}

pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, table: &AlignedTable) -> Result<Verdict, ValidityError>;
}

/// Builds a validator from its stored arguments.
pub type ValidatorBuilder =
    Arc<dyn Fn(&Kwargs) -> Result<Box<dyn Validator>, ArgError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    builders: HashMap<String, ValidatorBuilder>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        checks::register(&mut reg);
        reg
    }

    pub fn register<F>(&mut self, name: &str, builder: F)
    where
        F: Fn(&Kwargs) -> Result<Box<dyn Validator>, ArgError> + Send + Sync + 'static,
    {
        self.builders.insert(name.to_string(), Arc::new(builder));
    }

    pub fn build(&self, name: &str, args: &Kwargs) -> Result<Box<dyn Validator>, FactoryError> {
        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| FactoryError::UnknownValidator(name.to_string()))?;
        builder(args).map_err(|source| FactoryError::BadArgs {
            component: name.to_string(),
            source,
        })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// A validator that could not be run.
#[derive(Debug)]
pub struct ValidatorFailure {
    pub vid: u32,
    pub validator: String,
    pub error: ValidityError,
}

#[derive(Debug, Default)]
pub struct ValidityOutcome {
    pub valid: bool,
    /// One `validation` point per validator that ran.
    pub points: Vec<ReportPoint>,
    pub failures: Vec<ValidatorFailure>,
}

/// Run the given validators. Failures to build or run one do not stop the
/// others.
pub fn run_validators(
    registry: &ValidatorRegistry,
    specs: &[&ValidatorSpec],
    table: &AlignedTable,
) -> ValidityOutcome {
    let mut outcome = ValidityOutcome {
        valid: true,
        ..ValidityOutcome::default()
    };
    for spec in specs {
        let result = registry
            .build(&spec.validator, &spec.args)
            .map_err(ValidityError::from)
            .and_then(|v| v.check(table));
        match result {
            Ok(verdict) => {
                outcome.valid &= verdict.passed;
                outcome.points.push(
                    ReportPoint::new("validation", spec.validator.clone(), verdict.passed)
                        .with_extra(format!(
                            "vid={} args={} {}",
                            spec.vid,
                            crate::domain::kwargs::render(&spec.args),
                            verdict.evidence
                        )),
                );
            }
            Err(error) => {
                outcome.valid = false;
                outcome.failures.push(ValidatorFailure {
                    vid: spec.vid,
                    validator: spec.validator.clone(),
                    error,
                });
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{kwargs, IndexKind, IndexValue};
    use crate::table::{Column, ColumnRole};

    fn table() -> AlignedTable {
        let mut t = AlignedTable::new(
            IndexKind::Integer,
            (1..=3).map(IndexValue::Integer).collect(),
        );
        t.columns.push(Column {
            role: ColumnRole::Feed(0),
            values: vec![Some(1.0), Some(2.0), Some(3.0)],
        });
        t.final_values = vec![Some(1.0), Some(2.0), Some(3.0)];
        t
    }

    fn spec(vid: u32, name: &str, args: Kwargs) -> ValidatorSpec {
        ValidatorSpec {
            vid,
            validator: name.into(),
            args,
        }
    }

    #[test]
    fn empty_selection_is_vacuously_valid() {
        let out = run_validators(&ValidatorRegistry::with_builtins(), &[], &table());
        assert!(out.valid);
        assert!(out.points.is_empty());
    }

    #[test]
    fn result_is_the_and_of_all_validators() {
        let reg = ValidatorRegistry::with_builtins();
        let ok = spec(0, "no_missing_final", Kwargs::new());
        let bad = spec(1, "final_in_range", kwargs([("max", 2.0)]));
        let out = run_validators(&reg, &[&ok, &bad], &table());
        assert!(!out.valid);
        assert_eq!(out.points.len(), 2);
        assert_eq!(out.points[0].value, serde_json::json!(true));
        assert_eq!(out.points[1].value, serde_json::json!(false));
    }

    #[test]
    fn broken_validator_fails_without_stopping_the_rest() {
        let reg = ValidatorRegistry::with_builtins();
        let broken = spec(0, "feeds_match", kwargs([("right", 5i64)]));
        let ok = spec(1, "no_missing_final", Kwargs::new());
        let out = run_validators(&reg, &[&broken, &ok], &table());
        assert!(!out.valid);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].vid, 0);
        assert_eq!(out.points.len(), 1);
    }

    #[test]
    fn unknown_validator_is_a_factory_error() {
        let reg = ValidatorRegistry::with_builtins();
        assert!(matches!(
            reg.build("is_pretty", &Kwargs::new()),
            Err(FactoryError::UnknownValidator(_))
        ));
    }
}
