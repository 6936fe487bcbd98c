//! Handles: one BitPolicy per checkpoint, as a fixed record.
//!
//! Defaults are built from `HandleDefaults`, which carries the global
//! raise-by-default switch. Overrides arrive as `*HandleConfig` records that
//! reject unknown checkpoint names at parse time.

use serde::{Deserialize, Serialize};

use super::checkpoint::{FeedCheckpoint, SymbolCheckpoint};
use super::policy::{BitPolicy, Flag, PolicyError, PolicySpec};

/// Inputs to handle construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleDefaults {
    /// When set, every checkpoint defaults to `{raise}`.
    pub raise_by_default: bool,
}

fn pick(defaults: &HandleDefaults, fallback: BitPolicy) -> BitPolicy {
    if defaults.raise_by_default {
        BitPolicy::RAISE
    } else {
        fallback
    }
}

fn stdout_report() -> BitPolicy {
    BitPolicy::from_flags([Flag::Stdout, Flag::Report])
}

// ─── Symbol handle ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolHandle {
    pub caching: BitPolicy,
    pub concatenation: BitPolicy,
    pub aggregation: BitPolicy,
    pub validity_check: BitPolicy,
}

impl SymbolHandle {
    pub fn defaults(defaults: &HandleDefaults) -> Self {
        Self {
            caching: pick(defaults, BitPolicy::SILENT),
            concatenation: pick(defaults, BitPolicy::RAISE),
            aggregation: pick(defaults, BitPolicy::from_flags([Flag::Stdout])),
            validity_check: pick(defaults, BitPolicy::from_flags([Flag::Report])),
        }
    }

    /// Every checkpoint set to the same policy.
    pub fn uniform(policy: BitPolicy) -> Self {
        Self {
            caching: policy,
            concatenation: policy,
            aggregation: policy,
            validity_check: policy,
        }
    }

    pub fn policy(&self, checkpoint: SymbolCheckpoint) -> BitPolicy {
        match checkpoint {
            SymbolCheckpoint::Caching => self.caching,
            SymbolCheckpoint::Concatenation => self.concatenation,
            SymbolCheckpoint::Aggregation => self.aggregation,
            SymbolCheckpoint::ValidityCheck => self.validity_check,
        }
    }

    pub fn set_policy(&mut self, checkpoint: SymbolCheckpoint, policy: BitPolicy) {
        let slot = match checkpoint {
            SymbolCheckpoint::Caching => &mut self.caching,
            SymbolCheckpoint::Concatenation => &mut self.concatenation,
            SymbolCheckpoint::Aggregation => &mut self.aggregation,
            SymbolCheckpoint::ValidityCheck => &mut self.validity_check,
        };
        *slot = policy;
    }

    /// Set a checkpoint by name. Unknown names are an error, never ignored.
    pub fn set(&mut self, name: &str, policy: BitPolicy) -> Result<(), PolicyError> {
        let checkpoint: SymbolCheckpoint = name.parse()?;
        self.set_policy(checkpoint, policy);
        Ok(())
    }
}

impl Default for SymbolHandle {
    fn default() -> Self {
        Self::defaults(&HandleDefaults::default())
    }
}

// ─── Feed handle ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedHandle {
    pub api_failure: BitPolicy,
    pub empty_feed: BitPolicy,
    pub monounique: BitPolicy,
    pub index_type_problem: BitPolicy,
    pub data_type_problem: BitPolicy,
}

impl FeedHandle {
    pub fn defaults(defaults: &HandleDefaults) -> Self {
        Self {
            api_failure: pick(defaults, BitPolicy::RAISE),
            empty_feed: pick(defaults, stdout_report()),
            monounique: pick(defaults, BitPolicy::RAISE),
            index_type_problem: pick(defaults, stdout_report()),
            data_type_problem: pick(defaults, stdout_report()),
        }
    }

    pub fn uniform(policy: BitPolicy) -> Self {
        Self {
            api_failure: policy,
            empty_feed: policy,
            monounique: policy,
            index_type_problem: policy,
            data_type_problem: policy,
        }
    }

    pub fn policy(&self, checkpoint: FeedCheckpoint) -> BitPolicy {
        match checkpoint {
            FeedCheckpoint::ApiFailure => self.api_failure,
            FeedCheckpoint::EmptyFeed => self.empty_feed,
            FeedCheckpoint::Monounique => self.monounique,
            FeedCheckpoint::IndexTypeProblem => self.index_type_problem,
            FeedCheckpoint::DataTypeProblem => self.data_type_problem,
        }
    }

    pub fn set_policy(&mut self, checkpoint: FeedCheckpoint, policy: BitPolicy) {
        let slot = match checkpoint {
            FeedCheckpoint::ApiFailure => &mut self.api_failure,
            FeedCheckpoint::EmptyFeed => &mut self.empty_feed,
            FeedCheckpoint::Monounique => &mut self.monounique,
            FeedCheckpoint::IndexTypeProblem => &mut self.index_type_problem,
            FeedCheckpoint::DataTypeProblem => &mut self.data_type_problem,
        };
        *slot = policy;
    }

    pub fn set(&mut self, name: &str, policy: BitPolicy) -> Result<(), PolicyError> {
        let checkpoint: FeedCheckpoint = name.parse()?;
        self.set_policy(checkpoint, policy);
        Ok(())
    }
}

impl Default for FeedHandle {
    fn default() -> Self {
        Self::defaults(&HandleDefaults::default())
    }
}

// ─── Configuration records ───────────────────────────────────────────

/// Symbol handle overrides as written in TOML. Absent fields keep the
/// default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolHandleConfig {
    pub caching: Option<PolicySpec>,
    pub concatenation: Option<PolicySpec>,
    pub aggregation: Option<PolicySpec>,
    pub validity_check: Option<PolicySpec>,
}

impl SymbolHandleConfig {
    /// Apply onto an existing handle.
    pub fn apply_to(
        &self,
        handle: &mut SymbolHandle,
        defaults: &HandleDefaults,
    ) -> Result<(), PolicyError> {
        let base = SymbolHandle::defaults(&HandleDefaults {
            raise_by_default: false,
        });
        let fields = [
            (SymbolCheckpoint::Caching, &self.caching),
            (SymbolCheckpoint::Concatenation, &self.concatenation),
            (SymbolCheckpoint::Aggregation, &self.aggregation),
            (SymbolCheckpoint::ValidityCheck, &self.validity_check),
        ];
        for (checkpoint, spec) in fields {
            if let Some(spec) = spec {
                let policy = spec.resolve(base.policy(checkpoint), defaults.raise_by_default)?;
                handle.set_policy(checkpoint, policy);
            }
        }
        Ok(())
    }

    pub fn build(&self, defaults: &HandleDefaults) -> Result<SymbolHandle, PolicyError> {
        let mut handle = SymbolHandle::defaults(defaults);
        self.apply_to(&mut handle, defaults)?;
        Ok(handle)
    }
}

/// Feed handle overrides as written in TOML.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedHandleConfig {
    pub api_failure: Option<PolicySpec>,
    pub empty_feed: Option<PolicySpec>,
    pub monounique: Option<PolicySpec>,
    pub index_type_problem: Option<PolicySpec>,
    pub data_type_problem: Option<PolicySpec>,
}

impl FeedHandleConfig {
    pub fn apply_to(
        &self,
        handle: &mut FeedHandle,
        defaults: &HandleDefaults,
    ) -> Result<(), PolicyError> {
        let base = FeedHandle::defaults(&HandleDefaults {
            raise_by_default: false,
        });
        let fields = [
            (FeedCheckpoint::ApiFailure, &self.api_failure),
            (FeedCheckpoint::EmptyFeed, &self.empty_feed),
            (FeedCheckpoint::Monounique, &self.monounique),
            (FeedCheckpoint::IndexTypeProblem, &self.index_type_problem),
            (FeedCheckpoint::DataTypeProblem, &self.data_type_problem),
        ];
        for (checkpoint, spec) in fields {
            if let Some(spec) = spec {
                let policy = spec.resolve(base.policy(checkpoint), defaults.raise_by_default)?;
                handle.set_policy(checkpoint, policy);
            }
        }
        Ok(())
    }

    pub fn build(&self, defaults: &HandleDefaults) -> Result<FeedHandle, PolicyError> {
        let mut handle = FeedHandle::defaults(defaults);
        self.apply_to(&mut handle, defaults)?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raise_all() -> HandleDefaults {
        HandleDefaults {
            raise_by_default: true,
        }
    }

    #[test]
    fn symbol_defaults() {
        let h = SymbolHandle::default();
        assert!(h.caching.is_silent());
        assert_eq!(h.concatenation, BitPolicy::RAISE);
        assert_eq!(h.aggregation, BitPolicy::from_flags([Flag::Stdout]));
        assert_eq!(h.validity_check, BitPolicy::from_flags([Flag::Report]));
    }

    #[test]
    fn feed_defaults() {
        let h = FeedHandle::default();
        assert_eq!(h.api_failure, BitPolicy::RAISE);
        assert_eq!(h.monounique, BitPolicy::RAISE);
        assert_eq!(h.empty_feed, stdout_report());
        assert_eq!(h.index_type_problem, stdout_report());
        assert_eq!(h.data_type_problem, stdout_report());
    }

    #[test]
    fn raise_by_default_applies_everywhere() {
        let s = SymbolHandle::defaults(&raise_all());
        let f = FeedHandle::defaults(&raise_all());
        for c in SymbolCheckpoint::ALL {
            assert_eq!(s.policy(c), BitPolicy::RAISE);
        }
        for c in FeedCheckpoint::ALL {
            assert_eq!(f.policy(c), BitPolicy::RAISE);
        }
    }

    #[test]
    fn set_by_name_rejects_unknown_checkpoint() {
        let mut h = FeedHandle::default();
        h.set("empty_feed", BitPolicy::SILENT).unwrap();
        assert!(h.empty_feed.is_silent());
        assert_eq!(
            h.set("emptyfeed", BitPolicy::SILENT),
            Err(PolicyError::UnknownCheckpoint("emptyfeed".into()))
        );
    }

    #[test]
    fn config_rejects_unknown_fields() {
        let err = toml::from_str::<FeedHandleConfig>("api_failur = [\"raise\"]");
        assert!(err.is_err());
    }

    #[test]
    fn config_accepts_all_policy_forms() {
        let cfg: FeedHandleConfig = toml::from_str(
            r#"
            api_failure = ["stdout", "report"]
            empty_feed = 0
            monounique = "default"
            "#,
        )
        .unwrap();
        let h = cfg.build(&HandleDefaults::default()).unwrap();
        assert_eq!(h.api_failure, stdout_report());
        assert!(h.empty_feed.is_silent());
        assert_eq!(h.monounique, BitPolicy::RAISE);
        assert_eq!(h.data_type_problem, stdout_report());
    }

    #[test]
    fn default_sentinel_restores_builtin_when_not_raising() {
        let cfg: SymbolHandleConfig = toml::from_str("aggregation = \"default\"").unwrap();
        let mut h = SymbolHandle::uniform(BitPolicy::SILENT);
        cfg.apply_to(&mut h, &HandleDefaults::default()).unwrap();
        assert_eq!(h.aggregation, BitPolicy::from_flags([Flag::Stdout]));
        assert!(h.caching.is_silent());
    }
}
