//! Symbol definitions.

use serde::{Deserialize, Serialize};

use super::datakind::DataKind;
use super::index::{IndexKind, IndexSpec};
use super::kwargs::Kwargs;
use crate::handling::{HandleDefaults, SymbolHandle};

pub const DEFAULT_AGG_METHOD: &str = "priority_fill";

fn default_agg_method() -> String {
    DEFAULT_AGG_METHOD.to_string()
}

/// One declared validity rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSpec {
    pub vid: u32,
    pub validator: String,
    #[serde(default)]
    pub args: Kwargs,
}

/// A named canonical series. Feeds, overrides and failsafes are stored
/// separately and loaded as a snapshot when caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub units: String,
    #[serde(default = "default_agg_method")]
    pub agg_method: String,
    #[serde(default)]
    pub index: IndexSpec,
    #[serde(default)]
    pub data_kind: DataKind,
    #[serde(default)]
    pub validators: Vec<ValidatorSpec>,
    #[serde(default)]
    pub handle: SymbolHandle,
}

impl Symbol {
    pub fn new(name: impl Into<String>, defaults: &HandleDefaults) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            units: String::new(),
            agg_method: default_agg_method(),
            index: IndexSpec::default(),
            data_kind: DataKind::default(),
            validators: Vec::new(),
            handle: SymbolHandle::defaults(defaults),
        }
    }

    pub fn with_agg_method(mut self, method: impl Into<String>) -> Self {
        self.agg_method = method.into();
        self
    }

    pub fn with_index_kind(mut self, kind: IndexKind) -> Self {
        self.index.kind = kind;
        self
    }

    pub fn with_data_kind(mut self, kind: DataKind) -> Self {
        self.data_kind = kind;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub fn with_handle(mut self, handle: SymbolHandle) -> Self {
        self.handle = handle;
        self
    }

    /// Next validator id: one past the largest in use, or 0.
    pub fn next_vid(&self) -> u32 {
        self.validators
            .iter()
            .map(|v| v.vid + 1)
            .max()
            .unwrap_or(0)
    }

    /// Validators selected by name. An empty selection means all of them.
    pub fn selected_validators<'a>(&'a self, checks: &[String]) -> Vec<&'a ValidatorSpec> {
        self.validators
            .iter()
            .filter(|v| checks.is_empty() || checks.iter().any(|c| c == &v.validator))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(vid: u32, name: &str) -> ValidatorSpec {
        ValidatorSpec {
            vid,
            validator: name.into(),
            args: Kwargs::new(),
        }
    }

    #[test]
    fn vid_is_max_plus_one() {
        let mut s = Symbol::new("X", &HandleDefaults::default());
        assert_eq!(s.next_vid(), 0);
        s.validators.push(spec(0, "a"));
        s.validators.push(spec(4, "b"));
        assert_eq!(s.next_vid(), 5);
    }

    #[test]
    fn empty_check_list_selects_everything() {
        let mut s = Symbol::new("X", &HandleDefaults::default());
        s.validators = vec![spec(0, "date_exists"), spec(1, "feeds_match")];
        assert_eq!(s.selected_validators(&[]).len(), 2);
        let only = s.selected_validators(&["feeds_match".to_string()]);
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].vid, 1);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let s: Symbol = toml::from_str("name = \"EURCAD\"").unwrap();
        assert_eq!(s.agg_method, "priority_fill");
        assert_eq!(s.data_kind, DataKind::Skip);
        assert_eq!(s.index.kind, IndexKind::Date);
    }
}
