//! Checkpoint names: the points in the pipeline where a failure policy is
//! evaluated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::policy::PolicyError;

/// Checkpoints owned by a Feed's handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedCheckpoint {
    ApiFailure,
    EmptyFeed,
    Monounique,
    IndexTypeProblem,
    DataTypeProblem,
}

/// Checkpoints owned by a Symbol's handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolCheckpoint {
    Caching,
    Concatenation,
    Aggregation,
    ValidityCheck,
}

impl FeedCheckpoint {
    pub const ALL: [FeedCheckpoint; 5] = [
        FeedCheckpoint::ApiFailure,
        FeedCheckpoint::EmptyFeed,
        FeedCheckpoint::Monounique,
        FeedCheckpoint::IndexTypeProblem,
        FeedCheckpoint::DataTypeProblem,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeedCheckpoint::ApiFailure => "api_failure",
            FeedCheckpoint::EmptyFeed => "empty_feed",
            FeedCheckpoint::Monounique => "monounique",
            FeedCheckpoint::IndexTypeProblem => "index_type_problem",
            FeedCheckpoint::DataTypeProblem => "data_type_problem",
        }
    }
}

impl SymbolCheckpoint {
    pub const ALL: [SymbolCheckpoint; 4] = [
        SymbolCheckpoint::Caching,
        SymbolCheckpoint::Concatenation,
        SymbolCheckpoint::Aggregation,
        SymbolCheckpoint::ValidityCheck,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SymbolCheckpoint::Caching => "caching",
            SymbolCheckpoint::Concatenation => "concatenation",
            SymbolCheckpoint::Aggregation => "aggregation",
            SymbolCheckpoint::ValidityCheck => "validity_check",
        }
    }
}

impl FromStr for FeedCheckpoint {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeedCheckpoint::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| PolicyError::UnknownCheckpoint(s.to_string()))
    }
}

impl FromStr for SymbolCheckpoint {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SymbolCheckpoint::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| PolicyError::UnknownCheckpoint(s.to_string()))
    }
}

/// Any checkpoint, as carried in handle records and escalations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Checkpoint {
    Feed(FeedCheckpoint),
    Symbol(SymbolCheckpoint),
}

impl Checkpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Checkpoint::Feed(c) => c.name(),
            Checkpoint::Symbol(c) => c.name(),
        }
    }
}

impl From<FeedCheckpoint> for Checkpoint {
    fn from(c: FeedCheckpoint) -> Self {
        Checkpoint::Feed(c)
    }
}

impl From<SymbolCheckpoint> for Checkpoint {
    fn from(c: SymbolCheckpoint) -> Self {
        Checkpoint::Symbol(c)
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for FeedCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for SymbolCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for c in FeedCheckpoint::ALL {
            assert_eq!(c.name().parse::<FeedCheckpoint>().unwrap(), c);
        }
        for c in SymbolCheckpoint::ALL {
            assert_eq!(c.name().parse::<SymbolCheckpoint>().unwrap(), c);
        }
    }

    #[test]
    fn feed_names_are_not_symbol_names() {
        assert!("api_failure".parse::<SymbolCheckpoint>().is_err());
        assert!("aggregation".parse::<FeedCheckpoint>().is_err());
    }

    #[test]
    fn serialized_as_plain_name() {
        let c: Checkpoint = FeedCheckpoint::Monounique.into();
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"monounique\"");
        let back: Checkpoint = serde_json::from_str("\"validity_check\"").unwrap();
        assert_eq!(back, Checkpoint::Symbol(SymbolCheckpoint::ValidityCheck));
    }
}
