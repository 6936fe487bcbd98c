//! BitPolicy: an immutable set of named failure-reaction flags.
//!
//! The bit layout is fixed so integer masks written by older tooling keep
//! their meaning: `raise`=1, `warn`=2, `email`=4, `dblog`=8, `txtlog`=16,
//! `stdout`=32, `report`=64.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One reaction to a checkpoint failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flag {
    /// Escalate: abort the current Symbol's cache call.
    Raise,
    /// Emit a `tracing` warning.
    Warn,
    /// Dispatch an external notification.
    Email,
    /// Hand the record to the notifier's persistent log.
    DbLog,
    /// Emit to the text log target.
    TxtLog,
    /// Print an operator-visible console line.
    Stdout,
    /// Attach the record to the report tree.
    Report,
}

impl Flag {
    pub const ALL: [Flag; 7] = [
        Flag::Raise,
        Flag::Warn,
        Flag::Email,
        Flag::DbLog,
        Flag::TxtLog,
        Flag::Stdout,
        Flag::Report,
    ];

    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            Flag::Raise => "raise",
            Flag::Warn => "warn",
            Flag::Email => "email",
            Flag::DbLog => "dblog",
            Flag::TxtLog => "txtlog",
            Flag::Stdout => "stdout",
            Flag::Report => "report",
        }
    }

    pub fn from_name(name: &str) -> Option<Flag> {
        let name = name.trim().to_ascii_lowercase();
        let name = match name.as_str() {
            "notify" => "email",
            "log" => "stdout",
            other => other,
        };
        Flag::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("unknown policy flag '{0}'")]
    UnknownFlag(String),

    #[error("bitmask {0} sets bits outside the known flags")]
    UnknownBits(u16),

    #[error("unknown checkpoint '{0}'")]
    UnknownCheckpoint(String),

    #[error("unknown policy sentinel '{0}' (only \"default\" is recognised)")]
    UnknownSentinel(String),
}

const KNOWN_BITS: u8 = 0b0111_1111;

/// An immutable set of flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy", into = "RawPolicy")]
pub struct BitPolicy(u8);

impl BitPolicy {
    /// No flags: failures are fully absorbed.
    pub const SILENT: BitPolicy = BitPolicy(0);
    /// Only `raise`: the global raise-by-default policy.
    pub const RAISE: BitPolicy = BitPolicy(1);

    pub fn from_bits(bits: u16) -> Result<Self, PolicyError> {
        if bits > KNOWN_BITS as u16 {
            return Err(PolicyError::UnknownBits(bits));
        }
        Ok(BitPolicy(bits as u8))
    }

    pub fn from_flags(flags: impl IntoIterator<Item = Flag>) -> Self {
        BitPolicy(flags.into_iter().fold(0, |acc, f| acc | f.bit()))
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, PolicyError> {
        names
            .iter()
            .map(|n| {
                Flag::from_name(n.as_ref())
                    .ok_or_else(|| PolicyError::UnknownFlag(n.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(BitPolicy::from_flags)
    }

    /// Parse a comma-separated flag list, as accepted on the command line.
    /// An integer is read as a bitmask.
    pub fn parse(raw: &str) -> Result<Self, PolicyError> {
        if let Ok(bits) = raw.trim().parse::<u16>() {
            return BitPolicy::from_bits(bits);
        }
        let names: Vec<&str> = raw.split(',').filter(|s| !s.trim().is_empty()).collect();
        BitPolicy::from_names(names.as_slice())
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.0 & flag.bit() != 0
    }

    pub fn is_silent(&self) -> bool {
        self.0 == 0
    }

    pub fn escalates(&self) -> bool {
        self.contains(Flag::Raise)
    }

    pub fn with(self, flag: Flag) -> Self {
        BitPolicy(self.0 | flag.bit())
    }

    pub fn without(self, flag: Flag) -> Self {
        BitPolicy(self.0 & !flag.bit())
    }

    pub fn flags(&self) -> impl Iterator<Item = Flag> + '_ {
        Flag::ALL.into_iter().filter(|f| self.contains(*f))
    }
}

impl fmt::Debug for BitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitPolicy({self})")
    }
}

impl fmt::Display for BitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.flags().map(Flag::name).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Wire form of a policy: either a bitmask or a list of flag names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPolicy {
    Bits(u16),
    Names(Vec<String>),
}

impl TryFrom<RawPolicy> for BitPolicy {
    type Error = PolicyError;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        match raw {
            RawPolicy::Bits(bits) => BitPolicy::from_bits(bits),
            RawPolicy::Names(names) => BitPolicy::from_names(names.as_slice()),
        }
    }
}

impl From<BitPolicy> for RawPolicy {
    fn from(policy: BitPolicy) -> Self {
        RawPolicy::Names(policy.flags().map(|f| f.name().to_string()).collect())
    }
}

/// A policy as written in configuration.
///
/// Besides the two wire forms, the string `"default"` selects the
/// checkpoint's built-in default, which is `{raise}` when raise-by-default is
/// configured.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PolicySpec {
    Bits(u16),
    Names(Vec<String>),
    Sentinel(String),
}

impl PolicySpec {
    /// Resolve against the checkpoint's built-in default.
    pub fn resolve(
        &self,
        fallback: BitPolicy,
        raise_by_default: bool,
    ) -> Result<BitPolicy, PolicyError> {
        match self {
            PolicySpec::Bits(bits) => BitPolicy::from_bits(*bits),
            PolicySpec::Names(names) => BitPolicy::from_names(names.as_slice()),
            PolicySpec::Sentinel(s) if s.eq_ignore_ascii_case("default") => {
                Ok(if raise_by_default {
                    BitPolicy::RAISE
                } else {
                    fallback
                })
            }
            PolicySpec::Sentinel(s) => Err(PolicyError::UnknownSentinel(s.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmask_layout_matches_flag_order() {
        let p = BitPolicy::from_bits(36).unwrap();
        assert!(p.contains(Flag::Email));
        assert!(p.contains(Flag::Stdout));
        assert!(!p.contains(Flag::Raise));
        assert_eq!(p, BitPolicy::from_flags([Flag::Email, Flag::Stdout]));
    }

    #[test]
    fn raise_constant_is_bit_one() {
        assert_eq!(BitPolicy::RAISE.bits(), 1);
        assert!(BitPolicy::RAISE.escalates());
    }

    #[test]
    fn unknown_bits_are_rejected() {
        assert_eq!(BitPolicy::from_bits(128), Err(PolicyError::UnknownBits(128)));
    }

    #[test]
    fn names_round_trip_through_display() {
        let p = BitPolicy::from_names(&["report", "stdout"][..]).unwrap();
        assert_eq!(p.to_string(), "{stdout, report}");
    }

    #[test]
    fn aliases_map_to_catalogue_flags() {
        let p = BitPolicy::parse("notify,log").unwrap();
        assert_eq!(p, BitPolicy::from_flags([Flag::Email, Flag::Stdout]));
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(
            BitPolicy::parse("raise,shout"),
            Err(PolicyError::UnknownFlag("shout".into()))
        );
    }

    #[test]
    fn serde_accepts_both_wire_forms() {
        let a: BitPolicy = serde_json::from_str("65").unwrap();
        let b: BitPolicy = serde_json::from_str(r#"["raise", "report"]"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), r#"["raise","report"]"#);
    }

    #[test]
    fn sentinel_follows_raise_by_default() {
        let spec = PolicySpec::Sentinel("default".into());
        let fallback = BitPolicy::from_flags([Flag::Stdout]);
        assert_eq!(spec.resolve(fallback, false).unwrap(), fallback);
        assert_eq!(spec.resolve(fallback, true).unwrap(), BitPolicy::RAISE);
    }

    #[test]
    fn empty_policy_is_silent() {
        assert!(BitPolicy::SILENT.is_silent());
        assert!(BitPolicy::parse("").unwrap().is_silent());
    }
}
