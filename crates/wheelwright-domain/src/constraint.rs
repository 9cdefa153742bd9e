//! Runtime compatibility constraints published by the upstream source tree.
//!
//! The accepted grammar is deliberately narrow: `(>=|>)X.Y(,(<|<=)X.Y)?`.

use std::fmt;
use std::str::FromStr;

use pep440_rs::Version;
use serde::Serialize;

use crate::version::{RuntimeVersion, KNOWN_RUNTIMES};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintError {
    #[error("constraint `{0}` does not match (>=|>)X.Y(,(<|<=)X.Y)?")]
    Grammar(String),
    #[error("constraint `{0}` admits no known runtime")]
    Empty(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bound {
    pub runtime: RuntimeVersion,
    pub inclusive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuntimeConstraint {
    pub lower: Bound,
    pub upper: Option<Bound>,
}

impl RuntimeConstraint {
    #[must_use]
    pub fn allows(&self, runtime: RuntimeVersion) -> bool {
        let above = if self.lower.inclusive {
            runtime >= self.lower.runtime
        } else {
            runtime > self.lower.runtime
        };
        let below = self.upper.map_or(true, |upper| {
            if upper.inclusive {
                runtime <= upper.runtime
            } else {
                runtime < upper.runtime
            }
        });
        above && below
    }

    /// Every known runtime admitted by the constraint, ascending.
    pub fn expand(&self) -> Result<Vec<RuntimeVersion>, ConstraintError> {
        let runtimes: Vec<_> = KNOWN_RUNTIMES
            .iter()
            .copied()
            .filter(|runtime| self.allows(*runtime))
            .collect();
        if runtimes.is_empty() {
            return Err(ConstraintError::Empty(self.to_string()));
        }
        Ok(runtimes)
    }
}

impl fmt::Display for RuntimeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.lower.inclusive { ">=" } else { ">" };
        write!(f, "{op}{}", self.lower.runtime)?;
        if let Some(upper) = self.upper {
            let op = if upper.inclusive { "<=" } else { "<" };
            write!(f, ",{op}{}", upper.runtime)?;
        }
        Ok(())
    }
}

impl FromStr for RuntimeConstraint {
    type Err = ConstraintError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let grammar = || ConstraintError::Grammar(raw.to_string());
        let cleaned: String = raw
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let (lower_raw, upper_raw) = match cleaned.split_once(',') {
            Some((lower, upper)) => (lower, Some(upper)),
            None => (cleaned.as_str(), None),
        };

        let lower = if let Some(rest) = lower_raw.strip_prefix(">=") {
            Bound {
                runtime: parse_runtime(rest).ok_or_else(grammar)?,
                inclusive: true,
            }
        } else if let Some(rest) = lower_raw.strip_prefix('>') {
            Bound {
                runtime: parse_runtime(rest).ok_or_else(grammar)?,
                inclusive: false,
            }
        } else {
            return Err(grammar());
        };

        let upper = match upper_raw {
            None => None,
            Some(upper) => {
                if let Some(rest) = upper.strip_prefix("<=") {
                    Some(Bound {
                        runtime: parse_runtime(rest).ok_or_else(grammar)?,
                        inclusive: true,
                    })
                } else if let Some(rest) = upper.strip_prefix('<') {
                    Some(Bound {
                        runtime: parse_runtime(rest).ok_or_else(grammar)?,
                        inclusive: false,
                    })
                } else {
                    return Err(grammar());
                }
            }
        };

        Ok(Self { lower, upper })
    }
}

fn parse_runtime(raw: &str) -> Option<RuntimeVersion> {
    let (major, minor) = raw.split_once('.')?;
    if major.is_empty()
        || minor.is_empty()
        || !major.chars().all(|c| c.is_ascii_digit())
        || !minor.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    Some(RuntimeVersion::new(major.parse().ok()?, minor.parse().ok()?))
}

/// Compatibility of past upstream releases, used when the live constraint
/// cannot be fetched outside auto mode. Rows are ordered by `below`.
const HISTORICAL_COMPATIBILITY: &[(Option<&str>, &str)] = &[
    (Some("0.6.4"), ">=3.8,<3.13"),
    (Some("0.11.0"), ">=3.9,<3.13"),
    (None, ">=3.10,<3.14"),
];

/// Looks up the historical constraint for `upstream`.
pub fn historical_constraint(upstream: &Version) -> Result<RuntimeConstraint, ConstraintError> {
    let row = HISTORICAL_COMPATIBILITY
        .iter()
        .find(|(below, _)| match below {
            Some(bound) => Version::from_str(bound).is_ok_and(|bound| *upstream < bound),
            None => true,
        })
        .map_or(">=3.10,<3.14", |(_, constraint)| *constraint);
    row.parse()
}
