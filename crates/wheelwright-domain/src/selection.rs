//! User-facing selectors for the build matrix.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use strum::IntoEnumIterator;

use crate::version::{RuntimeVersion, KNOWN_RUNTIMES};
use crate::target::Platform;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("unknown platform `{0}` (expected x86_64, aarch64, all, or native)")]
    UnknownPlatform(String),
    #[error("host architecture `{0}` is not a supported build platform")]
    UnsupportedHost(String),
    #[error("runtime spec `{0}` is not X.Y, a comma list, a range X.Y-X.Z, or auto")]
    RuntimeSpec(String),
    #[error("runtime range `{0}` is empty")]
    EmptyRange(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum VariantSelector {
    All,
    Named(String),
}

impl FromStr for VariantSelector {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            Ok(Self::Named(trimmed.to_string()))
        }
    }
}

impl fmt::Display for VariantSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Which runtimes to build: an explicit set, or whatever the upstream
/// release declares (`auto`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeSpec {
    Auto,
    Explicit(Vec<RuntimeVersion>),
}

impl RuntimeSpec {
    #[must_use]
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

impl FromStr for RuntimeSpec {
    type Err = SelectionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let spec_error = || SelectionError::RuntimeSpec(raw.to_string());
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        if trimmed.is_empty() {
            return Err(spec_error());
        }
        if let Some((start, end)) = trimmed.split_once('-') {
            let start: RuntimeVersion = start.parse().map_err(|_| spec_error())?;
            let end: RuntimeVersion = end.parse().map_err(|_| spec_error())?;
            let runtimes: Vec<_> = KNOWN_RUNTIMES
                .iter()
                .copied()
                .filter(|runtime| *runtime >= start && *runtime <= end)
                .collect();
            if runtimes.is_empty() {
                return Err(SelectionError::EmptyRange(raw.to_string()));
            }
            return Ok(Self::Explicit(runtimes));
        }
        let mut runtimes = Vec::new();
        for part in trimmed.split(',') {
            let runtime: RuntimeVersion = part.parse().map_err(|_| spec_error())?;
            if !runtimes.contains(&runtime) {
                runtimes.push(runtime);
            }
        }
        Ok(Self::Explicit(runtimes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformSelector {
    One(Platform),
    All,
    Native,
}

impl PlatformSelector {
    pub fn resolve(self) -> Result<Vec<Platform>, SelectionError> {
        match self {
            Self::One(platform) => Ok(vec![platform]),
            Self::All => Ok(Platform::iter().collect()),
            Self::Native => Platform::host()
                .map(|platform| vec![platform])
                .ok_or_else(|| SelectionError::UnsupportedHost(std::env::consts::ARCH.into())),
        }
    }
}

impl FromStr for PlatformSelector {
    type Err = SelectionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        if trimmed.eq_ignore_ascii_case("native") || trimmed.eq_ignore_ascii_case("auto") {
            return Ok(Self::Native);
        }
        trimmed
            .parse::<Platform>()
            .map(Self::One)
            .map_err(|_| SelectionError::UnknownPlatform(raw.to_string()))
    }
}
