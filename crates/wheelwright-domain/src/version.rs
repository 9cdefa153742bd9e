use std::fmt;
use std::str::FromStr;

use pep440_rs::Version;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuffixError {
    #[error("version suffix `{0}` must look like .post<N> or .dev<N>")]
    Grammar(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("`{0}` is not a valid PEP 440 version")]
    Invalid(String),
    #[error("`{0}` is not a runtime version of the form X.Y")]
    Runtime(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuffixKind {
    Post,
    Dev,
}

/// A `.post<N>` / `.dev<N>` suffix used to mint a fresh uploadable version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionSuffix {
    kind: SuffixKind,
    number: String,
}

impl VersionSuffix {
    #[must_use]
    pub fn kind(&self) -> SuffixKind {
        self.kind
    }

    /// Appends the suffix to `version`, returning `None` when it is already there.
    #[must_use]
    pub fn apply(&self, version: &str) -> Option<String> {
        let suffix = self.to_string();
        if version.ends_with(&suffix) {
            None
        } else {
            Some(format!("{version}{suffix}"))
        }
    }

    /// Strips this suffix from `version` when present.
    #[must_use]
    pub fn strip<'a>(&self, version: &'a str) -> Option<&'a str> {
        version.strip_suffix(self.to_string().as_str())
    }
}

impl fmt::Display for VersionSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            SuffixKind::Post => "post",
            SuffixKind::Dev => "dev",
        };
        write!(f, ".{label}{}", self.number)
    }
}

impl FromStr for VersionSuffix {
    type Err = SuffixError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (kind, digits) = if let Some(rest) = raw.strip_prefix(".post") {
            (SuffixKind::Post, rest)
        } else if let Some(rest) = raw.strip_prefix(".dev") {
            (SuffixKind::Dev, rest)
        } else {
            return Err(SuffixError::Grammar(raw.to_string()));
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(SuffixError::Grammar(raw.to_string()));
        }
        Ok(Self {
            kind,
            number: digits.to_string(),
        })
    }
}

impl TryFrom<String> for VersionSuffix {
    type Error = SuffixError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionSuffix> for String {
    fn from(value: VersionSuffix) -> Self {
        value.to_string()
    }
}

/// Validates an upstream release string and returns its parsed form.
pub fn parse_upstream_version(raw: &str) -> Result<Version, VersionError> {
    let trimmed = raw.trim().trim_start_matches('v');
    Version::from_str(trimmed).map_err(|_| VersionError::Invalid(raw.to_string()))
}

/// A CPython `major.minor` runtime such as 3.12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuntimeVersion {
    pub major: u8,
    pub minor: u8,
}

impl RuntimeVersion {
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// `cp312` style interpreter tag; also used as the ABI tag.
    #[must_use]
    pub fn tag(self) -> String {
        format!("cp{}{}", self.major, self.minor)
    }

    /// Reverse of [`RuntimeVersion::tag`] for CPython 3 tags.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        let digits = tag.strip_prefix("cp")?;
        let minor = digits.strip_prefix('3')?;
        if minor.is_empty() || !minor.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        minor.parse().ok().map(|minor| Self::new(3, minor))
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for RuntimeVersion {
    type Err = VersionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (major, minor) = trimmed
            .split_once('.')
            .ok_or_else(|| VersionError::Runtime(raw.to_string()))?;
        let major = major
            .parse()
            .map_err(|_| VersionError::Runtime(raw.to_string()))?;
        let minor = minor
            .parse()
            .map_err(|_| VersionError::Runtime(raw.to_string()))?;
        Ok(Self::new(major, minor))
    }
}

/// Runtimes the planner knows how to target.
pub const KNOWN_RUNTIMES: [RuntimeVersion; 7] = [
    RuntimeVersion::new(3, 8),
    RuntimeVersion::new(3, 9),
    RuntimeVersion::new(3, 10),
    RuntimeVersion::new(3, 11),
    RuntimeVersion::new(3, 12),
    RuntimeVersion::new(3, 13),
    RuntimeVersion::new(3, 14),
];
