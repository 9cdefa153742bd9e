use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const WHEEL_EXTENSION: &str = "whl";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilenameError {
    #[error("`{0}` does not end with .whl")]
    Extension(String),
    #[error("`{filename}` has {found} dash-separated fields (expected 5 or 6)")]
    FieldCount { filename: String, found: usize },
    #[error("`{filename}` has an empty or malformed {field}")]
    Field {
        filename: String,
        field: &'static str,
    },
}

/// Typed view of a wheel filename:
/// `{distribution}-{version}(-{build})?-{python}-{abi}-{platform}.whl`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WheelFilename {
    pub distribution: String,
    pub version: String,
    pub build: Option<String>,
    pub python_tag: String,
    pub abi_tag: String,
    pub platform_tag: String,
}

impl WheelFilename {
    #[must_use]
    pub fn new(
        distribution: impl Into<String>,
        version: impl Into<String>,
        python_tag: impl Into<String>,
        abi_tag: impl Into<String>,
        platform_tag: impl Into<String>,
    ) -> Self {
        Self {
            distribution: distribution.into(),
            version: version.into(),
            build: None,
            python_tag: python_tag.into(),
            abi_tag: abi_tag.into(),
            platform_tag: platform_tag.into(),
        }
    }

    /// Name of the `.dist-info` directory inside the archive.
    #[must_use]
    pub fn info_dir(&self) -> String {
        format!("{}-{}.dist-info", self.distribution, self.version)
    }

    /// Same tags under a different version; the build tag is dropped because it
    /// only orders builds of one version.
    #[must_use]
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            build: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for WheelFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.distribution, self.version)?;
        if let Some(build) = &self.build {
            write!(f, "-{build}")?;
        }
        write!(
            f,
            "-{}-{}-{}.{WHEEL_EXTENSION}",
            self.python_tag, self.abi_tag, self.platform_tag
        )
    }
}

impl FromStr for WheelFilename {
    type Err = FilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let stem = filename
            .strip_suffix(".whl")
            .ok_or_else(|| FilenameError::Extension(filename.to_string()))?;
        let parts: Vec<&str> = stem.split('-').collect();
        let (distribution, version, build, python, abi, platform) = match parts.as_slice() {
            [dist, version, python, abi, platform] => {
                (*dist, *version, None, *python, *abi, *platform)
            }
            [dist, version, build, python, abi, platform] => {
                (*dist, *version, Some(*build), *python, *abi, *platform)
            }
            _ => {
                return Err(FilenameError::FieldCount {
                    filename: filename.to_string(),
                    found: parts.len(),
                })
            }
        };

        let field_error = |field: &'static str| FilenameError::Field {
            filename: filename.to_string(),
            field,
        };
        if !is_name_component(distribution) {
            return Err(field_error("distribution"));
        }
        if !is_version_component(version) {
            return Err(field_error("version"));
        }
        if let Some(build) = build {
            let starts_with_digit = build.chars().next().is_some_and(|c| c.is_ascii_digit());
            if !starts_with_digit || !is_name_component(build) {
                return Err(field_error("build tag"));
            }
        }
        for (field, value) in [
            ("python tag", python),
            ("abi tag", abi),
            ("platform tag", platform),
        ] {
            if !is_name_component(value) {
                return Err(field_error(field));
            }
        }

        Ok(Self {
            distribution: distribution.to_string(),
            version: version.to_string(),
            build: build.map(ToString::to_string),
            python_tag: python.to_string(),
            abi_tag: abi.to_string(),
            platform_tag: platform.to_string(),
        })
    }
}

fn is_name_component(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn is_version_component(value: &str) -> bool {
    !value.is_empty()
        && value.chars().next().is_some_and(|c| c.is_ascii_digit())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '!'))
}

/// Normalizes a project name into the form used inside wheel filenames.
#[must_use]
pub fn normalize_distribution(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_sep = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !last_sep {
                out.push('_');
            }
            last_sep = true;
        } else {
            out.push(c.to_ascii_lowercase());
            last_sep = false;
        }
    }
    out
}
