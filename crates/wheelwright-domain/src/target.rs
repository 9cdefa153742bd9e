use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::filename::{normalize_distribution, WheelFilename};
use crate::version::{RuntimeVersion, VersionSuffix};

/// Hardware platforms the catalog can declare.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Platform {
    #[serde(rename = "x86_64", alias = "amd64")]
    #[strum(to_string = "x86_64", serialize = "amd64")]
    X86_64,
    #[serde(rename = "aarch64", alias = "arm64")]
    #[strum(to_string = "aarch64", serialize = "arm64")]
    Aarch64,
}

impl Platform {
    /// Architecture of the running host, when it is one we build for.
    #[must_use]
    pub fn host() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86_64" => Some(Self::X86_64),
            "aarch64" => Some(Self::Aarch64),
            _ => None,
        }
    }
}

/// One concrete artifact to produce: variant × upstream × runtime × platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BuildTarget {
    /// Catalog key, also the release tag's short name.
    pub variant: String,
    pub package_name: String,
    pub upstream_version: String,
    pub runtime: RuntimeVersion,
    pub platform: Platform,
    pub version_suffix: Option<VersionSuffix>,
}

impl BuildTarget {
    #[must_use]
    pub fn distribution(&self) -> String {
        normalize_distribution(&self.package_name)
    }

    /// Version the published artifact carries, suffix included.
    #[must_use]
    pub fn release_version(&self) -> String {
        match &self.version_suffix {
            Some(suffix) => suffix
                .apply(&self.upstream_version)
                .unwrap_or_else(|| self.upstream_version.clone()),
            None => self.upstream_version.clone(),
        }
    }

    #[must_use]
    pub fn wheel_filename(&self, platform_tag: &str) -> WheelFilename {
        let tag = self.runtime.tag();
        WheelFilename::new(
            self.distribution(),
            self.release_version(),
            tag.clone(),
            tag,
            platform_tag,
        )
    }

    /// Filename the builder emits before any suffix is applied.
    #[must_use]
    pub fn base_filename(&self, platform_tag: &str) -> WheelFilename {
        self.wheel_filename(platform_tag)
            .with_version(self.upstream_version.clone())
    }

    /// `{version}-{variant}`, the release tag.
    #[must_use]
    pub fn release_tag(&self) -> String {
        format!("{}-{}", self.release_version(), self.variant)
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} py{} {}",
            self.variant,
            self.release_version(),
            self.runtime,
            self.platform
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PublishState {
    AlreadyPublished,
    NeedsPublishOnly,
    NeedsBuildAndPublish,
    Skipped,
}

impl PublishState {
    #[must_use]
    pub fn needs_build(self) -> bool {
        matches!(self, Self::NeedsBuildAndPublish)
    }

    /// Whether no further stage runs for the target.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AlreadyPublished | Self::Skipped)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TargetStage {
    Unchecked,
    Classified,
    Built,
    Verified,
    Published,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("target cannot move from {from} back to {to}")]
pub struct StageRegression {
    pub from: TargetStage,
    pub to: TargetStage,
}

/// Forward-only lifecycle of a build target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetProgress {
    stage: TargetStage,
    history: Vec<TargetStage>,
}

impl Default for TargetProgress {
    fn default() -> Self {
        Self {
            stage: TargetStage::Unchecked,
            history: vec![TargetStage::Unchecked],
        }
    }
}

impl TargetProgress {
    #[must_use]
    pub fn stage(&self) -> TargetStage {
        self.stage
    }

    #[must_use]
    pub fn history(&self) -> &[TargetStage] {
        &self.history
    }

    /// Moves to `next`. Stages may be skipped but never revisited.
    pub fn advance(&mut self, next: TargetStage) -> Result<(), StageRegression> {
        if next <= self.stage {
            return Err(StageRegression {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        self.history.push(next);
        Ok(())
    }
}
