//! The variant catalog (`build_config.json`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use wheelwright_domain::{Platform, VariantSelector};

use crate::ConfigurationError;

pub const DEFAULT_CATALOG: &str = "build_config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub project: Option<String>,
    /// Per-catalog constraint URL template; the environment overrides it.
    #[serde(default)]
    pub constraint_url: Option<String>,
    pub builds: IndexMap<String, VariantSpec>,
    #[serde(default)]
    pub platform_tags: IndexMap<Platform, String>,
    #[serde(skip)]
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantSpec {
    pub package_name: String,
    #[serde(default)]
    pub description: String,
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub build_env: IndexMap<String, String>,
    /// Long description swapped into each built wheel, relative to the catalog.
    #[serde(default)]
    pub description_file: Option<PathBuf>,
}

impl VariantSpec {
    #[must_use]
    pub fn supports(&self, platform: Platform) -> bool {
        self.platforms.contains(&platform)
    }
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            ConfigurationError::new(
                format!("cannot read catalog {}: {err}", path.display()),
                json!({
                    "reason": "catalog_unreadable",
                    "path": path.display().to_string(),
                    "hint": "Pass --catalog or run from the directory holding build_config.json.",
                }),
            )
        })?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Self::parse(&contents, root)?)
    }

    pub fn parse(contents: &str, root: PathBuf) -> Result<Self, ConfigurationError> {
        let mut catalog: Self = serde_json::from_str(contents).map_err(|err| {
            ConfigurationError::new(
                format!("invalid catalog: {err}"),
                json!({ "reason": "catalog_invalid", "error": err.to_string() }),
            )
        })?;
        catalog.root = root;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.builds.is_empty() {
            return Err(ConfigurationError::new(
                "catalog declares no builds",
                json!({ "reason": "catalog_empty" }),
            ));
        }
        for (name, spec) in &self.builds {
            let valid_name = !spec.package_name.is_empty()
                && spec
                    .package_name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
            if !valid_name {
                return Err(ConfigurationError::new(
                    format!("variant `{name}` has an invalid package_name `{}`", spec.package_name),
                    json!({ "reason": "invalid_package_name", "variant": name }),
                ));
            }
            if spec.platforms.is_empty() {
                return Err(ConfigurationError::new(
                    format!("variant `{name}` declares no platforms"),
                    json!({ "reason": "no_platforms", "variant": name }),
                ));
            }
        }
        Ok(())
    }

    /// Variants named by `selector`, in catalog order.
    pub fn select(
        &self,
        selector: &VariantSelector,
    ) -> Result<Vec<(&str, &VariantSpec)>, ConfigurationError> {
        match selector {
            VariantSelector::All => Ok(self
                .builds
                .iter()
                .map(|(name, spec)| (name.as_str(), spec))
                .collect()),
            VariantSelector::Named(name) => {
                let (key, spec) = self.builds.get_key_value(name.as_str()).ok_or_else(|| {
                    let known: Vec<&str> = self.builds.keys().map(String::as_str).collect();
                    ConfigurationError::new(
                        format!("unknown variant `{name}`"),
                        json!({
                            "reason": "unknown_variant",
                            "variant": name,
                            "known": known,
                        }),
                    )
                })?;
                Ok(vec![(key.as_str(), spec)])
            }
        }
    }

    /// Wheel platform tag for `platform`; bare architecture when unset.
    #[must_use]
    pub fn platform_tag(&self, platform: Platform) -> String {
        self.platform_tags
            .get(&platform)
            .cloned()
            .unwrap_or_else(|| default_platform_tag(platform).to_string())
    }

    /// Path of the variant's description file, resolved against the catalog.
    #[must_use]
    pub fn description_path(&self, spec: &VariantSpec) -> Option<PathBuf> {
        spec.description_file
            .as_ref()
            .map(|file| if file.is_absolute() { file.clone() } else { self.root.join(file) })
    }
}

fn default_platform_tag(platform: Platform) -> &'static str {
    match platform {
        Platform::X86_64 => "manylinux_2_17_x86_64",
        Platform::Aarch64 => "manylinux_2_17_aarch64",
    }
}
