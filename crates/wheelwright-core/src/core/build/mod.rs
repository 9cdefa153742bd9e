//! The compilation toolchain is external; builders only spawn a configured
//! command and pick up the wheel it leaves in the output directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use wheelwright_domain::{normalize_distribution, BuildTarget, WheelFilename};

use crate::config::Config;
use crate::core::wheel::{find_wheels, Artifact};

mod container;
mod native;
pub mod retry;

pub use container::ContainerBuilder;
pub use native::NativeBuilder;
pub use retry::{ensure_verified, MAX_REBUILDS};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("build tool is unavailable: {0}")]
    Unavailable(String),
    #[error("failed to start the build: {0}")]
    Spawn(String),
    #[error("build exited with status {code}: {stderr}")]
    Failed { code: i32, stderr: String },
    #[error("build finished but produced no wheel matching {expected}")]
    MissingArtifact { expected: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackendKind {
    #[default]
    Native,
    Container,
}

/// Everything a backend needs to produce one wheel.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub target: &'a BuildTarget,
    pub build_env: &'a IndexMap<String, String>,
    pub platform_tag: &'a str,
    pub out_dir: &'a Path,
}

impl BuildRequest<'_> {
    /// Filename the target is expected to build under, before any suffix.
    #[must_use]
    pub fn expected_filename(&self) -> WheelFilename {
        self.target.base_filename(self.platform_tag)
    }

    /// Variables describing the target, exported to the build command.
    #[must_use]
    pub fn environment(&self, out_dir: &str) -> Vec<(String, String)> {
        let mut envs: Vec<(String, String)> = self
            .build_env
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let target = self.target;
        envs.extend([
            ("WHEELWRIGHT_VARIANT".to_string(), target.variant.clone()),
            ("WHEELWRIGHT_PACKAGE_NAME".to_string(), target.package_name.clone()),
            ("WHEELWRIGHT_UPSTREAM_VERSION".to_string(), target.upstream_version.clone()),
            ("WHEELWRIGHT_PYTHON".to_string(), target.runtime.to_string()),
            ("WHEELWRIGHT_PLATFORM".to_string(), target.platform.to_string()),
            ("WHEELWRIGHT_PLATFORM_TAG".to_string(), self.platform_tag.to_string()),
            ("WHEELWRIGHT_OUT_DIR".to_string(), out_dir.to_string()),
        ]);
        envs
    }
}

pub trait ArtifactBuilder: Send + Sync {
    fn name(&self) -> &'static str;
    fn build(&self, request: &BuildRequest<'_>) -> Result<Artifact, BuildError>;
}

/// Backend for `kind`, configured from the environment.
#[must_use]
pub fn builder_for(kind: BackendKind, config: &Config) -> Box<dyn ArtifactBuilder> {
    let build = config.build();
    match kind {
        BackendKind::Native => Box::new(NativeBuilder::new(
            build.command.clone(),
            build.source_dir.clone(),
        )),
        BackendKind::Container => Box::new(ContainerBuilder::new(
            build.image.clone(),
            build.command.clone(),
            build.source_dir.clone(),
        )),
    }
}

/// Output directory anchored to the current directory, so a build running
/// from the source tree or inside a container writes where we look.
pub(crate) fn absolute_out_dir(request: &BuildRequest<'_>) -> Result<PathBuf, BuildError> {
    std::path::absolute(request.out_dir).map_err(|err| {
        BuildError::Spawn(format!(
            "failed to resolve {}: {err}",
            request.out_dir.display()
        ))
    })
}

/// The wheel a finished build left behind: the expected filename when
/// present, otherwise the newest wheel with the same distribution, version
/// and interpreter tag for the target's architecture.
pub(crate) fn locate_output(request: &BuildRequest<'_>) -> Result<Artifact, BuildError> {
    let expected = request.expected_filename();
    let missing = || BuildError::MissingArtifact {
        expected: expected.to_string(),
    };
    let exact = request.out_dir.join(expected.to_string());
    if exact.is_file() {
        return Artifact::from_path(&exact).map_err(|_| missing());
    }
    let wheels = find_wheels(request.out_dir).map_err(|_| missing())?;
    let arch = request.target.platform.to_string();
    let mut candidates: Vec<(SystemTime, Artifact)> = wheels
        .iter()
        .filter_map(|path| Artifact::from_path(path).ok())
        .filter(|artifact| {
            let name = &artifact.filename;
            normalize_distribution(&name.distribution) == expected.distribution
                && name.version == expected.version
                && name.python_tag == expected.python_tag
                && name.platform_tag.contains(arch.as_str())
        })
        .map(|artifact| (modified(&artifact.path), artifact))
        .collect();
    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    candidates.pop().map(|(_, artifact)| artifact).ok_or_else(missing)
}

fn modified(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wheel::testing::write_wheel;
    use wheelwright_domain::{Platform, RuntimeVersion};

    pub(crate) fn target() -> BuildTarget {
        BuildTarget {
            variant: "base".into(),
            package_name: "pkg".into(),
            upstream_version: "1.0".into(),
            runtime: RuntimeVersion::new(3, 12),
            platform: Platform::X86_64,
            version_suffix: None,
        }
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("container".parse::<BackendKind>().ok(), Some(BackendKind::Container));
        assert_eq!("NATIVE".parse::<BackendKind>().ok(), Some(BackendKind::Native));
        assert!("docker".parse::<BackendKind>().is_err());
    }

    #[test]
    fn locates_exact_or_compatible_output() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = target();
        let env = IndexMap::new();
        let request = BuildRequest {
            target: &target,
            build_env: &env,
            platform_tag: "manylinux_2_17_x86_64",
            out_dir: dir.path(),
        };
        assert!(matches!(
            locate_output(&request),
            Err(BuildError::MissingArtifact { .. })
        ));

        write_wheel(dir.path(), "pkg-1.0-cp311-cp311-linux_x86_64.whl");
        write_wheel(dir.path(), "pkg-1.0-cp312-cp312-linux_x86_64.whl");
        let found = locate_output(&request).map_err(|err| anyhow::anyhow!(err))?;
        assert_eq!(found.filename.to_string(), "pkg-1.0-cp312-cp312-linux_x86_64.whl");

        write_wheel(dir.path(), "pkg-1.0-cp312-cp312-manylinux_2_17_x86_64.whl");
        let found = locate_output(&request).map_err(|err| anyhow::anyhow!(err))?;
        assert_eq!(found.filename.platform_tag, "manylinux_2_17_x86_64");
        Ok(())
    }

    #[test]
    fn environment_describes_the_target() {
        let target = target();
        let env = IndexMap::from([("VLLM_CPU_DISABLE_AVX512".to_string(), "1".to_string())]);
        let request = BuildRequest {
            target: &target,
            build_env: &env,
            platform_tag: "x86_64",
            out_dir: Path::new("/out"),
        };
        let vars = request.environment("/out");
        assert_eq!(vars[0], ("VLLM_CPU_DISABLE_AVX512".into(), "1".into()));
        assert!(vars.contains(&("WHEELWRIGHT_PYTHON".to_string(), "3.12".into())));
    }
}
