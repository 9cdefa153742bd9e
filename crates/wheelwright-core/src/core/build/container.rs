use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use wheelwright_domain::Platform;

use super::{absolute_out_dir, locate_output, ArtifactBuilder, BuildError, BuildRequest};
use crate::core::wheel::Artifact;
use crate::process::run_command;

const CONTAINER_RUNTIMES: [&str; 2] = ["docker", "podman"];
const SOURCE_MOUNT: &str = "/src";
const OUT_MOUNT: &str = "/out";

/// Runs the build inside a prebuilt image with the source tree and output
/// directory mounted.
pub struct ContainerBuilder {
    image: Option<String>,
    command: Option<String>,
    source_dir: Option<PathBuf>,
}

impl ContainerBuilder {
    #[must_use]
    pub fn new(image: Option<String>, command: Option<String>, source_dir: Option<PathBuf>) -> Self {
        Self {
            image,
            command,
            source_dir,
        }
    }

    fn runtime() -> Result<PathBuf, BuildError> {
        CONTAINER_RUNTIMES
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| BuildError::Unavailable("neither docker nor podman is on PATH".into()))
    }

    /// Host paths for the source and output mounts. Relative paths would be
    /// taken as named volumes by the runtime, so both are made absolute.
    pub(crate) fn mounts(
        &self,
        request: &BuildRequest<'_>,
    ) -> Result<(PathBuf, PathBuf), BuildError> {
        let source = match &self.source_dir {
            Some(dir) => std::path::absolute(dir),
            None => std::env::current_dir(),
        }
        .map_err(|err| BuildError::Spawn(err.to_string()))?;
        Ok((source, absolute_out_dir(request)?))
    }

    pub(crate) fn arguments(
        &self,
        image: &str,
        source: &Path,
        request: &BuildRequest<'_>,
    ) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--platform".to_string(),
            container_platform(request.target.platform).to_string(),
            "-v".to_string(),
            format!("{}:{SOURCE_MOUNT}", source.display()),
            "-v".to_string(),
            format!("{}:{OUT_MOUNT}", request.out_dir.display()),
            "-w".to_string(),
            SOURCE_MOUNT.to_string(),
        ];
        for (key, value) in request.environment(OUT_MOUNT) {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        let script = self.command.clone().unwrap_or_else(|| {
            format!(
                "python{} -m build --wheel --outdir {OUT_MOUNT}",
                request.target.runtime
            )
        });
        args.extend([image.to_string(), "sh".to_string(), "-c".to_string(), script]);
        args
    }
}

fn container_platform(platform: Platform) -> &'static str {
    match platform {
        Platform::X86_64 => "linux/amd64",
        Platform::Aarch64 => "linux/arm64",
    }
}

impl ArtifactBuilder for ContainerBuilder {
    fn name(&self) -> &'static str {
        "container"
    }

    fn build(&self, request: &BuildRequest<'_>) -> Result<Artifact, BuildError> {
        let image = self.image.as_deref().ok_or_else(|| {
            BuildError::Unavailable("no build image configured (WHEELWRIGHT_BUILD_IMAGE)".into())
        })?;
        let runtime = Self::runtime()?;
        let (source, out_dir) = self.mounts(request)?;
        let request = &BuildRequest {
            out_dir: &out_dir,
            ..*request
        };
        fs::create_dir_all(request.out_dir).map_err(|err| BuildError::Spawn(err.to_string()))?;
        let args = self.arguments(image, &source, request);
        info!(target = %request.target, backend = self.name(), %image, "building");
        debug!(runtime = %runtime.display(), ?args, "spawning container build");
        let output = run_command(&runtime.display().to_string(), &args, &[], &source)
            .map_err(|err| BuildError::Spawn(format!("{err:#}")))?;
        if !output.succeeded() {
            return Err(BuildError::Failed {
                code: output.code,
                stderr: output.stderr_tail(20),
            });
        }
        locate_output(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::build::tests::target;
    use indexmap::IndexMap;
    use serial_test::serial;

    #[test]
    fn arguments_mount_dirs_and_pass_environment() {
        let target = target();
        let env = IndexMap::from([("VLLM_CPU_DISABLE_AVX512".to_string(), "1".to_string())]);
        let request = BuildRequest {
            target: &target,
            build_env: &env,
            platform_tag: "x86_64",
            out_dir: Path::new("/tmp/out"),
        };
        let builder = ContainerBuilder::new(Some("builder:latest".into()), None, None);
        let args = builder.arguments("builder:latest", Path::new("/work/src"), &request);
        assert_eq!(&args[..4], ["run", "--rm", "--platform", "linux/amd64"]);
        assert!(args.contains(&"/work/src:/src".to_string()));
        assert!(args.contains(&"/tmp/out:/out".to_string()));
        assert!(args.contains(&"VLLM_CPU_DISABLE_AVX512=1".to_string()));
        assert!(args.contains(&"WHEELWRIGHT_OUT_DIR=/out".to_string()));
        assert_eq!(
            args.last().map(String::as_str),
            Some("python3.12 -m build --wheel --outdir /out")
        );
    }

    #[test]
    #[serial]
    fn relative_mounts_become_host_paths() -> anyhow::Result<()> {
        let target = target();
        let env = IndexMap::new();
        let request = BuildRequest {
            target: &target,
            build_env: &env,
            platform_tag: "x86_64",
            out_dir: Path::new("dist"),
        };
        let builder = ContainerBuilder::new(
            Some("builder:latest".into()),
            None,
            Some(PathBuf::from("vllm")),
        );
        let (source, out_dir) = builder.mounts(&request)?;
        let cwd = std::env::current_dir()?;
        assert_eq!(source, cwd.join("vllm"));
        assert_eq!(out_dir, cwd.join("dist"));

        let request = BuildRequest {
            out_dir: &out_dir,
            ..request
        };
        let args = builder.arguments("builder:latest", &source, &request);
        assert!(args.contains(&format!("{}:/out", cwd.join("dist").display())));
        assert!(!args.contains(&"dist:/out".to_string()));
        Ok(())
    }

    #[test]
    fn missing_image_is_reported_before_spawning() {
        let target = target();
        let env = IndexMap::new();
        let out = tempfile::tempdir().expect("tempdir");
        let request = BuildRequest {
            target: &target,
            build_env: &env,
            platform_tag: "x86_64",
            out_dir: out.path(),
        };
        let builder = ContainerBuilder::new(None, None, None);
        assert!(matches!(builder.build(&request), Err(BuildError::Unavailable(_))));
    }
}
