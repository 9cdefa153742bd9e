use std::fs;

use tracing::{info, warn};

use super::{ArtifactBuilder, BuildRequest};
use crate::core::pipeline::TargetFailure;
use crate::core::wheel::{verify, Artifact, Violation};

/// Rebuilds allowed after the first failing verification.
pub const MAX_REBUILDS: usize = 2;

/// Verifies `artifact`, rebuilding it up to [`MAX_REBUILDS`] times while it
/// keeps failing. Without a builder the first failure is final.
pub fn ensure_verified(
    artifact: Artifact,
    builder: Option<&dyn ArtifactBuilder>,
    request: &BuildRequest<'_>,
) -> Result<Artifact, TargetFailure> {
    let mut current = artifact;
    let mut rebuilds = 0;
    loop {
        let violations = verify(&current.path);
        if violations.is_empty() {
            return Ok(current);
        }
        log_violations(&current, &violations);
        let Some(builder) = builder.filter(|_| rebuilds < MAX_REBUILDS) else {
            return Err(TargetFailure::Integrity {
                filename: current.filename.to_string(),
                rebuilds,
                violations,
            });
        };
        if let Err(err) = fs::remove_file(&current.path) {
            warn!(wheel = %current.path.display(), error = %err, "could not delete failing wheel");
        }
        rebuilds += 1;
        info!(target = %request.target, attempt = rebuilds, "rebuilding after failed verification");
        current = builder.build(request)?;
    }
}

fn log_violations(artifact: &Artifact, violations: &[Violation]) {
    for violation in violations {
        warn!(wheel = %artifact.filename, %violation, "integrity violation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use indexmap::IndexMap;

    use crate::core::build::tests::target;
    use crate::core::build::BuildError;
    use crate::core::wheel::testing::write_wheel;

    /// Writes a broken wheel for the first `broken` builds, then a good one.
    struct FlakyBuilder {
        broken: usize,
        calls: AtomicUsize,
    }

    impl ArtifactBuilder for FlakyBuilder {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn build(&self, request: &BuildRequest<'_>) -> Result<Artifact, BuildError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let name = request.expected_filename().to_string();
            let path = if call < self.broken {
                let path = request.out_dir.join(&name);
                fs::write(&path, b"not a zip").map_err(|err| BuildError::Spawn(err.to_string()))?;
                path
            } else {
                write_wheel(request.out_dir, &name)
            };
            Artifact::from_path(&path).map_err(|err| BuildError::Spawn(err.to_string()))
        }
    }

    fn broken_artifact(dir: &std::path::Path) -> Artifact {
        let path = dir.join("pkg-1.0-cp312-cp312-x86_64.whl");
        fs::write(&path, b"truncated").expect("write");
        Artifact::from_path(&path).expect("artifact")
    }

    #[test]
    fn rebuilds_until_verification_passes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = target();
        let env = IndexMap::new();
        let request = BuildRequest {
            target: &target,
            build_env: &env,
            platform_tag: "x86_64",
            out_dir: dir.path(),
        };
        let builder = FlakyBuilder {
            broken: 1,
            calls: AtomicUsize::new(0),
        };
        let artifact = ensure_verified(broken_artifact(dir.path()), Some(&builder), &request)
            .map_err(|err| anyhow::anyhow!(err))?;
        assert!(verify(&artifact.path).is_empty());
        assert_eq!(builder.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn gives_up_after_two_rebuilds() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = target();
        let env = IndexMap::new();
        let request = BuildRequest {
            target: &target,
            build_env: &env,
            platform_tag: "x86_64",
            out_dir: dir.path(),
        };
        let builder = FlakyBuilder {
            broken: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        match ensure_verified(broken_artifact(dir.path()), Some(&builder), &request) {
            Err(TargetFailure::Integrity { rebuilds, violations, .. }) => {
                assert_eq!(rebuilds, MAX_REBUILDS);
                assert!(!violations.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(builder.calls.load(Ordering::SeqCst), MAX_REBUILDS);
        Ok(())
    }

    #[test]
    fn without_a_builder_the_first_failure_is_fatal() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = target();
        let env = IndexMap::new();
        let request = BuildRequest {
            target: &target,
            build_env: &env,
            platform_tag: "x86_64",
            out_dir: dir.path(),
        };
        let artifact = broken_artifact(dir.path());
        let path = artifact.path.clone();
        assert!(matches!(
            ensure_verified(artifact, None, &request),
            Err(TargetFailure::Integrity { rebuilds: 0, .. })
        ));
        assert!(path.exists(), "nothing is deleted without a rebuild");
        Ok(())
    }
}
