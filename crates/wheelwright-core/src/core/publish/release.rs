use std::fs;

use serde::Serialize;
use sha2::{Digest, Sha256};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, info, warn};
use wheelwright_domain::BuildTarget;

use crate::config::ReleaseConfig;
use crate::core::wheel::Artifact;
use crate::effects::{ReleaseDraft, ReleaseHost};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReleaseStatus {
    Created { tag: String },
    Skipped { tag: String, reason: String },
    Failed { tag: String, reason: String },
}

impl ReleaseStatus {
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Created { tag } | Self::Skipped { tag, .. } | Self::Failed { tag, .. } => tag,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("failed to read {path}: {source}")]
    Asset {
        path: String,
        source: std::io::Error,
    },
    #[error("release host: {0:#}")]
    Host(anyhow::Error),
}

/// Mirrors published wheels as one release per (version, variant).
pub struct ReleasePublisher<'a> {
    host: &'a dyn ReleaseHost,
    config: &'a ReleaseConfig,
}

impl<'a> ReleasePublisher<'a> {
    #[must_use]
    pub fn new(host: &'a dyn ReleaseHost, config: &'a ReleaseConfig) -> Self {
        Self { host, config }
    }

    /// Creates the release for `target` and attaches `artifact`. Problems are
    /// logged and reported, never propagated.
    pub fn release(&self, target: &BuildTarget, artifact: &Artifact) -> ReleaseStatus {
        let tag = target.release_tag();
        let (Some(repo), Some(_)) = (self.config.repo.as_deref(), self.config.token.as_deref())
        else {
            debug!(%tag, "release host not configured");
            return ReleaseStatus::Skipped {
                tag,
                reason: "release repository or token not configured".into(),
            };
        };
        match self.create(repo, &tag, target, artifact) {
            Ok(status) => status,
            Err(err) => {
                warn!(%tag, %repo, error = %err, "release creation failed");
                ReleaseStatus::Failed {
                    tag,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn create(
        &self,
        repo: &str,
        tag: &str,
        target: &BuildTarget,
        artifact: &Artifact,
    ) -> Result<ReleaseStatus, ReleaseError> {
        if self
            .host
            .find_release(repo, tag)
            .map_err(ReleaseError::Host)?
            .is_some()
        {
            info!(%tag, "release already exists");
            return Ok(ReleaseStatus::Skipped {
                tag: tag.to_string(),
                reason: "release already exists".into(),
            });
        }
        let content = fs::read(&artifact.path).map_err(|source| ReleaseError::Asset {
            path: artifact.path.display().to_string(),
            source,
        })?;
        let draft = ReleaseDraft {
            tag_name: tag.to_string(),
            name: format!("{} {}", target.package_name, target.release_version()),
            body: release_body(target, artifact, &content),
        };
        let release = self
            .host
            .create_release(repo, &draft)
            .map_err(ReleaseError::Host)?;
        let asset = artifact.filename.to_string();
        self.host
            .upload_asset(repo, &release, &asset, content)
            .map_err(ReleaseError::Host)?;
        info!(%tag, %asset, "release created");
        Ok(ReleaseStatus::Created {
            tag: tag.to_string(),
        })
    }
}

fn release_body(target: &BuildTarget, artifact: &Artifact, content: &[u8]) -> String {
    let created = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".into());
    format!(
        "## {package} {version}\n\n\
         | | |\n|---|---|\n\
         | Variant | `{variant}` |\n\
         | Upstream version | {upstream} |\n\
         | Python | {python} |\n\
         | Platform | {platform} |\n\
         | Wheel | `{filename}` |\n\
         | SHA256 | `{digest}` |\n\n\
         Install with `pip install {package}=={version}`.\n\n\
         _Built {created}_\n",
        package = target.package_name,
        version = target.release_version(),
        variant = target.variant,
        upstream = target.upstream_version,
        python = target.runtime,
        platform = target.platform,
        filename = artifact.filename,
        digest = hex::encode(Sha256::digest(content)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use wheelwright_domain::{Platform, RuntimeVersion};

    use crate::core::wheel::testing::write_wheel;
    use crate::effects::HostedRelease;

    #[derive(Default)]
    struct MemoryHost {
        existing: Vec<String>,
        fail_create: bool,
        created: Mutex<Vec<ReleaseDraft>>,
        assets: Mutex<Vec<String>>,
    }

    impl ReleaseHost for MemoryHost {
        fn find_release(&self, _: &str, tag: &str) -> Result<Option<HostedRelease>> {
            Ok(self.existing.iter().any(|t| t == tag).then(|| HostedRelease {
                id: 1,
                tag_name: tag.to_string(),
                html_url: None,
            }))
        }

        fn create_release(&self, _: &str, draft: &ReleaseDraft) -> Result<HostedRelease> {
            if self.fail_create {
                return Err(anyhow!("422 Unprocessable Entity"));
            }
            self.created
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .push(draft.clone());
            Ok(HostedRelease {
                id: 7,
                tag_name: draft.tag_name.clone(),
                html_url: None,
            })
        }

        fn upload_asset(&self, _: &str, _: &HostedRelease, name: &str, _: Vec<u8>) -> Result<()> {
            self.assets
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .push(name.to_string());
            Ok(())
        }
    }

    fn config(configured: bool) -> ReleaseConfig {
        ReleaseConfig {
            repo: configured.then(|| "acme/wheels".to_string()),
            token: configured.then(|| "gh".to_string()),
            api_url: "http://127.0.0.1:9".into(),
            uploads_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(1),
        }
    }

    fn target() -> BuildTarget {
        BuildTarget {
            variant: "avx512".into(),
            package_name: "vllm-cpu-avx512".into(),
            upstream_version: "0.6.0".into(),
            runtime: RuntimeVersion::new(3, 12),
            platform: Platform::X86_64,
            version_suffix: None,
        }
    }

    fn artifact(dir: &std::path::Path) -> Result<Artifact> {
        Artifact::from_path(&write_wheel(
            dir,
            "vllm_cpu_avx512-0.6.0-cp312-cp312-x86_64.whl",
        ))
    }

    #[test]
    fn creates_release_with_digest_and_asset() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let host = MemoryHost::default();
        let config = config(true);
        let wheel = artifact(dir.path())?;
        let status = ReleasePublisher::new(&host, &config).release(&target(), &wheel);
        assert_eq!(
            status,
            ReleaseStatus::Created {
                tag: "0.6.0-avx512".into()
            }
        );
        let created = host.created.lock().map_err(|_| anyhow!("poisoned"))?;
        let digest = hex::encode(Sha256::digest(fs::read(&wheel.path)?));
        assert!(created[0].body.contains(&digest));
        assert!(created[0].body.contains("| Python | 3.12 |"));
        assert_eq!(
            host.assets.lock().map_err(|_| anyhow!("poisoned"))?.as_slice(),
            ["vllm_cpu_avx512-0.6.0-cp312-cp312-x86_64.whl"]
        );
        Ok(())
    }

    #[test]
    fn existing_tags_and_missing_configuration_skip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let wheel = artifact(dir.path())?;
        let host = MemoryHost {
            existing: vec!["0.6.0-avx512".into()],
            ..MemoryHost::default()
        };
        let configured = config(true);
        let status = ReleasePublisher::new(&host, &configured).release(&target(), &wheel);
        assert!(matches!(status, ReleaseStatus::Skipped { .. }));

        let unconfigured = config(false);
        let status = ReleasePublisher::new(&host, &unconfigured).release(&target(), &wheel);
        assert!(matches!(status, ReleaseStatus::Skipped { .. }));
        assert!(host.created.lock().map_err(|_| anyhow!("poisoned"))?.is_empty());
        Ok(())
    }

    #[test]
    fn host_failures_are_reported_not_raised() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let host = MemoryHost {
            fail_create: true,
            ..MemoryHost::default()
        };
        let config = config(true);
        let status = ReleasePublisher::new(&host, &config).release(&target(), &artifact(dir.path())?);
        match status {
            ReleaseStatus::Failed { tag, reason } => {
                assert_eq!(tag, "0.6.0-avx512");
                assert!(reason.contains("422"));
            }
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }
}
