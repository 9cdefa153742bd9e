//! The release pipeline: plan, classify, build, verify, repackage, publish and
//! release, one (variant, upstream version) group at a time.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{info, warn};
use wheelwright_domain::{
    BuildTarget, PublishState, StageRegression, TargetProgress, TargetStage, VersionSuffix,
};

use crate::config::{Catalog, Config, VariantSpec};
use crate::core::build::{builder_for, ensure_verified, ArtifactBuilder, BackendKind, BuildError, BuildRequest};
use crate::core::planning::{
    local_wheels, Classification, ConstraintOrigin, MatrixPlanner, PlanRequest, Preflight, TargetGroup,
};
use crate::core::publish::{Publisher, ReleasePublisher, ReleaseStatus, UploadError, UploadStatus};
use crate::core::wheel::{repackage_batch, verify_batch, Artifact, Repackage, Violation};
use crate::effects::Effects;

/// Why one target stopped short of publication.
#[derive(Debug, thiserror::Error)]
pub enum TargetFailure {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("{filename} failed verification after {rebuilds} rebuild(s) with {} violation(s)", .violations.len())]
    Integrity {
        filename: String,
        rebuilds: usize,
        violations: Vec<Violation>,
    },
    #[error("unusable wheel: {0}")]
    Artifact(String),
    #[error("repackaging failed: {0}")]
    Repackage(String),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Stage(#[from] StageRegression),
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub backend: BackendKind,
    pub out_dir: PathBuf,
    pub jobs: usize,
    pub skip_build: bool,
    pub skip_release: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub target: BuildTarget,
    pub filename: String,
    pub state: PublishState,
    pub index_reachable: bool,
    pub stage: TargetStage,
    pub stages: Vec<TargetStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

impl TargetReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub variant: String,
    pub upstream_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<ConstraintOrigin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub targets: Vec<TargetReport>,
}

impl GroupReport {
    fn planned(group: &TargetGroup) -> Self {
        Self {
            variant: group.variant.clone(),
            upstream_version: group.upstream_version.clone(),
            constraint: group.constraint.clone(),
            origin: group.origin,
            failure: group.failure.clone(),
            targets: Vec::new(),
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.targets.iter().all(TargetReport::succeeded)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub dry_run: bool,
    pub groups: Vec<GroupReport>,
}

impl PipelineReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.groups.iter().all(GroupReport::succeeded)
    }

    /// (variant, upstream version) pairs whose every target made it.
    #[must_use]
    pub fn succeeded(&self) -> Vec<(String, String)> {
        self.pairs(true)
    }

    #[must_use]
    pub fn failed(&self) -> Vec<(String, String)> {
        self.pairs(false)
    }

    fn pairs(&self, succeeded: bool) -> Vec<(String, String)> {
        self.groups
            .iter()
            .filter(|group| group.succeeded() == succeeded)
            .map(|group| (group.variant.clone(), group.upstream_version.clone()))
            .collect()
    }

    pub fn targets(&self) -> impl Iterator<Item = &TargetReport> {
        self.groups.iter().flat_map(|group| group.targets.iter())
    }
}

/// Working state of one target while its group moves through the stages.
struct Slot {
    target: BuildTarget,
    platform_tag: String,
    classification: Classification,
    progress: TargetProgress,
    artifact: Option<Artifact>,
    repackaged: bool,
    upload: Option<UploadStatus>,
    release: Option<ReleaseStatus>,
    failure: Option<TargetFailure>,
}

impl Slot {
    fn new(target: &BuildTarget, platform_tag: String, classification: Classification) -> Self {
        let mut slot = Self {
            target: target.clone(),
            platform_tag,
            classification,
            progress: TargetProgress::default(),
            artifact: None,
            repackaged: false,
            upload: None,
            release: None,
            failure: None,
        };
        slot.advance(TargetStage::Classified);
        slot
    }

    fn active(&self) -> bool {
        self.failure.is_none() && self.artifact.is_some()
    }

    fn fail(&mut self, failure: TargetFailure) {
        warn!(target = %self.target, error = %failure, "target failed");
        self.failure = Some(failure);
    }

    fn advance(&mut self, stage: TargetStage) -> bool {
        match self.progress.advance(stage) {
            Ok(()) => true,
            Err(regression) => {
                self.fail(regression.into());
                false
            }
        }
    }

    fn request<'s>(&'s self, build_env: &'s IndexMap<String, String>, out_dir: &'s Path) -> BuildRequest<'s> {
        BuildRequest {
            target: &self.target,
            build_env,
            platform_tag: &self.platform_tag,
            out_dir,
        }
    }

    fn finish(self) -> TargetReport {
        let violations = match &self.failure {
            Some(TargetFailure::Integrity { violations, .. }) => violations.clone(),
            _ => Vec::new(),
        };
        TargetReport {
            filename: self
                .artifact
                .as_ref()
                .map_or_else(|| self.classification.filename.clone(), |a| a.filename.to_string()),
            state: self.classification.state,
            index_reachable: self.classification.index_reachable,
            stage: self.progress.stage(),
            stages: self.progress.history().to_vec(),
            artifact: self.artifact.map(|artifact| artifact.path),
            upload: self.upload,
            release: self.release,
            failure: self.failure.map(|failure| failure.to_string()),
            violations,
            target: self.target,
        }
    }
}

pub struct Pipeline<'a> {
    catalog: &'a Catalog,
    config: &'a Config,
    effects: &'a dyn Effects,
    builder: Option<Box<dyn ArtifactBuilder>>,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(
        catalog: &'a Catalog,
        config: &'a Config,
        effects: &'a dyn Effects,
        options: PipelineOptions,
    ) -> Self {
        let builder = (!options.skip_build).then(|| builder_for(options.backend, config));
        Self {
            catalog,
            config,
            effects,
            builder,
            options,
        }
    }

    #[cfg(test)]
    fn with_builder(mut self, builder: Box<dyn ArtifactBuilder>) -> Self {
        if !self.options.skip_build {
            self.builder = Some(builder);
        }
        self
    }

    /// Runs every group best-effort. Only configuration problems abort the
    /// run, and they do so before any stage executes.
    pub fn run(&self, request: &PlanRequest) -> Result<PipelineReport> {
        let publisher = Publisher::new(self.effects.index(), self.config.credentials());
        if !self.options.dry_run {
            let variants = self.catalog.select(&request.variants)?;
            publisher.validate_credentials(
                variants.iter().map(|(_, spec)| spec.package_name.as_str()),
            )?;
        }
        let plan = MatrixPlanner::new(self.catalog, self.config, self.effects.constraints())
            .plan(request)?;
        info!(
            groups = plan.groups.len(),
            targets = plan.targets().count(),
            dry_run = self.options.dry_run,
            "planned build matrix"
        );

        let mut report = PipelineReport {
            dry_run: self.options.dry_run,
            groups: Vec::with_capacity(plan.groups.len()),
        };
        for group in &plan.groups {
            let outcome = self.run_group(group, &publisher);
            if outcome.succeeded() {
                info!(variant = %outcome.variant, version = %outcome.upstream_version, "group finished");
            } else {
                warn!(variant = %outcome.variant, version = %outcome.upstream_version, "group failed");
            }
            report.groups.push(outcome);
        }
        Ok(report)
    }

    fn run_group(&self, group: &TargetGroup, publisher: &Publisher<'_>) -> GroupReport {
        let mut report = GroupReport::planned(group);
        if report.failure.is_some() {
            return report;
        }
        let Some(spec) = self.catalog.builds.get(&group.variant) else {
            report.failure = Some(format!("variant `{}` vanished from the catalog", group.variant));
            return report;
        };
        let local = match local_wheels(&self.options.out_dir) {
            Ok(local) => local,
            Err(err) => {
                report.failure = Some(format!("{err:#}"));
                return report;
            }
        };

        let preflight = Preflight::new(self.effects.index(), self.catalog);
        let mut slots: Vec<Slot> = group
            .targets
            .iter()
            .zip(preflight.classify_all(&group.targets, &local))
            .map(|(target, classification)| {
                Slot::new(target, self.catalog.platform_tag(target.platform), classification)
            })
            .collect();

        if !self.options.dry_run {
            for slot in &mut slots {
                self.acquire(slot, spec);
            }
            self.verify_stage(&mut slots, spec);
            self.repackage_stage(&mut slots, spec);
            self.post_verify_stage(&mut slots);
            let releases = ReleasePublisher::new(self.effects.releases(), self.config.release());
            for slot in &mut slots {
                self.publish_stage(slot, publisher, &releases);
            }
        }
        report.targets = slots.into_iter().map(Slot::finish).collect();
        report
    }

    /// Produces the wheel a target will publish: built, or taken from disk.
    fn acquire(&self, slot: &mut Slot, spec: &VariantSpec) {
        match slot.classification.state {
            PublishState::AlreadyPublished => {
                info!(target = %slot.target, filename = %slot.classification.filename, "already published");
            }
            PublishState::Skipped => {}
            PublishState::NeedsBuildAndPublish => {
                let Some(builder) = self.builder.as_deref() else {
                    info!(target = %slot.target, "build skipped");
                    slot.classification.state = PublishState::Skipped;
                    return;
                };
                let built = builder.build(&slot.request(&spec.build_env, &self.options.out_dir));
                match built {
                    Ok(artifact) => {
                        slot.artifact = Some(artifact);
                        slot.advance(TargetStage::Built);
                    }
                    Err(err) => slot.fail(err.into()),
                }
            }
            PublishState::NeedsPublishOnly => {
                let Some(path) = slot.classification.local.clone() else {
                    slot.fail(TargetFailure::Artifact("no local wheel was recorded".into()));
                    return;
                };
                match Artifact::from_path(&path) {
                    Ok(artifact) => slot.artifact = Some(artifact),
                    Err(err) => slot.fail(TargetFailure::Artifact(format!("{err:#}"))),
                }
            }
        }
    }

    /// Verifies every candidate on the pool, then rebuilds the ones that fail.
    fn verify_stage(&self, slots: &mut [Slot], spec: &VariantSpec) {
        let indices = active_indices(slots, |_| true);
        let paths: Vec<PathBuf> = indices
            .iter()
            .filter_map(|&idx| slots[idx].artifact.as_ref().map(|a| a.path.clone()))
            .collect();
        if paths.is_empty() {
            return;
        }
        let batch = match verify_batch(&paths, self.options.jobs) {
            Ok(batch) => batch,
            Err(err) => {
                for &idx in &indices {
                    slots[idx].fail(TargetFailure::Artifact(format!("{err:#}")));
                }
                return;
            }
        };
        for (&idx, report) in indices.iter().zip(batch.reports) {
            let slot = &mut slots[idx];
            if report.passed() {
                slot.advance(TargetStage::Verified);
                continue;
            }
            let Some(artifact) = slot.artifact.take() else {
                continue;
            };
            let retried = ensure_verified(
                artifact,
                self.builder.as_deref(),
                &slot.request(&spec.build_env, &self.options.out_dir),
            );
            match retried {
                Ok(artifact) => {
                    slot.artifact = Some(artifact);
                    slot.advance(TargetStage::Verified);
                }
                Err(failure) => slot.fail(failure),
            }
        }
    }

    fn repackage_stage(&self, slots: &mut [Slot], spec: &VariantSpec) {
        if let Some(path) = self.catalog.description_path(spec) {
            match fs::read_to_string(&path) {
                Ok(text) => {
                    self.apply_batch(slots, |_| true, &Repackage::Description(text));
                }
                Err(err) => {
                    for idx in active_indices(slots, |_| true) {
                        slots[idx].fail(TargetFailure::Repackage(format!(
                            "cannot read description {}: {err}",
                            path.display()
                        )));
                    }
                }
            }
        }
        let suffix: Option<VersionSuffix> = slots
            .iter()
            .find_map(|slot| slot.target.version_suffix.clone());
        if let Some(suffix) = suffix {
            self.apply_batch(
                slots,
                |slot| {
                    slot.artifact
                        .as_ref()
                        .is_some_and(|artifact| artifact.filename.version != slot.target.release_version())
                },
                &Repackage::Suffix(suffix),
            );
        }
    }

    fn apply_batch(&self, slots: &mut [Slot], select: impl Fn(&Slot) -> bool, operation: &Repackage) {
        let indices = active_indices(slots, select);
        let artifacts: Vec<Artifact> = indices
            .iter()
            .filter_map(|&idx| slots[idx].artifact.clone())
            .collect();
        if artifacts.is_empty() {
            return;
        }
        match repackage_batch(&artifacts, operation, self.options.jobs) {
            Ok(results) => {
                for (&idx, result) in indices.iter().zip(results) {
                    let slot = &mut slots[idx];
                    match result.and_then(|path| Artifact::from_path(&path)) {
                        Ok(artifact) => {
                            slot.artifact = Some(artifact);
                            slot.repackaged = true;
                        }
                        Err(err) => slot.fail(TargetFailure::Repackage(format!("{err:#}"))),
                    }
                }
            }
            Err(err) => {
                for &idx in &indices {
                    slots[idx].fail(TargetFailure::Repackage(format!("{err:#}")));
                }
            }
        }
    }

    /// Repackaged wheels are checked once more; there is no rebuild here.
    fn post_verify_stage(&self, slots: &mut [Slot]) {
        let indices = active_indices(slots, |slot| slot.repackaged);
        let paths: Vec<PathBuf> = indices
            .iter()
            .filter_map(|&idx| slots[idx].artifact.as_ref().map(|a| a.path.clone()))
            .collect();
        if paths.is_empty() {
            return;
        }
        match verify_batch(&paths, self.options.jobs) {
            Ok(batch) => {
                for (&idx, report) in indices.iter().zip(batch.reports) {
                    if report.passed() {
                        continue;
                    }
                    let slot = &mut slots[idx];
                    let filename = slot
                        .artifact
                        .as_ref()
                        .map_or_else(|| slot.classification.filename.clone(), |a| a.filename.to_string());
                    slot.fail(TargetFailure::Integrity {
                        filename,
                        rebuilds: 0,
                        violations: report.violations,
                    });
                }
            }
            Err(err) => {
                for &idx in &indices {
                    slots[idx].fail(TargetFailure::Artifact(format!("{err:#}")));
                }
            }
        }
    }

    fn publish_stage(&self, slot: &mut Slot, publisher: &Publisher<'_>, releases: &ReleasePublisher<'_>) {
        if !slot.active() {
            return;
        }
        let Some(artifact) = slot.artifact.clone() else {
            return;
        };
        match publisher.publish(&artifact, &slot.target.package_name) {
            Ok(status) => {
                slot.upload = Some(status);
                if !slot.advance(TargetStage::Published) {
                    return;
                }
            }
            Err(err) => {
                slot.fail(err.into());
                return;
            }
        }
        if self.options.skip_release {
            return;
        }
        let status = releases.release(&slot.target, &artifact);
        if matches!(status, ReleaseStatus::Created { .. }) {
            slot.advance(TargetStage::Released);
        }
        slot.release = Some(status);
    }
}

fn active_indices(slots: &[Slot], select: impl Fn(&Slot) -> bool) -> Vec<usize> {
    slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.active() && select(slot))
        .map(|(idx, _)| idx)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use anyhow::anyhow;
    use wheelwright_domain::{Platform, PlatformSelector, VariantSelector};

    use crate::config::EnvSnapshot;
    use crate::core::wheel::testing::write_wheel;
    use crate::effects::{
        ConstraintSource, HostedRelease, IndexError, PackageIndex, ReleaseDraft, ReleaseHost,
        UploadForm, UploadResponse,
    };
    use crate::ConfigurationError;

    #[derive(Default)]
    struct FakeEffects {
        listed: Vec<String>,
        uploads: Mutex<Vec<String>>,
        releases: Mutex<Vec<String>>,
    }

    impl PackageIndex for FakeEffects {
        fn release_files(&self, _: &str, _: &str) -> Result<Option<Vec<String>>, IndexError> {
            Ok(Some(self.listed.clone()))
        }

        fn upload(&self, form: &UploadForm, _: &str) -> Result<UploadResponse> {
            self.uploads
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .push(form.filename.clone());
            Ok(UploadResponse {
                status: 200,
                body: String::new(),
            })
        }
    }

    impl ReleaseHost for FakeEffects {
        fn find_release(&self, _: &str, _: &str) -> Result<Option<HostedRelease>> {
            Ok(None)
        }

        fn create_release(&self, _: &str, draft: &ReleaseDraft) -> Result<HostedRelease> {
            self.releases
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .push(draft.tag_name.clone());
            Ok(HostedRelease {
                id: 1,
                tag_name: draft.tag_name.clone(),
                html_url: None,
            })
        }

        fn upload_asset(&self, _: &str, _: &HostedRelease, _: &str, _: Vec<u8>) -> Result<()> {
            Ok(())
        }
    }

    impl ConstraintSource for FakeEffects {
        fn fetch(&self, url: &str) -> Result<String> {
            Err(anyhow!("offline: {url}"))
        }
    }

    impl Effects for FakeEffects {
        fn index(&self) -> &dyn PackageIndex {
            self
        }

        fn releases(&self) -> &dyn ReleaseHost {
            self
        }

        fn constraints(&self) -> &dyn ConstraintSource {
            self
        }
    }

    /// Writes a valid wheel under the expected name, failing for `broken_version`.
    #[derive(Default)]
    struct WheelBuilder {
        broken_version: Option<String>,
        calls: AtomicUsize,
    }

    impl ArtifactBuilder for WheelBuilder {
        fn name(&self) -> &'static str {
            "test"
        }

        fn build(&self, request: &BuildRequest<'_>) -> Result<Artifact, BuildError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken_version.as_deref() == Some(request.target.upstream_version.as_str()) {
                return Err(BuildError::Failed {
                    code: 1,
                    stderr: "compiler exploded".into(),
                });
            }
            let path = write_wheel(request.out_dir, &request.expected_filename().to_string());
            Artifact::from_path(&path).map_err(|err| BuildError::Spawn(err.to_string()))
        }
    }

    const CATALOG: &str = r#"{
        "builds": {
            "avx512": {"package_name": "vllm-cpu-avx512", "platforms": ["x86_64"]}
        },
        "platform_tags": {"x86_64": "x86_64"}
    }"#;

    const FILENAME: &str = "vllm_cpu_avx512-0.6.0-cp312-cp312-x86_64.whl";

    fn config(release: bool) -> Config {
        let mut pairs = vec![("WHEELWRIGHT_INDEX_TOKEN", "pypi-token")];
        if release {
            pairs.push(("WHEELWRIGHT_RELEASE_REPO", "acme/wheels"));
            pairs.push(("WHEELWRIGHT_RELEASE_TOKEN", "gh"));
        }
        Config::from_snapshot(&EnvSnapshot::testing(&pairs))
    }

    fn options(out_dir: &Path) -> PipelineOptions {
        PipelineOptions {
            backend: BackendKind::Native,
            out_dir: out_dir.to_path_buf(),
            jobs: 2,
            skip_build: false,
            skip_release: false,
            dry_run: false,
        }
    }

    fn request(versions: &[&str], suffix: Option<&str>) -> Result<PlanRequest> {
        Ok(PlanRequest {
            variants: VariantSelector::Named("avx512".into()),
            versions: versions.iter().map(ToString::to_string).collect(),
            runtimes: "3.12".parse()?,
            platforms: PlatformSelector::One(Platform::X86_64),
            version_suffix: suffix.map(str::parse::<VersionSuffix>).transpose()?,
        })
    }

    fn catalog(root: &Path) -> Result<Catalog> {
        Ok(Catalog::parse(CATALOG, root.to_path_buf())?)
    }

    #[test]
    fn builds_verifies_publishes_and_releases() -> Result<()> {
        let out = tempfile::tempdir()?;
        let catalog = catalog(out.path())?;
        let config = config(true);
        let effects = FakeEffects::default();
        let pipeline = Pipeline::new(&catalog, &config, &effects, options(out.path()))
            .with_builder(Box::new(WheelBuilder::default()));
        let report = pipeline.run(&request(&["0.6.0"], None)?)?;

        assert!(report.passed());
        assert_eq!(report.succeeded(), vec![("avx512".to_string(), "0.6.0".to_string())]);
        let target = report.targets().next().ok_or_else(|| anyhow!("no target"))?;
        assert_eq!(target.filename, FILENAME);
        assert_eq!(target.upload, Some(UploadStatus::Uploaded));
        assert_eq!(target.stage, TargetStage::Released);
        assert_eq!(
            target.stages,
            vec![
                TargetStage::Unchecked,
                TargetStage::Classified,
                TargetStage::Built,
                TargetStage::Verified,
                TargetStage::Published,
                TargetStage::Released,
            ]
        );
        assert_eq!(
            effects.releases.lock().map_err(|_| anyhow!("poisoned"))?.as_slice(),
            ["0.6.0-avx512"]
        );
        Ok(())
    }

    #[test]
    fn published_targets_are_not_rebuilt() -> Result<()> {
        let out = tempfile::tempdir()?;
        let catalog = catalog(out.path())?;
        let config = config(false);
        let effects = FakeEffects {
            listed: vec![FILENAME.to_string()],
            ..FakeEffects::default()
        };
        let builder = Box::new(WheelBuilder::default());
        let pipeline = Pipeline::new(&catalog, &config, &effects, options(out.path()))
            .with_builder(builder);
        let report = pipeline.run(&request(&["0.6.0"], None)?)?;
        assert!(report.passed());
        let target = report.targets().next().ok_or_else(|| anyhow!("no target"))?;
        assert_eq!(target.state, PublishState::AlreadyPublished);
        assert_eq!(target.stage, TargetStage::Classified);
        assert!(effects.uploads.lock().map_err(|_| anyhow!("poisoned"))?.is_empty());
        Ok(())
    }

    #[test]
    fn a_failed_build_only_fails_its_group() -> Result<()> {
        let out = tempfile::tempdir()?;
        let catalog = catalog(out.path())?;
        let config = config(false);
        let effects = FakeEffects::default();
        let builder = WheelBuilder {
            broken_version: Some("0.6.0".into()),
            ..WheelBuilder::default()
        };
        let pipeline = Pipeline::new(&catalog, &config, &effects, options(out.path()))
            .with_builder(Box::new(builder));
        let report = pipeline.run(&request(&["0.6.0", "0.7.0"], None)?)?;
        assert!(!report.passed());
        assert_eq!(report.failed(), vec![("avx512".to_string(), "0.6.0".to_string())]);
        assert_eq!(report.succeeded(), vec![("avx512".to_string(), "0.7.0".to_string())]);
        let failed = report.targets().next().ok_or_else(|| anyhow!("no target"))?;
        assert!(failed
            .failure
            .as_deref()
            .is_some_and(|reason| reason.contains("compiler exploded")));
        Ok(())
    }

    #[test]
    fn skip_build_and_dry_run_do_not_build() -> Result<()> {
        let out = tempfile::tempdir()?;
        let catalog = catalog(out.path())?;
        let config = config(false);
        let effects = FakeEffects::default();

        let mut skipping = options(out.path());
        skipping.skip_build = true;
        let report = Pipeline::new(&catalog, &config, &effects, skipping).run(&request(&["0.6.0"], None)?)?;
        assert!(report.passed());
        let target = report.targets().next().ok_or_else(|| anyhow!("no target"))?;
        assert_eq!(target.state, PublishState::Skipped);

        let mut dry = options(out.path());
        dry.dry_run = true;
        let builder = Box::new(WheelBuilder::default());
        let report = Pipeline::new(&catalog, &config, &effects, dry)
            .with_builder(builder)
            .run(&request(&["0.6.0"], None)?)?;
        assert!(report.dry_run);
        let target = report.targets().next().ok_or_else(|| anyhow!("no target"))?;
        assert_eq!(target.state, PublishState::NeedsBuildAndPublish);
        assert!(effects.uploads.lock().map_err(|_| anyhow!("poisoned"))?.is_empty());
        assert!(crate::core::wheel::find_wheels(out.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn local_base_wheel_is_suffixed_then_published() -> Result<()> {
        let out = tempfile::tempdir()?;
        let catalog = catalog(out.path())?;
        let config = config(false);
        let effects = FakeEffects::default();
        let base = write_wheel(out.path(), FILENAME);
        let mut opts = options(out.path());
        opts.skip_build = true;
        let report = Pipeline::new(&catalog, &config, &effects, opts)
            .run(&request(&["0.6.0"], Some(".post1"))?)?;

        assert!(report.passed());
        let suffixed = "vllm_cpu_avx512-0.6.0.post1-cp312-cp312-x86_64.whl";
        assert_eq!(
            effects.uploads.lock().map_err(|_| anyhow!("poisoned"))?.as_slice(),
            [suffixed]
        );
        assert!(!base.exists());
        assert!(out.path().join(suffixed).is_file());
        Ok(())
    }

    #[test]
    fn description_file_is_swapped_in() -> Result<()> {
        let out = tempfile::tempdir()?;
        let root = tempfile::tempdir()?;
        fs::write(
            root.path().join("avx512.md"),
            "# vllm-cpu-avx512\n\nA description long enough to publish.\n",
        )?;
        let catalog = Catalog::parse(
            &CATALOG.replace(
                r#""platforms": ["x86_64"]}"#,
                r#""platforms": ["x86_64"], "description_file": "avx512.md"}"#,
            ),
            root.path().to_path_buf(),
        )?;
        let config = config(false);
        let effects = FakeEffects::default();
        let pipeline = Pipeline::new(&catalog, &config, &effects, options(out.path()))
            .with_builder(Box::new(WheelBuilder::default()));
        let report = pipeline.run(&request(&["0.6.0"], None)?)?;
        assert!(report.passed());

        let wheel = out.path().join(FILENAME);
        let metadata = crate::core::wheel::archive::read_text_member(
            &wheel,
            "vllm_cpu_avx512-0.6.0.dist-info/METADATA",
        )?;
        assert!(metadata.ends_with("A description long enough to publish.\n"));
        Ok(())
    }

    #[test]
    fn missing_credentials_stop_before_any_stage() -> Result<()> {
        let out = tempfile::tempdir()?;
        let catalog = catalog(out.path())?;
        let config = Config::from_snapshot(&EnvSnapshot::testing(&[]));
        let effects = FakeEffects::default();
        let builder = WheelBuilder::default();
        let pipeline = Pipeline::new(&catalog, &config, &effects, options(out.path()))
            .with_builder(Box::new(builder));
        let err = pipeline.run(&request(&["0.6.0"], None)?).unwrap_err();
        let config_err = err
            .downcast_ref::<ConfigurationError>()
            .ok_or_else(|| anyhow!("expected a configuration error"))?;
        assert_eq!(config_err.details()["reason"], "missing_credentials");
        assert!(crate::core::wheel::find_wheels(out.path())?.is_empty());
        Ok(())
    }
}
