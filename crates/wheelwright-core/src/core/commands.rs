//! Command handlers behind the CLI surface.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;
use wheelwright_domain::{PlatformSelector, RuntimeSpec, VariantSelector, VersionSuffix};

use crate::config::Catalog;
use crate::core::build::BackendKind;
use crate::core::layout::organize_dist;
use crate::core::pipeline::{Pipeline, PipelineOptions, PipelineReport};
use crate::core::planning::PlanRequest;
use crate::core::wheel::{
    append_version_suffix, find_wheels, is_wheel, update_description, verify_batch, Artifact,
    SuffixOutcome,
};
use crate::{CommandContext, ExecutionOutcome};

#[derive(Clone, Debug)]
pub struct ReleaseRequest {
    pub catalog: PathBuf,
    pub variant: VariantSelector,
    pub versions: Vec<String>,
    pub runtimes: RuntimeSpec,
    pub platform: PlatformSelector,
    pub backend: BackendKind,
    pub out_dir: PathBuf,
    pub jobs: usize,
    pub skip_build: bool,
    pub skip_release: bool,
    pub version_suffix: Option<VersionSuffix>,
    pub dry_run: bool,
}

#[derive(Clone, Debug)]
pub struct VerifyRequest {
    pub paths: Vec<PathBuf>,
    pub jobs: usize,
}

#[derive(Clone, Debug)]
pub struct DescriptionRequest {
    pub wheel: PathBuf,
    pub file: PathBuf,
}

#[derive(Clone, Debug)]
pub struct SuffixRequest {
    pub wheel: PathBuf,
    pub suffix: VersionSuffix,
}

#[derive(Clone, Debug)]
pub struct OrganizeRequest {
    pub dir: PathBuf,
}

/// Runs the release pipeline over the requested matrix.
///
/// # Errors
/// Returns an error when the catalog or request is rejected before any stage
/// runs; per-target problems are reported in the outcome instead.
pub fn release(ctx: &CommandContext, request: &ReleaseRequest) -> Result<ExecutionOutcome> {
    let catalog = Catalog::load(&request.catalog)?;
    let out_dir = std::path::absolute(&request.out_dir).with_context(|| {
        format!("failed to resolve output directory {}", request.out_dir.display())
    })?;
    let options = PipelineOptions {
        backend: request.backend,
        out_dir,
        jobs: request.jobs,
        skip_build: request.skip_build,
        skip_release: request.skip_release,
        dry_run: request.dry_run,
    };
    let plan = PlanRequest {
        variants: request.variant.clone(),
        versions: request.versions.clone(),
        runtimes: request.runtimes.clone(),
        platforms: request.platform,
        version_suffix: request.version_suffix.clone(),
    };
    let report = Pipeline::new(&catalog, ctx.config(), ctx.effects(), options).run(&plan)?;
    Ok(release_outcome(&report))
}

fn release_outcome(report: &PipelineReport) -> ExecutionOutcome {
    let succeeded = report.succeeded();
    let failed = report.failed();
    let pairs = |pairs: &[(String, String)]| -> Vec<String> {
        pairs
            .iter()
            .map(|(variant, version)| format!("{variant} {version}"))
            .collect()
    };
    let mut problems = Vec::new();
    for group in &report.groups {
        if let Some(failure) = &group.failure {
            problems.push(format!(
                "{} {}: {failure}",
                group.variant, group.upstream_version
            ));
        }
        for target in &group.targets {
            if let Some(failure) = &target.failure {
                problems.push(format!("{}: {failure}", target.filename));
            }
        }
    }
    let details = json!({
        "dry_run": report.dry_run,
        "groups": report.groups,
        "succeeded": pairs(&succeeded),
        "failed": pairs(&failed),
        "failures": problems,
    });
    if report.dry_run {
        let targets = report.targets().count();
        return ExecutionOutcome::success(
            format!("dry run: {targets} target(s) across {} group(s)", report.groups.len()),
            details,
        );
    }
    if report.passed() {
        ExecutionOutcome::success(
            format!("released {} group(s)", succeeded.len()),
            details,
        )
    } else {
        ExecutionOutcome::failure(
            format!(
                "{} of {} group(s) failed: {}",
                failed.len(),
                report.groups.len(),
                pairs(&failed).join(", ")
            ),
            details,
        )
    }
}

/// Checks wheels, or every wheel below the given directories.
///
/// # Errors
/// Returns an error if a directory cannot be scanned.
pub fn verify_wheels(_ctx: &CommandContext, request: &VerifyRequest) -> Result<ExecutionOutcome> {
    let mut wheels = Vec::new();
    for path in &request.paths {
        if path.is_dir() {
            wheels.extend(find_wheels(path)?);
        } else if path.is_file() && is_wheel(path) {
            wheels.push(path.clone());
        } else {
            return Ok(ExecutionOutcome::user_error(
                format!("{} is not a wheel or directory", path.display()),
                json!({ "reason": "invalid_path", "path": path.display().to_string() }),
            ));
        }
    }
    if wheels.is_empty() {
        return Ok(ExecutionOutcome::user_error(
            "no wheels found",
            json!({ "reason": "no_wheels", "hint": "Pass .whl files or directories containing them." }),
        ));
    }
    let batch = verify_batch(&wheels, request.jobs)?;
    let failures = batch.failures().count();
    let problems: Vec<String> = batch
        .failures()
        .flat_map(|report| {
            report
                .violations
                .iter()
                .map(move |violation| format!("{}: {violation}", report.path.display()))
        })
        .collect();
    let details = json!({
        "reports": batch.reports,
        "failed": failures,
        "failures": problems,
    });
    if batch.passed() {
        Ok(ExecutionOutcome::success(
            format!("{} wheel(s) passed verification", wheels.len()),
            details,
        ))
    } else {
        Ok(ExecutionOutcome::failure(
            format!("{failures} of {} wheel(s) failed verification", wheels.len()),
            details,
        ))
    }
}

/// Replaces a wheel's long description with the contents of a file.
///
/// # Errors
/// Returns an error if the file or wheel cannot be read or rewritten.
pub fn set_description(_ctx: &CommandContext, request: &DescriptionRequest) -> Result<ExecutionOutcome> {
    let text = fs::read_to_string(&request.file)
        .with_context(|| format!("failed to read {}", request.file.display()))?;
    let artifact = Artifact::from_path(&request.wheel)?;
    update_description(&artifact, &text)?;
    Ok(ExecutionOutcome::success(
        format!("updated description of {}", artifact.filename),
        json!({
            "wheel": artifact.path.display().to_string(),
            "characters": text.chars().count(),
        }),
    ))
}

/// Re-versions a wheel with a `.postN`/`.devN` suffix.
///
/// # Errors
/// Returns an error if the wheel cannot be read or rewritten.
pub fn add_suffix(_ctx: &CommandContext, request: &SuffixRequest) -> Result<ExecutionOutcome> {
    let artifact = Artifact::from_path(&request.wheel)?;
    let outcome = append_version_suffix(&artifact, &request.suffix)?;
    let message = match &outcome {
        SuffixOutcome::Unchanged { path } => {
            format!("{} already carries {}", path.display(), request.suffix)
        }
        SuffixOutcome::Renamed { to, .. } => format!("wrote {}", to.display()),
    };
    Ok(ExecutionOutcome::success(message, json!(outcome)))
}

/// Sorts a dist directory into `{dist}-{version}/python-X.Y/`.
///
/// # Errors
/// Returns an error if files cannot be moved.
pub fn organize(_ctx: &CommandContext, request: &OrganizeRequest) -> Result<ExecutionOutcome> {
    if !request.dir.is_dir() {
        return Ok(ExecutionOutcome::user_error(
            format!("{} is not a directory", request.dir.display()),
            json!({ "reason": "invalid_path", "path": request.dir.display().to_string() }),
        ));
    }
    let report = organize_dist(&request.dir)?;
    info!(
        moved = report.moved.len(),
        duplicates = report.duplicates.len(),
        unmapped = report.unmapped.len(),
        "organized dist directory"
    );
    Ok(ExecutionOutcome::success(
        format!(
            "moved {} wheel(s), removed {} duplicate(s), left {} unmapped",
            report.moved.len(),
            report.duplicates.len(),
            report.unmapped.len()
        ),
        json!(report),
    ))
}
