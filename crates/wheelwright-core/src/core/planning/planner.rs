//! Expands the user's selectors into concrete build targets.

use serde::Serialize;
use serde_json::json;
use toml_edit::{DocumentMut, Item};
use tracing::{debug, warn};
use wheelwright_domain::{
    historical_constraint, parse_upstream_version, BuildTarget, Platform, PlatformSelector,
    RuntimeConstraint, RuntimeSpec, RuntimeVersion, VariantSelector, VersionSuffix,
};

use crate::config::{Catalog, Config};
use crate::effects::ConstraintSource;
use crate::ConfigurationError;

/// Placeholder substituted with the upstream version in constraint URLs.
pub const VERSION_PLACEHOLDER: &str = "{version}";

#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub variants: VariantSelector,
    pub versions: Vec<String>,
    pub runtimes: RuntimeSpec,
    pub platforms: PlatformSelector,
    pub version_suffix: Option<VersionSuffix>,
}

/// Where the runtime set of a group came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintOrigin {
    Upstream,
    Historical,
}

/// All targets of one (variant, upstream version) pair, or why there are none.
#[derive(Debug, Clone, Serialize)]
pub struct TargetGroup {
    pub variant: String,
    pub upstream_version: String,
    pub constraint: Option<String>,
    pub origin: Option<ConstraintOrigin>,
    pub targets: Vec<BuildTarget>,
    pub failure: Option<String>,
}

impl TargetGroup {
    #[must_use]
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatrixPlan {
    pub groups: Vec<TargetGroup>,
}

impl MatrixPlan {
    pub fn targets(&self) -> impl Iterator<Item = &BuildTarget> {
        self.groups.iter().flat_map(|group| group.targets.iter())
    }
}

pub struct MatrixPlanner<'a> {
    catalog: &'a Catalog,
    constraints: &'a dyn ConstraintSource,
    url_template: Option<String>,
}

/// Runtimes resolved for one upstream version.
struct Resolved {
    runtimes: Vec<RuntimeVersion>,
    constraint: RuntimeConstraint,
    origin: ConstraintOrigin,
}

impl<'a> MatrixPlanner<'a> {
    #[must_use]
    pub fn new(catalog: &'a Catalog, config: &Config, constraints: &'a dyn ConstraintSource) -> Self {
        let url_template = config
            .constraint()
            .url_template
            .clone()
            .or_else(|| catalog.constraint_url.clone());
        Self {
            catalog,
            constraints,
            url_template,
        }
    }

    /// Builds the plan. Selector problems are configuration errors; a version
    /// whose runtimes cannot be resolved only fails its own groups.
    pub fn plan(&self, request: &PlanRequest) -> Result<MatrixPlan, ConfigurationError> {
        let variants = self.catalog.select(&request.variants)?;
        let platforms = request.platforms.resolve().map_err(|err| {
            ConfigurationError::new(
                err.to_string(),
                json!({ "reason": "invalid_platform", "platform": format!("{:?}", request.platforms) }),
            )
        })?;
        if request.versions.is_empty() {
            return Err(ConfigurationError::new(
                "no upstream versions requested",
                json!({ "reason": "missing_versions", "hint": "Pass --versions 0.6.0,0.7.0" }),
            ));
        }
        for raw in &request.versions {
            parse_upstream_version(raw).map_err(|err| {
                ConfigurationError::new(
                    err.to_string(),
                    json!({ "reason": "invalid_version", "version": raw }),
                )
            })?;
        }
        if request.runtimes.is_auto() && self.url_template.is_none() {
            return Err(ConfigurationError::new(
                "--python auto needs an upstream constraint source",
                json!({
                    "reason": "missing_constraint_source",
                    "hint": "Set WHEELWRIGHT_CONSTRAINT_URL or constraint_url in the catalog.",
                }),
            ));
        }

        let mut selected = Vec::new();
        for (variant, spec) in &variants {
            let supported: Vec<Platform> = platforms
                .iter()
                .copied()
                .filter(|platform| {
                    let ok = spec.supports(*platform);
                    if !ok {
                        warn!(variant = %variant, %platform, "variant does not support platform; skipping");
                    }
                    ok
                })
                .collect();
            if supported.is_empty() {
                warn!(variant = %variant, "variant supports none of the requested platforms; skipping variant");
                continue;
            }
            selected.push((variant, spec, supported));
        }
        if selected.is_empty() {
            let requested: Vec<String> = platforms.iter().map(ToString::to_string).collect();
            return Err(ConfigurationError::new(
                format!(
                    "no selected variant supports the requested platforms ({})",
                    requested.join(", ")
                ),
                json!({ "reason": "unsupported_platform", "platforms": requested }),
            ));
        }

        let mut plan = MatrixPlan::default();
        for raw in &request.versions {
            let version = raw.trim().trim_start_matches('v').to_string();
            let resolved = self.resolve_runtimes(&version, &request.runtimes);
            for (variant, spec, supported) in &selected {
                let mut group = TargetGroup {
                    variant: variant.to_string(),
                    upstream_version: version.clone(),
                    constraint: None,
                    origin: None,
                    targets: Vec::new(),
                    failure: None,
                };
                match &resolved {
                    Err(reason) => group.failure = Some(reason.clone()),
                    Ok(resolved) => {
                        group.constraint = Some(resolved.constraint.to_string());
                        group.origin = Some(resolved.origin);
                        for runtime in &resolved.runtimes {
                            for platform in supported {
                                group.targets.push(BuildTarget {
                                    variant: variant.to_string(),
                                    package_name: spec.package_name.clone(),
                                    upstream_version: version.clone(),
                                    runtime: *runtime,
                                    platform: *platform,
                                    version_suffix: request.version_suffix.clone(),
                                });
                            }
                        }
                    }
                }
                debug!(
                    variant = %group.variant,
                    version = %group.upstream_version,
                    targets = group.targets.len(),
                    "planned group"
                );
                plan.groups.push(group);
            }
        }
        Ok(plan)
    }

    fn resolve_runtimes(&self, version: &str, spec: &RuntimeSpec) -> Result<Resolved, String> {
        let live = self.fetch_constraint(version);
        match spec {
            RuntimeSpec::Auto => {
                let constraint = live.map_err(|reason| {
                    warn!(%version, %reason, "cannot determine supported runtimes");
                    format!("cannot determine supported runtimes for {version}: {reason}")
                })?;
                let runtimes = constraint.expand().map_err(|err| err.to_string())?;
                Ok(Resolved {
                    runtimes,
                    constraint,
                    origin: ConstraintOrigin::Upstream,
                })
            }
            RuntimeSpec::Explicit(requested) => {
                let (constraint, origin) = match live {
                    Ok(constraint) => (constraint, ConstraintOrigin::Upstream),
                    Err(reason) => {
                        warn!(%version, %reason, "upstream constraint unavailable; using the historical table");
                        let parsed = parse_upstream_version(version).map_err(|err| err.to_string())?;
                        let constraint = historical_constraint(&parsed).map_err(|err| err.to_string())?;
                        (constraint, ConstraintOrigin::Historical)
                    }
                };
                let mut runtimes = Vec::new();
                for runtime in requested {
                    if constraint.allows(*runtime) {
                        runtimes.push(*runtime);
                    } else {
                        warn!(%version, python = %runtime, %constraint, "runtime not supported upstream; dropping");
                    }
                }
                if runtimes.is_empty() {
                    return Err(format!(
                        "none of the requested runtimes is supported by {version} ({constraint})"
                    ));
                }
                Ok(Resolved {
                    runtimes,
                    constraint,
                    origin,
                })
            }
        }
    }

    fn fetch_constraint(&self, version: &str) -> Result<RuntimeConstraint, String> {
        let template = self
            .url_template
            .as_deref()
            .ok_or_else(|| "no constraint source configured".to_string())?;
        let url = template.replace(VERSION_PLACEHOLDER, version);
        let body = self
            .constraints
            .fetch(&url)
            .map_err(|err| format!("{err:#}"))?;
        parse_constraint_document(&body)
    }
}

/// Reads a constraint from either a bare expression or a `pyproject.toml`
/// carrying `project.requires-python`.
pub fn parse_constraint_document(body: &str) -> Result<RuntimeConstraint, String> {
    if let Ok(constraint) = body.trim().parse::<RuntimeConstraint>() {
        return Ok(constraint);
    }
    let doc: DocumentMut = body
        .parse()
        .map_err(|_| "constraint document is neither an expression nor TOML".to_string())?;
    let raw = doc
        .get("project")
        .and_then(|project| project.get("requires-python"))
        .and_then(Item::as_str)
        .ok_or_else(|| "project.requires-python is missing".to_string())?;
    raw.parse().map_err(|err: wheelwright_domain::ConstraintError| err.to_string())
}
