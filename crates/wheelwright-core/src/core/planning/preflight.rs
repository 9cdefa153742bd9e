//! Decides, per target, what still has to happen before it is published.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};
use wheelwright_domain::{BuildTarget, PublishState};

use crate::config::Catalog;
use crate::effects::PackageIndex;

/// What the remote index said about one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLookup {
    Listed(Vec<String>),
    Absent,
    Unreachable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub state: PublishState,
    pub filename: String,
    /// Local wheel to publish (or to re-version when `needs_suffix`).
    pub local: Option<PathBuf>,
    /// Only the unsuffixed build exists locally.
    pub needs_suffix: bool,
    pub index_reachable: bool,
}

/// Pure classification: remote beats local, local beats building.
#[must_use]
pub fn classify(
    filename: &str,
    base_filename: Option<&str>,
    lookup: &IndexLookup,
    local: &[PathBuf],
) -> Classification {
    let index_reachable = !matches!(lookup, IndexLookup::Unreachable(_));
    let find_local = |name: &str| {
        local
            .iter()
            .find(|path| path.file_name().is_some_and(|file| file == name))
            .cloned()
    };
    let mut classification = Classification {
        state: PublishState::NeedsBuildAndPublish,
        filename: filename.to_string(),
        local: None,
        needs_suffix: false,
        index_reachable,
    };
    if let IndexLookup::Listed(files) = lookup {
        if files.iter().any(|file| file == filename) {
            classification.state = PublishState::AlreadyPublished;
            return classification;
        }
    }
    if let Some(path) = find_local(filename) {
        classification.state = PublishState::NeedsPublishOnly;
        classification.local = Some(path);
        return classification;
    }
    if let Some(path) = base_filename.and_then(find_local) {
        classification.state = PublishState::NeedsPublishOnly;
        classification.local = Some(path);
        classification.needs_suffix = true;
    }
    classification
}

pub struct Preflight<'a> {
    index: &'a dyn PackageIndex,
    catalog: &'a Catalog,
}

impl<'a> Preflight<'a> {
    #[must_use]
    pub fn new(index: &'a dyn PackageIndex, catalog: &'a Catalog) -> Self {
        Self { index, catalog }
    }

    /// Looks up `project==version` on the index; network trouble counts as
    /// absent but is reported distinctly.
    pub fn lookup(&self, project: &str, version: &str) -> IndexLookup {
        match self.index.release_files(project, version) {
            Ok(Some(files)) => IndexLookup::Listed(files),
            Ok(None) => IndexLookup::Absent,
            Err(err) => {
                warn!(%project, %version, error = %err, "package index unavailable; treating release as unpublished");
                IndexLookup::Unreachable(err.to_string())
            }
        }
    }

    /// Classifies `targets` against the index and the wheels already in `local`.
    /// Each distinct release is looked up once.
    pub fn classify_all(&self, targets: &[BuildTarget], local: &[PathBuf]) -> Vec<Classification> {
        let mut lookups: HashMap<(String, String), IndexLookup> = HashMap::new();
        targets
            .iter()
            .map(|target| {
                let key = (target.package_name.clone(), target.release_version());
                let lookup = lookups
                    .entry(key)
                    .or_insert_with_key(|(project, version)| self.lookup(project, version));
                let tag = self.catalog.platform_tag(target.platform);
                let filename = target.wheel_filename(&tag).to_string();
                let base = target
                    .version_suffix
                    .as_ref()
                    .map(|_| target.base_filename(&tag).to_string());
                let classification = classify(&filename, base.as_deref(), lookup, local);
                debug!(
                    target = %target,
                    state = %classification.state,
                    filename = %classification.filename,
                    "classified target"
                );
                classification
            })
            .collect()
    }
}

/// Wheels currently in the output directory.
pub fn local_wheels(out_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !out_dir.exists() {
        return Ok(Vec::new());
    }
    crate::core::wheel::find_wheels(out_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{IndexError, UploadForm, UploadResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NAME: &str = "pkg-1.0-cp312-cp312-x86_64.whl";

    #[test]
    fn remote_wins_over_local() {
        let local = vec![PathBuf::from("/out/nested").join(NAME)];
        let result = classify(NAME, None, &IndexLookup::Listed(vec![NAME.into()]), &local);
        assert_eq!(result.state, PublishState::AlreadyPublished);
        assert!(result.index_reachable);
    }

    #[test]
    fn local_file_means_publish_only() {
        let local = vec![PathBuf::from("/out/nested").join(NAME)];
        let listed = IndexLookup::Listed(vec!["pkg-1.0-cp311-cp311-x86_64.whl".into()]);
        let result = classify(NAME, None, &listed, &local);
        assert_eq!(result.state, PublishState::NeedsPublishOnly);
        assert_eq!(result.local, Some(local[0].clone()));
        assert!(!result.needs_suffix);
    }

    #[test]
    fn unreachable_index_counts_as_absent() {
        let result = classify(NAME, None, &IndexLookup::Unreachable("timeout".into()), &[]);
        assert_eq!(result.state, PublishState::NeedsBuildAndPublish);
        assert!(!result.index_reachable);
    }

    #[test]
    fn unsuffixed_local_build_is_flagged_for_suffixing() {
        let suffixed = "pkg-1.0.post1-cp312-cp312-x86_64.whl";
        let local = vec![PathBuf::from("/out").join(NAME)];
        let result = classify(suffixed, Some(NAME), &IndexLookup::Absent, &local);
        assert_eq!(result.state, PublishState::NeedsPublishOnly);
        assert!(result.needs_suffix);
    }

    #[test]
    fn classification_is_deterministic() {
        let local = vec![PathBuf::from("/a").join(NAME), PathBuf::from("/b").join(NAME)];
        let first = classify(NAME, None, &IndexLookup::Absent, &local);
        for _ in 0..5 {
            assert_eq!(classify(NAME, None, &IndexLookup::Absent, &local), first);
        }
    }

    struct CountingIndex(AtomicUsize);

    impl PackageIndex for CountingIndex {
        fn release_files(
            &self,
            _project: &str,
            _version: &str,
        ) -> Result<Option<Vec<String>>, IndexError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Some(vec![NAME.to_string()]))
        }

        fn upload(&self, _form: &UploadForm, _token: &str) -> anyhow::Result<UploadResponse> {
            unreachable!("preflight never uploads")
        }
    }

    #[test]
    fn group_is_looked_up_once() -> anyhow::Result<()> {
        let catalog = Catalog::parse(
            r#"{"builds": {"base": {"package_name": "pkg", "platforms": ["x86_64"]}},
                "platform_tags": {"x86_64": "x86_64"}}"#,
            PathBuf::new(),
        )?;
        let index = CountingIndex(AtomicUsize::new(0));
        let preflight = Preflight::new(&index, &catalog);
        let targets: Vec<BuildTarget> = [11, 12]
            .iter()
            .map(|minor| BuildTarget {
                variant: "base".into(),
                package_name: "pkg".into(),
                upstream_version: "1.0".into(),
                runtime: wheelwright_domain::RuntimeVersion::new(3, *minor),
                platform: wheelwright_domain::Platform::X86_64,
                version_suffix: None,
            })
            .collect();
        let states: Vec<PublishState> = preflight
            .classify_all(&targets, &[])
            .into_iter()
            .map(|c| c.state)
            .collect();
        assert_eq!(
            states,
            vec![PublishState::NeedsBuildAndPublish, PublishState::AlreadyPublished]
        );
        assert_eq!(index.0.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
