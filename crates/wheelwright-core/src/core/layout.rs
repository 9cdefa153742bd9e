//! Sorts an output directory into `{dist}-{version}/python-X.Y/` folders.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use wheelwright_domain::{RuntimeVersion, WheelFilename};

use crate::core::wheel::find_wheels;

#[derive(Debug, Clone, Default, Serialize)]
pub struct LayoutReport {
    pub moved: Vec<(PathBuf, PathBuf)>,
    pub in_place: Vec<PathBuf>,
    /// Extra copies removed once the canonical file existed.
    pub duplicates: Vec<PathBuf>,
    /// Wheels left where they were because their runtime is unknown.
    pub unmapped: Vec<PathBuf>,
}

/// Canonical location of `filename` below `dir`, if its interpreter tag maps
/// to a CPython runtime.
#[must_use]
pub fn canonical_path(dir: &Path, filename: &WheelFilename) -> Option<PathBuf> {
    let runtime = RuntimeVersion::from_tag(&filename.python_tag)?;
    Some(
        dir.join(format!("{}-{}", filename.distribution, filename.version))
            .join(format!("python-{runtime}"))
            .join(filename.to_string()),
    )
}

/// Moves every wheel found below `dir` into its canonical place.
pub fn organize_dist(dir: &Path) -> Result<LayoutReport> {
    let mut report = LayoutReport::default();
    let mut groups: IndexMap<PathBuf, Vec<PathBuf>> = IndexMap::new();
    for wheel in find_wheels(dir)? {
        let canonical = wheel
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.parse::<WheelFilename>().ok())
            .and_then(|filename| canonical_path(dir, &filename));
        match canonical {
            Some(canonical) => groups.entry(canonical).or_default().push(wheel),
            None => {
                warn!(wheel = %wheel.display(), "cannot determine the runtime; leaving in place");
                report.unmapped.push(wheel);
            }
        }
    }

    for (canonical, sources) in groups {
        if sources.len() > 1 {
            info!(filename = ?canonical.file_name(), copies = sources.len(), "found duplicate wheels");
        }
        if sources.contains(&canonical) {
            report.in_place.push(canonical.clone());
        } else if let Some(first) = sources.first() {
            move_file(first, &canonical)?;
            info!(from = %first.display(), to = %canonical.display(), "moved wheel");
            report.moved.push((first.clone(), canonical.clone()));
        }
        for source in &sources {
            if *source == canonical || !source.exists() || !canonical.is_file() {
                continue;
            }
            fs::remove_file(source)
                .with_context(|| format!("failed to remove duplicate {}", source.display()))?;
            debug!(duplicate = %source.display(), "removed duplicate");
            report.duplicates.push(source.clone());
        }
    }
    prune_empty_dirs(dir)?;
    Ok(report)
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // Different filesystems: copy, then drop the source.
    fs::copy(from, to)
        .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))?;
    fs::remove_file(from).with_context(|| format!("failed to remove {}", from.display()))
}

/// Removes directories below `root` left empty by the moves.
fn prune_empty_dirs(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = entry.with_context(|| format!("failed to scan {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let empty = fs::read_dir(entry.path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            fs::remove_dir(entry.path())
                .with_context(|| format!("failed to remove {}", entry.path().display()))?;
        }
    }
    Ok(())
}
