//! In-place wheel rewrites: swapping the long description and minting a new
//! version with a `.post`/`.dev` suffix. Both keep RECORD consistent.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};
use wheelwright_domain::{rewrite_version_header, MetadataDocument, VersionSuffix, METADATA_FILE};

use super::archive::{locate_info_dir, pack, rewrite_record, unpack};
use super::{run_bounded, Artifact};

const STANDALONE_DESCRIPTIONS: [&str; 2] = ["DESCRIPTION.rst", "README.md"];

/// Replaces the long description of `artifact` with `text`.
///
/// A standalone description file in the info directory is overwritten too.
/// METADATA headers are kept byte-for-byte.
pub fn update_description(artifact: &Artifact, text: &str) -> Result<()> {
    let scratch = tempfile::tempdir().context("failed to create scratch directory")?;
    unpack(&artifact.path, scratch.path())?;
    let info_dir = locate_info_dir(scratch.path(), &artifact.filename.info_dir())?;
    let info_path = scratch.path().join(&info_dir);

    for name in STANDALONE_DESCRIPTIONS {
        let path = info_path.join(name);
        if path.is_file() {
            fs::write(&path, text).with_context(|| format!("failed to write {name}"))?;
        }
    }

    let metadata_path = info_path.join(METADATA_FILE);
    let contents = fs::read_to_string(&metadata_path)
        .with_context(|| format!("{info_dir}/METADATA is missing or unreadable"))?;
    let mut document = MetadataDocument::parse(&contents);
    document.replace_body(text);
    fs::write(&metadata_path, document.render()).context("failed to write METADATA")?;

    let record = rewrite_record(scratch.path(), &info_dir)?;
    pack(scratch.path(), &record, &artifact.path)?;
    info!(wheel = %artifact.filename, "updated long description");
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SuffixOutcome {
    /// The version already carried the suffix; nothing was written.
    Unchanged { path: PathBuf },
    Renamed { from: PathBuf, to: PathBuf },
}

impl SuffixOutcome {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Unchanged { path } => path,
            Self::Renamed { to, .. } => to,
        }
    }
}

/// Re-versions `artifact` to `{version}{suffix}` under a new filename.
///
/// The info directory is renamed, every `Version:` header inside it is
/// rewritten, and the original file is removed only once the new one exists.
pub fn append_version_suffix(artifact: &Artifact, suffix: &VersionSuffix) -> Result<SuffixOutcome> {
    let Some(new_version) = suffix.apply(&artifact.filename.version) else {
        info!(wheel = %artifact.filename, %suffix, "version already carries the suffix");
        return Ok(SuffixOutcome::Unchanged {
            path: artifact.path.clone(),
        });
    };
    let renamed = artifact.filename.with_version(new_version.clone());

    let scratch = tempfile::tempdir().context("failed to create scratch directory")?;
    unpack(&artifact.path, scratch.path())?;
    let old_info = locate_info_dir(scratch.path(), &artifact.filename.info_dir())?;
    let new_info = renamed.info_dir();
    fs::rename(scratch.path().join(&old_info), scratch.path().join(&new_info))
        .with_context(|| format!("failed to rename {old_info} to {new_info}"))?;

    let rewritten = rewrite_info_versions(&scratch.path().join(&new_info), &new_version)?;
    if !rewritten.iter().any(|name| name == METADATA_FILE) {
        warn!(wheel = %artifact.filename, "METADATA declared no Version header");
    }

    let record = rewrite_record(scratch.path(), &new_info)?;
    let destination = artifact
        .path
        .parent()
        .map_or_else(|| PathBuf::from(renamed.to_string()), |dir| dir.join(renamed.to_string()));
    pack(scratch.path(), &record, &destination)?;
    if destination != artifact.path {
        fs::remove_file(&artifact.path)
            .with_context(|| format!("failed to remove {}", artifact.path.display()))?;
    }
    info!(from = %artifact.filename, to = %renamed, "applied version suffix");
    Ok(SuffixOutcome::Renamed {
        from: artifact.path.clone(),
        to: destination,
    })
}

/// Rewrites `Version:` in every text document directly inside the info
/// directory; returns the names of the files that changed.
fn rewrite_info_versions(info_path: &Path, version: &str) -> Result<Vec<String>> {
    let mut changed = Vec::new();
    for entry in fs::read_dir(info_path)
        .with_context(|| format!("failed to read {}", info_path.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name == wheelwright_domain::RECORD_FILE {
            continue;
        }
        let Ok(contents) = fs::read_to_string(entry.path()) else {
            continue;
        };
        let (updated, found) = rewrite_version_header(&contents, version);
        if found {
            fs::write(entry.path(), updated).with_context(|| format!("failed to write {name}"))?;
            debug!(file = %name, "rewrote Version header");
            changed.push(name);
        }
    }
    Ok(changed)
}

/// One rewrite applied by [`repackage_batch`].
#[derive(Debug, Clone)]
pub enum Repackage {
    Description(String),
    Suffix(VersionSuffix),
}

/// Applies `operation` to every artifact on the bounded worker pool.
///
/// Results come back in input order; each carries the artifact's final path.
pub fn repackage_batch(
    artifacts: &[Artifact],
    operation: &Repackage,
    jobs: usize,
) -> Result<Vec<Result<PathBuf>>> {
    run_bounded(jobs, artifacts, |artifact| match operation {
        Repackage::Description(text) => {
            update_description(artifact, text).map(|()| artifact.path.clone())
        }
        Repackage::Suffix(suffix) => {
            append_version_suffix(artifact, suffix).map(|outcome| outcome.path().to_path_buf())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wheel::testing::{read_members, write_members, write_wheel};
    use crate::core::wheel::verify;
    use wheelwright_domain::Record;

    fn member(members: &[(String, Vec<u8>)], name: &str) -> String {
        members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| String::from_utf8_lossy(data).to_string())
            .unwrap_or_else(|| panic!("{name} missing"))
    }

    #[test]
    fn description_update_keeps_headers_and_record() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_wheel(dir.path(), "pkg-1.2.0-cp312-cp312-x86_64.whl");
        let artifact = Artifact::from_path(&path)?;
        let before = member(&read_members(&path), "pkg-1.2.0.dist-info/METADATA");

        update_description(&artifact, "# New docs\n\nNow with AVX512 support.\n")?;

        let members = read_members(&path);
        let after = member(&members, "pkg-1.2.0.dist-info/METADATA");
        let headers_before = MetadataDocument::parse(&before).headers().to_string();
        let parsed = MetadataDocument::parse(&after);
        assert_eq!(parsed.headers(), headers_before);
        assert_eq!(parsed.body(), "# New docs\n\nNow with AVX512 support.\n");
        assert!(verify(&path).is_empty());

        let record = Record::parse(&member(&members, "pkg-1.2.0.dist-info/RECORD"))?;
        for (name, data) in &members {
            let entry = record.get(name).expect("recorded");
            if entry.hash.is_some() {
                assert!(entry.matches(data), "{name}");
            }
        }
        Ok(())
    }

    #[test]
    fn description_update_overwrites_standalone_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_members(
            &dir.path().join("pkg-1.0-py3-none-any.whl"),
            &[
                ("pkg/__init__.py".into(), Vec::new()),
                ("pkg-1.0.dist-info/METADATA".into(), b"Name: pkg\nVersion: 1.0\n".to_vec()),
                ("pkg-1.0.dist-info/README.md".into(), b"old".to_vec()),
            ],
            Some("pkg-1.0.dist-info/RECORD"),
        );
        update_description(&Artifact::from_path(&path)?, "fresh text")?;
        let members = read_members(&path);
        assert_eq!(member(&members, "pkg-1.0.dist-info/README.md"), "fresh text");
        assert!(member(&members, "pkg-1.0.dist-info/METADATA").ends_with("\n\nfresh text"));
        Ok(())
    }

    #[test]
    fn suffix_renames_file_and_info_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_members(
            &dir.path().join("pkg-1.2.0-cp312-cp312-x86_64.whl"),
            &[
                ("pkg/__init__.py".into(), Vec::new()),
                (
                    "pkg-1.2.0.dist-info/METADATA".into(),
                    b"Name: pkg\nVersion: 1.2.0\n\nA long description for the package here.\nVersion: body\n"
                        .to_vec(),
                ),
                (
                    "pkg-1.2.0.dist-info/PKG-INFO".into(),
                    b"Name: pkg\nVersion: 1.2.0\n".to_vec(),
                ),
                ("pkg-1.2.0.dist-info/RECORD.jws".into(), b"sig".to_vec()),
            ],
            Some("pkg-1.2.0.dist-info/RECORD"),
        );
        let suffix: VersionSuffix = ".post1".parse()?;
        let outcome = append_version_suffix(&Artifact::from_path(&path)?, &suffix)?;

        let renamed = dir.path().join("pkg-1.2.0.post1-cp312-cp312-x86_64.whl");
        assert_eq!(outcome.path(), renamed.as_path());
        assert!(!path.exists());
        let members = read_members(&renamed);
        assert!(members.iter().all(|(name, _)| !name.starts_with("pkg-1.2.0.dist-info/")));
        assert!(members.iter().all(|(name, _)| !name.ends_with("RECORD.jws")));
        let metadata = member(&members, "pkg-1.2.0.post1.dist-info/METADATA");
        assert!(metadata.contains("Version: 1.2.0.post1\n"));
        assert!(metadata.ends_with("Version: body\n"));
        assert!(member(&members, "pkg-1.2.0.post1.dist-info/PKG-INFO").contains("1.2.0.post1"));
        assert!(verify(&renamed).is_empty());
        Ok(())
    }

    #[test]
    fn suffix_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_wheel(dir.path(), "pkg-1.2.0.dev3-cp311-cp311-x86_64.whl");
        let before = fs::read(&path)?;
        let suffix: VersionSuffix = ".dev3".parse()?;
        let outcome = append_version_suffix(&Artifact::from_path(&path)?, &suffix)?;
        assert!(matches!(outcome, SuffixOutcome::Unchanged { .. }));
        assert_eq!(fs::read(&path)?, before);
        Ok(())
    }

    #[test]
    fn batch_applies_to_every_artifact() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let artifacts = vec![
            Artifact::from_path(&write_wheel(dir.path(), "pkg-2.0-cp311-cp311-x86_64.whl"))?,
            Artifact::from_path(&write_wheel(dir.path(), "pkg-2.0-cp312-cp312-x86_64.whl"))?,
        ];
        let results = repackage_batch(&artifacts, &Repackage::Suffix(".post2".parse()?), 2)?;
        let paths: Vec<PathBuf> = results.into_iter().collect::<Result<_>>()?;
        assert_eq!(
            paths,
            vec![
                dir.path().join("pkg-2.0.post2-cp311-cp311-x86_64.whl"),
                dir.path().join("pkg-2.0.post2-cp312-cp312-x86_64.whl"),
            ]
        );
        Ok(())
    }
}
