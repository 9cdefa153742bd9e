//! Structural integrity checks for built wheels.
//!
//! Every check runs and every violation is reported; a wheel whose archive
//! cannot be opened only gets the filename check on top.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::debug;
use wheelwright_domain::{MetadataDocument, Record, WheelFilename, METADATA_FILE, RECORD_FILE};
use zip::ZipArchive;

use super::run_bounded;

/// RECORD may legitimately omit or add a couple of entries (itself, directory
/// members written by some tools).
pub const RECORD_COUNT_TOLERANCE: usize = 2;

/// Shortest METADATA body accepted as a long description.
pub const MIN_DESCRIPTION_CHARS: usize = 20;

const STANDALONE_DESCRIPTIONS: [&str; 2] = ["DESCRIPTION.rst", "README.md"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    #[error("archive cannot be opened: {reason}")]
    ArchiveUnreadable { reason: String },
    #[error("member {member} is corrupt: {reason}")]
    CorruptMember { member: String, reason: String },
    #[error("filename does not follow the wheel grammar: {reason}")]
    InvalidFilename { reason: String },
    #[error("missing {expected}/ directory")]
    MissingInfoDir { expected: String },
    #[error("missing {info_dir}/METADATA")]
    MissingMetadata { info_dir: String },
    #[error("METADATA has no {field} value")]
    MissingMetadataField { field: String },
    #[error("missing {info_dir}/RECORD")]
    MissingRecord { info_dir: String },
    #[error("RECORD is malformed: {reason}")]
    MalformedRecord { reason: String },
    #[error("RECORD lists {recorded} entries but the archive holds {files} files")]
    RecordCountMismatch { recorded: usize, files: usize },
    #[error("no long description (standalone file or METADATA body)")]
    MissingDescription,
    #[error("no top-level package directory with __init__.py")]
    MissingPackage,
}

#[derive(Debug, Clone, Serialize)]
pub struct WheelReport {
    pub path: PathBuf,
    pub violations: Vec<Violation>,
}

impl WheelReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub reports: Vec<WheelReport>,
}

impl BatchReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.reports.iter().all(WheelReport::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &WheelReport> {
        self.reports.iter().filter(|report| !report.passed())
    }
}

/// Verifies many wheels on a pool of `min(jobs, wheels, 8)` workers and waits
/// for all of them.
pub fn verify_batch(wheels: &[PathBuf], jobs: usize) -> Result<BatchReport> {
    let reports = run_bounded(jobs, wheels, |path| WheelReport {
        path: path.clone(),
        violations: verify(path),
    })?;
    Ok(BatchReport { reports })
}

/// Runs every integrity check against the wheel at `path`.
#[must_use]
pub fn verify(path: &Path) -> Vec<Violation> {
    let mut violations = Vec::new();
    let filename = match parse_filename(path) {
        Ok(filename) => Some(filename),
        Err(reason) => {
            violations.push(Violation::InvalidFilename { reason });
            None
        }
    };

    let contents = match scan_archive(path) {
        Ok(contents) => contents,
        Err(reason) => {
            violations.push(Violation::ArchiveUnreadable { reason });
            return violations;
        }
    };
    violations.extend(contents.corrupt.iter().cloned());

    let Some(info_dir) = contents.info_dir(filename.as_ref()) else {
        violations.push(Violation::MissingInfoDir {
            expected: filename
                .as_ref()
                .map_or_else(|| "*.dist-info".to_string(), WheelFilename::info_dir),
        });
        if !contents.has_package() {
            violations.push(Violation::MissingPackage);
        }
        return violations;
    };

    let metadata = contents
        .text(&format!("{info_dir}/{METADATA_FILE}"))
        .as_deref()
        .map(MetadataDocument::parse);
    match &metadata {
        None => violations.push(Violation::MissingMetadata {
            info_dir: info_dir.clone(),
        }),
        Some(document) => {
            for field in ["Name", "Version"] {
                if document.field(field).map_or(true, str::is_empty) {
                    violations.push(Violation::MissingMetadataField {
                        field: field.to_string(),
                    });
                }
            }
        }
    }

    match contents.text(&format!("{info_dir}/{RECORD_FILE}")) {
        None => violations.push(Violation::MissingRecord {
            info_dir: info_dir.clone(),
        }),
        Some(text) => match Record::parse(&text) {
            Ok(record) => {
                let files = contents.files.len();
                if record.len().abs_diff(files) > RECORD_COUNT_TOLERANCE {
                    violations.push(Violation::RecordCountMismatch {
                        recorded: record.len(),
                        files,
                    });
                }
            }
            Err(err) => violations.push(Violation::MalformedRecord {
                reason: err.to_string(),
            }),
        },
    }

    let standalone = STANDALONE_DESCRIPTIONS
        .iter()
        .any(|name| contents.has_file(&format!("{info_dir}/{name}")));
    let body_ok = metadata
        .as_ref()
        .is_some_and(|document| document.body().trim().chars().count() >= MIN_DESCRIPTION_CHARS);
    if !standalone && !body_ok {
        violations.push(Violation::MissingDescription);
    }

    if !contents.has_package() {
        violations.push(Violation::MissingPackage);
    }

    debug!(wheel = %path.display(), violations = violations.len(), "verified wheel");
    violations
}

fn parse_filename(path: &Path) -> Result<WheelFilename, String> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("{} has no usable file name", path.display()))?;
    name.parse().map_err(|err: wheelwright_domain::FilenameError| err.to_string())
}

/// What a full read of the archive learned.
struct ArchiveContents {
    files: Vec<String>,
    /// Contents of the small info-directory documents, keyed by member name.
    documents: Vec<(String, Vec<u8>)>,
    corrupt: Vec<Violation>,
}

impl ArchiveContents {
    fn info_dir(&self, filename: Option<&WheelFilename>) -> Option<String> {
        let mut tops = self
            .files
            .iter()
            .filter_map(|name| name.split_once('/').map(|(top, _)| top));
        let found = match filename {
            Some(filename) => {
                let expected = filename.info_dir();
                tops.find(|top| top.eq_ignore_ascii_case(&expected))
            }
            None => tops.find(|top| top.ends_with(".dist-info")),
        };
        found.map(ToString::to_string)
    }

    fn has_file(&self, member: &str) -> bool {
        self.files.iter().any(|name| name == member)
    }

    fn text(&self, member: &str) -> Option<String> {
        self.documents
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, data)| String::from_utf8_lossy(data).to_string())
    }

    fn has_package(&self) -> bool {
        self.files.iter().any(|name| {
            name.split_once('/').is_some_and(|(top, rest)| {
                rest == "__init__.py"
                    && !top.ends_with(".dist-info")
                    && !top.ends_with(".data")
            })
        })
    }
}

/// Reads every member to the end so CRC errors surface.
fn scan_archive(path: &Path) -> Result<ArchiveContents, String> {
    let file = File::open(path).map_err(|err| err.to_string())?;
    let mut archive = ZipArchive::new(file).map_err(|err| err.to_string())?;
    let mut contents = ArchiveContents {
        files: Vec::new(),
        documents: Vec::new(),
        corrupt: Vec::new(),
    };
    for idx in 0..archive.len() {
        let mut entry = match archive.by_index(idx) {
            Ok(entry) => entry,
            Err(err) => {
                contents.corrupt.push(Violation::CorruptMember {
                    member: format!("#{idx}"),
                    reason: err.to_string(),
                });
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let keep = name.ends_with(&format!(".dist-info/{METADATA_FILE}"))
            || name.ends_with(&format!(".dist-info/{RECORD_FILE}"));
        let read = if keep {
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map(|_| Some(data))
        } else {
            io::copy(&mut entry, &mut io::sink()).map(|_| None)
        };
        match read {
            Ok(Some(data)) => contents.documents.push((name.clone(), data)),
            Ok(None) => {}
            Err(err) => contents.corrupt.push(Violation::CorruptMember {
                member: name.clone(),
                reason: err.to_string(),
            }),
        }
        contents.files.push(name);
    }
    Ok(contents)
}
