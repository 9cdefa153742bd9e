//! Wheel archives on disk: discovery, integrity checks, and in-place repackaging.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;
use wheelwright_domain::{WheelFilename, WHEEL_EXTENSION};

pub(crate) mod archive;
pub mod repackage;
pub mod verify;

pub use repackage::{
    append_version_suffix, repackage_batch, update_description, Repackage, SuffixOutcome,
};
pub use verify::{verify, verify_batch, BatchReport, Violation, WheelReport};

/// Upper bound on worker threads for batch operations.
pub const MAX_WORKERS: usize = 8;

/// A wheel file together with its parsed name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub filename: WheelFilename,
}

impl Artifact {
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?;
        let filename = name
            .parse()
            .with_context(|| format!("{} is not a wheel", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            filename,
        })
    }
}

/// Every `.whl` below `root`, sorted by path.
pub fn find_wheels(root: &Path) -> Result<Vec<PathBuf>> {
    let mut wheels = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to scan {}", root.display()))?;
        if entry.file_type().is_file() && is_wheel(entry.path()) {
            wheels.push(entry.into_path());
        }
    }
    wheels.sort();
    Ok(wheels)
}

pub(crate) fn is_wheel(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(WHEEL_EXTENSION))
}

/// Worker count for a batch of `items`: `min(jobs, items, MAX_WORKERS)`, at least one.
#[must_use]
pub fn worker_count(jobs: usize, items: usize) -> usize {
    jobs.min(items).min(MAX_WORKERS).max(1)
}

/// Runs `op` over `items` on a dedicated pool and waits for every worker.
pub(crate) fn run_bounded<T, R, F>(jobs: usize, items: &[T], op: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count(jobs, items.len()))
        .build()
        .context("failed to start worker pool")?;
    Ok(pool.install(|| items.par_iter().map(&op).collect()))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::fs::File;
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use wheelwright_domain::{Record, RecordEntry};
    use zip::{write::FileOptions, CompressionMethod, ZipWriter};

    pub(crate) const LONG_DESCRIPTION: &str =
        "A CPU build of the package with a description long enough to pass.\n";

    /// Writes a structurally valid wheel named `filename` into `dir`.
    pub(crate) fn write_wheel(dir: &Path, filename: &str) -> PathBuf {
        let parsed: wheelwright_domain::WheelFilename = filename.parse().expect("wheel name");
        let info = parsed.info_dir();
        let metadata = format!(
            "Metadata-Version: 2.1\nName: {}\nVersion: {}\nSummary: test wheel\n\n{LONG_DESCRIPTION}",
            parsed.distribution, parsed.version
        );
        let members = vec![
            (format!("{}/__init__.py", parsed.distribution), b"VALUE = 1\n".to_vec()),
            (format!("{}/core.py", parsed.distribution), b"def run():\n    pass\n".to_vec()),
            (format!("{info}/METADATA"), metadata.into_bytes()),
            (
                format!("{info}/WHEEL"),
                b"Wheel-Version: 1.0\nRoot-Is-Purelib: false\n".to_vec(),
            ),
        ];
        write_members(&dir.join(filename), &members, Some(&format!("{info}/RECORD")))
    }

    /// Writes `members` verbatim, plus a correct RECORD at `record` when given.
    pub(crate) fn write_members(
        path: &Path,
        members: &[(String, Vec<u8>)],
        record: Option<&str>,
    ) -> PathBuf {
        let file = File::create(path).expect("create wheel");
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut entries = Vec::new();
        for (name, data) in members {
            zip.start_file(name.as_str(), options).expect("start file");
            zip.write_all(data).expect("write member");
            entries.push(RecordEntry::for_contents(name.clone(), data));
        }
        if let Some(record) = record {
            entries.push(RecordEntry::unhashed(record));
            zip.start_file(record, options).expect("start record");
            zip.write_all(Record { entries }.render().as_bytes())
                .expect("write record");
        }
        zip.finish().expect("finish wheel");
        path.to_path_buf()
    }

    /// Reads every member of a wheel into memory, in archive order.
    pub(crate) fn read_members(path: &Path) -> Vec<(String, Vec<u8>)> {
        use std::io::Read;
        let mut archive = zip::ZipArchive::new(File::open(path).expect("open")).expect("zip");
        (0..archive.len())
            .map(|idx| {
                let mut entry = archive.by_index(idx).expect("entry");
                let mut data = Vec::new();
                entry.read_to_end(&mut data).expect("read");
                (entry.name().to_string(), data)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_is_bounded() {
        assert_eq!(worker_count(4, 10), 4);
        assert_eq!(worker_count(32, 100), MAX_WORKERS);
        assert_eq!(worker_count(4, 2), 2);
        assert_eq!(worker_count(0, 0), 1);
    }

    #[test]
    fn finds_nested_wheels_only() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("a/b"))?;
        testing::write_wheel(&dir.path().join("a/b"), "pkg-1.0-cp312-cp312-x86_64.whl");
        testing::write_wheel(dir.path(), "pkg-1.0-cp311-cp311-x86_64.whl");
        std::fs::write(dir.path().join("notes.txt"), "x")?;
        let found = find_wheels(dir.path())?;
        assert_eq!(found.len(), 2);
        let artifact = Artifact::from_path(&found[0])?;
        assert_eq!(artifact.filename.distribution, "pkg");
        Ok(())
    }

    #[test]
    fn run_bounded_preserves_order() -> Result<()> {
        let items: Vec<u32> = (0..20).collect();
        let doubled = run_bounded(3, &items, |n| n * 2)?;
        assert_eq!(doubled, items.iter().map(|n| n * 2).collect::<Vec<_>>());
        Ok(())
    }
}
