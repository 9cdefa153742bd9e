use std::fs::{self, File};
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tempfile::NamedTempFile;
use walkdir::WalkDir;
use wheelwright_domain::{Record, RecordEntry, RECORD_FILE};
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

/// RECORD signatures cannot survive a rewrite.
const RECORD_SIGNATURES: [&str; 2] = ["RECORD.jws", "RECORD.p7s"];

/// Extracts every member of `wheel` below `dest`. Members whose names escape
/// the destination are skipped.
pub(crate) fn unpack(wheel: &Path, dest: &Path) -> Result<()> {
    let file = File::open(wheel).with_context(|| format!("failed to open {}", wheel.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("{} is not a readable zip archive", wheel.display()))?;
    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx)?;
        let Some(enclosed) = entry.enclosed_name().map(|p| dest.join(p)) else {
            continue;
        };
        if entry.name().ends_with('/') || entry.is_dir() {
            fs::create_dir_all(&enclosed)?;
            continue;
        }
        if let Some(parent) = enclosed.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&enclosed)?;
        io::copy(&mut entry, &mut outfile)
            .with_context(|| format!("failed to extract {}", entry.name()))?;
        #[cfg(unix)]
        {
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&enclosed, fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}

/// Text of one member, located case-insensitively.
pub(crate) fn read_text_member(wheel: &Path, member: &str) -> Result<String> {
    let file = File::open(wheel).with_context(|| format!("failed to open {}", wheel.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("{} is not a readable zip archive", wheel.display()))?;
    let name = archive
        .file_names()
        .find(|name| name.eq_ignore_ascii_case(member))
        .map(ToString::to_string)
        .ok_or_else(|| anyhow!("{} has no {member}", wheel.display()))?;
    let mut entry = archive.by_name(&name)?;
    let mut text = String::new();
    io::Read::read_to_string(&mut entry, &mut text)
        .with_context(|| format!("failed to read {member}"))?;
    Ok(text)
}

/// Top-level `.dist-info` directory of an extracted wheel matching `expected`
/// case-insensitively.
pub(crate) fn locate_info_dir(root: &Path, expected: &str) -> Result<String> {
    for entry in fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type()?.is_dir() && name.eq_ignore_ascii_case(expected) {
            return Ok(name);
        }
    }
    Err(anyhow!("wheel has no {expected} directory"))
}

/// Recomputes RECORD for the tree under `root` and writes it into `info_dir`.
///
/// Entries are sorted by path with the info directory last; the RECORD
/// self-entry closes the list.
pub(crate) fn rewrite_record(root: &Path, info_dir: &str) -> Result<Record> {
    for signature in RECORD_SIGNATURES {
        let path = root.join(info_dir).join(signature);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to drop {}", path.display()))?;
        }
    }

    let record_path = format!("{info_dir}/{RECORD_FILE}");
    let info_prefix = format!("{info_dir}/");
    let mut entries = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("failed to scan {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = member_name(root, entry.path())?;
        if relative == record_path {
            continue;
        }
        let contents = fs::read(entry.path())
            .with_context(|| format!("failed to read {}", entry.path().display()))?;
        entries.push(RecordEntry::for_contents(relative, &contents));
    }
    entries.sort_by(|a, b| {
        let a_key = (a.path.starts_with(&info_prefix), &a.path);
        let b_key = (b.path.starts_with(&info_prefix), &b.path);
        a_key.cmp(&b_key)
    });
    entries.push(RecordEntry::unhashed(record_path.clone()));

    let record = Record { entries };
    fs::write(root.join(&record_path), record.render())
        .with_context(|| format!("failed to write {record_path}"))?;
    Ok(record)
}

/// Zips the members listed in `record` from `root` into `dest`.
///
/// The archive is written next to `dest` and only renamed into place once
/// complete, so readers never observe a partial wheel.
pub(crate) fn pack(root: &Path, record: &Record, dest: &Path) -> Result<PathBuf> {
    let parent = dest
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create a temp file in {}", parent.display()))?;
    {
        let mut zip = ZipWriter::new(temp.as_file_mut());
        for entry in &record.entries {
            let source = root.join(&entry.path);
            let options = member_options(&source)?;
            zip.start_file(entry.path.as_str(), options)?;
            let data =
                fs::read(&source).with_context(|| format!("failed to read {}", source.display()))?;
            zip.write_all(&data)?;
        }
        zip.finish()
            .with_context(|| format!("failed to finish {}", dest.display()))?;
    }
    temp.persist(dest)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to write {}", dest.display()))?;
    Ok(dest.to_path_buf())
}

fn member_options(source: &Path) -> Result<FileOptions> {
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    #[cfg(unix)]
    let options = {
        let mode = fs::metadata(source)
            .with_context(|| format!("failed to stat {}", source.display()))?
            .permissions()
            .mode();
        options.unix_permissions(mode)
    };
    #[cfg(not(unix))]
    let _ = source;
    Ok(options)
}

fn member_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect();
    Ok(parts.join("/"))
}
