//! Uploads to the package index and mirroring to the release host.

use std::fs;

use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use wheelwright_domain::{MetadataDocument, METADATA_FILE};

use crate::config::Credentials;
use crate::core::wheel::{archive::read_text_member, Artifact};
use crate::effects::{PackageIndex, UploadForm};
use crate::ConfigurationError;

pub mod release;

pub use release::{ReleasePublisher, ReleaseStatus};

/// Response bodies the index uses for a filename it already holds.
const CONFLICT_MARKERS: [&str; 3] = [
    "already exists",
    "filename has already been used",
    "previously used",
];

/// Header-to-form-field mapping for single-valued METADATA headers.
const SINGLE_FIELDS: [(&str, &str); 10] = [
    ("Metadata-Version", "metadata_version"),
    ("Summary", "summary"),
    ("Home-page", "home_page"),
    ("Author", "author"),
    ("Author-email", "author_email"),
    ("License", "license"),
    ("Keywords", "keywords"),
    ("Requires-Python", "requires_python"),
    ("Description-Content-Type", "description_content_type"),
    ("Platform", "platform"),
];

const REPEATED_FIELDS: [(&str, &str); 4] = [
    ("Classifier", "classifiers"),
    ("Requires-Dist", "requires_dist"),
    ("Project-URL", "project_urls"),
    ("Provides-Extra", "provides_extra"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    /// The index already had the file; counted as published.
    Conflict,
    /// The pre-upload recheck found the file; nothing was sent.
    AlreadyPresent,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no upload credential for {package}")]
    MissingCredential { package: String },
    #[error("cannot prepare {filename}: {reason}")]
    Artifact { filename: String, reason: String },
    #[error("upload of {filename} failed: {reason}")]
    Transport { filename: String, reason: String },
    #[error("index rejected {filename} with status {status}: {body}")]
    Rejected {
        filename: String,
        status: u16,
        body: String,
    },
}

/// Whether a rejected upload only says the file is already there.
#[must_use]
pub fn is_conflict(status: u16, body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    matches!(status, 400 | 409) && CONFLICT_MARKERS.iter().any(|marker| lowered.contains(marker))
}

pub struct Publisher<'a> {
    index: &'a dyn PackageIndex,
    credentials: &'a Credentials,
}

impl<'a> Publisher<'a> {
    #[must_use]
    pub fn new(index: &'a dyn PackageIndex, credentials: &'a Credentials) -> Self {
        Self { index, credentials }
    }

    /// Fails when any of `packages` has no usable credential.
    pub fn validate_credentials<'p>(
        &self,
        packages: impl IntoIterator<Item = &'p str>,
    ) -> Result<(), ConfigurationError> {
        let mut missing: Vec<&str> = packages
            .into_iter()
            .filter(|package| self.credentials.select(package).is_none())
            .collect();
        missing.sort_unstable();
        missing.dedup();
        if missing.is_empty() {
            return Ok(());
        }
        Err(ConfigurationError::new(
            format!("no upload token for {}", missing.join(", ")),
            json!({
                "reason": "missing_credentials",
                "packages": missing,
                "hint": "Set WHEELWRIGHT_INDEX_TOKEN or WHEELWRIGHT_INDEX_TOKEN_<PACKAGE>.",
            }),
        ))
    }

    /// Uploads `artifact` under `package`, unless the index already lists it.
    pub fn publish(&self, artifact: &Artifact, package: &str) -> Result<UploadStatus, UploadError> {
        let filename = artifact.filename.to_string();
        match self.index.release_files(package, &artifact.filename.version) {
            Ok(Some(files)) if files.iter().any(|file| *file == filename) => {
                info!(%filename, "already on the index; skipping upload");
                return Ok(UploadStatus::AlreadyPresent);
            }
            Ok(_) => {}
            Err(err) => warn!(%filename, error = %err, "could not recheck the index before upload"),
        }

        let token = self
            .credentials
            .select(package)
            .ok_or_else(|| UploadError::MissingCredential {
                package: package.to_string(),
            })?;
        debug!(%filename, source = %token.source, "selected upload credential");

        let form = upload_form(artifact).map_err(|err| UploadError::Artifact {
            filename: filename.clone(),
            reason: format!("{err:#}"),
        })?;
        let response = self
            .index
            .upload(&form, token.token)
            .map_err(|err| UploadError::Transport {
                filename: filename.clone(),
                reason: format!("{err:#}"),
            })?;
        if (200..300).contains(&response.status) {
            info!(%filename, "uploaded");
            return Ok(UploadStatus::Uploaded);
        }
        if is_conflict(response.status, &response.body) {
            info!(%filename, status = response.status, "index already holds this file");
            return Ok(UploadStatus::Conflict);
        }
        Err(UploadError::Rejected {
            filename,
            status: response.status,
            body: response.body.chars().take(500).collect(),
        })
    }
}

/// Legacy upload form for a wheel, with fields taken from its METADATA.
pub fn upload_form(artifact: &Artifact) -> anyhow::Result<UploadForm> {
    let content = fs::read(&artifact.path)?;
    let name = &artifact.filename;
    let metadata = MetadataDocument::parse(&read_text_member(
        &artifact.path,
        &format!("{}/{METADATA_FILE}", name.info_dir()),
    )?);

    let mut fields: Vec<(String, String)> = vec![
        (":action".into(), "file_upload".into()),
        ("protocol_version".into(), "1".into()),
        (
            "name".into(),
            metadata.field("Name").unwrap_or(&name.distribution).to_string(),
        ),
        (
            "version".into(),
            metadata.field("Version").unwrap_or(&name.version).to_string(),
        ),
    ];
    for (header, field) in SINGLE_FIELDS {
        if let Some(value) = metadata.field(header) {
            fields.push((field.to_string(), value.to_string()));
        }
    }
    for (header, field) in REPEATED_FIELDS {
        for value in metadata.fields(header) {
            fields.push((field.to_string(), value.to_string()));
        }
    }
    fields.extend([
        ("description".to_string(), metadata.body().to_string()),
        ("filetype".to_string(), "bdist_wheel".to_string()),
        ("pyversion".to_string(), name.python_tag.clone()),
        ("sha256_digest".to_string(), hex::encode(Sha256::digest(&content))),
        ("size".to_string(), content.len().to_string()),
        ("comment".to_string(), String::new()),
    ]);
    Ok(UploadForm {
        fields,
        filename: name.to_string(),
        content,
    })
}
