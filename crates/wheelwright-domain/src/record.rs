//! The wheel `RECORD` manifest.
//!
//! Each line is a CSV row `path,sha256=<digest>,size` where the digest is the
//! unpadded URL-safe base64 encoding of the SHA-256 of the member. The RECORD
//! file lists itself with empty hash and size columns.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const RECORD_FILE: &str = "RECORD";
pub const HASH_ALGORITHM: &str = "sha256";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("RECORD line {line} is malformed: {reason}")]
    Malformed { line: usize, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordEntry {
    pub path: String,
    pub hash: Option<String>,
    pub size: Option<u64>,
}

impl RecordEntry {
    /// Entry for a member whose full contents are in memory.
    #[must_use]
    pub fn for_contents(path: impl Into<String>, contents: &[u8]) -> Self {
        Self::from_digest(path, &Sha256::digest(contents), contents.len() as u64)
    }

    #[must_use]
    pub fn from_digest(path: impl Into<String>, digest: &[u8], size: u64) -> Self {
        Self {
            path: path.into(),
            hash: Some(format!("{HASH_ALGORITHM}={}", encode_digest(digest))),
            size: Some(size),
        }
    }

    /// Self-entry for the RECORD file: no hash, no size.
    #[must_use]
    pub fn unhashed(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hash: None,
            size: None,
        }
    }

    /// Raw digest bytes of a `sha256=` hash field.
    #[must_use]
    pub fn digest(&self) -> Option<Vec<u8>> {
        let encoded = self
            .hash
            .as_deref()?
            .strip_prefix(HASH_ALGORITHM)?
            .strip_prefix('=')?;
        URL_SAFE_NO_PAD.decode(encoded).ok()
    }

    /// Whether `contents` matches both the recorded digest and size.
    #[must_use]
    pub fn matches(&self, contents: &[u8]) -> bool {
        let size_ok = self.size.map_or(true, |size| size == contents.len() as u64);
        let digest_ok = self
            .digest()
            .is_some_and(|digest| digest.as_slice() == Sha256::digest(contents).as_slice());
        size_ok && digest_ok
    }

    fn render(&self) -> String {
        format!(
            "{},{},{}",
            quote_field(&self.path),
            self.hash.as_deref().unwrap_or(""),
            self.size.map(|size| size.to_string()).unwrap_or_default()
        )
    }
}

/// Unpadded URL-safe base64, the only digest encoding the index accepts.
#[must_use]
pub fn encode_digest(digest: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(digest)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    pub entries: Vec<RecordEntry>,
}

impl Record {
    pub fn parse(contents: &str) -> Result<Self, RecordError> {
        let mut entries = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let line_no = idx + 1;
            let fields = split_csv_line(line).ok_or(RecordError::Malformed {
                line: line_no,
                reason: "unterminated quote",
            })?;
            let [path, hash, size] = fields.as_slice() else {
                return Err(RecordError::Malformed {
                    line: line_no,
                    reason: "expected three columns",
                });
            };
            if path.is_empty() {
                return Err(RecordError::Malformed {
                    line: line_no,
                    reason: "empty path",
                });
            }
            let size = if size.is_empty() {
                None
            } else {
                Some(size.parse().map_err(|_| RecordError::Malformed {
                    line: line_no,
                    reason: "size is not an integer",
                })?)
            };
            entries.push(RecordEntry {
                path: path.clone(),
                hash: (!hash.is_empty()).then(|| hash.clone()),
                size,
            });
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut body = String::new();
        for entry in &self.entries {
            body.push_str(&entry.render());
            body.push('\n');
        }
        body
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&RecordEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }
}

fn quote_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn split_csv_line(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.trim_end_matches('\r').chars().peekable();
    let mut quoted = false;
    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            (true, '"') => quoted = false,
            (false, '"') if current.is_empty() => quoted = true,
            (false, ',') => fields.push(std::mem::take(&mut current)),
            (_, other) => current.push(other),
        }
    }
    if quoted {
        return None;
    }
    fields.push(current);
    Some(fields)
}
