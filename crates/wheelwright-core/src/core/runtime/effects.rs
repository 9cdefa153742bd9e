use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::github::GithubReleaseHost;
use crate::index::HttpPackageIndex;
use crate::net::build_http_client;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("package index unreachable: {0}")]
    Unreachable(String),
    #[error("package index answered {status} for {url}")]
    Status { status: u16, url: String },
    #[error("package index sent an unreadable response: {0}")]
    Malformed(String),
}

/// One multipart upload to the legacy API.
#[derive(Debug, Clone)]
pub struct UploadForm {
    pub fields: Vec<(String, String)>,
    pub filename: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub status: u16,
    pub body: String,
}

pub trait PackageIndex: Send + Sync {
    /// Filenames published for `project` at `version`; `Ok(None)` when the
    /// index has no such release.
    fn release_files(&self, project: &str, version: &str)
        -> Result<Option<Vec<String>>, IndexError>;

    /// Sends `form` and returns the raw response; interpreting it is the
    /// caller's job.
    fn upload(&self, form: &UploadForm, token: &str) -> Result<UploadResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedRelease {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseDraft {
    pub tag_name: String,
    pub name: String,
    pub body: String,
}

pub trait ReleaseHost: Send + Sync {
    fn find_release(&self, repo: &str, tag: &str) -> Result<Option<HostedRelease>>;
    fn create_release(&self, repo: &str, draft: &ReleaseDraft) -> Result<HostedRelease>;
    fn upload_asset(
        &self,
        repo: &str,
        release: &HostedRelease,
        name: &str,
        content: Vec<u8>,
    ) -> Result<()>;
}

/// Fetches the small text document that declares upstream runtime support.
pub trait ConstraintSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String>;
}

pub trait Effects: Send + Sync {
    fn index(&self) -> &dyn PackageIndex;
    fn releases(&self) -> &dyn ReleaseHost;
    fn constraints(&self) -> &dyn ConstraintSource;
}

pub type SharedEffects = Arc<dyn Effects>;

pub struct SystemEffects {
    index: Arc<HttpPackageIndex>,
    releases: Arc<GithubReleaseHost>,
    constraints: Arc<HttpConstraintSource>,
}

impl SystemEffects {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            index: Arc::new(HttpPackageIndex::new(config)?),
            releases: Arc::new(GithubReleaseHost::new(config)?),
            constraints: Arc::new(HttpConstraintSource {
                client: build_http_client(config.network(), config.constraint().timeout)?,
            }),
        })
    }
}

impl Effects for SystemEffects {
    fn index(&self) -> &dyn PackageIndex {
        self.index.as_ref()
    }

    fn releases(&self) -> &dyn ReleaseHost {
        self.releases.as_ref()
    }

    fn constraints(&self) -> &dyn ConstraintSource {
        self.constraints.as_ref()
    }
}

struct HttpConstraintSource {
    client: Client,
}

impl ConstraintSource for HttpConstraintSource {
    fn fetch(&self, url: &str) -> Result<String> {
        self.client
            .get(url)
            .send()
            .with_context(|| format!("failed to fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("unexpected response for {url}"))?
            .text()
            .with_context(|| format!("failed to read {url}"))
    }
}
