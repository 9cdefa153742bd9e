//! Release-hosting client for the GitHub REST API.

use anyhow::{anyhow, Context, Result};
use reqwest::{
    blocking::{Client, RequestBuilder},
    StatusCode,
};
use url::Url;

use crate::config::Config;
use crate::effects::{HostedRelease, ReleaseDraft, ReleaseHost};
use crate::net::build_http_client;

const API_VERSION: &str = "2022-11-28";

pub struct GithubReleaseHost {
    api_url: String,
    uploads_url: String,
    token: Option<String>,
    client: Client,
}

impl GithubReleaseHost {
    pub fn new(config: &Config) -> Result<Self> {
        let release = config.release();
        Ok(Self {
            api_url: release.api_url.clone(),
            uploads_url: release.uploads_url.clone(),
            token: release.token.clone(),
            client: build_http_client(config.network(), release.timeout)?,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow!("no release token configured"))?;
        Ok(request
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION))
    }
}

impl ReleaseHost for GithubReleaseHost {
    fn find_release(&self, repo: &str, tag: &str) -> Result<Option<HostedRelease>> {
        let url = format!("{}/repos/{repo}/releases/tags/{tag}", self.api_url);
        let response = self
            .authorized(self.client.get(&url))?
            .send()
            .with_context(|| format!("failed to query {url}"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let release = response
            .error_for_status()
            .with_context(|| format!("unexpected response for {url}"))?
            .json()
            .with_context(|| format!("unreadable release from {url}"))?;
        Ok(Some(release))
    }

    fn create_release(&self, repo: &str, draft: &ReleaseDraft) -> Result<HostedRelease> {
        let url = format!("{}/repos/{repo}/releases", self.api_url);
        self.authorized(self.client.post(&url))?
            .json(draft)
            .send()
            .with_context(|| format!("failed to create release {}", draft.tag_name))?
            .error_for_status()
            .with_context(|| format!("release {} was rejected", draft.tag_name))?
            .json()
            .context("unreadable release creation response")
    }

    fn upload_asset(
        &self,
        repo: &str,
        release: &HostedRelease,
        name: &str,
        content: Vec<u8>,
    ) -> Result<()> {
        let url = Url::parse_with_params(
            &format!(
                "{}/repos/{repo}/releases/{}/assets",
                self.uploads_url, release.id
            ),
            &[("name", name)],
        )
        .context("invalid release upload URL")?;
        self.authorized(self.client.post(url))?
            .header("Content-Type", "application/octet-stream")
            .body(content)
            .send()
            .with_context(|| format!("failed to upload release asset {name}"))?
            .error_for_status()
            .with_context(|| format!("release asset {name} was rejected"))?;
        Ok(())
    }
}
