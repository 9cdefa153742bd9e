//! HTTP client for the package index: JSON read API and legacy upload API.

use anyhow::{Context, Result};
use reqwest::{blocking::Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::Config;
use crate::effects::{IndexError, PackageIndex, UploadForm, UploadResponse};
use crate::net::build_http_client;

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    #[serde(default)]
    urls: Vec<ReleaseFile>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    filename: String,
}

pub struct HttpPackageIndex {
    json_url: String,
    upload_url: String,
    client: Client,
    upload_client: Client,
}

impl HttpPackageIndex {
    pub fn new(config: &Config) -> Result<Self> {
        let index = config.index();
        Ok(Self {
            json_url: index.json_url.clone(),
            upload_url: index.upload_url.clone(),
            client: build_http_client(config.network(), index.timeout)?,
            upload_client: build_http_client(config.network(), index.upload_timeout)?,
        })
    }
}

impl PackageIndex for HttpPackageIndex {
    fn release_files(
        &self,
        project: &str,
        version: &str,
    ) -> Result<Option<Vec<String>>, IndexError> {
        let url = format!("{}/pypi/{project}/{version}/json", self.json_url);
        debug!(%url, "querying package index");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| IndexError::Unreachable(err.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(IndexError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        let release: ReleaseResponse = response
            .json()
            .map_err(|err| IndexError::Malformed(err.to_string()))?;
        Ok(Some(
            release.urls.into_iter().map(|file| file.filename).collect(),
        ))
    }

    fn upload(&self, form: &UploadForm, token: &str) -> Result<UploadResponse> {
        let digest = hex::encode(Sha256::digest(&form.content));
        let boundary = format!("----wheelwright{}", &digest[..12]);
        let body = encode_form(&boundary, form);
        let response = self
            .upload_client
            .post(&self.upload_url)
            .basic_auth("__token__", Some(token))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(body)
            .send()
            .with_context(|| format!("failed to upload {}", form.filename))?;
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        Ok(UploadResponse { status, body })
    }
}

fn encode_form(boundary: &str, form: &UploadForm) -> Vec<u8> {
    let mut body = Vec::with_capacity(form.content.len() + 4096);
    for (name, value) in &form.fields {
        append_form_field(&mut body, boundary, name, value);
    }
    append_file_field(&mut body, boundary, "content", &form.filename, &form.content);
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

fn append_form_field(buf: &mut Vec<u8>, boundary: &str, name: &str, value: &str) {
    buf.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    buf.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
    );
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

fn append_file_field(buf: &mut Vec<u8>, boundary: &str, name: &str, filename: &str, bytes: &[u8]) {
    buf.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    buf.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    buf.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    buf.extend_from_slice(bytes);
    buf.extend_from_slice(b"\r\n");
}
