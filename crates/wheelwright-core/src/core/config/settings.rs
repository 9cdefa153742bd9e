use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net;

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org";
pub const DEFAULT_UPLOAD_URL: &str = "https://upload.pypi.org/legacy/";
pub const DEFAULT_RELEASE_API: &str = "https://api.github.com";
pub const DEFAULT_RELEASE_UPLOADS: &str = "https://uploads.github.com";

const SHARED_TOKEN_ENV: &str = "WHEELWRIGHT_INDEX_TOKEN";
const SCOPED_TOKEN_PREFIX: &str = "WHEELWRIGHT_INDEX_TOKEN_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
}

/// Process environment captured once; nothing reads `std::env` afterwards.
#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Non-empty value of `key`, trimmed.
    pub(crate) fn non_empty(&self, key: &str) -> Option<&str> {
        self.var(key).map(str::trim).filter(|value| !value.is_empty())
    }

    pub(crate) fn with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.vars.iter().filter_map(move |(key, value)| {
            key.strip_prefix(prefix)
                .map(|rest| (rest, value.as_str()))
        })
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) index: IndexConfig,
    pub(crate) credentials: Credentials,
    pub(crate) release: ReleaseConfig,
    pub(crate) constraint: ConstraintConfig,
    pub(crate) build: BuildConfig,
    pub(crate) network: NetworkConfig,
}

impl Config {
    /// Builds the configuration from the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    #[must_use]
    pub fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        let url = |key: &str, default: &str| {
            snapshot
                .non_empty(key)
                .unwrap_or(default)
                .trim_end_matches('/')
                .to_string()
        };
        Self {
            index: IndexConfig {
                json_url: url("WHEELWRIGHT_INDEX_URL", DEFAULT_INDEX_URL),
                upload_url: snapshot
                    .non_empty("WHEELWRIGHT_UPLOAD_URL")
                    .unwrap_or(DEFAULT_UPLOAD_URL)
                    .to_string(),
                timeout: Duration::from_secs(15),
                upload_timeout: Duration::from_secs(300),
            },
            credentials: Credentials::from_snapshot(snapshot),
            release: ReleaseConfig {
                repo: snapshot.non_empty("WHEELWRIGHT_RELEASE_REPO").map(ToOwned::to_owned),
                token: snapshot
                    .non_empty("WHEELWRIGHT_RELEASE_TOKEN")
                    .or_else(|| snapshot.non_empty("GITHUB_TOKEN"))
                    .map(ToOwned::to_owned),
                api_url: url("WHEELWRIGHT_RELEASE_API", DEFAULT_RELEASE_API),
                uploads_url: url("WHEELWRIGHT_RELEASE_UPLOADS", DEFAULT_RELEASE_UPLOADS),
                timeout: Duration::from_secs(60),
            },
            constraint: ConstraintConfig {
                url_template: snapshot
                    .non_empty("WHEELWRIGHT_CONSTRAINT_URL")
                    .map(ToOwned::to_owned),
                timeout: Duration::from_secs(10),
            },
            build: BuildConfig {
                command: snapshot
                    .non_empty("WHEELWRIGHT_BUILD_COMMAND")
                    .map(ToOwned::to_owned),
                image: snapshot
                    .non_empty("WHEELWRIGHT_BUILD_IMAGE")
                    .map(ToOwned::to_owned),
                source_dir: snapshot
                    .non_empty("WHEELWRIGHT_SOURCE_DIR")
                    .map(PathBuf::from),
            },
            network: NetworkConfig {
                keep_proxies: net::keep_proxies(snapshot),
            },
        }
    }

    #[must_use]
    pub fn index(&self) -> &IndexConfig {
        &self.index
    }

    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    #[must_use]
    pub fn release(&self) -> &ReleaseConfig {
        &self.release
    }

    #[must_use]
    pub fn constraint(&self) -> &ConstraintConfig {
        &self.constraint
    }

    #[must_use]
    pub fn build(&self) -> &BuildConfig {
        &self.build
    }

    #[must_use]
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Base of the JSON read API, e.g. `https://pypi.org`.
    pub json_url: String,
    /// Legacy upload endpoint.
    pub upload_url: String,
    pub timeout: Duration,
    pub upload_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    pub repo: Option<String>,
    pub token: Option<String>,
    pub api_url: String,
    pub uploads_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ConstraintConfig {
    /// URL with a `{version}` placeholder.
    pub url_template: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub command: Option<String>,
    pub image: Option<String>,
    pub source_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    pub keep_proxies: bool,
}

/// Upload tokens: one shared, plus any number scoped to a package identity.
#[derive(Clone, Default)]
pub struct Credentials {
    shared: Option<String>,
    scoped: Vec<(String, String)>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let identities: Vec<&str> = self.scoped.iter().map(|(id, _)| id.as_str()).collect();
        f.debug_struct("Credentials")
            .field("shared", &self.shared.as_ref().map(|_| "<redacted>"))
            .field("scoped", &identities)
            .finish()
    }
}

/// Selected credential plus where it came from, for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedToken<'a> {
    pub token: &'a str,
    pub source: String,
}

impl Credentials {
    fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        let mut scoped: Vec<(String, String)> = snapshot
            .with_prefix(SCOPED_TOKEN_PREFIX)
            .filter(|(identity, token)| !identity.is_empty() && !token.trim().is_empty())
            .map(|(identity, token)| (normalize_identity(identity), token.trim().to_string()))
            .collect();
        scoped.sort();
        Self {
            shared: snapshot.non_empty(SHARED_TOKEN_ENV).map(ToOwned::to_owned),
            scoped,
        }
    }

    /// Longest scoped identity that prefixes `package` on a separator
    /// boundary, else the shared token.
    #[must_use]
    pub fn select(&self, package: &str) -> Option<SelectedToken<'_>> {
        let identity = normalize_identity(package);
        self.scoped
            .iter()
            .filter(|(scope, _)| {
                identity
                    .strip_prefix(scope.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('_'))
            })
            .max_by_key(|(scope, _)| scope.len())
            .map(|(scope, token)| SelectedToken {
                token: token.as_str(),
                source: format!("{SCOPED_TOKEN_PREFIX}{scope}"),
            })
            .or_else(|| {
                self.shared.as_deref().map(|token| SelectedToken {
                    token,
                    source: SHARED_TOKEN_ENV.to_string(),
                })
            })
    }

    #[cfg(test)]
    pub(crate) fn testing(shared: Option<&str>, scoped: &[(&str, &str)]) -> Self {
        Self {
            shared: shared.map(ToOwned::to_owned),
            scoped: scoped
                .iter()
                .map(|(id, token)| (normalize_identity(id), (*token).to_string()))
                .collect(),
        }
    }
}

/// Uppercase, with every run of non-alphanumerics collapsed to `_`.
#[must_use]
pub fn normalize_identity(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_sep = false;
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_uppercase());
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    out
}
