//! The `METADATA` document: RFC 822 style headers, a blank line, then the long
//! description body.

pub const METADATA_FILE: &str = "METADATA";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDocument {
    headers: String,
    body: String,
}

impl MetadataDocument {
    /// Splits at the first blank line. Header text is kept byte-for-byte so
    /// rewriting the body never disturbs it.
    #[must_use]
    pub fn parse(contents: &str) -> Self {
        let mut offset = 0;
        for line in contents.split_inclusive('\n') {
            if line.trim_end_matches(['\r', '\n']).is_empty() {
                return Self {
                    headers: contents[..offset].to_string(),
                    body: contents[offset + line.len()..].to_string(),
                };
            }
            offset += line.len();
        }
        Self {
            headers: contents.to_string(),
            body: String::new(),
        }
    }

    #[must_use]
    pub fn headers(&self) -> &str {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// First value of header `name` (case-insensitive), trimmed.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.header_lines().find_map(|(key, value)| {
            key.eq_ignore_ascii_case(name).then_some(value)
        })
    }

    /// Every value of a repeatable header such as `Classifier`.
    #[must_use]
    pub fn fields<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        self.header_lines()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
            .collect()
    }

    fn header_lines(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.lines().filter_map(|line| {
            if line.starts_with([' ', '\t']) {
                return None;
            }
            let (key, value) = line.split_once(':')?;
            Some((key.trim(), value.trim()))
        })
    }

    /// Rewrites every `Version:` header line, returning whether one was found.
    pub fn set_version(&mut self, version: &str) -> bool {
        let (headers, changed) = rewrite_version_header(&self.headers, version);
        self.headers = headers;
        changed
    }

    /// Keeps the headers verbatim and replaces everything after the first
    /// blank line with `text`.
    pub fn replace_body(&mut self, text: &str) {
        self.body = text.to_string();
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self.headers.clone();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out
    }
}

/// Rewrites `Version:` header lines in any RFC 822 style document (METADATA,
/// PKG-INFO). Lines after the first blank line are untouched.
#[must_use]
pub fn rewrite_version_header(contents: &str, version: &str) -> (String, bool) {
    let mut out = String::with_capacity(contents.len() + version.len());
    let mut in_headers = true;
    let mut changed = false;
    for line in contents.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\r', '\n']);
        if in_headers && bare.is_empty() {
            in_headers = false;
        }
        let is_version = in_headers
            && bare
                .split_once(':')
                .is_some_and(|(key, _)| key.trim().eq_ignore_ascii_case("version"));
        if is_version {
            out.push_str("Version: ");
            out.push_str(version);
            out.push_str(&line[bare.len()..]);
            changed = true;
        } else {
            out.push_str(line);
        }
    }
    (out, changed)
}
