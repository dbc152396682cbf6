// src/placeholder.rs

//! `{namespace.key}` template substitution.
//!
//! Supported placeholders:
//!
//! | placeholder                        | value                                   |
//! |------------------------------------|-----------------------------------------|
//! | `{env.NAME}`                       | environment variable (must be set)      |
//! | `{http.request.method}`            | request method                          |
//! | `{http.request.uri}`               | path plus query                         |
//! | `{http.request.uri.path}`          | path                                    |
//! | `{http.request.uri.query}`         | raw query string, empty if none         |
//! | `{http.request.uri.query.<name>}`  | query parameter, empty if absent        |
//! | `{http.request.header.<Name>}`     | header (case-insensitive), empty if absent |
//! | `{http.request.remote.host}`       | peer IP, empty if unknown               |
//!
//! Only text of the form `{word.more}` is considered a placeholder; other
//! braces (e.g. `find -exec ... {} ;`) pass through untouched.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([a-z]+\.[^{}\s]+)\}").expect("placeholder pattern is valid")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderError {
    #[error("unknown placeholder '{{{0}}}'")]
    Unknown(String),

    #[error("environment variable '{0}' is not set")]
    MissingEnv(String),

    #[error("placeholder '{{{0}}}' needs a request but none is available")]
    NoRequest(String),
}

/// Per-request values exposed to placeholders.
///
/// This is plain data so the handler does not depend on a particular HTTP
/// framework; the embedding host fills it from its own request type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub raw_query: Option<String>,
    pub query: BTreeMap<String, String>,
    /// Header names are stored lowercased.
    pub headers: BTreeMap<String, String>,
    pub remote_host: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        let pair = format!("{name}={value}");
        self.raw_query = Some(match self.raw_query.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{pair}"),
            _ => pair,
        });
        self.query.insert(name, value);
        self
    }

    /// Add a header; repeated names are joined with `,`.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        let value = value.into();
        self.headers
            .entry(name.as_ref().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&value);
            })
            .or_insert(value);
        self
    }

    pub fn with_remote_host(mut self, host: impl Into<String>) -> Self {
        self.remote_host = Some(host.into());
        self
    }

    fn uri(&self) -> String {
        match self.raw_query.as_deref() {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.clone(),
        }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let value = match key {
            "method" => self.method.clone(),
            "uri" => self.uri(),
            "uri.path" => self.path.clone(),
            "uri.query" => self.raw_query.clone().unwrap_or_default(),
            "remote.host" => self.remote_host.clone().unwrap_or_default(),
            _ => {
                if let Some(name) = key.strip_prefix("uri.query.") {
                    self.query.get(name).cloned().unwrap_or_default()
                } else if let Some(name) = key.strip_prefix("header.") {
                    self.headers
                        .get(&name.to_ascii_lowercase())
                        .cloned()
                        .unwrap_or_default()
                } else {
                    return None;
                }
            }
        };
        Some(value)
    }
}

/// Whether `template` contains at least one placeholder.
pub fn has_placeholders(template: &str) -> bool {
    PLACEHOLDER.is_match(template)
}

/// Substitute every placeholder in `template`.
///
/// `request` is `None` outside a request (provisioning, lifecycle events);
/// `http.request.*` placeholders then fail with [`PlaceholderError::NoRequest`].
pub fn resolve(
    template: &str,
    request: Option<&RequestContext>,
) -> Result<String, PlaceholderError> {
    if !has_placeholders(template) {
        return Ok(template.to_string());
    }

    let mut failure = None;
    let resolved = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        let name = &caps[1];
        match lookup(name, request) {
            Ok(value) => value,
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
                String::new()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(resolved.into_owned()),
    }
}

fn lookup(name: &str, request: Option<&RequestContext>) -> Result<String, PlaceholderError> {
    if let Some(var) = name.strip_prefix("env.") {
        return std::env::var(var).map_err(|_| PlaceholderError::MissingEnv(var.to_string()));
    }

    if let Some(key) = name.strip_prefix("http.request.") {
        let request = request.ok_or_else(|| PlaceholderError::NoRequest(name.to_string()))?;
        return request
            .lookup(key)
            .ok_or_else(|| PlaceholderError::Unknown(name.to_string()));
    }

    Err(PlaceholderError::Unknown(name.to_string()))
}
