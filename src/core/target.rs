// src/core/target.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("target is empty")]
    Empty,
    #[error("target '{0}' has no host component")]
    MissingHost(String),
    #[error("target '{input}' is not a valid URL: {reason}")]
    Invalid { input: String, reason: String },
}

/// A normalized analysis target.
///
/// The stored form is always a scheme-qualified URL (`https://` is assumed
/// when the input has no scheme), so normalizing an already-normalized target
/// yields the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target {
    url: Url,
}

impl Target {
    pub fn parse(input: &str) -> Result<Self, TargetError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TargetError::Empty);
        }

        let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };

        let url = Url::parse(&with_scheme).map_err(|e| TargetError::Invalid {
            input: trimmed.to_string(),
            reason: e.to_string(),
        })?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(TargetError::MissingHost(trimmed.to_string()));
        }
        Ok(Self { url })
    }

    /// The normalized string form.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Host name or IP literal, without brackets for IPv6.
    pub fn host(&self) -> String {
        match self.url.host() {
            Some(url::Host::Ipv6(ip)) => ip.to_string(),
            Some(host) => host.to_string(),
            None => String::new(),
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.host().parse().ok()
    }

    /// Registrable-looking domain: the host with a leading `www.` removed.
    /// `None` for IP targets.
    pub fn domain(&self) -> Option<String> {
        if self.ip().is_some() {
            return None;
        }
        let host = self.host();
        Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Target {
    type Error = TargetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Target::parse(&value)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.url.into()
    }
}
