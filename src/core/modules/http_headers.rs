// src/core/modules/http_headers.rs

use tracing::{debug, info, warn};

use crate::core::models::{Finding, ResultTree, ResultValue, Severity};
use crate::core::module::{ModuleContext, ModuleDescriptor, ModuleError, ReconModule};
use crate::core::target::Target;
use async_trait::async_trait;
use reqwest::header::HeaderMap;

/// Security headers reported on, with the finding raised when one is absent.
const SECURITY_HEADERS: &[(&str, Option<(Severity, &str)>)] = &[
    ("strict-transport-security", Some((Severity::Warning, "HEADERS_HSTS_MISSING"))),
    ("content-security-policy", Some((Severity::Warning, "HEADERS_CSP_MISSING"))),
    ("x-frame-options", Some((Severity::Warning, "HEADERS_X_FRAME_OPTIONS_MISSING"))),
    ("x-content-type-options", Some((Severity::Info, "HEADERS_X_CONTENT_TYPE_OPTIONS_MISSING"))),
    ("referrer-policy", None),
    ("permissions-policy", None),
    ("x-xss-protection", None),
];

/// Retrieves the response headers of the target and reports server type,
/// content type, cookies and security headers.
pub struct HttpHeaders {
    descriptor: ModuleDescriptor,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new(
                "HTTP Headers",
                "Retrieve server type, content type, cookies, and security headers.",
            ),
        }
    }
}

#[async_trait]
impl ReconModule for HttpHeaders {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &Target, ctx: &ModuleContext) -> Result<ResultTree, ModuleError> {
        info!(target = %target, "Starting headers scan.");
        let client = ctx.http_client()?;

        // Some servers answer HEAD badly; fall back to GET on an error status.
        let mut response = client
            .head(target.url().clone())
            .send()
            .await
            .map_err(|e| ModuleError::Failed(format!("HTTP request failed: {}", e)))?;
        if response.status().is_client_error() || response.status().is_server_error() {
            debug!(status = %response.status(), "HEAD rejected, retrying with GET.");
            response = client
                .get(target.url().clone())
                .send()
                .await
                .map_err(|e| ModuleError::Failed(format!("HTTP request failed: {}", e)))?;
        }
        info!(status = %response.status(), "Received HTTP response for headers scan.");

        let headers = response.headers();
        let (security, findings) = check_security_headers(headers);
        info!(findings = %findings.len(), "Headers scan finished.");

        Ok(ResultTree::new()
            .with("Final URL", response.url().as_str())
            .with("Status", response.status().as_u16())
            .with("Server", header_value(headers, "server"))
            .with("Content-Type", header_value(headers, "content-type"))
            .with("Cookies", cookie_names(headers))
            .with("Security Headers", security)
            .with("Findings", findings))
    }
}

/// Header value as text; non-UTF-8 values are reported as a placeholder.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).map(|value| match value.to_str() {
        Ok(s) => s.to_string(),
        Err(_) => {
            warn!(header_name = name, "Header found but contained invalid UTF-8.");
            "[Invalid UTF-8]".to_string()
        }
    })
}

fn cookie_names(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| cookie.split('=').next())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

fn check_security_headers(headers: &HeaderMap) -> (ResultTree, Vec<Finding>) {
    let mut tree = ResultTree::new();
    let mut findings = Vec::new();
    for (name, missing) in SECURITY_HEADERS {
        let value = header_value(headers, name);
        if value.is_none() {
            if let Some((severity, code)) = missing {
                debug!(header_name = name, code, "Security header missing.");
                findings.push(Finding::new(*severity, *code));
            }
        }
        tree.insert(*name, ResultValue::from(value));
    }
    (tree, findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn missing_headers_raise_findings() {
        let mut headers = HeaderMap::new();
        headers.insert("strict-transport-security", HeaderValue::from_static("max-age=63072000"));
        headers.insert("x-frame-options", HeaderValue::from_static("DENY"));

        let (tree, findings) = check_security_headers(&headers);
        let codes: Vec<_> = findings.iter().map(|f| f.code).collect();

        assert_eq!(codes, vec!["HEADERS_CSP_MISSING", "HEADERS_X_CONTENT_TYPE_OPTIONS_MISSING"]);
        assert_eq!(tree.get("x-frame-options"), Some(&ResultValue::Text("DENY".into())));
        assert_eq!(tree.get("referrer-policy"), Some(&ResultValue::Null));
    }

    #[test]
    fn cookie_names_are_extracted() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("PHPSESSID=abc; Path=/"));
        headers.append("set-cookie", HeaderValue::from_static("theme=dark"));
        assert_eq!(cookie_names(&headers), vec!["PHPSESSID", "theme"]);
    }

    #[test]
    fn invalid_utf8_header_is_placeholder() {
        let mut headers = HeaderMap::new();
        headers.insert("server", HeaderValue::from_bytes(b"caf\xe9").unwrap());
        assert_eq!(header_value(&headers, "server").as_deref(), Some("[Invalid UTF-8]"));
    }
}
