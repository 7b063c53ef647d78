// src/core/modules/web_technologies.rs

use tracing::{debug, info};

use crate::core::models::ResultTree;
use crate::core::module::{ModuleContext, ModuleDescriptor, ModuleError, ReconModule};
use crate::core::target::Target;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::HeaderMap;
use scraper::{Html, Selector};
use std::collections::BTreeMap;

/// Where a rule looks for its signature.
enum Source {
    Header(&'static str),
    Cookies,
    Body,
    MetaGenerator,
    ScriptSrc,
}

struct Rule {
    name: &'static str,
    category: &'static str,
    source: Source,
    /// The first capture group, when present, is taken as the version.
    pattern: &'static str,
}

const RULES: &[Rule] = &[
    Rule { name: "Nginx", category: "Web Server", source: Source::Header("server"), pattern: r"nginx/?([\d.]+)?" },
    Rule { name: "Apache", category: "Web Server", source: Source::Header("server"), pattern: r"Apache/?([\d.]+)?" },
    Rule { name: "Microsoft IIS", category: "Web Server", source: Source::Header("server"), pattern: r"Microsoft-IIS/?([\d.]+)?" },
    Rule { name: "LiteSpeed", category: "Web Server", source: Source::Header("server"), pattern: r"LiteSpeed" },
    Rule { name: "Cloudflare", category: "CDN", source: Source::Header("server"), pattern: r"(?i)cloudflare" },
    Rule { name: "PHP", category: "Language", source: Source::Header("x-powered-by"), pattern: r"PHP/?([\d.]+)?" },
    Rule { name: "PHP", category: "Language", source: Source::Cookies, pattern: r"PHPSESSID" },
    Rule { name: "ASP.NET", category: "Framework", source: Source::Header("x-powered-by"), pattern: r"ASP\.NET" },
    Rule { name: "Java Servlet", category: "Framework", source: Source::Cookies, pattern: r"JSESSIONID" },
    Rule { name: "Django", category: "Framework", source: Source::Cookies, pattern: r"csrftoken" },
    Rule { name: "Ruby on Rails", category: "Framework", source: Source::Cookies, pattern: r"_rails_session" },
    Rule { name: "WordPress", category: "CMS", source: Source::MetaGenerator, pattern: r"WordPress ?([\d.]+)?" },
    Rule { name: "WordPress", category: "CMS", source: Source::Body, pattern: r"/wp-content/|/wp-includes/" },
    Rule { name: "Joomla", category: "CMS", source: Source::MetaGenerator, pattern: r"Joomla!?" },
    Rule { name: "Drupal", category: "CMS", source: Source::Header("x-generator"), pattern: r"Drupal ?([\d.]+)?" },
    Rule { name: "Shopify", category: "E-commerce", source: Source::Body, pattern: r"cdn\.shopify\.com" },
    Rule { name: "Next.js", category: "JS Framework", source: Source::ScriptSrc, pattern: r"/_next/static/" },
    Rule { name: "Nuxt.js", category: "JS Framework", source: Source::Body, pattern: r"__NUXT__" },
    Rule { name: "Angular", category: "JS Framework", source: Source::Body, pattern: r#"ng-version="([\d.]+)""# },
    Rule { name: "jQuery", category: "JS Library", source: Source::ScriptSrc, pattern: r"jquery[.-]?([\d.]+\d)?(\.min)?\.js" },
    Rule { name: "Google Analytics", category: "Analytics", source: Source::ScriptSrc, pattern: r"googletagmanager\.com|google-analytics\.com" },
];

static COMPILED: Lazy<Vec<Regex>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|rule| Regex::new(rule.pattern).expect("fingerprint patterns are valid"))
        .collect()
});

static META_GENERATOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[name='generator']").expect("valid selector"));
static SCRIPT_SRC: Lazy<Selector> = Lazy::new(|| Selector::parse("script[src]").expect("valid selector"));

#[derive(Debug, Clone, PartialEq, Eq)]
struct Technology {
    category: &'static str,
    version: Option<String>,
}

/// Identifies server software, frameworks, CMSs and client libraries from
/// the target's response headers, cookies and HTML.
pub struct WebTechnologies {
    descriptor: ModuleDescriptor,
}

impl WebTechnologies {
    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new(
                "Web Technologies",
                "Identify server-side technologies, CMS, JavaScript frameworks, and web application frameworks.",
            ),
        }
    }
}

#[async_trait]
impl ReconModule for WebTechnologies {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &Target, ctx: &ModuleContext) -> Result<ResultTree, ModuleError> {
        info!(target = %target, "Starting fingerprint scan.");
        let client = ctx.http_client()?;

        let response = client
            .get(target.url().clone())
            .send()
            .await
            .map_err(|e| ModuleError::Failed(format!("HTTP request failed: {}", e)))?;
        if !response.status().is_success() {
            return Ok(ResultTree::error(format!(
                "Failed to retrieve content. Status code: {}",
                response.status().as_u16()
            )));
        }

        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| ModuleError::Failed(format!("Failed to read response body: {}", e)))?;
        debug!(bytes = %body.len(), "Successfully read response body.");

        let detected = detect(&headers, &body);
        info!(count = %detected.len(), "Fingerprint scan finished.");

        let technologies: Vec<ResultTree> = detected
            .into_iter()
            .map(|(name, tech)| {
                ResultTree::new()
                    .with("Name", name)
                    .with("Category", tech.category)
                    .with("Version", tech.version)
            })
            .collect();
        Ok(ResultTree::new().with("Detected Technologies", technologies))
    }
}

/// Applies every rule; a later match can fill in a version an earlier one lacked.
fn detect(headers: &HeaderMap, body: &str) -> BTreeMap<&'static str, Technology> {
    let document = Html::parse_document(body);
    let cookies = headers
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");
    let generator: Vec<&str> = document
        .select(&META_GENERATOR)
        .filter_map(|el| el.value().attr("content"))
        .collect();
    let scripts: Vec<&str> = document
        .select(&SCRIPT_SRC)
        .filter_map(|el| el.value().attr("src"))
        .collect();

    let mut found: BTreeMap<&'static str, Technology> = BTreeMap::new();
    for (rule, re) in RULES.iter().zip(COMPILED.iter()) {
        let haystacks: Vec<&str> = match rule.source {
            Source::Header(name) => headers.get(name).and_then(|v| v.to_str().ok()).into_iter().collect(),
            Source::Cookies => vec![cookies.as_str()],
            Source::Body => vec![body],
            Source::MetaGenerator => generator.clone(),
            Source::ScriptSrc => scripts.clone(),
        };

        let Some(version) = haystacks.iter().find_map(|text| match_version(re, text)) else {
            continue;
        };
        debug!(tech = rule.name, version = ?version, "Rule matched.");
        let entry = found.entry(rule.name).or_insert(Technology { category: rule.category, version: None });
        if entry.version.is_none() {
            entry.version = version;
        }
    }
    found
}

/// `Some(version)` on a match, where the version is the first non-empty capture.
fn match_version(re: &Regex, text: &str) -> Option<Option<String>> {
    re.captures(text).map(|caps| {
        caps.get(1)
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn all_patterns_compile() {
        assert_eq!(COMPILED.len(), RULES.len());
    }

    #[test]
    fn detects_from_headers_cookies_and_html() {
        let mut headers = HeaderMap::new();
        headers.insert("server", HeaderValue::from_static("nginx/1.25.3"));
        headers.insert("set-cookie", HeaderValue::from_static("PHPSESSID=abc; path=/"));
        let body = r#"<html><head>
            <meta name="generator" content="WordPress 6.4.2">
            <script src="/wp-includes/js/jquery/jquery.min.js"></script>
            <script src="https://www.googletagmanager.com/gtag/js?id=G-1"></script>
        </head><body></body></html>"#;

        let found = detect(&headers, body);

        assert_eq!(found["Nginx"].version.as_deref(), Some("1.25.3"));
        assert_eq!(found["PHP"].category, "Language");
        assert_eq!(found["WordPress"].version.as_deref(), Some("6.4.2"));
        assert!(found.contains_key("jQuery"));
        assert!(found.contains_key("Google Analytics"));
        assert!(!found.contains_key("Apache"));
    }

    #[test]
    fn later_rule_fills_missing_version() {
        let mut headers = HeaderMap::new();
        headers.insert("set-cookie", HeaderValue::from_static("PHPSESSID=1"));
        headers.insert("x-powered-by", HeaderValue::from_static("PHP/8.2.1"));
        let found = detect(&headers, "<html></html>");
        assert_eq!(found["PHP"].version.as_deref(), Some("8.2.1"));
    }
}
