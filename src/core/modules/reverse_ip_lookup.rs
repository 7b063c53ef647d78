// src/core/modules/reverse_ip_lookup.rs

use tracing::{info, warn};

use crate::core::models::ResultTree;
use crate::core::module::{ModuleContext, ModuleDescriptor, ModuleError, ReconModule};
use crate::core::target::Target;
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use serde::Deserialize;
use std::net::IpAddr;

pub const API_KEY: &str = "SecurityTrails_API_Key";
const API_BASE: &str = "https://api.securitytrails.com/v1";

#[derive(Debug, Deserialize)]
struct SubdomainsResponse {
    #[serde(default)]
    subdomains: Vec<String>,
}

/// Lists other hostnames served from the target's address, using the
/// SecurityTrails API.
pub struct ReverseIpLookup {
    descriptor: ModuleDescriptor,
    api_base: String,
}

impl ReverseIpLookup {
    pub fn new() -> Self {
        Self::with_api_base(API_BASE)
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            descriptor: ModuleDescriptor::new(
                "Reverse IP Lookup",
                "Find other domains hosted on the same IP address.",
            )
            .requiring(&[API_KEY]),
            api_base: api_base.into(),
        }
    }
}

#[async_trait]
impl ReconModule for ReverseIpLookup {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &Target, ctx: &ModuleContext) -> Result<ResultTree, ModuleError> {
        let api_key = ctx.credential(self.name(), API_KEY)?;
        let domain = target
            .domain()
            .ok_or_else(|| ModuleError::Failed("Reverse IP lookup needs a domain name, not an IP.".into()))?;
        info!(domain = %domain, "Starting reverse IP lookup.");

        let ip = resolve_ipv4(&domain, ctx).await?;
        let url = format!("{}/domain/host/{}/subdomains", self.api_base.trim_end_matches('/'), ip);
        let response = ctx
            .http_client()?
            .get(&url)
            .header("APIKEY", api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| ModuleError::Failed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "SecurityTrails request rejected.");
            return Ok(ResultTree::error(format!(
                "API request failed with status code {}: {}",
                status.as_u16(),
                body
            )));
        }

        let data: SubdomainsResponse = response
            .json()
            .await
            .map_err(|e| ModuleError::Failed(format!("Unexpected API response: {}", e)))?;
        let hosted = qualify(&data.subdomains, &domain);
        info!(ip = %ip, domains = hosted.len(), "Reverse IP lookup finished.");

        Ok(ResultTree::new()
            .with("IP Address", ip.to_string())
            .with("Domains Hosted on IP", hosted))
    }
}

async fn resolve_ipv4(domain: &str, ctx: &ModuleContext) -> Result<IpAddr, ModuleError> {
    let mut opts = ResolverOpts::default();
    opts.timeout = ctx.http.timeout();
    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);
    let lookup = resolver
        .ipv4_lookup(domain)
        .await
        .map_err(|e| ModuleError::Failed(format!("Could not resolve {}: {}", domain, e)))?;
    lookup
        .iter()
        .next()
        .map(|a| IpAddr::V4(a.0))
        .ok_or_else(|| ModuleError::Failed(format!("No A record for {}", domain)))
}

fn qualify(labels: &[String], domain: &str) -> Vec<String> {
    labels.iter().map(|label| format!("{}.{}", label, domain)).collect()
}
