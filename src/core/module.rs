// src/core/module.rs

//! The contract every analysis module implements.
//!
//! The orchestrator only ever sees `Arc<dyn ReconModule>`, so a module is free
//! to bring its own HTTP client, resolver or probe configuration as long as it
//! honours the rules below:
//!
//! * `run` is invoked on a tokio worker, never on the UI thread.
//! * `run` must bound its own blocking calls; the orchestrator imposes no
//!   per-module timeout.
//! * Failures may be reported either as `Err(ModuleError)` or as an `"Error"`
//!   string inside the returned tree. A panic is also contained. All three are
//!   turned into a single `Failed` event by the orchestrator.

use crate::config::{HttpSettings, ProbeSettings};
use crate::core::models::ResultTree;
use crate::core::target::Target;
use async_trait::async_trait;
use std::collections::HashMap;
use strum::Display;
use thiserror::Error;

/// Declared output format of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DataFormat {
    Json,
}

/// Immutable description of a module, created once when the registry is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub data_format: DataFormat,
    /// Names of the credentials the module needs, in the order they are asked for.
    pub required_capabilities: &'static [&'static str],
}

impl ModuleDescriptor {
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            data_format: DataFormat::Json,
            required_capabilities: &[],
        }
    }

    pub const fn requiring(mut self, capabilities: &'static [&'static str]) -> Self {
        self.required_capabilities = capabilities;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModuleError {
    #[error("{0}")]
    Failed(String),
    /// The module put an `"Error"` entry in its own result.
    #[error("{0}")]
    Reported(String),
    #[error("module panicked: {0}")]
    Panicked(String),
    #[error("missing credential '{0}'")]
    MissingCredential(String),
}

/// Read-only per-run configuration handed to every module.
///
/// Built from the application config when a run starts; it is never shared
/// mutably with the caller while the run is in progress.
#[derive(Debug, Clone, Default)]
pub struct ModuleContext {
    pub probe: ProbeSettings,
    pub http: HttpSettings,
    credentials: HashMap<String, HashMap<String, String>>,
}

impl ModuleContext {
    pub fn new(
        probe: ProbeSettings,
        http: HttpSettings,
        credentials: HashMap<String, HashMap<String, String>>,
    ) -> Self {
        Self { probe, http, credentials }
    }

    /// Looks up a credential stored for `module`.
    pub fn credential(&self, module: &str, name: &str) -> Result<&str, ModuleError> {
        self.credentials
            .get(module)
            .and_then(|secrets| secrets.get(name))
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ModuleError::MissingCredential(name.to_string()))
    }

    /// Shared HTTP client configured from [`HttpSettings`].
    pub fn http_client(&self) -> Result<reqwest::Client, ModuleError> {
        reqwest::Client::builder()
            .user_agent(self.http.user_agent.as_str())
            .timeout(self.http.timeout())
            .build()
            .map_err(|e| ModuleError::Failed(format!("Failed to build HTTP client: {}", e)))
    }
}

#[async_trait]
pub trait ReconModule: Send + Sync {
    fn descriptor(&self) -> &ModuleDescriptor;

    fn name(&self) -> &'static str {
        self.descriptor().name
    }

    fn description(&self) -> &'static str {
        self.descriptor().description
    }

    fn required_capabilities(&self) -> &'static [&'static str] {
        self.descriptor().required_capabilities
    }

    async fn run(&self, target: &Target, ctx: &ModuleContext) -> Result<ResultTree, ModuleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_lookup_is_scoped_per_module() {
        let mut secrets = HashMap::new();
        secrets.insert(
            "Reverse IP Lookup".to_string(),
            HashMap::from([("SecurityTrails_API_Key".to_string(), "abc".to_string())]),
        );
        let ctx = ModuleContext::new(ProbeSettings::default(), HttpSettings::default(), secrets);

        assert_eq!(ctx.credential("Reverse IP Lookup", "SecurityTrails_API_Key"), Ok("abc"));
        assert_eq!(
            ctx.credential("HTTP Headers", "SecurityTrails_API_Key"),
            Err(ModuleError::MissingCredential("SecurityTrails_API_Key".to_string()))
        );
    }

    #[test]
    fn empty_credential_counts_as_missing() {
        let secrets = HashMap::from([(
            "m".to_string(),
            HashMap::from([("k".to_string(), String::new())]),
        )]);
        let ctx = ModuleContext::new(ProbeSettings::default(), HttpSettings::default(), secrets);
        assert!(ctx.credential("m", "k").is_err());
    }

    #[test]
    fn descriptor_builder_defaults_to_json() {
        const D: ModuleDescriptor = ModuleDescriptor::new("x", "y").requiring(&["token"]);
        assert_eq!(D.data_format.to_string(), "json");
        assert_eq!(D.required_capabilities, &["token"]);
    }
}
