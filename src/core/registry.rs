// src/core/registry.rs

//! The set of modules known to the application, built once at startup.

use crate::core::module::{ModuleDescriptor, ReconModule};
use crate::core::modules::{
    BannerGrabbing, DnsRecords, HttpHeaders, OpenPorts, ReverseIpLookup, SslCertificate,
    WebTechnologies,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown module '{0}'")]
    Unknown(String),
    #[error("module '{0}' is registered twice")]
    Duplicate(String),
}

/// Modules in display order, addressable by name.
#[derive(Clone, Default)]
pub struct Registry {
    modules: Vec<Arc<dyn ReconModule>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every module shipped with the application.
    pub fn builtin() -> Self {
        let modules: Vec<Arc<dyn ReconModule>> = vec![
            Arc::new(DnsRecords::new()),
            Arc::new(SslCertificate::new()),
            Arc::new(HttpHeaders::new()),
            Arc::new(WebTechnologies::new()),
            Arc::new(OpenPorts::new()),
            Arc::new(BannerGrabbing::new()),
            Arc::new(ReverseIpLookup::new()),
        ];
        debug!(count = modules.len(), "Built-in module registry created.");
        Self { modules }
    }

    pub fn register(&mut self, module: Arc<dyn ReconModule>) -> Result<(), RegistryError> {
        if self.get(module.name()).is_some() {
            return Err(RegistryError::Duplicate(module.name().to_string()));
        }
        self.modules.push(module);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ReconModule>> {
        self.modules.iter().find(|m| m.name() == name)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.iter().map(|m| m.descriptor())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Resolves `names` to modules, keeping the caller's order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<dyn ReconModule>>, RegistryError> {
        names
            .iter()
            .map(|name| {
                self.get(name.as_ref())
                    .cloned()
                    .ok_or_else(|| RegistryError::Unknown(name.as_ref().to_string()))
            })
            .collect()
    }
}
