// src/core/modules/banner_grabbing.rs

use tracing::{debug, info};

use super::open_ports::{port_label, COMMON_PORTS};
use crate::core::models::ResultTree;
use crate::core::module::{ModuleContext, ModuleDescriptor, ModuleError, ReconModule};
use crate::core::probe::{self, PortState, ProbeError};
use crate::core::target::Target;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

const NO_BANNER: &str = "No banner received.";
const NO_OPEN_PORTS: &str = "No common ports are open for banner grabbing.";

/// Captures the greeting sent by services on the open common ports.
pub struct BannerGrabbing {
    descriptor: ModuleDescriptor,
    ports: BTreeSet<u16>,
}

impl BannerGrabbing {
    pub fn new() -> Self {
        Self::with_ports(COMMON_PORTS.iter().map(|(port, _)| *port))
    }

    pub fn with_ports(ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            descriptor: ModuleDescriptor::new(
                "Banner Grabbing",
                "Capture service banners for services running on open ports.",
            ),
            ports: ports.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ReconModule for BannerGrabbing {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &Target, ctx: &ModuleContext) -> Result<ResultTree, ModuleError> {
        let host = target.host();
        info!(host = %host, "Starting banner grabbing.");

        let scanned = probe::scan_ports(
            &host,
            &self.ports,
            ctx.probe.connect_timeout(),
            ctx.probe.concurrency(),
        )
        .await;
        let open: BTreeSet<u16> = scanned
            .values()
            .filter(|r| r.state == PortState::Open)
            .map(|r| r.port)
            .collect();
        if open.is_empty() {
            debug!(host = %host, "No open ports to grab banners from.");
            return Ok(ResultTree::new().with("Message", NO_OPEN_PORTS));
        }

        let banners = probe::grab_banners(
            &host,
            &open,
            ctx.probe.connect_timeout(),
            ctx.probe.read_timeout(),
            ctx.probe.concurrency(),
        )
        .await;
        info!(host = %host, ports = banners.len(), "Banner grabbing finished.");
        Ok(ResultTree::new().with("Banners", describe(&banners)))
    }
}

fn describe(banners: &BTreeMap<u16, Result<Option<String>, ProbeError>>) -> ResultTree {
    banners
        .iter()
        .map(|(port, outcome)| {
            let text = match outcome {
                Ok(Some(banner)) => banner.clone(),
                Ok(None) => NO_BANNER.to_string(),
                Err(e) => format!("Failed to grab banner: {}", e),
            };
            (format!("Port {}", port_label(*port)), text.into())
        })
        .collect()
}
