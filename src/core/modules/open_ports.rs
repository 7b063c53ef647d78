// src/core/modules/open_ports.rs

use tracing::info;

use crate::core::models::{ResultTree, ResultValue};
use crate::core::module::{ModuleContext, ModuleDescriptor, ModuleError, ReconModule};
use crate::core::probe::{self, HostProbeMap, PortState};
use crate::core::target::Target;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Well-known service ports checked when no explicit list is given.
pub const COMMON_PORTS: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (6379, "Redis"),
    (8080, "HTTP-Alt"),
    (8443, "HTTPS-Alt"),
];

/// Service label for a well-known port.
pub fn service_name(port: u16) -> Option<&'static str> {
    COMMON_PORTS
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
}

pub(crate) fn port_label(port: u16) -> String {
    match service_name(port) {
        Some(service) => format!("{} ({})", port, service),
        None => port.to_string(),
    }
}

/// TCP connect scan over a fixed port list.
pub struct OpenPorts {
    descriptor: ModuleDescriptor,
    ports: BTreeSet<u16>,
}

impl OpenPorts {
    pub fn new() -> Self {
        Self::with_ports(COMMON_PORTS.iter().map(|(port, _)| *port))
    }

    pub fn with_ports(ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            descriptor: ModuleDescriptor::new(
                "Open Ports",
                "Scan common service ports and report which accept connections.",
            ),
            ports: ports.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ReconModule for OpenPorts {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &Target, ctx: &ModuleContext) -> Result<ResultTree, ModuleError> {
        let host = target.host();
        info!(host = %host, ports = self.ports.len(), "Starting port scan.");

        let results = probe::scan_ports(
            &host,
            &self.ports,
            ctx.probe.connect_timeout(),
            ctx.probe.concurrency(),
        )
        .await;

        // A resolution failure marks every port the same way; report it once.
        if let Some(reason) = unresolved(&results) {
            return Err(ModuleError::Failed(reason));
        }

        let summary = summarize(&host, &results);
        info!("Port scan finished.");
        Ok(summary)
    }
}

fn unresolved(results: &HostProbeMap) -> Option<String> {
    results
        .values()
        .next()
        .and_then(|r| r.error.as_ref())
        .filter(|e| matches!(e, probe::ProbeError::Resolve { .. }))
        .map(ToString::to_string)
}

fn summarize(host: &str, results: &HostProbeMap) -> ResultTree {
    let open: Vec<ResultValue> = results
        .values()
        .filter(|r| r.state == PortState::Open)
        .map(|r| port_label(r.port).into())
        .collect();
    let ports: ResultTree = results
        .values()
        .map(|r| (port_label(r.port), ResultValue::from(r)))
        .collect();

    ResultTree::new()
        .with("Host", host)
        .with("Scanned", results.len())
        .with("Open Ports", open)
        .with("Ports", ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn labels_known_and_unknown_ports() {
        assert_eq!(port_label(22), "22 (SSH)");
        assert_eq!(port_label(31337), "31337");
        assert_eq!(service_name(3389), Some("RDP"));
    }

    #[tokio::test]
    async fn reports_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let module = OpenPorts::with_ports([open, closed]);
        let target = Target::parse("http://127.0.0.1").unwrap();
        let tree = module.run(&target, &ModuleContext::default()).await.unwrap();

        assert_eq!(tree.get("Scanned"), Some(&ResultValue::from(2usize)));
        assert_eq!(
            tree.get("Open Ports"),
            Some(&ResultValue::from(vec![open.to_string()]))
        );
        let Some(ResultValue::Tree(ports)) = tree.get("Ports") else {
            panic!("ports subtree missing");
        };
        let Some(ResultValue::Tree(closed_entry)) = ports.get(&closed.to_string()) else {
            panic!("closed port missing");
        };
        assert_eq!(closed_entry.get("State"), Some(&ResultValue::from("Closed")));
    }

    #[tokio::test]
    async fn unresolvable_host_fails_the_module() {
        let module = OpenPorts::with_ports([80]);
        let target = Target::parse("http://does-not-exist.invalid").unwrap();
        let err = module.run(&target, &ModuleContext::default()).await.unwrap_err();
        assert!(matches!(err, ModuleError::Failed(_)));
    }
}
