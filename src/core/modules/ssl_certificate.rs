// src/core/modules/ssl_certificate.rs

use tracing::{debug, error, info};

use crate::core::models::{Finding, ResultTree, Severity};
use crate::core::module::{ModuleContext, ModuleDescriptor, ModuleError, ReconModule};
use crate::core::target::Target;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tokio::task::spawn_blocking;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::*;

const HTTPS_PORT: u16 = 443;

/// Details extracted from the peer certificate.
#[derive(Debug, Clone, PartialEq)]
struct CertificateInfo {
    subject: String,
    issuer: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    sans: Vec<String>,
}

impl CertificateInfo {
    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now > self.not_before && now < self.not_after
    }

    fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.not_after.signed_duration_since(now).num_days()
    }
}

/// Fetches the TLS certificate presented by the target and reports its
/// subject, issuer, validity window and SANs.
pub struct SslCertificate {
    descriptor: ModuleDescriptor,
}

impl SslCertificate {
    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new(
                "SSL/TLS Certificate",
                "Fetch certificate details, including validity dates, issuer, subject and SANs.",
            ),
        }
    }
}

#[async_trait]
impl ReconModule for SslCertificate {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &Target, ctx: &ModuleContext) -> Result<ResultTree, ModuleError> {
        let host = target.host();
        let port = target.url().port().unwrap_or(HTTPS_PORT);
        let connect_timeout = ctx.probe.connect_timeout();
        let io_timeout = ctx.http.timeout();
        info!(host = %host, port, "Starting SSL/TLS scan.");

        // native-tls is blocking, so the handshake runs off the async workers.
        let host_owned = host.clone();
        let cert = spawn_blocking(move || fetch_certificate(&host_owned, port, connect_timeout, io_timeout))
            .await
            .map_err(|e| {
                error!(panic = %e, "Blocking SSL scan task panicked!");
                ModuleError::Panicked(e.to_string())
            })??;

        let now = Utc::now();
        let findings = analyze_certificate(&cert, now);
        info!(findings = %findings.len(), "SSL/TLS scan finished.");

        Ok(ResultTree::new()
            .with("Host", host)
            .with("Port", port)
            .with("Subject", cert.subject.as_str())
            .with("Issuer", cert.issuer.as_str())
            .with("Valid From", cert.not_before)
            .with("Valid To", cert.not_after)
            .with("Valid", cert.is_valid_at(now))
            .with("Days Until Expiry", cert.days_until_expiry(now))
            .with("SANs", cert.sans)
            .with("Findings", findings))
    }
}

fn fetch_certificate(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    io_timeout: Duration,
) -> Result<CertificateInfo, ModuleError> {
    let failed = |context: &str, e: &dyn std::fmt::Display| {
        error!(error = %e, "{}", context);
        ModuleError::Failed(format!("{}: {}", context, e))
    };

    let connector = TlsConnector::new().map_err(|e| failed("TlsConnector Error", &e))?;

    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| failed("Address Resolution Error", &e))?
        .next()
        .ok_or_else(|| ModuleError::Failed(format!("No address found for {}", host)))?;

    debug!(%addr, "Connecting TCP stream.");
    let stream = TcpStream::connect_timeout(&addr, connect_timeout)
        .map_err(|e| failed("TCP Connection Error", &e))?;
    stream
        .set_read_timeout(Some(io_timeout))
        .and_then(|_| stream.set_write_timeout(Some(io_timeout)))
        .map_err(|e| failed("Socket Configuration Error", &e))?;

    debug!(host, "Performing TLS handshake.");
    let stream = connector
        .connect(host, stream)
        .map_err(|e| failed("TLS Handshake Error", &e))?;

    let cert = stream
        .peer_certificate()
        .map_err(|e| failed("Could not get peer certificate", &e))?
        .ok_or_else(|| ModuleError::Failed("Server did not provide a certificate.".into()))?;
    let cert_der = cert.to_der().map_err(|e| failed("Could not convert certificate to DER", &e))?;
    let (_, x509) = parse_x509_certificate(&cert_der).map_err(|e| failed("X.509 Parse Error", &e))?;

    info!(subject = %x509.subject(), issuer = %x509.issuer(), "Successfully parsed certificate.");

    let validity = x509.validity();
    let sans = x509
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    GeneralName::IPAddress(bytes) => ip_from_bytes(bytes),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(CertificateInfo {
        subject: x509.subject().to_string(),
        issuer: x509.issuer().to_string(),
        not_before: asn1_time_to_chrono_utc(&validity.not_before),
        not_after: asn1_time_to_chrono_utc(&validity.not_after),
        sans,
    })
}

fn ip_from_bytes(bytes: &[u8]) -> Option<String> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(|b| std::net::Ipv4Addr::from(b).to_string()),
        16 => <[u8; 16]>::try_from(bytes).ok().map(|b| std::net::Ipv6Addr::from(b).to_string()),
        _ => None,
    }
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

fn analyze_certificate(cert: &CertificateInfo, now: DateTime<Utc>) -> Vec<Finding> {
    let mut findings = Vec::new();
    if !cert.is_valid_at(now) {
        debug!(expiry_date = %cert.not_after, "Certificate is not currently valid.");
        findings.push(Finding::new(Severity::Critical, "SSL_EXPIRED"));
    }
    if (0..=30).contains(&cert.days_until_expiry(now)) {
        findings.push(Finding::new(Severity::Warning, "SSL_EXPIRING_SOON"));
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn cert_valid_for(days: i64) -> (CertificateInfo, DateTime<Utc>) {
        let now = Utc::now();
        let cert = CertificateInfo {
            subject: "CN=example.com".into(),
            issuer: "CN=Test CA".into(),
            not_before: now - ChronoDuration::days(60),
            not_after: now + ChronoDuration::days(days),
            sans: vec!["example.com".into()],
        };
        (cert, now)
    }

    #[test]
    fn healthy_certificate_has_no_findings() {
        let (cert, now) = cert_valid_for(200);
        assert!(analyze_certificate(&cert, now).is_empty());
    }

    #[test]
    fn near_expiry_is_a_warning() {
        let (cert, now) = cert_valid_for(10);
        let codes: Vec<_> = analyze_certificate(&cert, now).iter().map(|f| f.code).collect();
        assert_eq!(codes, vec!["SSL_EXPIRING_SOON"]);
    }

    #[test]
    fn expired_certificate_is_critical() {
        let (cert, now) = cert_valid_for(-3);
        let codes: Vec<_> = analyze_certificate(&cert, now).iter().map(|f| f.code).collect();
        assert_eq!(codes, vec!["SSL_EXPIRED"]);
    }

    #[test]
    fn san_ip_bytes_are_rendered() {
        assert_eq!(ip_from_bytes(&[10, 0, 0, 1]), Some("10.0.0.1".into()));
        assert_eq!(ip_from_bytes(&[1, 2, 3]), None);
    }
}
