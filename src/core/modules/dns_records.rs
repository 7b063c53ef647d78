// src/core/modules/dns_records.rs

use tracing::{debug, info, warn};

use crate::core::models::{Finding, ResultTree, ResultValue, Severity};
use crate::core::module::{ModuleContext, ModuleDescriptor, ModuleError, ReconModule};
use crate::core::target::Target;
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;

/// Record types queried for every domain, in display order.
const RECORD_TYPES: &[RecordType] = &[
    RecordType::A,
    RecordType::AAAA,
    RecordType::MX,
    RecordType::NS,
    RecordType::SOA,
    RecordType::TXT,
    RecordType::CNAME,
    RecordType::CAA,
];

/// Looks up the common DNS records of a domain and checks its email
/// authentication posture (SPF and DMARC).
pub struct DnsRecords {
    descriptor: ModuleDescriptor,
}

impl DnsRecords {
    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new(
                "DNS Records",
                "Retrieve A, AAAA, MX, NS, SOA, TXT, CNAME and CAA records and check SPF/DMARC.",
            ),
        }
    }
}

#[async_trait]
impl ReconModule for DnsRecords {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &Target, ctx: &ModuleContext) -> Result<ResultTree, ModuleError> {
        let Some(domain) = target.domain() else {
            return Err(ModuleError::Failed("DNS records require a domain name, not an IP address.".into()));
        };
        info!(target = %domain, "Starting DNS scan.");

        let mut opts = ResolverOpts::default();
        opts.timeout = ctx.http.timeout();
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);

        let mut records = ResultTree::new();
        for record_type in RECORD_TYPES {
            records.insert(record_type.to_string(), lookup(&resolver, &domain, *record_type).await);
        }

        let (spf, dmarc) = tokio::join!(lookup_spf(&resolver, &domain), lookup_dmarc(&resolver, &domain));
        let caa_present = matches!(records.get("CAA"), Some(ResultValue::List(items)) if !items.is_empty());
        let findings = analyze_dns_results(spf.as_deref(), dmarc.as_deref(), caa_present);
        info!(findings = %findings.len(), "DNS scan finished.");

        Ok(ResultTree::new()
            .with("Domain", domain)
            .with("Records", records)
            .with("SPF", spf)
            .with("DMARC", dmarc.clone())
            .with("DMARC Policy", dmarc.as_deref().and_then(dmarc_policy))
            .with("Findings", findings))
    }
}

/// A list of record strings, or an `"Error: ..."` string for this type only.
async fn lookup(resolver: &TokioAsyncResolver, domain: &str, record_type: RecordType) -> ResultValue {
    debug!(domain, %record_type, "Looking up records.");
    match resolver.lookup(domain, record_type).await {
        Ok(answer) => answer.iter().map(|r| r.to_string()).collect::<Vec<_>>().into(),
        Err(e) => {
            debug!(domain, %record_type, error = %e, "Lookup returned no records.");
            format!("Error: {}", e).into()
        }
    }
}

/// SPF records live in TXT records and start with "v=spf1".
async fn lookup_spf(resolver: &TokioAsyncResolver, domain: &str) -> Option<String> {
    match resolver.txt_lookup(domain).await {
        Ok(txt_records) => txt_records
            .iter()
            .map(|record| record.to_string())
            .find(|record| record.starts_with("v=spf1")),
        Err(e) => {
            warn!(domain, error = %e, "SPF lookup failed.");
            None
        }
    }
}

/// DMARC records live in a TXT record at the `_dmarc` subdomain.
async fn lookup_dmarc(resolver: &TokioAsyncResolver, domain: &str) -> Option<String> {
    let dmarc_target = format!("_dmarc.{}", domain);
    match resolver.txt_lookup(&dmarc_target).await {
        Ok(txt_records) => txt_records
            .iter()
            .map(|record| record.to_string())
            .find(|record| record.starts_with("v=DMARC1")),
        Err(e) => {
            warn!(target = %dmarc_target, error = %e, "DMARC lookup failed.");
            None
        }
    }
}

/// Extracts the `p=` tag of a DMARC record.
fn dmarc_policy(record: &str) -> Option<String> {
    record
        .split(';')
        .map(str::trim)
        .find_map(|tag| tag.strip_prefix("p="))
        .map(|policy| policy.trim().to_string())
}

fn analyze_dns_results(spf: Option<&str>, dmarc: Option<&str>, caa_present: bool) -> Vec<Finding> {
    let mut findings = Vec::new();

    match dmarc {
        None => findings.push(Finding::new(Severity::Critical, "DNS_DMARC_MISSING")),
        Some(record) if dmarc_policy(record).as_deref() == Some("none") => {
            findings.push(Finding::new(Severity::Warning, "DNS_DMARC_POLICY_NONE"));
        }
        Some(_) => {}
    }

    match spf {
        None => findings.push(Finding::new(Severity::Warning, "DNS_SPF_MISSING")),
        Some(record) if record.ends_with("~all") => {
            findings.push(Finding::new(Severity::Info, "DNS_SPF_POLICY_SOFTFAIL"));
        }
        Some(record) if record.ends_with("?all") => {
            findings.push(Finding::new(Severity::Info, "DNS_SPF_POLICY_NEUTRAL"));
        }
        Some(_) => {}
    }

    if !caa_present {
        findings.push(Finding::new(Severity::Info, "DNS_CAA_MISSING"));
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dmarc_policy_tag() {
        assert_eq!(dmarc_policy("v=DMARC1; p=reject; rua=mailto:x@y"), Some("reject".into()));
        assert_eq!(dmarc_policy("v=DMARC1;p=none"), Some("none".into()));
        assert_eq!(dmarc_policy("v=DMARC1; rua=mailto:x@y"), None);
    }

    #[test]
    fn missing_email_records_are_flagged() {
        let codes: Vec<_> = analyze_dns_results(None, None, false).iter().map(|f| f.code).collect();
        assert_eq!(codes, vec!["DNS_DMARC_MISSING", "DNS_SPF_MISSING", "DNS_CAA_MISSING"]);
    }

    #[test]
    fn weak_policies_are_flagged() {
        let findings = analyze_dns_results(Some("v=spf1 include:_spf.example.com ~all"), Some("v=DMARC1; p=none"), true);
        let codes: Vec<_> = findings.iter().map(|f| f.code).collect();
        assert_eq!(codes, vec!["DNS_DMARC_POLICY_NONE", "DNS_SPF_POLICY_SOFTFAIL"]);
    }

    #[test]
    fn strict_configuration_has_no_findings() {
        assert!(analyze_dns_results(Some("v=spf1 -all"), Some("v=DMARC1; p=reject"), true).is_empty());
    }

    #[tokio::test]
    async fn ip_target_is_rejected() {
        let target = Target::parse("127.0.0.1").unwrap();
        let result = DnsRecords::new().run(&target, &ModuleContext::default()).await;
        assert!(matches!(result, Err(ModuleError::Failed(_))));
    }
}
