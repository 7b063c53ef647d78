// src/core/modules/mod.rs

// Built-in analysis modules. Each one implements `ReconModule` and is
// registered in `core::registry`.
pub mod banner_grabbing;
pub mod dns_records;
pub mod http_headers;
pub mod open_ports;
pub mod reverse_ip_lookup;
pub mod ssl_certificate;
pub mod web_technologies;

pub use banner_grabbing::BannerGrabbing;
pub use dns_records::DnsRecords;
pub use http_headers::HttpHeaders;
pub use open_ports::OpenPorts;
pub use reverse_ip_lookup::ReverseIpLookup;
pub use ssl_certificate::SslCertificate;
pub use web_technologies::WebTechnologies;
