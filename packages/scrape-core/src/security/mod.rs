//! SSRF protection (C3) and credential handling used across the pipeline.

pub mod credentials;
pub mod ssrf;

pub use credentials::SecretString;
pub use ssrf::{ensure_url_allowed, DnsResolver, SystemDnsResolver};
