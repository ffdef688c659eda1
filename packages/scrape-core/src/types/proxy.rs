//! ProxyPolicy: per-domain proxy mode with fallback to a global default.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    Direct,
    Gateway,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyPolicy {
    pub domain: String,
    pub mode: ProxyMode,
    pub proxy_url: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxySource {
    Policy,
    Default,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyDecision {
    pub proxy_url: Option<String>,
    pub source: ProxySource,
}
