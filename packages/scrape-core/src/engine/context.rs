//! Explicit services bundle (spec §9 "global mutable state → explicit
//! services"): one `RunnerDeps` value constructed at startup and passed
//! down to every engine runner, instead of package-level singletons.

use std::sync::Arc;

use crate::coordination::CoordinationStore;
use crate::fetchers::{BrowserRenderer, Fetcher};
use crate::governance::GovernanceGuard;
use crate::identity::{IdentityCipher, IdentityManager};
use crate::oracle::OracleClient;
use crate::plugins::PluginRegistry;
use crate::proxy::ProxyResolver;
use crate::security::ssrf::DnsResolver;
use crate::selectors::CandidateRegistry;
use crate::types::config::PipelineConfig;

use super::external::ExternalClient;

pub struct RunnerDeps {
    pub config: PipelineConfig,
    pub coordination: Arc<dyn CoordinationStore>,
    pub governance: Arc<GovernanceGuard>,
    pub dns_resolver: Arc<dyn DnsResolver>,
    pub identity: Arc<IdentityManager>,
    pub identity_cipher: Arc<IdentityCipher>,
    pub proxy: Arc<ProxyResolver>,
    pub plugins: Arc<PluginRegistry>,
    pub fast_fetcher: Arc<dyn Fetcher>,
    pub stealth_fetcher: Arc<dyn Fetcher>,
    pub browser_renderer: Option<Arc<dyn BrowserRenderer>>,
    pub external_client: Option<Arc<dyn ExternalClient>>,
    pub oracle: Arc<OracleClient>,
    pub candidates: Arc<CandidateRegistry>,
}

/// The plugin names to load for one job: engine-default (global) → tenant →
/// schema (spec §4.6), resolved by the caller from configuration/storage.
#[derive(Debug, Clone, Default)]
pub struct PluginSelection {
    pub global: Vec<String>,
    pub tenant: Vec<String>,
    pub schema: Vec<String>,
}
