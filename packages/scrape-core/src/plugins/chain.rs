//! Plugin Chain (C6): ordered hook points with isolation and typed
//! context propagation (spec §4.6).

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::PluginError;
use crate::types::plugin::{ParseContext, RequestContext, ResponseContext};

/// A registered hook module. Each hook returns `None` for "no change" or
/// `Some(context)` to replace the current one (spec §4.6).
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn on_request(&self, ctx: RequestContext) -> Result<Option<RequestContext>, String> {
        let _ = ctx;
        Ok(None)
    }

    async fn on_response(&self, ctx: ResponseContext) -> Result<Option<ResponseContext>, String> {
        let _ = ctx;
        Ok(None)
    }

    async fn on_parse(&self, ctx: ParseContext) -> Result<Option<ParseContext>, String> {
        let _ = ctx;
        Ok(None)
    }
}

/// Loads plugins by name from a registry, constrained by an optional
/// allow-list.
pub struct PluginRegistry {
    available: std::collections::HashMap<String, Arc<dyn Plugin>>,
    allow_list: Option<BTreeSet<String>>,
}

impl PluginRegistry {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>, allow_list: Option<BTreeSet<String>>) -> Self {
        let available = plugins.into_iter().map(|p| (p.name().to_string(), p)).collect();
        Self { available, allow_list }
    }

    /// Loads the ordered plugin chain for one job: engine-default (global)
    /// → tenant → schema, deduplicating by name while keeping first
    /// occurrence order.
    pub fn load(&self, global: &[String], tenant: &[String], schema: &[String]) -> Result<Vec<Arc<dyn Plugin>>, PluginError> {
        let mut seen = BTreeSet::new();
        let mut chain = Vec::new();
        for name in global.iter().chain(tenant).chain(schema) {
            if !seen.insert(name.clone()) {
                continue;
            }
            if name.trim().is_empty() {
                return Err(PluginError::Invalid(name.clone()));
            }
            if let Some(allow) = &self.allow_list {
                if !allow.contains(name) {
                    return Err(PluginError::NotAllowed(name.clone()));
                }
            }
            let plugin = self.available.get(name).ok_or_else(|| PluginError::Missing(name.clone()))?;
            chain.push(plugin.clone());
        }
        Ok(chain)
    }
}

pub struct PluginChain {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginChain {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub async fn run_request(&self, mut ctx: RequestContext) -> Result<RequestContext, PluginError> {
        let original_host = ctx.host();
        for plugin in &self.plugins {
            match plugin.on_request(ctx.clone()).await {
                Ok(Some(next)) => {
                    if next.host() != original_host && original_host.is_some() {
                        return Err(PluginError::UrlChanged);
                    }
                    ctx = next;
                }
                Ok(None) => {}
                Err(_) => return Err(PluginError::HookFailed { hook: "request", name: plugin.name().to_string() }),
            }
        }
        Ok(ctx)
    }

    pub async fn run_response(&self, mut ctx: ResponseContext) -> Result<ResponseContext, PluginError> {
        for plugin in &self.plugins {
            match plugin.on_response(ctx.clone()).await {
                Ok(Some(next)) => ctx = next,
                Ok(None) => {}
                Err(_) => return Err(PluginError::HookFailed { hook: "response", name: plugin.name().to_string() }),
            }
        }
        Ok(ctx)
    }

    pub async fn run_parse(&self, mut ctx: ParseContext) -> Result<ParseContext, PluginError> {
        for plugin in &self.plugins {
            match plugin.on_parse(ctx.clone()).await {
                Ok(Some(next)) => ctx = next,
                Ok(None) => {}
                Err(_) => return Err(PluginError::HookFailed { hook: "parse", name: plugin.name().to_string() }),
            }
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    struct HostRewriter;
    #[async_trait]
    impl Plugin for HostRewriter {
        fn name(&self) -> &str {
            "host_rewriter"
        }
        async fn on_request(&self, mut ctx: RequestContext) -> Result<Option<RequestContext>, String> {
            ctx.url = "https://evil.example/page".to_string();
            Ok(Some(ctx))
        }
    }

    struct PathRewriter;
    #[async_trait]
    impl Plugin for PathRewriter {
        fn name(&self) -> &str {
            "path_rewriter"
        }
        async fn on_request(&self, mut ctx: RequestContext) -> Result<Option<RequestContext>, String> {
            ctx.url = format!("{}?x=1", ctx.url);
            Ok(Some(ctx))
        }
    }

    fn ctx() -> RequestContext {
        RequestContext { job_id: Uuid::new_v4(), url: "https://shop.example/p/1".into(), headers: BTreeMap::new(), cookies: BTreeMap::new() }
    }

    #[tokio::test]
    async fn host_change_is_rejected() {
        let chain = PluginChain::new(vec![Arc::new(HostRewriter)]);
        let err = chain.run_request(ctx()).await.unwrap_err();
        assert_eq!(err, PluginError::UrlChanged);
    }

    #[tokio::test]
    async fn same_host_rewrite_is_allowed() {
        let chain = PluginChain::new(vec![Arc::new(PathRewriter)]);
        let out = chain.run_request(ctx()).await.unwrap();
        assert_eq!(out.url, "https://shop.example/p/1?x=1");
    }

    #[test]
    fn load_order_is_global_then_tenant_then_schema_deduped() {
        let registry = PluginRegistry::new(vec![Arc::new(PathRewriter), Arc::new(HostRewriter)], None);
        let chain = registry
            .load(&["path_rewriter".into()], &["host_rewriter".into()], &["path_rewriter".into()])
            .unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].name(), "path_rewriter");
        assert_eq!(chain[1].name(), "host_rewriter");
    }

    #[test]
    fn missing_plugin_is_an_error() {
        let registry = PluginRegistry::new(vec![], None);
        let err = registry.load(&["nope".into()], &[], &[]).unwrap_err();
        assert_eq!(err, PluginError::Missing("nope".to_string()));
    }

    #[test]
    fn not_allow_listed_plugin_is_rejected() {
        let registry = PluginRegistry::new(vec![Arc::new(PathRewriter)], Some(BTreeSet::from(["other".to_string()])));
        let err = registry.load(&["path_rewriter".into()], &[], &[]).unwrap_err();
        assert_eq!(err, PluginError::NotAllowed("path_rewriter".to_string()));
    }
}
