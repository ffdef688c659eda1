//! Impersonating HTTP fetcher (spec §4.11.2): same contract as the plain
//! fetcher, plus a configurable browser-like header profile. Used
//! exclusively by the `stealth` engine.

use async_trait::async_trait;

use crate::error::FetchError;
use crate::types::config::FetchConfig;

use super::plain::{Fetcher, FetchRequest, FetchResponse, PlainFetcher};

/// The header set a browser-like TLS/HTTP fingerprint profile sends,
/// applied on top of (and not overriding) any caller-supplied headers.
#[derive(Debug, Clone)]
pub struct ImpersonationProfile {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub sec_ch_ua: String,
}

impl Default for ImpersonationProfile {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            sec_ch_ua: "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\"".to_string(),
        }
    }
}

pub struct ImpersonatingFetcher {
    inner: PlainFetcher,
    profile: ImpersonationProfile,
}

impl ImpersonatingFetcher {
    pub fn new(config: FetchConfig, profile: ImpersonationProfile) -> Self {
        Self { inner: PlainFetcher::new(config), profile }
    }

    fn apply_profile(&self, mut request: FetchRequest) -> FetchRequest {
        request.headers.entry("user-agent".to_string()).or_insert_with(|| self.profile.user_agent.clone());
        request.headers.entry("accept".to_string()).or_insert_with(|| self.profile.accept.clone());
        request.headers.entry("accept-language".to_string()).or_insert_with(|| self.profile.accept_language.clone());
        request.headers.entry("sec-ch-ua".to_string()).or_insert_with(|| self.profile.sec_ch_ua.clone());
        request
    }
}

#[async_trait]
impl Fetcher for ImpersonatingFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.inner.fetch(self.apply_profile(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn profile_fills_in_missing_headers_without_overriding() {
        let fetcher = ImpersonatingFetcher::new(FetchConfig::default(), ImpersonationProfile::default());
        let mut headers = BTreeMap::new();
        headers.insert("user-agent".to_string(), "custom-ua".to_string());
        let request = FetchRequest { url: "https://x.example".into(), headers, cookies: vec![], proxy_url: None };
        let applied = fetcher.apply_profile(request);
        assert_eq!(applied.headers.get("user-agent").unwrap(), "custom-ua");
        assert!(applied.headers.contains_key("accept-language"));
        assert!(applied.headers.contains_key("sec-ch-ua"));
    }
}
