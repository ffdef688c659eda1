//! Plain HTTP fetcher (spec §4.11.1): streams up to `max_bytes`, retries
//! transient failures with full-jitter exponential backoff.

use async_trait::async_trait;
use rand::Rng;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::FetchError;
use crate::types::config::FetchConfig;
use crate::types::identity::Cookie;

const RETRYABLE_STATUSES: [u16; 6] = [408, 425, 429, 500, 502, 503, 504];

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub cookies: Vec<Cookie>,
    pub proxy_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub html: String,
    pub headers: BTreeMap<String, String>,
    pub cookies: Vec<Cookie>,
    pub content_type: Option<String>,
    pub truncated: bool,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

pub struct PlainFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl PlainFetcher {
    pub fn new(config: FetchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_store(false)
            .build()
            .expect("reqwest client builds with valid tls config");
        Self { client, config }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let cap = self.config.backoff_max_ms;
        let base = self.config.backoff_ms.saturating_mul(1u64 << attempt.min(16)).min(cap);
        let jittered = rand::thread_rng().gen_range(0..=base.max(1));
        Duration::from_millis(jittered)
    }

    /// Builds a client routed through `proxy_url` for this one attempt, or
    /// reuses the shared direct client when no proxy is set.
    fn client_for(&self, proxy_url: Option<&str>) -> Result<reqwest::Client, FetchError> {
        let Some(proxy_url) = proxy_url else { return Ok(self.client.clone()) };
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| FetchError::FetchFailed(e.to_string()))?;
        reqwest::Client::builder()
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(10))
            .proxy(proxy)
            .build()
            .map_err(|e| FetchError::FetchFailed(e.to_string()))
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let client = self.client_for(request.proxy_url.as_deref())?;
        let mut builder = client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.cookies.is_empty() {
            let cookie_header = request.cookies.iter().map(|c| format!("{}={}", c.name, c.value)).collect::<Vec<_>>().join("; ");
            builder = builder.header(reqwest::header::COOKIE, cookie_header);
        }

        let response = builder.send().await.map_err(|e| if e.is_timeout() { FetchError::Timeout } else { FetchError::FetchFailed(e.to_string()) })?;

        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let content_type = response.headers().get(reqwest::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_string);
        let headers: BTreeMap<String, String> =
            response.headers().iter().filter_map(|(k, v)| v.to_str().ok().map(|s| (k.as_str().to_lowercase(), s.to_string()))).collect();

        let cookies = parse_set_cookie(&headers, &final_url);

        let max_bytes = self.config.max_bytes;
        let bytes = response.bytes().await.map_err(|e| FetchError::FetchFailed(e.to_string()))?;
        let truncated = bytes.len() > max_bytes;
        let slice = if truncated { &bytes[..max_bytes] } else { &bytes[..] };
        let html = String::from_utf8_lossy(slice).to_string();

        if RETRYABLE_STATUSES.contains(&status) {
            return Err(FetchError::FetchFailed(format!("retryable status {status}")));
        }

        Ok(FetchResponse { url: final_url, status, html, headers, cookies, content_type, truncated })
    }
}

fn parse_set_cookie(headers: &BTreeMap<String, String>, url: &str) -> Vec<Cookie> {
    let domain = url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)).unwrap_or_default();
    let Some(raw) = headers.get("set-cookie") else { return Vec::new() };
    raw.split(", ")
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let (name, value) = parts.next()?.split_once('=')?;
            let rest: Vec<&str> = parts.collect();
            let secure = rest.iter().any(|p| p.trim().eq_ignore_ascii_case("secure"));
            let http_only = rest.iter().any(|p| p.trim().eq_ignore_ascii_case("httponly"));
            let path = rest
                .iter()
                .find_map(|p| p.trim().strip_prefix("Path=").or_else(|| p.trim().strip_prefix("path=")))
                .unwrap_or("/")
                .to_string();
            Some(Cookie { name: name.trim().to_string(), value: value.trim().to_string(), domain: domain.clone(), path, secure, http_only })
        })
        .collect()
}

#[async_trait]
impl Fetcher for PlainFetcher {
    /// Up to `retries` additional attempts on timeout, transport error, or a
    /// retryable status code, with full-jitter exponential backoff.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut last_err = FetchError::FetchFailed("no attempts made".to_string());
        for attempt in 0..=self.config.retries {
            match self.attempt(&request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    last_err = err;
                    if attempt < self.config.retries {
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                    }
                }
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_bounded_by_cap() {
        let fetcher = PlainFetcher::new(FetchConfig { backoff_ms: 100, backoff_max_ms: 500, ..FetchConfig::default() });
        for attempt in 0..10 {
            let delay = fetcher.backoff_delay(attempt);
            assert!(delay.as_millis() <= 500);
        }
    }

    #[test]
    fn set_cookie_parses_name_value_domain_path_flags() {
        let mut headers = BTreeMap::new();
        headers.insert("set-cookie".to_string(), "sid=abc123; Path=/account; Secure; HttpOnly".to_string());
        let cookies = parse_set_cookie(&headers, "https://shop.example/p/1");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "sid");
        assert_eq!(cookies[0].value, "abc123");
        assert_eq!(cookies[0].domain, "shop.example");
        assert_eq!(cookies[0].path, "/account");
        assert!(cookies[0].secure);
        assert!(cookies[0].http_only);
    }

    #[test]
    fn no_set_cookie_header_yields_empty_vec() {
        assert!(parse_set_cookie(&BTreeMap::new(), "https://shop.example/").is_empty());
    }
}
