//! Browser renderer contract (spec §4.11.3). The headless browser driver
//! itself is an out-of-scope external collaborator; this module specifies
//! only the orchestration contract an engine runner drives it through.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::FetchError;
use crate::types::identity::{Cookie, Fingerprint};

/// One `(html, url, status, headers)` capture from a rendering session.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub html: String,
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

/// Cubic-Bézier mouse-path humanization with jittered per-pixel delay;
/// parameters are left to the driver, this flag only requests the behavior.
#[derive(Debug, Clone, Default)]
pub struct HumanizationOptions {
    pub enabled: bool,
}

/// One page to visit within a rendering session.
#[derive(Debug, Clone)]
pub struct PageInstruction {
    pub url: String,
    pub wait_until: WaitUntil,
    pub timeout_ms: u64,
    pub wait_for_selector: Option<String>,
    pub fixed_wait_ms: Option<u64>,
    pub humanize: HumanizationOptions,
    pub scroll_steps: u32,
}

/// Either an explicit list of page instructions, or a "next" selector the
/// driver re-evaluates on the rendered DOM after each page to discover the
/// next one (spec §4.11.3 multi-page traversal).
#[derive(Debug, Clone)]
pub enum Traversal {
    Explicit(Vec<PageInstruction>),
    NextSelector { first: PageInstruction, next_selector: String, max_pages: u32 },
}

#[derive(Debug, Clone)]
pub struct BrowserContext {
    pub fingerprint: Fingerprint,
    pub proxy_url: Option<String>,
    pub cookies: Vec<Cookie>,
    pub storage_state: Option<Vec<u8>>,
    pub permissions: Vec<String>,
    /// Extra headers (identity-derived, plugin-mutated) the driver should
    /// set on the page session, e.g. via CDP `Network.setExtraHTTPHeaders`.
    pub extra_headers: BTreeMap<String, String>,
    pub traversal: Traversal,
}

/// Exit capture: cookies/storage_state to merge back into the Identity, plus
/// the final screenshot and HAR trace locations (already persisted by the
/// caller's `BlobStore`, referenced here only by bytes).
pub struct BrowserSessionResult {
    pub snapshots: Vec<Snapshot>,
    pub cookies: Vec<Cookie>,
    pub storage_state: Option<Vec<u8>>,
    pub screenshot: Option<Vec<u8>>,
    pub har: Option<Vec<u8>>,
}

#[async_trait]
pub trait BrowserRenderer: Send + Sync {
    async fn render(&self, context: BrowserContext) -> Result<BrowserSessionResult, FetchError>;
}
