//! Typed errors for the scraping pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Every variant renders
//! to one of the opaque string codes a caller is allowed to see, via
//! `.code()` — raw transport/parse exception text never escapes the engine
//! runner.

use thiserror::Error;

/// SSRF / URL-admission errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("invalid URL")]
    InvalidUrl,
    #[error("disallowed scheme")]
    InvalidScheme,
    #[error("URL carries embedded credentials")]
    CredentialsInUrl,
    #[error("domain denied")]
    DomainDenied,
    #[error("domain not in allow-list")]
    DomainNotAllowed,
    #[error("DNS resolution failed")]
    DnsFailed,
    #[error("SSRF blocked: resolves to a private/loopback/reserved address")]
    SsrfBlocked,
}

impl SecurityError {
    pub fn code(&self) -> &'static str {
        match self {
            SecurityError::InvalidUrl => "invalid_url",
            SecurityError::InvalidScheme => "invalid_scheme",
            SecurityError::CredentialsInUrl => "credentials_in_url",
            SecurityError::DomainDenied => "domain_denied",
            SecurityError::DomainNotAllowed => "domain_not_allowed",
            SecurityError::DnsFailed => "dns_failed",
            SecurityError::SsrfBlocked => "ssrf_blocked",
        }
    }
}

/// Governance (rate limiter / circuit breaker / budgets) denial.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("circuit open")]
    CircuitOpen,
    #[error("llm budget exceeded")]
    LlmBudgetExceeded,
    #[error("external budget exceeded")]
    ExternalBudgetExceeded,
}

impl GovernanceError {
    pub fn code(&self) -> &'static str {
        match self {
            GovernanceError::RateLimited { .. } => "rate_limited",
            GovernanceError::CircuitOpen => "circuit_open",
            GovernanceError::LlmBudgetExceeded => "llm_budget_exceeded",
            GovernanceError::ExternalBudgetExceeded => "external_budget_exceeded",
        }
    }
}

/// Plugin chain failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("plugin name invalid: {0}")]
    Invalid(String),
    #[error("plugin not allow-listed: {0}")]
    NotAllowed(String),
    #[error("plugin missing: {0}")]
    Missing(String),
    #[error("plugin failed to load: {0}")]
    LoadFailed(String),
    #[error("plugin hook {hook} failed: {name}")]
    HookFailed { hook: &'static str, name: String },
    #[error("plugin hook {hook} returned invalid context: {name}")]
    HookInvalid { hook: &'static str, name: String },
    #[error("plugin changed request host")]
    UrlChanged,
}

impl PluginError {
    pub fn code(&self) -> String {
        match self {
            PluginError::Invalid(_) => "plugin_invalid".to_string(),
            PluginError::NotAllowed(_) => "plugin_not_allowed".to_string(),
            PluginError::Missing(_) => "plugin_missing".to_string(),
            PluginError::LoadFailed(_) => "plugin_load_failed".to_string(),
            PluginError::HookFailed { hook, name } => format!("plugin_{hook}_failed:{name}"),
            PluginError::HookInvalid { hook, name } => format!("plugin_{hook}_invalid:{name}"),
            PluginError::UrlChanged => "plugin_url_changed".to_string(),
        }
    }
}

/// Fetch transport failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("timeout")]
    Timeout,
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    #[error("stealth engine unavailable for this domain")]
    StealthUnavailable,
    #[error("browser engine unavailable")]
    BrowserUnavailable,
}

impl FetchError {
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::FetchFailed(_) => "fetch_failed",
            FetchError::StealthUnavailable => "stealth_unavailable",
            FetchError::BrowserUnavailable => "browser_unavailable",
        }
    }
}

/// External engine (third-party scraping API) failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExternalError {
    #[error("external engine disabled")]
    Disabled,
    #[error("external not allowed for this domain")]
    NotAllowed,
    #[error("external circuit open")]
    CircuitOpen,
    #[error("external budget exceeded")]
    BudgetExceeded,
    #[error("no external provider configured")]
    ProviderUnconfigured,
    #[error("external provider auth failed")]
    AuthFailed,
    #[error("external provider unavailable")]
    ProviderUnavailable,
    #[error("external provider returned an invalid response")]
    ResponseInvalid,
}

impl ExternalError {
    pub fn code(&self) -> &'static str {
        match self {
            ExternalError::Disabled => "external_disabled",
            ExternalError::NotAllowed => "external_not_allowed",
            ExternalError::CircuitOpen => "external_circuit_open",
            ExternalError::BudgetExceeded => "external_budget_exceeded",
            ExternalError::ProviderUnconfigured => "external_provider_unconfigured",
            ExternalError::AuthFailed => "external_auth_failed",
            ExternalError::ProviderUnavailable => "external_provider_unavailable",
            ExternalError::ResponseInvalid => "external_provider_response_invalid",
        }
    }
}

/// Extraction oracle failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle unavailable")]
    Unavailable,
    #[error("oracle call failed: {0}")]
    Failed(String),
    #[error("oracle response failed validation")]
    ValidationFailed,
}

impl OracleError {
    pub fn code(&self) -> &'static str {
        match self {
            OracleError::Unavailable => "llm_unavailable",
            OracleError::Failed(_) => "llm_failed",
            OracleError::ValidationFailed => "llm_validation_failed",
        }
    }
}

/// Selector extraction failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("schema missing")]
    SchemaMissing,
    #[error("no selector matched")]
    EmptyParse,
    #[error("xpath selectors are unavailable in this build")]
    ParselUnavailable,
}

impl ExtractError {
    pub fn code(&self) -> &'static str {
        match self {
            ExtractError::SchemaMissing => "schema_missing",
            ExtractError::EmptyParse => "empty_parse",
            ExtractError::ParselUnavailable => "parsel_unavailable",
        }
    }
}

/// Top-level error produced by an engine runner attempt. Always carries an
/// opaque code and whether the worker should escalate to the next engine
/// tier rather than finalize the job failed.
#[derive(Debug, Error, Clone)]
#[error("{code}")]
pub struct PipelineError {
    pub code: String,
    pub escalate: bool,
}

impl PipelineError {
    pub fn terminal(code: impl Into<String>) -> Self {
        Self { code: code.into(), escalate: false }
    }

    pub fn escalatable(code: impl Into<String>) -> Self {
        Self { code: code.into(), escalate: true }
    }

    /// Classifies by code: anti-bot signals, HTTP 403/429, empty parse and
    /// vision signals escalate to the next engine tier; everything else is
    /// terminal for this attempt.
    pub fn from_code(code: impl Into<String>) -> Self {
        let code = code.into();
        let escalate = is_escalatable_code(&code);
        Self { code, escalate }
    }
}

pub fn is_escalatable_code(code: &str) -> bool {
    matches!(
        code,
        "http_403" | "http_429" | "captcha_detected" | "challenge_script" | "empty_parse" | "stealth_unavailable"
    ) || code.starts_with("blocked_")
        || code.starts_with("vision_")
}

impl From<SecurityError> for PipelineError {
    fn from(e: SecurityError) -> Self {
        PipelineError::terminal(e.code())
    }
}

impl From<GovernanceError> for PipelineError {
    fn from(e: GovernanceError) -> Self {
        PipelineError::terminal(e.code())
    }
}

impl From<PluginError> for PipelineError {
    fn from(e: PluginError) -> Self {
        PipelineError::terminal(e.code())
    }
}

impl From<FetchError> for PipelineError {
    fn from(e: FetchError) -> Self {
        PipelineError::from_code(e.code())
    }
}

impl From<ExternalError> for PipelineError {
    fn from(e: ExternalError) -> Self {
        PipelineError::terminal(e.code())
    }
}

impl From<OracleError> for PipelineError {
    fn from(e: OracleError) -> Self {
        PipelineError::terminal(e.code())
    }
}

impl From<ExtractError> for PipelineError {
    fn from(e: ExtractError) -> Self {
        PipelineError::from_code(e.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalatable_codes() {
        assert!(is_escalatable_code("http_403"));
        assert!(is_escalatable_code("blocked_url"));
        assert!(is_escalatable_code("vision_ocr_block"));
        assert!(is_escalatable_code("empty_parse"));
        assert!(!is_escalatable_code("schema_missing"));
        assert!(!is_escalatable_code("ssrf_blocked"));
    }

    #[test]
    fn plugin_error_codes_carry_hook_and_name() {
        let e = PluginError::HookFailed { hook: "request", name: "geo_ip".to_string() };
        assert_eq!(e.code(), "plugin_request_failed:geo_ip");
    }
}
