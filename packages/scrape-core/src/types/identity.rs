//! Identity and its transient binding: a rotating browsing persona and the
//! short-TTL association that pins it to a (tenant, domain) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::security::credentials::SecretString;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub locale: String,
    pub timezone: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub geolocation: Option<(f64, f64)>,
    pub color_scheme: Option<String>,
    pub device_scale_factor: Option<f32>,
    pub is_mobile: bool,
    pub has_touch: bool,
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into(),
            viewport: (1920, 1080),
            locale: "en-US".into(),
            timezone: "America/New_York".into(),
            headers: BTreeMap::new(),
            permissions: Vec::new(),
            geolocation: None,
            color_scheme: None,
            device_scale_factor: None,
            is_mobile: false,
            has_touch: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

/// A persisted browsing persona rotated across jobs to evade bot detection.
/// `cookies_encrypted`/`storage_state_encrypted` hold AES-GCM ciphertext;
/// plaintext only exists transiently inside `identity::crypto`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub tenant: String,
    pub label: String,
    pub fingerprint: Fingerprint,
    pub cookies_encrypted: Option<Vec<u8>>,
    pub storage_state_encrypted: Option<Vec<u8>>,
    pub active: bool,
    pub use_count: u64,
    pub failure_count: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(tenant: impl Into<String>, label: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant: tenant.into(),
            label: label.into(),
            fingerprint: Fingerprint::default(),
            cookies_encrypted: None,
            storage_state_encrypted: None,
            active: true,
            use_count: 0,
            failure_count: 0,
            last_used_at: None,
            last_failed_at: None,
            created_at: now,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.active
    }

    /// `decayed_failures = max(0, failure_count − decay_per_hour × hours_since_last_failed)`.
    pub fn decayed_failures(&self, decay_per_hour: f64, now: DateTime<Utc>) -> f64 {
        let Some(last_failed) = self.last_failed_at else {
            return self.failure_count as f64;
        };
        let hours = (now - last_failed).num_seconds().max(0) as f64 / 3600.0;
        (self.failure_count as f64 - decay_per_hour * hours).max(0.0)
    }

    /// The ordering tuple `acquire` sorts candidates by (spec §4.4.1).
    pub fn ordering_key(&self, decay_per_hour: f64, now: DateTime<Utc>) -> (u64, i64, u64, i64, Uuid) {
        let decayed = (self.decayed_failures(decay_per_hour, now) * 1000.0) as u64;
        let last_used = self.last_used_at.map(|t| t.timestamp_millis()).unwrap_or(0);
        (decayed, last_used, self.use_count, self.created_at.timestamp_millis(), self.id)
    }
}

/// Authenticated-cipher key wrapper used by `identity::crypto`. Kept out of
/// `Identity` itself so the key never round-trips through `serde`.
pub struct IdentityEncryptionKey(pub SecretString);

/// Transient (tenant, domain) → identity/proxy association, held in the
/// coordination store with a TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityBinding {
    pub identity_id: Uuid,
    pub proxy_url: Option<String>,
}
