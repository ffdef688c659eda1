//! Artifact: a reference to a stored blob (HTML, screenshot, HAR, OCR).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Html,
    Screenshot,
    Har,
    Ocr,
}

/// At most one artifact per `(job_id, type)`; a new one replaces the prior
/// (the blob store backend is out of scope — only the location+checksum
/// contract matters here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub job_id: Uuid,
    pub r#type: ArtifactType,
    pub location: String,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        job_id: Uuid,
        r#type: ArtifactType,
        location: impl Into<String>,
        checksum: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            r#type,
            location: location.into(),
            checksum: checksum.into(),
            created_at: now,
        }
    }
}

/// Blob-store contract: store bytes, return an opaque location and a hex
/// checksum. The backend itself (filesystem, object store) is out of scope
/// — callers outside this crate wire a real implementation (filesystem,
/// S3, ...) and this trait is all the pipeline depends on.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bytes: &[u8], content_type: &str) -> anyhow::Result<(String, String)>;
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_stable() {
        assert_eq!(sha256_hex(b"abc"), sha256_hex(b"abc"));
        assert_ne!(sha256_hex(b"abc"), sha256_hex(b"abd"));
    }
}
