//! Filesystem-backed `BlobStore` (spec §9 artifacts): writes content-addressed
//! files under a configured base directory. A real deployment might swap
//! this for an object-store-backed implementation; the pipeline only
//! depends on the `put` contract.

use std::path::PathBuf;

use async_trait::async_trait;
use scrape_core::types::artifact::{sha256_hex, BlobStore};
use tokio::fs;

pub struct FilesystemBlobStore {
    base_dir: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, bytes: &[u8], content_type: &str) -> anyhow::Result<(String, String)> {
        let checksum = sha256_hex(bytes);
        let ext = match content_type {
            "text/html" => "html",
            "image/png" => "png",
            "application/json" => "har.json",
            _ => "bin",
        };
        let file_name = format!("{checksum}.{ext}");
        fs::create_dir_all(&self.base_dir).await?;
        let path = self.base_dir.join(&file_name);
        fs::write(&path, bytes).await?;
        Ok((path.to_string_lossy().into_owned(), checksum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_writes_content_addressed_file() {
        let dir = std::env::temp_dir().join(format!("scrape-worker-blob-test-{}", uuid::Uuid::new_v4()));
        let store = FilesystemBlobStore::new(&dir);

        let (location, checksum) = store.put(b"hello world", "text/html").await.unwrap();
        assert_eq!(checksum, sha256_hex(b"hello world"));
        assert!(location.ends_with(&format!("{checksum}.html")));
        assert_eq!(fs::read(&location).await.unwrap(), b"hello world");

        let _ = fs::remove_dir_all(&dir).await;
    }
}
