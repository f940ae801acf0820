//! Last-known content hashes per watched resource

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Stores the last content hash seen for `(url, mapping template)`
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Hash stored for the key, if any
    async fn get(&self, url: &str, mapping_template_id: Option<&str>) -> Option<String>;

    /// Store a hash, replacing any previous one
    async fn set(&self, url: &str, mapping_template_id: Option<&str>, sha256_hex: String);

    /// Forget the hash for the key
    async fn remove(&self, url: &str, mapping_template_id: Option<&str>);
}

fn key(url: &str, mapping_template_id: Option<&str>) -> String {
    format!("{}|{}", url, mapping_template_id.unwrap_or("-"))
}

/// Process-local store; contents are lost on restart
#[derive(Debug, Default)]
pub struct InMemoryFingerprintStore {
    hashes: RwLock<HashMap<String, String>>,
}

impl InMemoryFingerprintStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored fingerprints
    pub fn len(&self) -> usize {
        self.hashes.read().map(|h| h.len()).unwrap_or(0)
    }

    /// Whether no fingerprints are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn get(&self, url: &str, mapping_template_id: Option<&str>) -> Option<String> {
        let hashes = self.hashes.read().unwrap_or_else(|e| e.into_inner());
        hashes.get(&key(url, mapping_template_id)).cloned()
    }

    async fn set(&self, url: &str, mapping_template_id: Option<&str>, sha256_hex: String) {
        let mut hashes = self.hashes.write().unwrap_or_else(|e| e.into_inner());
        hashes.insert(key(url, mapping_template_id), sha256_hex);
    }

    async fn remove(&self, url: &str, mapping_template_id: Option<&str>) {
        let mut hashes = self.hashes.write().unwrap_or_else(|e| e.into_inner());
        hashes.remove(&key(url, mapping_template_id));
    }
}
