//! 页面内容哈希存储

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::Result;

pub struct HashStore {
    path: PathBuf,
    hashes: BTreeMap<String, String>,
}

impl HashStore {
    /// Load hashes from `path`. A missing file starts empty; so does a
    /// corrupt one, with a warning.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let hashes = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Hash store {} is corrupt ({}), starting over", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        info!("Loaded {} page hashes", hashes.len());
        Self { path, hashes }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
    }

    /// Returns false when `content` hashes to the value stored for `url`;
    /// otherwise records the new hash and returns true.
    pub fn has_changed(&mut self, url: &str, content: &str) -> bool {
        let current = content_hash(content);
        if self.hashes.get(url) == Some(&current) {
            return false;
        }
        self.hashes.insert(url.to_string(), current);
        true
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.hashes)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
