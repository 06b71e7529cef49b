//! Content-addressed artifact store (spec §4.8).
//!
//! Offloads large tool results to disk so they don't blow up the inline
//! response. Two identical `(tool, args, bytes)` triples always yield the
//! same artifact id and file path — storing is idempotent, which lets the
//! executor call `maybe_store` freely without worrying about duplicating
//! files across continuation steps that re-fetch the same page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use ulid::Ulid;

/// Default inline threshold: results serializing larger than this are
/// offloaded rather than embedded in `executed_steps`.
pub const DEFAULT_INLINE_MAX_BYTES: usize = 32 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactItem {
    pub id: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub mime: String,
    pub sha256: String,
    pub tool: String,
    pub created_at: DateTime<Utc>,
}

/// Manifest of artifacts produced during a single request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub artifacts: Vec<ArtifactItem>,
}

/// Replaces a large inline result. Carries enough metadata that a caller
/// can decide whether to fetch the full artifact without a round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactReference {
    pub artifact: String,
    pub bytes: u64,
    pub mime: String,
    pub sha256: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ArtifactError {
    #[error("failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact not found: {0}")]
    NotFound(String),
}

/// Process-wide, concurrency-safe blob store rooted at a configurable
/// directory. Metadata is kept in-memory for the life of the process and
/// mirrored to a `.meta.json` sidecar next to each blob so a restarted
/// process can still serve `read`/`list` for artifacts written earlier.
pub struct ArtifactStore {
    root: PathBuf,
    inline_max_bytes: usize,
    index: Mutex<HashMap<String, ArtifactItem>>,
}

impl ArtifactStore {
    /// `init_from_env`: construct from a root directory and threshold,
    /// loading any sidecar metadata already on disk.
    pub fn init_from_env(root: PathBuf, inline_max_bytes: usize) -> Result<Self, ArtifactError> {
        std::fs::create_dir_all(&root)?;
        let mut index = HashMap::new();
        load_sidecars(&root, &mut index)?;
        Ok(Self {
            root,
            inline_max_bytes,
            index: Mutex::new(index),
        })
    }

    pub fn inline_max_bytes(&self) -> usize {
        self.inline_max_bytes
    }

    /// Store `bytes`, idempotently keyed on `(tool, args, bytes)`.
    pub fn store(
        &self,
        tool: &str,
        args: &Value,
        mime: &str,
        ext: &str,
        bytes: &[u8],
    ) -> Result<(ArtifactReference, ArtifactItem), ArtifactError> {
        let sha256 = hex_sha256(bytes);
        let id = deterministic_id(tool, args, &sha256);

        {
            let index = self.index.lock().expect("artifact index poisoned");
            if let Some(existing) = index.get(&id) {
                return Ok((reference_from(existing), existing.clone()));
            }
        }

        let dir = self.root.join(&sha256[0..2.min(sha256.len())]);
        std::fs::create_dir_all(&dir)?;
        let file_name = if ext.is_empty() {
            sha256.clone()
        } else {
            format!("{sha256}.{ext}")
        };
        let path = dir.join(file_name);
        if !path.exists() {
            std::fs::write(&path, bytes)?;
        }

        let item = ArtifactItem {
            id: id.clone(),
            path: path.clone(),
            bytes: bytes.len() as u64,
            mime: mime.to_string(),
            sha256: sha256.clone(),
            tool: tool.to_string(),
            created_at: Utc::now(),
        };

        write_sidecar(&path, &item)?;
        self.index
            .lock()
            .expect("artifact index poisoned")
            .insert(id, item.clone());

        Ok((reference_from(&item), item))
    }

    /// Store `value` if its serialized form exceeds `inline_max_bytes`.
    /// Returns `None` when the value should stay inline.
    pub fn maybe_store(
        &self,
        tool: &str,
        args: &Value,
        value: &Value,
    ) -> Result<Option<(ArtifactReference, ArtifactItem)>, ArtifactError> {
        let serialized = serde_json::to_vec(value).unwrap_or_default();
        if serialized.len() <= self.inline_max_bytes {
            return Ok(None);
        }
        self.store(tool, args, "application/json", "json", &serialized)
            .map(Some)
    }

    pub fn read(&self, id: &str) -> Result<(Vec<u8>, String), ArtifactError> {
        let item = self
            .index
            .lock()
            .expect("artifact index poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(id.to_string()))?;
        let bytes = std::fs::read(&item.path)?;
        Ok((bytes, item.mime))
    }

    pub fn list(&self) -> Vec<ArtifactItem> {
        let mut items: Vec<ArtifactItem> =
            self.index.lock().expect("artifact index poisoned").values().cloned().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items
    }
}

fn reference_from(item: &ArtifactItem) -> ArtifactReference {
    ArtifactReference {
        artifact: format!("artifact://{}", item.id),
        bytes: item.bytes,
        mime: item.mime.clone(),
        sha256: item.sha256.clone(),
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Deterministic "ULID-like" id: the first 16 bytes of
/// `sha256(tool || canonical(args) || content_sha256)` interpreted as a
/// ULID. Not time-ordered like a real ULID, but stable across repeated
/// calls with identical producer metadata — which is the invariant spec
/// §8 tests for.
fn deterministic_id(tool: &str, args: &Value, content_sha256: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool.as_bytes());
    hasher.update(args.to_string().as_bytes());
    hasher.update(content_sha256.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[0..16]);
    Ulid::from_bytes(bytes).to_string()
}

fn sidecar_path(blob_path: &Path) -> PathBuf {
    let mut os = blob_path.as_os_str().to_owned();
    os.push(".meta.json");
    PathBuf::from(os)
}

fn write_sidecar(blob_path: &Path, item: &ArtifactItem) -> Result<(), ArtifactError> {
    let json = serde_json::to_vec_pretty(item).unwrap_or_default();
    std::fs::write(sidecar_path(blob_path), json)?;
    Ok(())
}

fn load_sidecars(root: &Path, index: &mut HashMap<String, ArtifactItem>) -> Result<(), ArtifactError> {
    if !root.exists() {
        return Ok(());
    }
    for entry in walk_files(root)? {
        if entry.extension().and_then(|e| e.to_str()) == Some("json")
            && entry.to_string_lossy().ends_with(".meta.json")
        {
            if let Ok(bytes) = std::fs::read(&entry) {
                if let Ok(item) = serde_json::from_slice::<ArtifactItem>(&bytes) {
                    index.insert(item.id.clone(), item);
                }
            }
        }
    }
    Ok(())
}

fn walk_files(dir: &Path) -> Result<Vec<PathBuf>, ArtifactError> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk_files(&path)?);
        } else {
            out.push(path);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn store_is_idempotent_for_identical_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::init_from_env(dir.path().to_path_buf(), 16).unwrap();
        let args = json!({"q": "x"});
        let (r1, i1) = store.store("jira_search_issues", &args, "application/json", "json", b"hello world").unwrap();
        let (r2, i2) = store.store("jira_search_issues", &args, "application/json", "json", b"hello world").unwrap();
        assert_eq!(r1.artifact, r2.artifact);
        assert_eq!(i1.path, i2.path);
        assert_eq!(i1.sha256, i2.sha256);
    }

    #[test]
    fn maybe_store_keeps_small_values_inline() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::init_from_env(dir.path().to_path_buf(), 1024).unwrap();
        let out = store.maybe_store("t", &json!({}), &json!({"a": 1})).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn maybe_store_offloads_large_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::init_from_env(dir.path().to_path_buf(), 8).unwrap();
        let big = Value::String("x".repeat(1000));
        let out = store.maybe_store("t", &json!({}), &big).unwrap();
        assert!(out.is_some());
        let (reference, item) = out.unwrap();
        assert!(reference.artifact.starts_with("artifact://"));
        assert!(store.list().iter().any(|i| i.id == item.id));
    }

    #[test]
    fn read_roundtrips_stored_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::init_from_env(dir.path().to_path_buf(), 16).unwrap();
        let (reference, _item) = store
            .store("t", &json!({}), "text/plain", "txt", b"payload")
            .unwrap();
        let id = reference.artifact.strip_prefix("artifact://").unwrap();
        let (bytes, mime) = store.read(id).unwrap();
        assert_eq!(bytes, b"payload");
        assert_eq!(mime, "text/plain");
    }
}
