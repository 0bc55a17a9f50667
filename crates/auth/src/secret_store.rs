//! Opaque secret-blob fetcher used by tier 2 of the secret resolver
//! (spec §4.C). The production secret store is AWS Secrets Manager (spec
//! §6 "AWS_REGION and credentials"); no AWS SDK crate exists anywhere in
//! the retrieved reference pack to ground a direct integration on, so this
//! crate exposes the fetch behind a small trait and ships a filesystem-backed
//! implementation (grounded on the teacher's JSON-file `SessionStore`,
//! `crates/sessions/src/store.rs`) that reads the blob from a local secrets
//! root. A production deployment swaps in an AWS-backed implementation of
//! the same trait.

use async_trait::async_trait;

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the raw secret blob at `path`, or `None` if absent/unreadable.
    async fn fetch_blob(&self, path: &str) -> Option<String>;
}

/// Reads secret blobs from files under a root directory, keyed by the
/// tenant-key's resolved path.
pub struct FileSecretStore {
    root: std::path::PathBuf,
}

impl FileSecretStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn fetch_blob(&self, path: &str) -> Option<String> {
        let full_path = self.root.join(path.trim_start_matches('/'));
        tokio::fs::read_to_string(&full_path).await.ok()
    }
}

/// Parses a secret blob as either a JSON object or `KEY=VALUE` lines
/// (`#` starts a comment), selecting the first non-empty value among
/// `candidates` (spec §4.C tier 2).
pub fn parse_and_select(blob: &str, candidates: &[&str]) -> Option<String> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(blob) {
        if let Some(obj) = json.as_object() {
            for key in candidates {
                if let Some(v) = obj.get(*key).and_then(|v| v.as_str()) {
                    if !v.is_empty() {
                        return Some(v.to_string());
                    }
                }
            }
            return None;
        }
    }

    let mut kv = std::collections::HashMap::new();
    for line in blob.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            kv.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    for key in candidates {
        if let Some(v) = kv.get(*key) {
            if !v.is_empty() {
                return Some(v.clone());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANDIDATES: &[&str] = &[
        "SKYOFFICE_PRESENCE_SHARED_SECRET",
        "SKYOFFICE_PRESENCE_SECRET",
        "PRESENCE_SHARED_SECRET",
        "sharedSecret",
        "shared_secret",
    ];

    #[test]
    fn parses_json_blob() {
        let blob = r#"{"sharedSecret": "abc123"}"#;
        assert_eq!(
            parse_and_select(blob, CANDIDATES),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn parses_key_value_blob_with_comments() {
        let blob = "# a comment\nPRESENCE_SHARED_SECRET=def456\nOTHER=ignored\n";
        assert_eq!(
            parse_and_select(blob, CANDIDATES),
            Some("def456".to_string())
        );
    }

    #[test]
    fn returns_none_when_no_candidate_present() {
        let blob = "FOO=bar";
        assert_eq!(parse_and_select(blob, CANDIDATES), None);
    }

    #[test]
    fn json_candidate_priority_order_is_respected() {
        let blob = r#"{"shared_secret": "low-priority", "sharedSecret": "high-priority"}"#;
        assert_eq!(
            parse_and_select(blob, CANDIDATES),
            Some("high-priority".to_string())
        );
    }
}
