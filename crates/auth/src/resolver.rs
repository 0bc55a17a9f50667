//! HMAC secret resolution through the three-tier chain (spec §4.C).
//!
//! TTL caching mirrors the teacher's `AuthRotator`-adjacent caching style
//! (timestamped entries guarded by `parking_lot::RwLock`), generalised to a
//! resolved-secret cache keyed by `"officeId:lowercase(agentId)"` plus a
//! secret-blob cache keyed by secret-store path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use presence_domain::config::{OFFICE_ID_ENV_VARS, STATIC_SECRET_ENV_VARS};
use presence_registry_client::RegistryClient;

use crate::secret_store::{parse_and_select, SecretStore};

const TENANT_KEY_TYPE: &str = "shared:skyoffice-server";

const TENANT_SECRET_CANDIDATES: &[&str] = &[
    "SKYOFFICE_PRESENCE_SHARED_SECRET",
    "SKYOFFICE_PRESENCE_SECRET",
    "PRESENCE_SHARED_SECRET",
    "sharedSecret",
    "shared_secret",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Static,
    TenantKeys,
    Registry,
}

impl SecretSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretSource::Static => "static",
            SecretSource::TenantKeys => "tenant-keys",
            SecretSource::Registry => "registry",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedSecret {
    pub secret: String,
    pub source: SecretSource,
}

struct CacheEntry {
    value: String,
    inserted_at: Instant,
}

pub struct SecretResolver {
    registry: Arc<RegistryClient>,
    secret_store: Arc<dyn SecretStore>,
    secret_cache_ttl: Duration,
    tenant_secret_cache_ttl: Duration,
    resolved_cache: RwLock<HashMap<String, (CacheEntry, SecretSource)>>,
    tenant_blob_cache: RwLock<HashMap<String, CacheEntry>>,
    logged_once: RwLock<HashSet<String>>,
}

impl SecretResolver {
    pub fn new(
        registry: Arc<RegistryClient>,
        secret_store: Arc<dyn SecretStore>,
        secret_cache_ttl: Duration,
        tenant_secret_cache_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            secret_store,
            secret_cache_ttl,
            tenant_secret_cache_ttl,
            resolved_cache: RwLock::new(HashMap::new()),
            tenant_blob_cache: RwLock::new(HashMap::new()),
            logged_once: RwLock::new(HashSet::new()),
        }
    }

    /// `officeId` fallback chain (spec §4.C): explicit arg → env chain.
    pub fn resolve_office_id(explicit: Option<&str>) -> Option<String> {
        if let Some(id) = explicit {
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
        OFFICE_ID_ENV_VARS
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    fn cache_key(office_id: &str, agent_id: &str) -> String {
        format!("{office_id}:{}", agent_id.to_lowercase())
    }

    pub async fn resolve(&self, agent_id: &str, office_id: Option<&str>) -> Option<ResolvedSecret> {
        // Tier 1: static env, cached under no office lookup but still keyed
        // so agent-scoped tiers below don't thrash the cache on re-checks.
        if let Some(secret) = Self::static_secret() {
            return Some(ResolvedSecret {
                secret,
                source: SecretSource::Static,
            });
        }

        let office_id = Self::resolve_office_id(office_id)?;
        let key = Self::cache_key(&office_id, agent_id);

        if let Some((entry, source)) = self.resolved_cache.read().get(&key) {
            if entry.inserted_at.elapsed() < self.secret_cache_ttl {
                return Some(ResolvedSecret {
                    secret: entry.value.clone(),
                    source: *source,
                });
            }
        }

        if let Some(secret) = self.resolve_tenant_keys(&office_id).await {
            self.store_resolved(&key, &secret, SecretSource::TenantKeys);
            return Some(ResolvedSecret {
                secret,
                source: SecretSource::TenantKeys,
            });
        }

        if let Some(secret) = self.registry.fetch_agent_credential(&office_id, agent_id).await {
            self.store_resolved(&key, &secret, SecretSource::Registry);
            return Some(ResolvedSecret {
                secret,
                source: SecretSource::Registry,
            });
        }

        None
    }

    fn static_secret() -> Option<String> {
        STATIC_SECRET_ENV_VARS
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    async fn resolve_tenant_keys(&self, office_id: &str) -> Option<String> {
        let keys = self.registry.tenant_keys(office_id).await;
        let key = keys
            .into_iter()
            .find(|k| k.key_type.as_deref().unwrap_or("").to_lowercase() == TENANT_KEY_TYPE)?;
        let path = key.resolved_path()?;

        let blob = self.fetch_blob_cached(&path).await?;
        parse_and_select(&blob, TENANT_SECRET_CANDIDATES)
    }

    async fn fetch_blob_cached(&self, path: &str) -> Option<String> {
        if let Some(entry) = self.tenant_blob_cache.read().get(path) {
            if entry.inserted_at.elapsed() < self.tenant_secret_cache_ttl {
                return Some(entry.value.clone());
            }
        }

        let blob = self.secret_store.fetch_blob(path).await?;
        self.tenant_blob_cache.write().insert(
            path.to_string(),
            CacheEntry {
                value: blob.clone(),
                inserted_at: Instant::now(),
            },
        );

        if self.logged_once.write().insert(path.to_string()) {
            tracing::info!(path, "loaded tenant secret blob for the first time");
        }

        Some(blob)
    }

    fn store_resolved(&self, key: &str, secret: &str, source: SecretSource) {
        self.resolved_cache.write().insert(
            key.to_string(),
            (
                CacheEntry {
                    value: secret.to_string(),
                    inserted_at: Instant::now(),
                },
                source,
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn office_id_prefers_explicit_arg() {
        assert_eq!(
            SecretResolver::resolve_office_id(Some("explicit-office")),
            Some("explicit-office".to_string())
        );
    }

    #[test]
    fn cache_key_lowercases_agent_id() {
        assert_eq!(
            SecretResolver::cache_key("office-1", "Agent.X"),
            "office-1:agent.x"
        );
    }
}
