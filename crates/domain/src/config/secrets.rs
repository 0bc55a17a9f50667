use serde::{Deserialize, Serialize};

/// NPC handshake secret-resolution configuration (spec §4.C).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "d_ttl_secs")]
    pub secret_cache_ttl_secs: u64,
    #[serde(default = "d_ttl_secs")]
    pub tenant_secret_cache_ttl_secs: u64,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            secret_cache_ttl_secs: d_ttl_secs(),
            tenant_secret_cache_ttl_secs: d_ttl_secs(),
        }
    }
}

/// Env vars checked (in order) for a static shared secret (spec §4.C tier 1).
pub const STATIC_SECRET_ENV_VARS: &[&str] = &[
    "SKYOFFICE_PRESENCE_SHARED_SECRET",
    "SKYOFFICE_PRESENCE_SECRET",
    "PRESENCE_SHARED_SECRET",
    "SHARED_SECRET",
];

fn d_ttl_secs() -> u64 {
    300
}
