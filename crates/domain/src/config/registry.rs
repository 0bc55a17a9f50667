use serde::{Deserialize, Serialize};

/// Registry HTTP client + reconciler configuration (spec §4.E, §4.H, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL for the Registry service. Aliased env vars (checked in
    /// order, first wins): `REGISTRY_SERVICE_URL`, `REGISTRY_SERVICE_ORIGIN`,
    /// `REGISTRY_SERVICE_BASE_URL`, `REGISTRY_API_URL`.
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default = "d_sync_interval_ms")]
    pub sync_interval_ms: u64,
    #[serde(default = "d_base_domain")]
    pub base_domain: String,
    #[serde(default = "d_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "d_voice_agent_id")]
    pub default_voice_agent_id: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            service_url: None,
            sync_interval_ms: d_sync_interval_ms(),
            base_domain: d_base_domain(),
            request_timeout_secs: d_request_timeout_secs(),
            default_voice_agent_id: d_voice_agent_id(),
        }
    }
}

/// Environment variable names checked (in order) to resolve the Registry
/// base URL. Declared here so the client and the CLI `doctor` command
/// agree on the same resolution chain.
pub const REGISTRY_URL_ENV_VARS: &[&str] = &[
    "REGISTRY_SERVICE_URL",
    "REGISTRY_SERVICE_ORIGIN",
    "REGISTRY_SERVICE_BASE_URL",
    "REGISTRY_API_URL",
];

pub const REGISTRY_TOKEN_ENV_VARS: &[&str] = &["REGISTRY_SERVICE_TOKEN", "REGISTRY_API_TOKEN"];

pub const OFFICE_ID_ENV_VARS: &[&str] = &["REGISTRY_OFFICE_ID", "OFFICE_ID", "SKYOFFICE_OFFICE_ID"];

fn d_sync_interval_ms() -> u64 {
    60_000
}
fn d_base_domain() -> String {
    "office.xyz".into()
}
fn d_request_timeout_secs() -> u64 {
    5
}
fn d_voice_agent_id() -> String {
    "agent_4901k6k9xg9qf4paratx1d9rkmwx".into()
}
