//! Typed HTTP client for the external Registry service (spec §4.E).
//!
//! Modelled on the teacher's `OpenAiCompatProvider::authed_post` pattern
//! (`crates/providers/src/openai_compat.rs`): one shared `reqwest::Client`
//! with a fixed timeout, auth headers attached per-request. GET/PATCH
//! failures are logged and swallowed here (advisory reconciliation or
//! telemetry per spec §4.E); only the credential POST returns an error the
//! caller should act on differently (it yields `None` rather than an error).

use std::time::Duration;

use presence_domain::model::{RegistryAgent, RegistryOffice};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const REQUEST_TIMEOUT_SECS: u64 = 5;

const TOKEN_ENV_VARS: &[&str] = &["REGISTRY_SERVICE_TOKEN", "REGISTRY_API_TOKEN"];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<chrono::DateTime<chrono::Utc>>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficePatch {
    pub skyoffice_world_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantKey {
    pub key_type: Option<String>,
    #[serde(default)]
    pub secrets_path: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl TenantKey {
    /// `metadata.paths[0]`, falling back to `secretsPath` (spec §4.C tier 2).
    pub fn resolved_path(&self) -> Option<String> {
        self.metadata
            .get("paths")
            .and_then(|p| p.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.secrets_path.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialResponse {
    #[serde(alias = "sharedSecret", alias = "shared_secret")]
    pub shared_secret: Option<String>,
}

pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("reqwest client builds with static config");

        let token = TOKEN_ENV_VARS
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            req = req
                .header("Authorization", format!("Bearer {token}"))
                .header("X-Registry-Service-Token", token);
        }
        req
    }

    /// `GET /offices`. Network/parse failures are logged and an empty list
    /// is returned — reconciliation is eventually consistent.
    pub async fn list_offices(&self) -> Vec<RegistryOffice> {
        match self.request(reqwest::Method::GET, "/offices").send().await {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => resp.json::<Vec<RegistryOffice>>().await.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "failed to parse /offices response");
                    Vec::new()
                }),
                Err(err) => {
                    tracing::warn!(error = %err, "GET /offices returned an error status");
                    Vec::new()
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "GET /offices failed");
                Vec::new()
            }
        }
    }

    /// `GET /offices/{officeId}/agents`.
    pub async fn list_agents(&self, office_id: &str) -> Vec<RegistryAgent> {
        let path = format!("/offices/{office_id}/agents");
        match self.request(reqwest::Method::GET, &path).send().await {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => resp.json::<Vec<RegistryAgent>>().await.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, office_id, "failed to parse agents response");
                    Vec::new()
                }),
                Err(err) => {
                    tracing::warn!(error = %err, office_id, "GET agents returned an error status");
                    Vec::new()
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, office_id, "GET agents failed");
                Vec::new()
            }
        }
    }

    /// `PATCH /offices/{officeId}/agents/{agentId}`. Best-effort telemetry.
    pub async fn patch_agent(&self, office_id: &str, agent_id: &str, patch: &AgentPatch) {
        let path = format!("/offices/{office_id}/agents/{agent_id}");
        if let Err(err) = self
            .request(reqwest::Method::PATCH, &path)
            .json(patch)
            .send()
            .await
        {
            tracing::warn!(error = %err, office_id, agent_id, "PATCH agent failed");
        }
    }

    /// `PATCH /offices/{officeId}` with the live room id.
    pub async fn patch_office(&self, office_id: &str, patch: &OfficePatch) {
        let path = format!("/offices/{office_id}");
        if let Err(err) = self
            .request(reqwest::Method::PATCH, &path)
            .json(patch)
            .send()
            .await
        {
            tracing::warn!(error = %err, office_id, "PATCH office failed");
        }
    }

    /// `GET /offices/{officeId}/tenant-keys`, consumed by the secret resolver.
    pub async fn tenant_keys(&self, office_id: &str) -> Vec<TenantKey> {
        let path = format!("/offices/{office_id}/tenant-keys");
        match self.request(reqwest::Method::GET, &path).send().await {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => resp.json::<Vec<TenantKey>>().await.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, office_id, "failed to parse tenant-keys response");
                    Vec::new()
                }),
                Err(err) => {
                    tracing::warn!(error = %err, office_id, "GET tenant-keys returned an error status");
                    Vec::new()
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, office_id, "GET tenant-keys failed");
                Vec::new()
            }
        }
    }

    /// `POST /offices/{officeId}/presence/agents/{agentId}/credential`.
    /// Returns `None` on any failure (network, status, parse) — the secret
    /// resolver treats this tier as exhausted, not as an error to propagate.
    pub async fn fetch_agent_credential(&self, office_id: &str, agent_id: &str) -> Option<String> {
        let path = format!("/offices/{office_id}/presence/agents/{agent_id}/credential");
        let resp = self
            .request(reqwest::Method::POST, &path)
            .send()
            .await
            .ok()?;
        let resp = resp.error_for_status().ok()?;
        let body: CredentialResponse = resp.json().await.ok()?;
        body.shared_secret.filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_key_prefers_metadata_paths_over_secrets_path() {
        let key = TenantKey {
            key_type: Some("shared:skyoffice-server".into()),
            secrets_path: Some("fallback/path".into()),
            metadata: serde_json::json!({ "paths": ["primary/path"] }),
        };
        assert_eq!(key.resolved_path().as_deref(), Some("primary/path"));
    }

    #[test]
    fn tenant_key_falls_back_to_secrets_path() {
        let key = TenantKey {
            key_type: Some("shared:skyoffice-server".into()),
            secrets_path: Some("fallback/path".into()),
            metadata: Value::Null,
        };
        assert_eq!(key.resolved_path().as_deref(), Some("fallback/path"));
    }
}
