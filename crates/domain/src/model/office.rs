use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Registry-declared office (tenant namespace).
///
/// `namespace_slug` is the primary key this system uses everywhere; the
/// office id and domain are Registry-side concerns we carry through
/// untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryOffice {
    pub office_id: String,
    pub namespace_slug: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Free-form metadata; only a handful of keys are ever parsed
    /// (`defaultAgentId`, `customDomain`, ...) — everything else passes
    /// through opaque.
    #[serde(default)]
    pub metadata: Value,
}

impl RegistryOffice {
    /// Lowercased namespace slug, the canonical key for this office.
    pub fn slug(&self) -> String {
        self.namespace_slug.to_lowercase()
    }

    /// Lowercased domain, if present.
    pub fn domain_lower(&self) -> Option<String> {
        self.domain.as_ref().map(|d| d.to_lowercase())
    }

    /// `metadata.defaultAgentId`, if present and a string.
    pub fn default_agent_id(&self) -> Option<String> {
        self.metadata
            .get("defaultAgentId")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}
