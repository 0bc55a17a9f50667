use serde::{Deserialize, Serialize};

/// Fire-and-forget cache-invalidation webhook config (spec §4.I `DELETE
/// /api/rooms/{slug}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatBridgeConfig {
    #[serde(default = "d_url")]
    pub url: String,
}

impl Default for ChatBridgeConfig {
    fn default() -> Self {
        Self { url: d_url() }
    }
}

fn d_url() -> String {
    "http://localhost:3020".into()
}
