//! Blob link identifiers.
//!
//! A blob column resolves to `<base>/blobs?id=<id>` where `id` is the
//! URL-safe base64 of `{table, field, primaryField, primaryKey}` as JSON.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobId {
    pub table: String,
    pub field: String,
    pub primary_field: String,
    pub primary_key: Value,
}

impl BlobId {
    pub fn encode(&self) -> anyhow::Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(self)?))
    }

    pub fn decode(id: &str) -> anyhow::Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(id.trim())
            .map_err(|e| anyhow::anyhow!("invalid blob id: {}", e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn link(&self, base: &str) -> anyhow::Result<String> {
        Ok(format!("{}/blobs?id={}", base.trim_end_matches('/'), self.encode()?))
    }

    /// Primary key as text, for comparison against `column::text`.
    pub fn primary_key_text(&self) -> String {
        match &self.primary_key {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
