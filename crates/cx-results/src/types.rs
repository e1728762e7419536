//! Archived run metadata.

use serde::{Deserialize, Serialize};

use crate::column::ColumnInfo;

pub type RunId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub model_name: String,
    pub model_fingerprint: String,
    pub timestamp: String,
    pub solver: String,
    pub start_time: f64,
    pub end_time: f64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
    pub point_count: usize,
    pub columns: Vec<ColumnInfo>,
}

/// Current UTC time in RFC 3339, as stored in manifests.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339()
}
