//! Column metadata for recorded variables.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// One recorded variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// `component/name`, or just `name` for top-level variables.
    pub uri: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
}

impl ColumnInfo {
    pub fn new(component: &str, name: &str, unit: impl Into<String>) -> Self {
        let uri = if component.is_empty() {
            name.to_string()
        } else {
            format!("{component}/{name}")
        };
        Self {
            uri,
            label: name.to_string(),
            unit: unit.into(),
        }
    }
}

/// Case-insensitive ordering by uri, ties broken by exact uri.
pub fn compare_uri(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

pub fn sort_columns(columns: &mut [ColumnInfo]) {
    columns.sort_by(|a, b| compare_uri(&a.uri, &b.uri));
}
