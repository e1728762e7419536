//! Content-based hashing for run IDs.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Run id derived from everything that determines a run's output: the model
/// structure, the run configuration, the parameter values and the engine
/// version. Identical inputs give identical ids.
pub fn compute_run_id<C: Serialize>(
    model_fingerprint: &str,
    config: &C,
    parameters: &[f64],
    engine_version: &str,
) -> String {
    let mut hasher = Sha256::new();

    hasher.update(model_fingerprint.as_bytes());

    let config_json = serde_json::to_string(config).unwrap_or_default();
    hasher.update(config_json.as_bytes());

    for p in parameters {
        hasher.update(p.to_bits().to_le_bytes());
    }

    hasher.update(engine_version.as_bytes());

    let result = hasher.finalize();
    format!("{:x}", result)
}
