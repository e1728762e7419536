//! Directory-backed archive of finished runs.
//!
//! Each run gets `<root>/<run_id>/manifest.json` plus
//! `<root>/<run_id>/timeseries.jsonl` with one [`RecordedPoint`] per line.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::store::{RecordedPoint, Snapshot};
use crate::table::ResultsTable;
use crate::types::RunManifest;
use crate::{ResultsError, ResultsResult};

#[derive(Debug, Clone)]
pub struct RunArchive {
    root_dir: PathBuf,
}

impl RunArchive {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    /// Archive stored next to a model file, under `.cellex/runs`.
    pub fn for_model_file(model_path: &Path) -> ResultsResult<Self> {
        let dir = model_path.parent().unwrap_or_else(|| Path::new("."));
        Self::new(dir.join(".cellex").join("runs"))
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root_dir.join(run_id)
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.run_dir(run_id).join("manifest.json").exists()
    }

    pub fn save_run(&self, manifest: &RunManifest, snapshot: &Snapshot) -> ResultsResult<()> {
        let run_dir = self.run_dir(&manifest.run_id);
        fs::create_dir_all(&run_dir)?;

        let manifest_json = serde_json::to_string_pretty(manifest)?;
        fs::write(run_dir.join("manifest.json"), manifest_json)?;

        let mut timeseries = String::new();
        for point in snapshot.points() {
            timeseries.push_str(&serde_json::to_string(point.as_ref())?);
            timeseries.push('\n');
        }
        fs::write(run_dir.join("timeseries.jsonl"), timeseries)?;

        debug!(
            run_id = %manifest.run_id,
            points = snapshot.len(),
            "Run archived"
        );
        Ok(())
    }

    pub fn load_manifest(&self, run_id: &str) -> ResultsResult<RunManifest> {
        let manifest_path = self.run_dir(run_id).join("manifest.json");
        if !manifest_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let content = fs::read_to_string(manifest_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn load_timeseries(&self, run_id: &str) -> ResultsResult<Vec<RecordedPoint>> {
        let timeseries_path = self.run_dir(run_id).join("timeseries.jsonl");
        if !timeseries_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let content = fs::read_to_string(timeseries_path)?;
        let mut points = Vec::new();
        for line in content.lines() {
            if !line.trim().is_empty() {
                points.push(serde_json::from_str(line)?);
            }
        }
        Ok(points)
    }

    /// Archived run as a table with every column.
    pub fn load_table(&self, run_id: &str) -> ResultsResult<ResultsTable> {
        let manifest = self.load_manifest(run_id)?;
        let points = self.load_timeseries(run_id)?;

        let mut headers = Vec::with_capacity(manifest.columns.len() + 1);
        headers.push("time".to_string());
        headers.extend(manifest.columns.iter().map(|c| c.uri.clone()));
        let rows = points
            .into_iter()
            .map(|p| {
                let mut row = Vec::with_capacity(p.values.len() + 1);
                row.push(p.time);
                row.extend(p.values);
                row
            })
            .collect();
        Ok(ResultsTable { headers, rows })
    }

    /// Manifests of every archived run, optionally only those of one model,
    /// newest first.
    pub fn list_runs(&self, model_name: Option<&str>) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = Vec::new();
        if !self.root_dir.exists() {
            return Ok(runs);
        }

        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let run_id = entry.file_name().to_string_lossy().to_string();
            if let Ok(manifest) = self.load_manifest(&run_id) {
                if model_name.is_none_or(|name| manifest.model_name == name) {
                    runs.push(manifest);
                }
            }
        }

        runs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(runs)
    }

    pub fn delete_run(&self, run_id: &str) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id);
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        Ok(())
    }
}
