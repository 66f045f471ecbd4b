use crate::registry::{TaskRegistry, TaskStatistics};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// JSON record of one deployment run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub statistics: TaskStatistics,
    pub progress: f64,
    pub tasks: Vec<serde_json::Value>,
}

impl RunReport {
    /// Snapshot the registry at the end of a run.
    pub fn collect(registry: &TaskRegistry, started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at,
            finished_at: Utc::now(),
            dry_run,
            statistics: registry.get_statistics(),
            progress: registry.get_progress(),
            tasks: registry
                .get_all_tasks()
                .iter()
                .map(|t| t.to_summary_json())
                .collect(),
        }
    }

    /// Directory for reports under a data dir: `<data_dir>/reports`.
    pub fn reports_dir(data_dir: &Path) -> PathBuf {
        data_dir.join("reports")
    }

    /// Write `<dir>/<run_id>.json`.
    /// Returns Ok(None) if a report with that id already exists.
    pub fn write_to_dir(&self, dir: &Path) -> Result<Option<PathBuf>, std::io::Error> {
        let path = dir.join(format!("{}.json", self.run_id));
        if path.exists() {
            return Ok(None);
        }

        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&path, json)?;
        Ok(Some(path))
    }
}
