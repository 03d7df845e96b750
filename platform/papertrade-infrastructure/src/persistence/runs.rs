use crate::reporting;
use papertrade_domain::entities::run::{BacktestRun, RunRecord};
use papertrade_domain::repositories::runs::{RunReader, RunSink};
use papertrade_domain::value_objects::trade::Trade;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

const RUN_FILE: &str = "run.json";

/// Stores each run under `{root}/{run_id}/` as `run.json`, `trades.csv`, `equity.csv`
/// and `logs.jsonl`.
#[derive(Debug, Clone)]
pub struct FilesystemRunStore {
    root: PathBuf,
}

impl FilesystemRunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    fn write_all(&self, dir: &Path, run: &BacktestRun, trades: &[Trade]) -> Result<(), String> {
        fs::create_dir_all(dir)
            .map_err(|err| format!("failed to create dir {}: {}", dir.display(), err))?;
        reporting::write_trades_csv(&dir.join("trades.csv"), trades)?;
        reporting::write_equity_csv(&dir.join("equity.csv"), &run.equity_curve)?;
        reporting::write_audit_jsonl(&dir.join("logs.jsonl"), &run.audit_events)?;
        // Header last: a directory without run.json is an incomplete save.
        reporting::write_run_json(&dir.join(RUN_FILE), &run.record())
    }
}

fn record_metrics<T>(kind: &'static str, start: Instant, result: &Result<T, String>) {
    let result_label = if result.is_ok() { "ok" } else { "err" };
    metrics::counter!(
        "papertrade.infra.runs.calls_total",
        "kind" => kind,
        "result" => result_label
    )
    .increment(1);
    metrics::histogram!("papertrade.infra.runs.duration_ms", "kind" => kind, "result" => result_label)
        .record(start.elapsed().as_millis() as f64);
}

impl RunSink for FilesystemRunStore {
    fn save_run(&self, run: &BacktestRun, trades: &[Trade]) -> Result<String, String> {
        let start = Instant::now();
        let dir = self.run_dir(&run.run_id);
        let result = self
            .write_all(&dir, run, trades)
            .map(|_| run.run_id.clone());
        record_metrics("save", start, &result);
        if result.is_ok() {
            info!(run_id = %run.run_id, dir = %dir.display(), trades = trades.len(), "run saved");
        }
        result
    }
}

impl RunReader for FilesystemRunStore {
    fn list_runs(&self) -> Result<Vec<RunRecord>, String> {
        let start = Instant::now();
        let result = self.scan();
        record_metrics("list", start, &result);
        result
    }

    fn load_run(&self, run_id: &str) -> Result<RunRecord, String> {
        let start = Instant::now();
        let path = self.run_dir(run_id).join(RUN_FILE);
        let result = if path.exists() {
            reporting::read_run_json(&path)
        } else {
            Err(format!("run not found: {run_id}"))
        };
        record_metrics("load", start, &result);
        result
    }
}

impl FilesystemRunStore {
    fn scan(&self) -> Result<Vec<RunRecord>, String> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root)
            .map_err(|err| format!("failed to read runs dir {}: {}", self.root.display(), err))?;
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| format!("failed to read runs dir entry: {err}"))?;
            let path = entry.path().join(RUN_FILE);
            if !path.is_file() {
                continue;
            }
            match reporting::read_run_json(&path) {
                Ok(record) => records.push(record),
                Err(err) => warn!(error = %err, "skipping unreadable run"),
            }
        }
        Ok(records)
    }
}
