use crate::entities::run::{BacktestRun, RunRecord};
use crate::value_objects::trade::Trade;

pub trait RunSink {
    /// Persists a finalized run and returns the id it was stored under.
    fn save_run(&self, run: &BacktestRun, trades: &[Trade]) -> Result<String, String>;
}

pub trait RunReader {
    fn list_runs(&self) -> Result<Vec<RunRecord>, String>;
    fn load_run(&self, run_id: &str) -> Result<RunRecord, String>;
}
