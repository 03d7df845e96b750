use crate::backtesting::{agent_section, run_spec, simulate, technical_provider};
use crate::config::{parse_config, Config};
use crate::shared::{parse_date, to_hex_short};
use chrono::NaiveDate;
use papertrade_domain::entities::agent::AgentConfig;
use papertrade_domain::entities::metrics::MetricsSummary;
use papertrade_domain::repositories::market_data::{BarQuery, HistoricalBarSource};
use papertrade_domain::repositories::sentiment::SentimentSource;
use papertrade_domain::repositories::technical::TechnicalIndicatorSource;
use papertrade_domain::value_objects::bar::Bar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Instant;
use tracing::{info, info_span, warn};

/// Agent fields a sweep may vary. Identity fields (`id`, `symbol`, `timeframe`) stay
/// fixed so every combination sees the same bars.
const SWEEPABLE_FIELDS: [&str; 7] = [
    "stop_loss_pct",
    "take_profit_pct",
    "min_confidence",
    "entry_threshold",
    "exit_threshold",
    "max_position_size",
    "max_daily_trades",
];

const STATUS_FINALIZED: &str = "finalized";
const STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepFile {
    pub base: SweepBase,
    pub sweep: SweepMeta,
    #[serde(default)]
    pub params: Vec<SweepParam>,
    pub leaderboard: Option<LeaderboardConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepBase {
    pub config: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepMeta {
    pub id: String,
    pub agent: String,
    pub start: String,
    pub end: String,
    pub parallelism: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepParam {
    pub path: String,
    pub values: Vec<toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeaderboardConfig {
    pub sort_by: Option<String>,
    pub descending: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepRunEntry {
    pub run_id: String,
    pub params: BTreeMap<String, toml::Value>,
    pub status: String,
    pub error: Option<String>,
    pub metrics: Option<SweepMetrics>,
}

impl SweepRunEntry {
    pub fn is_finalized(&self) -> bool {
        self.status == STATUS_FINALIZED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepMetrics {
    pub bars_processed: usize,
    pub trades: usize,
    pub closed_trades: usize,
    pub win_rate: f64,
    pub net_profit: f64,
    pub total_return_pct: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
}

impl From<&MetricsSummary> for SweepMetrics {
    fn from(summary: &MetricsSummary) -> Self {
        Self {
            bars_processed: summary.bars_processed,
            trades: summary.total_trades,
            closed_trades: summary.closed_trades,
            win_rate: summary.win_rate,
            net_profit: summary.net_profit,
            total_return_pct: summary.total_return_pct,
            sharpe_ratio: summary.sharpe_ratio,
            max_drawdown_pct: summary.max_drawdown_pct,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub sweep_id: String,
    pub agent_id: String,
    pub sweep_dir: PathBuf,
    pub base_config: String,
    pub start: String,
    pub end: String,
    pub runs: Vec<SweepRunEntry>,
}

/// A parsed sweep file together with the base config it points at.
#[derive(Debug, Clone)]
pub struct LoadedSweep {
    pub sweep: SweepFile,
    pub base_config_path: PathBuf,
    pub base_config: Config,
    base_toml: toml::Value,
}

pub fn load_sweep(sweep_path: &Path) -> Result<LoadedSweep, String> {
    let raw = std::fs::read_to_string(sweep_path).map_err(|err| {
        format!(
            "failed to read sweep config {}: {err}",
            sweep_path.display()
        )
    })?;
    let sweep: SweepFile = toml::from_str(&raw)
        .map_err(|err| format!("failed to parse sweep TOML {}: {err}", sweep_path.display()))?;
    validate_param_paths(&sweep.params)?;

    let base_config_path = resolve_base_config_path(sweep_path, &sweep.base.config);
    let (base_config, base_source) =
        crate::config::load_config_with_source(base_config_path.as_path())?;
    let base_toml: toml::Value = toml::from_str(&base_source)
        .map_err(|err| format!("failed to parse base config TOML as value: {err}"))?;
    agent_section(&base_config, &sweep.sweep.agent)?;

    Ok(LoadedSweep {
        sweep,
        base_config_path,
        base_config,
        base_toml,
    })
}

pub fn run_sweep(
    loaded: &LoadedSweep,
    market_data: &dyn HistoricalBarSource,
    sentiment: &(dyn SentimentSource + Sync),
) -> Result<SweepResult, String> {
    let sweep = &loaded.sweep;
    let _span = info_span!(
        "run_sweep",
        sweep_id = %sweep.sweep.id,
        agent_id = %sweep.sweep.agent
    )
    .entered();
    let started = Instant::now();

    let start = parse_date(&sweep.sweep.start)?;
    let end = parse_date(&sweep.sweep.end)?;
    let technical = technical_provider(&loaded.base_config)?;

    let base_agent = agent_section(&loaded.base_config, &sweep.sweep.agent)?
        .to_agent_config()
        .map_err(|err| format!("invalid base agent '{}': {err}", sweep.sweep.agent))?;
    let query = BarQuery::for_dates(&base_agent.symbol, base_agent.timeframe.clone(), start, end);
    let (bars, report) = market_data.load_bars(&query)?;
    if !report.is_clean() {
        warn!(
            duplicates = report.duplicates,
            gaps = report.gaps,
            invalid_close = report.invalid_close,
            "sweep data has quality issues"
        );
    }

    let sweep_dir = PathBuf::from(&loaded.base_config.run.out_dir)
        .join("sweeps")
        .join(&sweep.sweep.id);
    std::fs::create_dir_all(&sweep_dir)
        .map_err(|err| format!("failed to create sweep dir {}: {err}", sweep_dir.display()))?;

    let grid = expand_grid(&sweep.params);
    let mut plans = Vec::with_capacity(grid.len());
    for (order_idx, assignment) in grid.into_iter().enumerate() {
        let mut toml_value = loaded.base_toml.clone();
        apply_assignment(&mut toml_value, &sweep.sweep.agent, &assignment)?;
        let run_id = format!("{}__{}", sweep.sweep.id, assignment_hash(&assignment));
        plans.push(SweepRunPlan {
            order_idx,
            run_id,
            agent: generated_agent(&toml_value, &sweep.sweep.agent),
            params: assignment,
        });
    }

    let parallelism = normalize_parallelism(sweep.sweep.parallelism);
    info!(
        runs = plans.len(),
        bars = bars.len(),
        parallelism,
        "starting sweep"
    );
    let context = PlanContext {
        config: &loaded.base_config,
        start,
        end,
        bars: &bars,
        technical: &technical,
        sentiment,
    };
    let mut executed = if parallelism <= 1 || plans.len() <= 1 {
        execute_plans_serial(&plans, &context)
    } else {
        execute_plans_parallel(&plans, parallelism, &context)?
    };
    executed.sort_by_key(|(order_idx, _)| *order_idx);

    let result = SweepResult {
        sweep_id: sweep.sweep.id.clone(),
        agent_id: sweep.sweep.agent.clone(),
        sweep_dir: sweep_dir.clone(),
        base_config: loaded.base_config_path.display().to_string(),
        start: start.to_string(),
        end: end.to_string(),
        runs: executed.into_iter().map(|(_, entry)| entry).collect(),
    };

    write_manifest(&sweep_dir, &result)?;
    write_results_csv(&sweep_dir, &result)?;
    write_leaderboard_csv(&sweep_dir, &result, sweep.leaderboard.as_ref())?;

    metrics::histogram!("papertrade.sweep.duration_ms")
        .record(started.elapsed().as_millis() as f64);
    info!(
        runs = result.runs.len(),
        failed = result.runs.iter().filter(|r| !r.is_finalized()).count(),
        dir = %sweep_dir.display(),
        "sweep complete"
    );
    Ok(result)
}

#[derive(Debug, Clone)]
struct SweepRunPlan {
    order_idx: usize,
    run_id: String,
    params: BTreeMap<String, toml::Value>,
    agent: Result<AgentConfig, String>,
}

/// Read-only inputs shared by every plan.
struct PlanContext<'a> {
    config: &'a Config,
    start: NaiveDate,
    end: NaiveDate,
    bars: &'a [Bar],
    technical: &'a (dyn TechnicalIndicatorSource + Sync),
    sentiment: &'a (dyn SentimentSource + Sync),
}

struct WorkerMessage {
    order_idx: usize,
    entry: SweepRunEntry,
}

fn normalize_parallelism(value: Option<usize>) -> usize {
    value.unwrap_or(1).max(1)
}

fn generated_agent(toml_value: &toml::Value, agent_id: &str) -> Result<AgentConfig, String> {
    let config_toml = toml::to_string_pretty(toml_value)
        .map_err(|err| format!("failed to serialize sweep config TOML: {err}"))?;
    let config = parse_config(&config_toml)
        .map_err(|err| format!("failed to parse generated config TOML: {err}"))?;
    let section = agent_section(&config, agent_id)?;
    section.to_agent_config().map_err(|err| err.to_string())
}

fn execute_plans_serial(
    plans: &[SweepRunPlan],
    context: &PlanContext<'_>,
) -> Vec<(usize, SweepRunEntry)> {
    plans
        .iter()
        .map(|plan| (plan.order_idx, execute_run_plan(plan, context)))
        .collect()
}

fn execute_plans_parallel(
    plans: &[SweepRunPlan],
    parallelism: usize,
    context: &PlanContext<'_>,
) -> Result<Vec<(usize, SweepRunEntry)>, String> {
    let worker_count = parallelism.max(1).min(plans.len());
    let next_index = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<WorkerMessage>();

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let tx = tx.clone();
            let next_index_ref = &next_index;
            scope.spawn(move || loop {
                let plan_idx = next_index_ref.fetch_add(1, Ordering::Relaxed);
                if plan_idx >= plans.len() {
                    break;
                }
                let plan = &plans[plan_idx];
                let entry = execute_run_plan(plan, context);
                if tx
                    .send(WorkerMessage {
                        order_idx: plan.order_idx,
                        entry,
                    })
                    .is_err()
                {
                    break;
                }
            });
        }

        drop(tx);

        let mut entries: Vec<(usize, SweepRunEntry)> = Vec::with_capacity(plans.len());
        while let Ok(message) = rx.recv() {
            entries.push((message.order_idx, message.entry));
        }

        if entries.len() != plans.len() {
            return Err(format!(
                "internal sweep error: expected {} results, got {}",
                plans.len(),
                entries.len()
            ));
        }
        Ok(entries)
    })
}

fn execute_run_plan(plan: &SweepRunPlan, context: &PlanContext<'_>) -> SweepRunEntry {
    let result = plan.agent.clone().and_then(|agent| {
        let spec = run_spec(context.config, plan.run_id.clone(), context.start, context.end);
        simulate(
            spec,
            agent,
            context.bars.to_vec(),
            context.technical,
            context.sentiment,
        )
        .map_err(|err| err.to_string())
    });

    match result {
        Ok(run) => {
            metrics::counter!("papertrade.sweep.runs", "status" => STATUS_FINALIZED).increment(1);
            SweepRunEntry {
                run_id: plan.run_id.clone(),
                params: plan.params.clone(),
                status: STATUS_FINALIZED.to_string(),
                error: None,
                metrics: Some(SweepMetrics::from(&run.metrics)),
            }
        }
        Err(err) => {
            metrics::counter!("papertrade.sweep.runs", "status" => STATUS_FAILED).increment(1);
            warn!(run_id = %plan.run_id, error = %err, "sweep combination failed");
            SweepRunEntry {
                run_id: plan.run_id.clone(),
                params: plan.params.clone(),
                status: STATUS_FAILED.to_string(),
                error: Some(err),
                metrics: None,
            }
        }
    }
}

fn resolve_base_config_path(sweep_path: &Path, base: &str) -> PathBuf {
    let p = PathBuf::from(base);
    if p.is_absolute() {
        p
    } else {
        sweep_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(p)
    }
}

fn validate_param_paths(params: &[SweepParam]) -> Result<(), String> {
    for p in params {
        let path = p.path.trim();
        if path.is_empty() {
            return Err("sweep param path cannot be empty".to_string());
        }
        if !SWEEPABLE_FIELDS.contains(&path) {
            return Err(format!(
                "sweep param path not allowed: {} (allowed: {})",
                p.path,
                SWEEPABLE_FIELDS.join(", ")
            ));
        }
        if p.values.is_empty() {
            return Err(format!("sweep param has no values: {}", p.path));
        }
    }
    Ok(())
}

fn expand_grid(params: &[SweepParam]) -> Vec<BTreeMap<String, toml::Value>> {
    let mut out: Vec<BTreeMap<String, toml::Value>> = vec![BTreeMap::new()];
    for p in params {
        let mut next: Vec<BTreeMap<String, toml::Value>> = Vec::new();
        for base in &out {
            for v in &p.values {
                let mut m = base.clone();
                m.insert(p.path.trim().to_string(), v.clone());
                next.push(m);
            }
        }
        out = next;
    }
    out
}

fn assignment_hash(assignment: &BTreeMap<String, toml::Value>) -> String {
    let canonical = serde_json::to_string(assignment)
        .unwrap_or_else(|_| "{\"error\":\"assignment\"}".to_string());
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let bytes = hasher.finalize();
    to_hex_short(&bytes[..], 12)
}

fn apply_assignment(
    root: &mut toml::Value,
    agent_id: &str,
    assignment: &BTreeMap<String, toml::Value>,
) -> Result<(), String> {
    for (field, value) in assignment {
        set_agent_field(root, agent_id, field, value.clone())?;
    }
    Ok(())
}

/// Overwrites `field` on the `[[agents]]` entry whose `id` is `agent_id`. The field
/// must already be present.
fn set_agent_field(
    root: &mut toml::Value,
    agent_id: &str,
    field: &str,
    value: toml::Value,
) -> Result<(), String> {
    let agents = root
        .get_mut("agents")
        .and_then(|agents| agents.as_array_mut())
        .ok_or_else(|| "base config has no [[agents]] entries".to_string())?;
    let table = agents
        .iter_mut()
        .filter_map(|agent| agent.as_table_mut())
        .find(|agent| agent.get("id").and_then(|id| id.as_str()) == Some(agent_id))
        .ok_or_else(|| format!("agent not found in base config: {agent_id}"))?;
    if !table.contains_key(field) {
        return Err(format!("path not found: agents[{agent_id}].{field}"));
    }
    table.insert(field.to_string(), value);
    Ok(())
}

fn write_manifest(dir: &Path, result: &SweepResult) -> Result<(), String> {
    let path = dir.join("manifest.json");
    let json = serde_json::to_string_pretty(result)
        .map_err(|err| format!("failed to serialize manifest: {err}"))?;
    std::fs::write(&path, json)
        .map_err(|err| format!("failed to write {}: {err}", path.display()))?;
    Ok(())
}

fn params_label(params: &BTreeMap<String, toml::Value>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(";")
}

fn write_results_csv(dir: &Path, result: &SweepResult) -> Result<(), String> {
    let path = dir.join("results.csv");
    let mut wtr = csv::Writer::from_path(&path)
        .map_err(|err| format!("failed to create {}: {err}", path.display()))?;
    wtr.write_record([
        "run_id",
        "params",
        "status",
        "bars_processed",
        "trades",
        "win_rate",
        "net_profit",
        "total_return_pct",
        "sharpe_ratio",
        "max_drawdown_pct",
        "error",
    ])
    .map_err(|err| format!("failed to write results header: {err}"))?;

    for r in &result.runs {
        let m = r.metrics;
        let record = vec![
            r.run_id.clone(),
            params_label(&r.params),
            r.status.clone(),
            m.map(|m| m.bars_processed.to_string()).unwrap_or_default(),
            m.map(|m| m.trades.to_string()).unwrap_or_default(),
            m.map(|m| format!("{}", m.win_rate)).unwrap_or_default(),
            m.map(|m| format!("{}", m.net_profit)).unwrap_or_default(),
            m.map(|m| format!("{}", m.total_return_pct))
                .unwrap_or_default(),
            m.map(|m| format!("{}", m.sharpe_ratio)).unwrap_or_default(),
            m.map(|m| format!("{}", m.max_drawdown_pct))
                .unwrap_or_default(),
            r.error.clone().unwrap_or_default(),
        ];
        wtr.write_record(record)
            .map_err(|err| format!("failed to write results row: {err}"))?;
    }
    wtr.flush()
        .map_err(|err| format!("failed to flush {}: {err}", path.display()))?;
    Ok(())
}

fn leaderboard_rows<'a>(
    result: &'a SweepResult,
    cfg: Option<&LeaderboardConfig>,
) -> Vec<(&'a SweepRunEntry, SweepMetrics)> {
    let sort_by = cfg
        .and_then(|c| c.sort_by.as_deref())
        .unwrap_or("total_return_pct")
        .trim()
        .to_lowercase();
    let descending = cfg.and_then(|c| c.descending).unwrap_or(true);

    let mut rows: Vec<(&SweepRunEntry, SweepMetrics)> = result
        .runs
        .iter()
        .filter(|r| r.is_finalized())
        .filter_map(|r| r.metrics.map(|m| (r, m)))
        .collect();
    rows.sort_by(|(_, a), (_, b)| {
        let av = metric_value(*a, &sort_by);
        let bv = metric_value(*b, &sort_by);
        let ord = bv.partial_cmp(&av).unwrap_or(std::cmp::Ordering::Equal);
        if descending {
            ord
        } else {
            ord.reverse()
        }
    });
    rows
}

fn write_leaderboard_csv(
    dir: &Path,
    result: &SweepResult,
    cfg: Option<&LeaderboardConfig>,
) -> Result<(), String> {
    let rows = leaderboard_rows(result, cfg);

    let path = dir.join("leaderboard.csv");
    let mut wtr = csv::Writer::from_path(&path)
        .map_err(|err| format!("failed to create {}: {err}", path.display()))?;
    wtr.write_record([
        "rank",
        "run_id",
        "params",
        "trades",
        "win_rate",
        "net_profit",
        "total_return_pct",
        "sharpe_ratio",
        "max_drawdown_pct",
    ])
    .map_err(|err| format!("failed to write leaderboard header: {err}"))?;

    for (idx, (r, m)) in rows.iter().enumerate() {
        let record = vec![
            (idx + 1).to_string(),
            r.run_id.clone(),
            params_label(&r.params),
            m.trades.to_string(),
            format!("{}", m.win_rate),
            format!("{}", m.net_profit),
            format!("{}", m.total_return_pct),
            format!("{}", m.sharpe_ratio),
            format!("{}", m.max_drawdown_pct),
        ];
        wtr.write_record(record)
            .map_err(|err| format!("failed to write leaderboard row: {err}"))?;
    }
    wtr.flush()
        .map_err(|err| format!("failed to flush {}: {err}", path.display()))?;
    Ok(())
}

fn metric_value(m: SweepMetrics, key: &str) -> f64 {
    match key {
        "net_profit" => m.net_profit,
        "sharpe" | "sharpe_ratio" => m.sharpe_ratio,
        "max_drawdown" | "max_dd" | "max_drawdown_pct" => m.max_drawdown_pct,
        "trades" => m.trades as f64,
        "win_rate" => m.win_rate,
        _ => m.total_return_pct,
    }
}
