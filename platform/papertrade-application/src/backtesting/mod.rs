use crate::config::{AgentSection, Config};
use crate::shared::{build_run_id, timing_event};
use chrono::NaiveDate;
use papertrade_domain::entities::agent::AgentConfig;
use papertrade_domain::entities::run::{BacktestRun, RunSpec};
use papertrade_domain::repositories::market_data::{BarQuery, HistoricalBarSource};
use papertrade_domain::repositories::runs::RunSink;
use papertrade_domain::repositories::sentiment::SentimentSource;
use papertrade_domain::repositories::technical::TechnicalIndicatorSource;
use papertrade_domain::services::engine::backtest::{BacktestOrchestrator, EngineError};
use papertrade_domain::services::market_data_source::VecBarSource;
use papertrade_domain::services::ohlcv::DataQualityReport;
use papertrade_domain::services::technical::WindowedTechnicalProvider;
use papertrade_domain::value_objects::bar::Bar;
use std::time::Instant;
use tracing::{info, info_span, warn};

pub use crate::shared::parse_date;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRequest {
    pub agent_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub save: bool,
}

#[derive(Debug)]
pub struct BacktestOutcome {
    pub run: BacktestRun,
    pub data_report: DataQualityReport,
    /// Id returned by the run store, `None` with `--no-save`.
    pub saved_as: Option<String>,
}

pub fn technical_provider(config: &Config) -> Result<WindowedTechnicalProvider, String> {
    WindowedTechnicalProvider::new(config.technical)
        .map_err(|err| format!("invalid [technical] section: {err}"))
}

pub fn agent_section<'a>(config: &'a Config, agent_id: &str) -> Result<&'a AgentSection, String> {
    config.agent(agent_id).ok_or_else(|| {
        let known: Vec<&str> = config.agents.iter().map(|a| a.id.as_str()).collect();
        format!(
            "unknown agent: {agent_id} (configured: {})",
            if known.is_empty() {
                "none".to_string()
            } else {
                known.join(", ")
            }
        )
    })
}

pub fn run_spec(config: &Config, run_id: String, start: NaiveDate, end: NaiveDate) -> RunSpec {
    RunSpec {
        run_id,
        start_date: start,
        end_date: end,
        initial_capital: config.run.initial_capital,
        calendar: config.calendar(),
        metrics: config.metrics_config(),
    }
}

/// Runs one agent over pre-loaded bars. Shared by the single-run use case and the
/// parameter sweep.
pub fn simulate(
    spec: RunSpec,
    agent: AgentConfig,
    bars: Vec<Bar>,
    technical: &dyn TechnicalIndicatorSource,
    sentiment: &dyn SentimentSource,
) -> Result<BacktestRun, EngineError> {
    let mut orchestrator =
        BacktestOrchestrator::new(spec, agent, VecBarSource::new(bars), technical, sentiment);
    orchestrator.run()
}

pub fn run_backtest(
    config: &Config,
    request: &BacktestRequest,
    market_data: &dyn HistoricalBarSource,
    technical: &dyn TechnicalIndicatorSource,
    sentiment: &dyn SentimentSource,
    sink: &dyn RunSink,
) -> Result<BacktestOutcome, String> {
    let section = agent_section(config, &request.agent_id)?;
    let _span = info_span!(
        "run_backtest",
        agent_id = %request.agent_id,
        symbol = %section.symbol,
        timeframe = %section.timeframe
    )
    .entered();

    let agent = section
        .to_agent_config()
        .map_err(|err| format!("invalid agent '{}': {err}", request.agent_id))?;

    let stage_start = Instant::now();
    let query = BarQuery::for_dates(
        &agent.symbol,
        agent.timeframe.clone(),
        request.start,
        request.end,
    );
    let (bars, data_report) = market_data.load_bars(&query)?;
    let load_ms = stage_start.elapsed().as_millis() as u64;
    metrics::histogram!("papertrade.backtest.load_bars_ms").record(load_ms as f64);
    if bars.is_empty() {
        warn!(
            symbol = %agent.symbol,
            start = %request.start,
            end = %request.end,
            "no bars in range; run will finish with zero trades"
        );
    }

    let run_id = build_run_id(
        &agent.agent_id,
        request.start,
        request.end,
        &agent.snapshot(),
        bars.len(),
    );
    let load_event = timing_event(
        &run_id,
        Some(&agent.symbol),
        "load_bars",
        load_ms,
        serde_json::json!({
            "rows": data_report.rows,
            "duplicates": data_report.duplicates,
            "gaps": data_report.gaps,
            "out_of_order": data_report.out_of_order,
            "invalid_close": data_report.invalid_close,
        }),
    );

    let spec = run_spec(config, run_id.clone(), request.start, request.end);
    let stage_start = Instant::now();
    let result = simulate(spec, agent, bars, technical, sentiment);
    let engine_ms = stage_start.elapsed().as_millis() as f64;
    metrics::histogram!("papertrade.backtest.engine_ms").record(engine_ms);

    let mut run = match result {
        Ok(run) => run,
        Err(err) => {
            metrics::counter!("papertrade.backtest.runs", "result" => "failed").increment(1);
            return Err(format!("backtest {run_id} failed: {err}"));
        }
    };
    metrics::counter!("papertrade.backtest.runs", "result" => "finalized").increment(1);
    metrics::gauge!("papertrade.backtest.bars_processed").set(run.metrics.bars_processed as f64);
    metrics::gauge!("papertrade.backtest.trades").set(run.metrics.total_trades as f64);
    metrics::gauge!("papertrade.backtest.engine_bars_per_sec").set(if engine_ms > 0.0 {
        run.metrics.bars_processed as f64 / (engine_ms / 1000.0)
    } else {
        0.0
    });

    run.audit_events.push(load_event);
    run.audit_events.push(timing_event(
        &run_id,
        Some(&run.symbol),
        "run_engine",
        engine_ms as u64,
        serde_json::json!({}),
    ));

    let saved_as = if request.save {
        let stage_start = Instant::now();
        let id = sink.save_run(&run, &run.trades)?;
        metrics::histogram!("papertrade.backtest.save_ms")
            .record(stage_start.elapsed().as_millis() as f64);
        Some(id)
    } else {
        None
    };

    info!(
        run_id = %run.run_id,
        trades = run.metrics.total_trades,
        total_return_pct = run.metrics.total_return_pct,
        saved = saved_as.is_some(),
        "backtest complete"
    );

    Ok(BacktestOutcome {
        run,
        data_report,
        saved_as,
    })
}
