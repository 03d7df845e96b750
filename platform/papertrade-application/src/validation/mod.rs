use crate::config::{resolve_agent, Config};
use papertrade_domain::entities::agent::ConfigError;
use papertrade_domain::repositories::market_data::{BarQuery, HistoricalBarSource};
use papertrade_domain::services::ohlcv::DataQualityReport;
use papertrade_domain::value_objects::timeframe::MarketCalendar;
use std::time::Instant;
use tracing::{info_span, warn};

/// Checks every configured agent and its bar file. Without `strict` the problems are
/// only reported; with it any config error or unclean data set fails the call.
pub fn validate(
    config: &Config,
    strict: bool,
    market_data: &dyn HistoricalBarSource,
) -> Result<serde_json::Value, String> {
    let _span = info_span!(
        "validate",
        strict = strict,
        agents = config.agents.len(),
        ohlcv_dir = %config.data.ohlcv_dir
    )
    .entered();

    let mut problems: Vec<String> = Vec::new();

    let run_check = run_section_error(config);
    if let Some(err) = &run_check {
        problems.push(err.to_string());
    }
    let technical_check = config.technical.validate().err();
    if let Some(err) = &technical_check {
        problems.push(err.to_string());
    }
    let staleness = config.sentiment_max_staleness_seconds();
    if let Err(err) = &staleness {
        problems.push(format!("invalid data.sentiment_max_staleness: {err}"));
    }
    if config.agents.is_empty() {
        problems.push("no [[agents]] configured".to_string());
    }

    let mut agents = Vec::with_capacity(config.agents.len());
    for section in &config.agents {
        let agent = match resolve_agent(config, &section.id) {
            Ok(agent) => agent,
            Err(err) => {
                warn!(agent_id = %section.id, error = %err, "agent config rejected");
                problems.push(format!("agent '{}': {err}", section.id));
                agents.push(serde_json::json!({
                    "id": section.id,
                    "ok": false,
                    "error": err.to_string(),
                }));
                continue;
            }
        };

        let stage_start = Instant::now();
        let query = BarQuery {
            symbol: agent.symbol.clone(),
            timeframe: agent.timeframe.clone(),
            start: i64::MIN,
            end: i64::MAX,
        };
        let (_bars, report) = market_data.load_bars(&query)?;
        metrics::histogram!("papertrade.validate.load_bars_ms")
            .record(stage_start.elapsed().as_millis() as f64);
        metrics::gauge!("papertrade.validate.ohlcv.gaps", "agent" => section.id.clone())
            .set(report.gaps as f64);
        metrics::gauge!("papertrade.validate.ohlcv.duplicates", "agent" => section.id.clone())
            .set(report.duplicates as f64);

        if report.rows == 0 {
            problems.push(format!(
                "agent '{}': no bars for {} {}",
                section.id, agent.symbol, agent.timeframe.label
            ));
        } else if has_blocking_issues(&report, config.calendar()) {
            problems.push(format!(
                "agent '{}': data quality issues in {} {}",
                section.id, agent.symbol, agent.timeframe.label
            ));
        }

        agents.push(serde_json::json!({
            "id": section.id,
            "ok": true,
            "symbol": agent.symbol,
            "timeframe": agent.timeframe.label,
            "ohlcv": data_quality_json(&report),
        }));
    }

    if strict && !problems.is_empty() {
        return Err(format!(
            "strict validation failed: {}",
            problems.join("; ")
        ));
    }

    Ok(serde_json::json!({
        "run": {
            "initial_capital": config.run.initial_capital,
            "calendar": config.calendar(),
            "error": run_check.map(|err| err.to_string()),
        },
        "technical": {
            "lookback": config.technical.lookback,
            "error": technical_check.map(|err| err.to_string()),
        },
        "sentiment": {
            "path": config.data.sentiment_path,
            "max_staleness_seconds": staleness.ok(),
            "expected_sources": config.expected_sources(),
        },
        "agents": agents,
        "problems": problems,
        "strict": strict,
    }))
}

fn run_section_error(config: &Config) -> Option<ConfigError> {
    let capital = config.run.initial_capital;
    if !capital.is_finite() || capital <= 0.0 {
        return Some(ConfigError::invalid(
            "run.initial_capital",
            format!("must be finite and > 0 (got {capital})"),
        ));
    }
    None
}

/// Weekend and holiday gaps are expected on calendar markets, so gaps only count
/// for continuous ones.
fn has_blocking_issues(report: &DataQualityReport, calendar: MarketCalendar) -> bool {
    report.duplicates > 0
        || report.out_of_order > 0
        || report.invalid_close > 0
        || (calendar == MarketCalendar::Continuous && report.gaps > 0)
}

pub fn data_quality_json(report: &DataQualityReport) -> serde_json::Value {
    serde_json::json!({
        "rows": report.rows,
        "duplicates": report.duplicates,
        "gaps": report.gaps,
        "out_of_order": report.out_of_order,
        "invalid_close": report.invalid_close,
        "first_timestamp": report.first_timestamp,
        "last_timestamp": report.last_timestamp,
        "first_gap": report.first_gap,
        "max_gap_seconds": report.max_gap_seconds,
        "clean": report.is_clean(),
    })
}
