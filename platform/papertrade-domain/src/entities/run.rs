use crate::entities::agent::ConfigError;
use crate::entities::metrics::{MetricsConfig, MetricsSummary};
use crate::services::audit::AuditEvent;
use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::timeframe::MarketCalendar;
use crate::value_objects::trade::Trade;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Init,
    Running,
    Finalized,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Finalized | RunState::Failed)
    }
}

/// Run-level parameters handed to the orchestrator alongside the agent config.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    pub run_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub calendar: MarketCalendar,
    pub metrics: MetricsConfig,
}

impl RunSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(ConfigError::invalid(
                "initial_capital",
                format!("must be finite and > 0 (got {})", self.initial_capital),
            ));
        }
        if self.start_date > self.end_date {
            return Err(ConfigError::InvalidRange(format!(
                "start {} is after end {}",
                self.start_date, self.end_date
            )));
        }
        if !self.metrics.risk_free_rate.is_finite() {
            return Err(ConfigError::invalid("risk_free_rate", "must be finite"));
        }
        if let Some(factor) = self.metrics.annualization_factor {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(ConfigError::invalid(
                    "annualization_factor",
                    format!("must be > 0 (got {factor})"),
                ));
            }
        }
        Ok(())
    }
}

/// Finalized output of one backtest.
#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub run_id: String,
    pub agent_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: MetricsSummary,
    pub config_snapshot: serde_json::Value,
    pub state: RunState,
    pub audit_events: Vec<AuditEvent>,
}

impl BacktestRun {
    pub fn record(&self) -> RunRecord {
        RunRecord {
            run_id: self.run_id.clone(),
            agent_id: self.agent_id.clone(),
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            initial_capital: self.initial_capital,
            final_capital: self.final_capital,
            state: self.state,
            metrics: self.metrics.clone(),
            config_snapshot: self.config_snapshot.clone(),
        }
    }
}

/// Persisted header of a run, without the trade log and equity curve.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub agent_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub state: RunState,
    pub metrics: MetricsSummary,
    pub config_snapshot: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::RunSpec;
    use crate::entities::agent::ConfigError;
    use crate::entities::metrics::MetricsConfig;
    use crate::value_objects::timeframe::MarketCalendar;
    use chrono::NaiveDate;

    fn spec(start: (i32, u32, u32), end: (i32, u32, u32), capital: f64) -> RunSpec {
        RunSpec {
            run_id: "run".to_string(),
            start_date: NaiveDate::from_ymd_opt(start.0, start.1, start.2).expect("date"),
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).expect("date"),
            initial_capital: capital,
            calendar: MarketCalendar::Equities,
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn rejects_inverted_range_and_bad_capital() {
        assert!(spec((2024, 1, 1), (2024, 6, 30), 10_000.0).validate().is_ok());
        assert!(spec((2024, 1, 1), (2024, 1, 1), 10_000.0).validate().is_ok());
        assert!(matches!(
            spec((2024, 6, 1), (2024, 1, 1), 10_000.0).validate(),
            Err(ConfigError::InvalidRange(_))
        ));
        assert!(spec((2024, 1, 1), (2024, 6, 30), 0.0).validate().is_err());
        assert!(spec((2024, 1, 1), (2024, 6, 30), f64::INFINITY)
            .validate()
            .is_err());
    }
}
