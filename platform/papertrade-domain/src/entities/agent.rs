use crate::entities::sizing::{PositionSizing, QuantityRule, MAX_FRACTIONAL_DECIMALS};
use crate::value_objects::timeframe::Timeframe;
use serde::Serialize;
use std::fmt;

/// Configuration problems detected before a run starts.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidValue { field: String, reason: String },
    InvalidSizing(String),
    UnknownAgent(String),
    InvalidRange(String),
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid config value for {field}: {reason}")
            }
            ConfigError::InvalidSizing(msg) => write!(f, "invalid position sizing: {msg}"),
            ConfigError::UnknownAgent(id) => write!(f, "unknown agent: {id}"),
            ConfigError::InvalidRange(msg) => write!(f, "invalid run range: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Risk and decision parameters of one agent, already resolved and typed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentConfig {
    pub agent_id: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub max_position_size: PositionSizing,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub min_confidence: f64,
    pub entry_threshold: f64,
    pub exit_threshold: f64,
    pub max_daily_trades: u32,
    pub quantity_rule: QuantityRule,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_id.trim().is_empty() {
            return Err(ConfigError::invalid("id", "must not be empty"));
        }
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::invalid("symbol", "must not be empty"));
        }
        match self.max_position_size {
            PositionSizing::Fraction(fraction) => {
                if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
                    return Err(ConfigError::InvalidSizing(format!(
                        "fraction must be in (0, 1] (got {fraction})"
                    )));
                }
            }
            PositionSizing::Absolute(amount) => {
                if !amount.is_finite() || amount <= 0.0 {
                    return Err(ConfigError::InvalidSizing(format!(
                        "absolute cap must be > 0 (got {amount})"
                    )));
                }
            }
        }
        if !self.stop_loss_pct.is_finite() || self.stop_loss_pct <= 0.0 || self.stop_loss_pct >= 1.0
        {
            return Err(ConfigError::invalid(
                "stop_loss_pct",
                format!("must be in (0, 1) (got {})", self.stop_loss_pct),
            ));
        }
        if !self.take_profit_pct.is_finite() || self.take_profit_pct <= 0.0 {
            return Err(ConfigError::invalid(
                "take_profit_pct",
                format!("must be > 0 (got {})", self.take_profit_pct),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::invalid(
                "min_confidence",
                format!("must be in [0, 1] (got {})", self.min_confidence),
            ));
        }
        for (field, value) in [
            ("entry_threshold", self.entry_threshold),
            ("exit_threshold", self.exit_threshold),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(
                    field,
                    format!("must be in [-1, 1] (got {value})"),
                ));
            }
        }
        if self.exit_threshold >= self.entry_threshold {
            return Err(ConfigError::invalid(
                "exit_threshold",
                format!(
                    "must be below entry_threshold ({} >= {})",
                    self.exit_threshold, self.entry_threshold
                ),
            ));
        }
        if self.max_daily_trades == 0 {
            return Err(ConfigError::invalid("max_daily_trades", "must be >= 1"));
        }
        if let QuantityRule::Fractional { decimals } = self.quantity_rule {
            if decimals > MAX_FRACTIONAL_DECIMALS {
                return Err(ConfigError::invalid(
                    "fractional_decimals",
                    format!("must be <= {MAX_FRACTIONAL_DECIMALS} (got {decimals})"),
                ));
            }
        }
        if self.timeframe.step_seconds <= 0 {
            return Err(ConfigError::invalid("timeframe", "step must be > 0"));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{AgentConfig, ConfigError};
    use crate::entities::sizing::{PositionSizing, QuantityRule};
    use crate::value_objects::timeframe::Timeframe;

    pub(crate) fn sample_agent() -> AgentConfig {
        AgentConfig {
            agent_id: "momentum".to_string(),
            symbol: "AAPL".to_string(),
            timeframe: Timeframe {
                label: "1day".to_string(),
                step_seconds: 86_400,
            },
            max_position_size: PositionSizing::Fraction(0.5),
            stop_loss_pct: 0.03,
            take_profit_pct: 0.06,
            min_confidence: 0.6,
            entry_threshold: 0.3,
            exit_threshold: -0.2,
            max_daily_trades: 4,
            quantity_rule: QuantityRule::WholeShares,
        }
    }

    #[test]
    fn sample_agent_is_valid() {
        assert!(sample_agent().validate().is_ok());
    }

    #[test]
    fn negative_stop_loss_is_rejected() {
        let mut agent = sample_agent();
        agent.stop_loss_pct = -0.05;
        let err = agent.validate().expect_err("negative stop");
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "stop_loss_pct"));
        assert!(err.to_string().contains("stop_loss_pct"));
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let mut agent = sample_agent();
        agent.exit_threshold = 0.5;
        assert!(agent.validate().is_err());
    }

    #[test]
    fn zero_daily_trades_is_rejected() {
        let mut agent = sample_agent();
        agent.max_daily_trades = 0;
        assert!(agent.validate().is_err());
    }

    #[test]
    fn oversized_fraction_is_rejected() {
        let mut agent = sample_agent();
        agent.max_position_size = PositionSizing::Fraction(1.5);
        assert!(matches!(
            agent.validate(),
            Err(ConfigError::InvalidSizing(_))
        ));
    }

    #[test]
    fn snapshot_tags_sizing_variant() {
        let snapshot = sample_agent().snapshot();
        assert_eq!(snapshot["max_position_size"]["kind"], "fraction");
        assert_eq!(snapshot["quantity_rule"]["kind"], "whole_shares");
    }
}
