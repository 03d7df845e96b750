use crate::entities::agent::ConfigError;
use serde::{Deserialize, Serialize};

/// Position size cap, resolved once at config load.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PositionSizing {
    /// Fraction of current total equity, `0 < f <= 1`.
    Fraction(f64),
    /// Dollar cap per entry.
    Absolute(f64),
}

impl PositionSizing {
    /// Values `<= 1.0` are fractions of equity, larger values are dollar caps.
    pub fn from_value(value: f64) -> Result<Self, ConfigError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::InvalidSizing(format!(
                "max_position_size must be finite and > 0 (got {value})"
            )));
        }
        if value <= 1.0 {
            Ok(PositionSizing::Fraction(value))
        } else {
            Ok(PositionSizing::Absolute(value))
        }
    }

    /// Accepts `"0.25"`, `"25%"`, `"$5000"` or `"5000"`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim().replace(['_', ','], "");
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidSizing(
                "max_position_size cannot be empty".to_string(),
            ));
        }

        let parse_number = |text: &str| -> Result<f64, ConfigError> {
            text.trim().parse::<f64>().map_err(|_| {
                ConfigError::InvalidSizing(format!("cannot parse max_position_size: {raw}"))
            })
        };

        if let Some(pct) = trimmed.strip_suffix('%') {
            let value = parse_number(pct)? / 100.0;
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(ConfigError::InvalidSizing(format!(
                    "percentage max_position_size must be in (0%, 100%] (got {raw})"
                )));
            }
            return Ok(PositionSizing::Fraction(value));
        }

        if let Some(amount) = trimmed.strip_prefix('$') {
            let value = parse_number(amount)?;
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidSizing(format!(
                    "dollar max_position_size must be > 0 (got {raw})"
                )));
            }
            return Ok(PositionSizing::Absolute(value));
        }

        Self::from_value(parse_number(&trimmed)?)
    }

    pub fn cap(&self, equity: f64) -> f64 {
        match self {
            PositionSizing::Fraction(fraction) => fraction * equity.max(0.0),
            PositionSizing::Absolute(amount) => *amount,
        }
    }

    pub fn label(&self) -> String {
        match self {
            PositionSizing::Fraction(fraction) => format!("{:.2}% of equity", fraction * 100.0),
            PositionSizing::Absolute(amount) => format!("${amount:.2}"),
        }
    }
}

/// The one rounding rule applied to share quantities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuantityRule {
    #[default]
    WholeShares,
    Fractional {
        decimals: u32,
    },
}

pub const MAX_FRACTIONAL_DECIMALS: u32 = 8;

impl QuantityRule {
    pub fn floor(&self, raw: f64) -> f64 {
        if !raw.is_finite() || raw <= 0.0 {
            return 0.0;
        }
        match self {
            QuantityRule::WholeShares => raw.floor(),
            QuantityRule::Fractional { decimals } => {
                let scale = 10f64.powi(*decimals as i32);
                (raw * scale).floor() / scale
            }
        }
    }

    /// Smallest quantity increment.
    pub fn step(&self) -> f64 {
        match self {
            QuantityRule::WholeShares => 1.0,
            QuantityRule::Fractional { decimals } => 10f64.powi(-(*decimals as i32)),
        }
    }
}
