use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
    InsufficientData,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Bullish => "bullish",
            Trend::Bearish => "bearish",
            Trend::Neutral => "neutral",
            Trend::InsufficientData => "insufficient_data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TechnicalSnapshot {
    pub rsi: f64,
    pub sma_short: f64,
    pub sma_long: f64,
    pub trend: Trend,
    pub support: f64,
    pub resistance: f64,
    pub volume_ratio: f64,
}

impl TechnicalSnapshot {
    /// Snapshot reported while the lookback window is still filling.
    pub fn insufficient_data() -> Self {
        Self {
            rsi: 50.0,
            sma_short: 0.0,
            sma_long: 0.0,
            trend: Trend::InsufficientData,
            support: 0.0,
            resistance: 0.0,
            volume_ratio: 1.0,
        }
    }

    pub fn with_trend(trend: Trend) -> Self {
        Self {
            trend,
            ..Self::insufficient_data()
        }
    }
}
