use crate::entities::agent::ConfigError;
use crate::repositories::technical::TechnicalIndicatorSource;
use crate::value_objects::bar::Bar;
use crate::value_objects::technical::{TechnicalSnapshot, Trend};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TechnicalConfig {
    pub lookback: usize,
    pub sma_short: usize,
    pub sma_long: usize,
    pub rsi_period: usize,
    pub volume_window: usize,
    /// Relative distance between the SMAs below which the trend is neutral.
    pub neutral_band: f64,
}

impl TechnicalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("technical.sma_short", self.sma_short),
            ("technical.sma_long", self.sma_long),
            ("technical.rsi_period", self.rsi_period),
            ("technical.volume_window", self.volume_window),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be >= 1"));
            }
        }
        if self.sma_short >= self.sma_long {
            return Err(ConfigError::invalid(
                "technical.sma_short",
                format!(
                    "must be below sma_long ({} >= {})",
                    self.sma_short, self.sma_long
                ),
            ));
        }
        let required = self.min_lookback();
        if self.lookback < required {
            return Err(ConfigError::invalid(
                "technical.lookback",
                format!("must be >= {required} (got {})", self.lookback),
            ));
        }
        if !self.neutral_band.is_finite() || !(0.0..1.0).contains(&self.neutral_band) {
            return Err(ConfigError::invalid(
                "technical.neutral_band",
                format!("must be in [0, 1) (got {})", self.neutral_band),
            ));
        }
        Ok(())
    }

    fn min_lookback(&self) -> usize {
        self.sma_long
            .max(self.rsi_period + 1)
            .max(self.volume_window)
    }
}

/// Indicator snapshot computed from the trailing window of bars alone.
#[derive(Debug, Clone, Copy)]
pub struct WindowedTechnicalProvider {
    config: TechnicalConfig,
}

impl WindowedTechnicalProvider {
    pub fn new(config: TechnicalConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TechnicalConfig {
        &self.config
    }

    fn classify(&self, sma_short: f64, sma_long: f64, close: f64) -> Trend {
        let band = self.config.neutral_band;
        if sma_short > sma_long * (1.0 + band) && close > sma_long {
            Trend::Bullish
        } else if sma_short < sma_long * (1.0 - band) && close < sma_long {
            Trend::Bearish
        } else {
            Trend::Neutral
        }
    }
}

impl TechnicalIndicatorSource for WindowedTechnicalProvider {
    fn lookback(&self) -> usize {
        self.config.lookback
    }

    fn snapshot(&self, _symbol: &str, window: &[Bar]) -> TechnicalSnapshot {
        if window.len() < self.config.lookback || window.is_empty() {
            return TechnicalSnapshot::insufficient_data();
        }
        let window = &window[window.len() - self.config.lookback..];
        let closes: Vec<f64> = window.iter().map(|bar| bar.close).collect();
        let volumes: Vec<f64> = window.iter().map(|bar| bar.volume).collect();

        let (Some(sma_short), Some(sma_long)) = (
            trailing_mean(&closes, self.config.sma_short),
            trailing_mean(&closes, self.config.sma_long),
        ) else {
            return TechnicalSnapshot::insufficient_data();
        };
        let close = closes[closes.len() - 1];

        let support = window.iter().map(|bar| bar.low).fold(f64::INFINITY, f64::min);
        let resistance = window
            .iter()
            .map(|bar| bar.high)
            .fold(f64::NEG_INFINITY, f64::max);

        TechnicalSnapshot {
            rsi: rsi(&closes, self.config.rsi_period).unwrap_or(50.0),
            sma_short,
            sma_long,
            trend: self.classify(sma_short, sma_long, close),
            support,
            resistance,
            volume_ratio: volume_ratio(&volumes, self.config.volume_window),
        }
    }
}

pub fn trailing_mean(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// Simple-average RSI over the last `period` price changes.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let tail = &closes[closes.len() - period - 1..];
    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in tail.windows(2) {
        let diff = pair[1] - pair[0];
        if diff > 0.0 {
            gains += diff;
        } else {
            losses -= diff;
        }
    }
    if gains == 0.0 && losses == 0.0 {
        return Some(50.0);
    }
    if losses == 0.0 {
        return Some(100.0);
    }
    let rs = gains / losses;
    Some(100.0 - 100.0 / (1.0 + rs))
}

fn volume_ratio(volumes: &[f64], window: usize) -> f64 {
    let Some(mean) = trailing_mean(volumes, window) else {
        return 1.0;
    };
    if mean <= 0.0 || !mean.is_finite() {
        return 1.0;
    }
    volumes[volumes.len() - 1] / mean
}

#[cfg(test)]
mod tests {
    use super::{rsi, trailing_mean, TechnicalConfig, WindowedTechnicalProvider};
    use crate::repositories::technical::TechnicalIndicatorSource;
    use crate::value_objects::bar::Bar;
    use crate::value_objects::technical::Trend;

    fn config() -> TechnicalConfig {
        TechnicalConfig {
            lookback: 6,
            sma_short: 2,
            sma_long: 5,
            rsi_period: 3,
            volume_window: 3,
            neutral_band: 0.001,
        }
    }

    fn bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| Bar {
                symbol: "AAPL".to_string(),
                timeframe: "1day".to_string(),
                timestamp: i as i64 * 86_400,
                open: *close,
                high: close + 1.0,
                low: close - 1.0,
                close: *close,
                volume: 100.0 + i as f64,
            })
            .collect()
    }

    #[test]
    fn short_window_is_insufficient() {
        let provider = WindowedTechnicalProvider::new(config()).expect("config");
        let snap = provider.snapshot("AAPL", &bars(&[1.0, 2.0, 3.0]));
        assert_eq!(snap.trend, Trend::InsufficientData);
    }

    #[test]
    fn rising_closes_are_bullish() {
        let provider = WindowedTechnicalProvider::new(config()).expect("config");
        let snap = provider.snapshot("AAPL", &bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0]));
        assert_eq!(snap.trend, Trend::Bullish);
        assert_eq!(snap.rsi, 100.0);
        assert_eq!(snap.support, 9.0);
        assert_eq!(snap.resistance, 16.0);
        assert!((snap.sma_short - 14.5).abs() < 1e-12);
        assert!((snap.sma_long - 13.0).abs() < 1e-12);
    }

    #[test]
    fn falling_closes_are_bearish() {
        let provider = WindowedTechnicalProvider::new(config()).expect("config");
        let snap = provider.snapshot("AAPL", &bars(&[15.0, 14.0, 13.0, 12.0, 11.0, 10.0]));
        assert_eq!(snap.trend, Trend::Bearish);
        assert_eq!(snap.rsi, 0.0);
    }

    #[test]
    fn flat_closes_are_neutral() {
        let provider = WindowedTechnicalProvider::new(config()).expect("config");
        let snap = provider.snapshot("AAPL", &bars(&[10.0; 8]));
        assert_eq!(snap.trend, Trend::Neutral);
        assert_eq!(snap.rsi, 50.0);
    }

    #[test]
    fn rsi_balances_gains_and_losses() {
        let value = rsi(&[10.0, 12.0, 11.0], 2).expect("rsi");
        assert!((value - 100.0 * 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(rsi(&[1.0], 2), None);
        assert_eq!(trailing_mean(&[1.0, 2.0, 3.0], 2), Some(2.5));
    }

    #[test]
    fn rejects_inconsistent_windows() {
        let mut cfg = config();
        cfg.sma_short = 5;
        assert!(WindowedTechnicalProvider::new(cfg).is_err());
        let mut cfg = config();
        cfg.lookback = 3;
        assert!(WindowedTechnicalProvider::new(cfg).is_err());
    }
}
