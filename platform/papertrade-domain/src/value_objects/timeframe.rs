use serde::{Deserialize, Serialize};

const DAY_SECONDS: i64 = 86_400;
const WEEK_SECONDS: i64 = 604_800;
const MONTH_SECONDS: i64 = 2_592_000;
const EQUITY_SESSION_SECONDS: f64 = 23_400.0;
const EQUITY_SESSIONS_PER_YEAR: f64 = 252.0;

/// Trading calendar used to turn a bar step into bars-per-year for annualization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketCalendar {
    /// 252 sessions of 6.5 hours.
    #[default]
    Equities,
    /// 24/7 markets such as crypto.
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Timeframe {
    pub label: String,
    pub step_seconds: i64,
}

impl Timeframe {
    pub fn parse(value: &str) -> Result<Self, String> {
        let normalized = value.trim().to_lowercase();
        let label = match normalized.as_str() {
            "1m" | "1min" => "1min",
            "5m" | "5min" => "5min",
            "15m" | "15min" => "15min",
            "30m" | "30min" => "30min",
            "1h" | "1hour" => "1hour",
            "4h" | "4hour" => "4hour",
            "1d" | "1day" => "1day",
            "1w" | "1week" => "1week",
            "1mo" | "1month" => "1month",
            _ => return Err(format!("unsupported timeframe: {value}")),
        };

        let step_seconds = parse_duration_like_seconds(label)?;
        Ok(Self {
            label: label.to_string(),
            step_seconds,
        })
    }

    pub fn bars_per_year(&self, calendar: MarketCalendar) -> f64 {
        let step = self.step_seconds.max(1);
        match calendar {
            MarketCalendar::Continuous => (365 * DAY_SECONDS) as f64 / step as f64,
            MarketCalendar::Equities => {
                if step >= MONTH_SECONDS {
                    12.0 * MONTH_SECONDS as f64 / step as f64
                } else if step >= WEEK_SECONDS {
                    52.0 * WEEK_SECONDS as f64 / step as f64
                } else if step >= DAY_SECONDS {
                    EQUITY_SESSIONS_PER_YEAR * DAY_SECONDS as f64 / step as f64
                } else {
                    EQUITY_SESSIONS_PER_YEAR * EQUITY_SESSION_SECONDS / step as f64
                }
            }
        }
    }
}

pub fn parse_duration_like_seconds(value: &str) -> Result<i64, String> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return Ok(seconds);
    }

    let (number_part, unit) = if let Some(stripped) = trimmed.strip_suffix("min") {
        (stripped, "min")
    } else if let Some(stripped) = trimmed.strip_suffix("hour") {
        (stripped, "hour")
    } else if let Some(stripped) = trimmed.strip_suffix("day") {
        (stripped, "day")
    } else if let Some(stripped) = trimmed.strip_suffix("week") {
        (stripped, "week")
    } else if let Some(stripped) = trimmed.strip_suffix("month") {
        (stripped, "month")
    } else if let Some(stripped) = trimmed.strip_suffix("mo") {
        (stripped, "mo")
    } else {
        trimmed.split_at(trimmed.len().saturating_sub(1))
    };

    let multiplier = match unit {
        "s" => 1,
        "m" | "min" => 60,
        "h" | "hour" => 3600,
        "d" | "day" => DAY_SECONDS,
        "w" | "week" => WEEK_SECONDS,
        "mo" | "month" => MONTH_SECONDS,
        _ => return Err(format!("unsupported duration unit: {unit}")),
    };

    let number: i64 = number_part
        .parse()
        .map_err(|_| format!("invalid duration: {value}"))?;
    if number < 0 {
        return Err(format!("negative duration: {value}"));
    }
    Ok(number * multiplier)
}
