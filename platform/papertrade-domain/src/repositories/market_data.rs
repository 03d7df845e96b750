use crate::services::market_data_source::VecBarSource;
use crate::services::ohlcv::DataQualityReport;
use crate::value_objects::bar::Bar;
use crate::value_objects::timeframe::Timeframe;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

const LAST_SECOND_OF_DAY: i64 = 86_399;

#[derive(Debug, Clone, PartialEq)]
pub struct BarQuery {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Inclusive, unix seconds.
    pub start: i64,
    /// Inclusive, unix seconds.
    pub end: i64,
}

impl BarQuery {
    /// `end` covers the whole end date.
    pub fn for_dates(symbol: &str, timeframe: Timeframe, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            start: day_start(start),
            end: day_start(end) + LAST_SECOND_OF_DAY,
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

pub fn day_start(date: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
        .timestamp()
}

/// Source of historical bars. Every call yields a fresh, independently consumable
/// sequence; an empty range is an empty sequence, not an error.
pub trait HistoricalBarSource {
    fn load_bars(&self, query: &BarQuery) -> Result<(Vec<Bar>, DataQualityReport), String>;

    fn open(&self, query: &BarQuery) -> Result<VecBarSource, String> {
        let (bars, _report) = self.load_bars(query)?;
        Ok(VecBarSource::new(bars))
    }
}
