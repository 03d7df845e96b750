use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use papertrade_domain::repositories::market_data::{BarQuery, HistoricalBarSource};
use papertrade_domain::services::ohlcv::DataQualityReport;
use papertrade_domain::value_objects::bar::Bar;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct OhlcvRecord {
    pub timestamp_utc: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Reads `{dir}/{SYMBOL}_{timeframe}.csv` files, e.g. `AAPL_1day.csv`.
#[derive(Debug, Clone)]
pub struct CsvBarSource {
    dir: PathBuf,
}

impl CsvBarSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str, timeframe_label: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", symbol.to_uppercase(), timeframe_label))
    }
}

impl HistoricalBarSource for CsvBarSource {
    fn load_bars(&self, query: &BarQuery) -> Result<(Vec<Bar>, DataQualityReport), String> {
        let start = Instant::now();
        let path = self.path_for(&query.symbol, &query.timeframe.label);
        if !path.exists() {
            warn!(
                path = %path.display(),
                symbol = %query.symbol,
                timeframe = %query.timeframe.label,
                "OHLCV file not found; treating range as empty"
            );
            metrics::counter!("papertrade.infra.ohlcv.missing_file").increment(1);
            return Ok((Vec::new(), DataQualityReport::default()));
        }

        let result = load_csv_range(&path, query);
        let result_label = if result.is_ok() { "ok" } else { "err" };
        metrics::histogram!("papertrade.infra.ohlcv.load_ms", "result" => result_label)
            .record(start.elapsed().as_millis() as f64);
        if let Ok((bars, report)) = &result {
            debug!(
                path = %path.display(),
                rows = bars.len(),
                duplicates = report.duplicates,
                gaps = report.gaps,
                "loaded OHLCV"
            );
        }
        result
    }
}

fn load_csv_range(path: &Path, query: &BarQuery) -> Result<(Vec<Bar>, DataQualityReport), String> {
    let file = File::open(path)
        .map_err(|err| format!("failed to open OHLCV CSV {}: {}", path.display(), err))?;
    let reader = csv::Reader::from_reader(file);
    read_bars(
        reader,
        &query.symbol,
        &query.timeframe.label,
        query.timeframe.step_seconds,
        |ts| query.contains(ts),
    )
    .map_err(|err| format!("{}: {err}", path.display()))
}

/// Canonicalizes rows: sorted by timestamp, the last row for a repeated timestamp wins,
/// non-positive closes are dropped. All of it is counted in the report.
pub fn read_bars<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    symbol: &str,
    timeframe_label: &str,
    step_seconds: i64,
    in_range: impl Fn(i64) -> bool,
) -> Result<(Vec<Bar>, DataQualityReport), String> {
    let mut bars_by_ts: BTreeMap<i64, Bar> = BTreeMap::new();
    let mut report = DataQualityReport::default();
    let mut last_seen_ts: Option<i64> = None;
    let mut max_gap: Option<i64> = None;
    let step = step_seconds.max(1);

    for result in reader.deserialize::<OhlcvRecord>() {
        let record = result.map_err(|err| format!("failed to parse CSV row: {}", err))?;
        let timestamp = parse_timestamp(&record.timestamp_utc)?;
        if !in_range(timestamp) {
            continue;
        }

        if !record.close.is_finite() || record.close <= 0.0 {
            report.invalid_close += 1;
            continue;
        }

        if let Some(prev) = last_seen_ts {
            if timestamp < prev {
                report.out_of_order += 1;
            }
        }
        last_seen_ts = Some(timestamp);

        if bars_by_ts
            .insert(
                timestamp,
                Bar {
                    symbol: symbol.to_uppercase(),
                    timeframe: timeframe_label.to_string(),
                    timestamp,
                    open: record.open,
                    high: record.high,
                    low: record.low,
                    close: record.close,
                    volume: record.volume,
                },
            )
            .is_some()
        {
            report.duplicates += 1;
        }
    }

    if bars_by_ts.is_empty() {
        return Ok((Vec::new(), report));
    }

    let mut bars = Vec::with_capacity(bars_by_ts.len());
    let mut last_unique_ts: Option<i64> = None;
    for (timestamp, bar) in bars_by_ts {
        if report.first_timestamp.is_none() {
            report.first_timestamp = Some(timestamp);
        }
        report.last_timestamp = Some(timestamp);

        if let Some(prev) = last_unique_ts {
            let diff = timestamp - prev;
            if diff > step {
                report.gaps += 1;
                if report.first_gap.is_none() {
                    report.first_gap = Some(timestamp);
                }
                max_gap = Some(max_gap.map_or(diff, |current| current.max(diff)));
            }
        }
        last_unique_ts = Some(timestamp);

        bars.push(bar);
    }

    report.rows = bars.len();
    report.max_gap_seconds = max_gap;
    Ok((bars, report))
}

pub fn parse_timestamp(value: &str) -> Result<i64, String> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%z") {
        return Ok(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        let dt: DateTime<Utc> = Utc.from_utc_datetime(&naive);
        return Ok(dt.timestamp());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(Utc
            .from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
            .timestamp());
    }

    Err(format!("unsupported timestamp format: {}", value))
}

#[cfg(test)]
mod tests {
    use super::{parse_timestamp, read_bars, CsvBarSource};
    use chrono::NaiveDate;
    use papertrade_domain::repositories::market_data::{BarQuery, HistoricalBarSource};
    use papertrade_domain::value_objects::timeframe::Timeframe;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_tmp_path(name: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("papertrade_{name}_{}_{}", std::process::id(), now))
    }

    fn reader(data: &str) -> csv::Reader<&[u8]> {
        csv::Reader::from_reader(data.as_bytes())
    }

    #[test]
    fn read_bars_detects_duplicates_and_gaps() {
        let csv_data = "timestamp_utc,open,high,low,close,volume\n\
2026-01-01T00:00:00Z,1,1,1,1,1\n\
2026-01-01T00:00:00Z,1,1,1,1,1\n\
2026-01-01T00:02:00Z,1,1,1,1,1\n";
        let (bars, report) = read_bars(reader(csv_data), "btc", "1min", 60, |_| true).expect("read");
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].symbol, "BTC");
        assert_eq!(bars[0].timeframe, "1min");
        assert_eq!(report.rows, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.gaps, 1);
        assert_eq!(report.max_gap_seconds, Some(120));
        assert_eq!(report.invalid_close, 0);
    }

    #[test]
    fn read_bars_canonicalizes_out_of_order_rows() {
        let csv_data = "timestamp_utc,open,high,low,close,volume\n\
2026-01-01T00:00:00Z,1,1,1,1,1\n\
2026-01-01T00:02:00Z,1,1,1,1,1\n\
2026-01-01T00:01:00Z,1,1,1,1,1\n\
2026-01-01T00:00:00Z,2,2,2,2,2\n\
2026-01-01T00:03:00Z,0,0,0,0,1\n";
        let (bars, report) = read_bars(reader(csv_data), "BTC", "1min", 60, |_| true).expect("read");
        assert_eq!(report.out_of_order, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.invalid_close, 1);
        assert_eq!(bars.len(), 3);
        assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!((bars[0].close - 2.0).abs() < 1e-9);
    }

    #[test]
    fn read_bars_rejects_unparseable_rows() {
        let csv_data = "timestamp_utc,open,high,low,close,volume\nyesterday,1,1,1,1,1\n";
        let err = read_bars(reader(csv_data), "BTC", "1min", 60, |_| true).expect_err("bad ts");
        assert!(err.contains("unsupported timestamp format"));
    }

    #[test]
    fn parse_timestamp_accepts_common_layouts() {
        assert_eq!(parse_timestamp("2024-01-01T00:00:00Z"), Ok(1_704_067_200));
        assert_eq!(parse_timestamp("2024-01-01 01:00:00+0100"), Ok(1_704_067_200));
        assert_eq!(parse_timestamp("2024-01-01 00:00:00"), Ok(1_704_067_200));
        assert_eq!(parse_timestamp("2024-01-01"), Ok(1_704_067_200));
    }

    #[test]
    fn csv_source_filters_to_range_and_tolerates_missing_files() {
        let dir = unique_tmp_path("ohlcv_dir");
        fs::create_dir_all(&dir).expect("dir");
        fs::write(
            dir.join("AAPL_1day.csv"),
            "timestamp_utc,open,high,low,close,volume\n\
2023-12-31T00:00:00Z,9,9,9,9,1\n\
2024-01-01T00:00:00Z,10,10,10,10,1\n\
2024-01-02T00:00:00Z,11,11,11,11,1\n\
2024-01-03T00:00:00Z,12,12,12,12,1\n",
        )
        .expect("write csv");

        let source = CsvBarSource::new(&dir);
        let query = BarQuery::for_dates(
            "aapl",
            Timeframe::parse("1d").expect("tf"),
            NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
            NaiveDate::from_ymd_opt(2024, 1, 2).expect("date"),
        );
        let (bars, report) = source.load_bars(&query).expect("load");
        assert_eq!(
            bars.iter().map(|b| b.close).collect::<Vec<_>>(),
            vec![10.0, 11.0]
        );
        assert_eq!(report.rows, 2);

        let missing = BarQuery::for_dates(
            "MSFT",
            Timeframe::parse("1d").expect("tf"),
            NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
            NaiveDate::from_ymd_opt(2024, 1, 2).expect("date"),
        );
        let (bars, report) = source.load_bars(&missing).expect("missing file is empty");
        assert!(bars.is_empty());
        assert_eq!(report.rows, 0);

        let _ = fs::remove_dir_all(&dir);
    }
}
