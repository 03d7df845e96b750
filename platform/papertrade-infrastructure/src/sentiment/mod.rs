use crate::market_data::ohlcv::parse_timestamp;
use papertrade_domain::repositories::sentiment::SentimentSource;
use papertrade_domain::services::sentiment::{SentimentBook, SentimentObservation};
use papertrade_domain::value_objects::sentiment::SentimentSnapshot;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct SentimentRecord {
    timestamp_utc: String,
    symbol: String,
    source: String,
    score: Option<f64>,
    confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SentimentLoadReport {
    pub rows: usize,
    pub kept: usize,
    pub missing_values: usize,
    pub invalid_values: usize,
}

/// Sentiment feed backed by a CSV with header `timestamp_utc,symbol,source,score,confidence`.
pub struct CsvSentimentSource {
    book: SentimentBook,
    report: SentimentLoadReport,
}

impl CsvSentimentSource {
    pub fn open(
        path: Option<&Path>,
        max_staleness_seconds: i64,
        expected_sources: usize,
    ) -> Result<Self, String> {
        let (observations, report) = match path {
            Some(path) if path.exists() => load_sentiment_csv(path)?,
            Some(path) => {
                warn!(path = %path.display(), "sentiment file not found; every bar will lack sentiment");
                (Vec::new(), SentimentLoadReport::default())
            }
            None => (Vec::new(), SentimentLoadReport::default()),
        };
        metrics::gauge!("papertrade.infra.sentiment.observations").set(report.kept as f64);
        Ok(Self {
            book: SentimentBook::new(observations, max_staleness_seconds, expected_sources),
            report,
        })
    }

    pub fn report(&self) -> &SentimentLoadReport {
        &self.report
    }

    pub fn book(&self) -> &SentimentBook {
        &self.book
    }
}

impl SentimentSource for CsvSentimentSource {
    fn snapshot(&self, symbol: &str, timestamp: i64) -> Result<Option<SentimentSnapshot>, String> {
        self.book.snapshot(symbol, timestamp)
    }
}

/// Rows missing a score or confidence, or holding values outside `[-1, 1]` / `[0, 1]`,
/// are dropped and counted.
pub fn load_sentiment_csv(
    path: &Path,
) -> Result<(Vec<SentimentObservation>, SentimentLoadReport), String> {
    let file = File::open(path)
        .map_err(|err| format!("failed to open sentiment CSV {}: {}", path.display(), err))?;
    let mut reader = csv::Reader::from_reader(file);
    let mut report = SentimentLoadReport::default();
    let mut observations = Vec::new();

    for result in reader.deserialize::<SentimentRecord>() {
        let record = result.map_err(|err| {
            format!(
                "failed to parse sentiment row in {}: {}",
                path.display(),
                err
            )
        })?;
        report.rows += 1;
        let timestamp = parse_timestamp(&record.timestamp_utc)?;

        let (Some(score), Some(confidence)) = (record.score, record.confidence) else {
            report.missing_values += 1;
            continue;
        };
        if !score.is_finite()
            || !confidence.is_finite()
            || !(-1.0..=1.0).contains(&score)
            || !(0.0..=1.0).contains(&confidence)
        {
            report.invalid_values += 1;
            continue;
        }

        observations.push(SentimentObservation {
            timestamp,
            symbol: record.symbol.trim().to_uppercase(),
            source: record.source.trim().to_string(),
            score,
            confidence,
        });
    }

    report.kept = observations.len();
    debug!(
        path = %path.display(),
        rows = report.rows,
        kept = report.kept,
        "loaded sentiment"
    );
    Ok((observations, report))
}

#[cfg(test)]
mod tests {
    use super::{load_sentiment_csv, CsvSentimentSource};
    use papertrade_domain::repositories::sentiment::SentimentSource;
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

    #[test]
    fn load_drops_missing_and_out_of_range_rows() {
        let path = unique_tmp_path("sentiment.csv");
        fs::write(
            &path,
            "timestamp_utc,symbol,source,score,confidence\n\
2024-01-01T00:00:00Z,aapl,news,0.5,0.8\n\
2024-01-01T00:00:00Z,AAPL,social,,0.8\n\
2024-01-01T00:00:00Z,AAPL,analyst,1.5,0.8\n",
        )
        .expect("write");

        let (observations, report) = load_sentiment_csv(&path).expect("load");
        assert_eq!(report.rows, 3);
        assert_eq!(report.kept, 1);
        assert_eq!(report.missing_values, 1);
        assert_eq!(report.invalid_values, 1);
        assert_eq!(observations[0].symbol, "AAPL");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn source_answers_nearest_prior_snapshots() {
        let path = unique_tmp_path("sentiment_source.csv");
        fs::write(
            &path,
            "timestamp_utc,symbol,source,score,confidence\n\
2024-01-01T00:00:00Z,AAPL,news,0.4,1.0\n\
2024-01-02T00:00:00Z,AAPL,news,-0.6,1.0\n",
        )
        .expect("write");

        let source = CsvSentimentSource::open(Some(path.as_path()), 2 * 86_400, 1).expect("open");
        assert_eq!(source.report().kept, 2);
        assert!(source.snapshot("AAPL", 1_704_067_200 - 1).expect("ok").is_none());
        let first = source
            .snapshot("AAPL", 1_704_067_200 + 3_600)
            .expect("ok")
            .expect("snapshot");
        assert!((first.score - 0.4).abs() < 1e-9);
        let second = source
            .snapshot("AAPL", 1_704_067_200 + 86_400 + 60)
            .expect("ok")
            .expect("snapshot");
        assert!((second.score + 0.6).abs() < 1e-9);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_yields_an_empty_source() {
        let path = unique_tmp_path("absent.csv");
        let source = CsvSentimentSource::open(Some(path.as_path()), 86_400, 1).expect("open");
        assert_eq!(source.book().observation_count(), 0);
        assert!(source.snapshot("AAPL", 1_704_067_200).expect("ok").is_none());
    }
}
