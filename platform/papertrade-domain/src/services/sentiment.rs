use crate::repositories::sentiment::SentimentSource;
use crate::value_objects::sentiment::SentimentSnapshot;
use std::collections::BTreeMap;

/// One raw score from one sentiment source.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentObservation {
    pub timestamp: i64,
    pub symbol: String,
    pub source: String,
    pub score: f64,
    pub confidence: f64,
}

fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// Combines one observation per source into a snapshot. `None` when nothing usable
/// was passed in.
pub fn aggregate_observations(
    observations: &[&SentimentObservation],
    expected_sources: usize,
) -> Option<SentimentSnapshot> {
    let usable: Vec<&SentimentObservation> = observations
        .iter()
        .copied()
        .filter(|obs| obs.score.is_finite() && obs.confidence.is_finite())
        .collect();
    if usable.is_empty() {
        return None;
    }

    let n = usable.len() as f64;
    let weight_sum: f64 = usable.iter().map(|obs| obs.confidence.clamp(0.0, 1.0)).sum();
    let score = if weight_sum > 0.0 {
        usable
            .iter()
            .map(|obs| obs.score.clamp(-1.0, 1.0) * obs.confidence.clamp(0.0, 1.0))
            .sum::<f64>()
            / weight_sum
    } else {
        usable.iter().map(|obs| obs.score.clamp(-1.0, 1.0)).sum::<f64>() / n
    };
    let score = score.clamp(-1.0, 1.0);

    let coverage = if expected_sources == 0 {
        1.0
    } else {
        (n / expected_sources as f64).min(1.0)
    };
    let confidence = (weight_sum / n * coverage).clamp(0.0, 1.0);

    let aggregate_sign = sign(score);
    let agreeing = usable
        .iter()
        .filter(|obs| sign(obs.score) == aggregate_sign)
        .count();

    Some(SentimentSnapshot {
        score,
        confidence,
        sources_used: usable.len(),
        agreement_level: agreeing as f64 / n,
    })
}

/// In-memory sentiment history indexed by symbol and source.
#[derive(Debug, Clone, Default)]
pub struct SentimentBook {
    series: BTreeMap<String, BTreeMap<String, Vec<SentimentObservation>>>,
    max_staleness_seconds: i64,
    expected_sources: usize,
}

impl SentimentBook {
    pub fn new(
        observations: Vec<SentimentObservation>,
        max_staleness_seconds: i64,
        expected_sources: usize,
    ) -> Self {
        let mut series: BTreeMap<String, BTreeMap<String, Vec<SentimentObservation>>> =
            BTreeMap::new();
        for obs in observations {
            series
                .entry(obs.symbol.clone())
                .or_default()
                .entry(obs.source.clone())
                .or_default()
                .push(obs);
        }
        for sources in series.values_mut() {
            for rows in sources.values_mut() {
                rows.sort_by_key(|obs| obs.timestamp);
            }
        }
        Self {
            series,
            max_staleness_seconds,
            expected_sources,
        }
    }

    pub fn observation_count(&self) -> usize {
        self.series
            .values()
            .flat_map(|sources| sources.values())
            .map(Vec::len)
            .sum()
    }

    pub fn source_names(&self, symbol: &str) -> Vec<String> {
        self.series
            .get(symbol)
            .map(|sources| sources.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Latest observation per source at or before `timestamp`, no older than the
    /// staleness limit.
    fn nearest_prior(&self, symbol: &str, timestamp: i64) -> Vec<&SentimentObservation> {
        let Some(sources) = self.series.get(symbol) else {
            return Vec::new();
        };
        sources
            .values()
            .filter_map(|rows| {
                let idx = rows.partition_point(|obs| obs.timestamp <= timestamp);
                if idx == 0 {
                    return None;
                }
                let obs = &rows[idx - 1];
                if timestamp - obs.timestamp > self.max_staleness_seconds {
                    None
                } else {
                    Some(obs)
                }
            })
            .collect()
    }
}

impl SentimentSource for SentimentBook {
    fn snapshot(&self, symbol: &str, timestamp: i64) -> Result<Option<SentimentSnapshot>, String> {
        let observations = self.nearest_prior(symbol, timestamp);
        Ok(aggregate_observations(&observations, self.expected_sources))
    }
}
