use crate::value_objects::sentiment::SentimentSnapshot;

pub trait SentimentSource {
    /// Nearest-prior aggregated sentiment, or `None` when nothing is known yet.
    fn snapshot(&self, symbol: &str, timestamp: i64) -> Result<Option<SentimentSnapshot>, String>;
}
