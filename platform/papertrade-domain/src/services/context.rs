use crate::value_objects::bar::Bar;
use crate::value_objects::context::MarketContext;
use crate::value_objects::sentiment::SentimentSnapshot;
use crate::value_objects::technical::TechnicalSnapshot;

/// Pure merge of already-resolved inputs.
pub fn build_context(
    bar: Bar,
    technical: TechnicalSnapshot,
    sentiment: SentimentSnapshot,
) -> MarketContext {
    MarketContext {
        bar,
        technical,
        sentiment,
    }
}
