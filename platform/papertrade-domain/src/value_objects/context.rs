use crate::value_objects::bar::Bar;
use crate::value_objects::sentiment::SentimentSnapshot;
use crate::value_objects::technical::TechnicalSnapshot;

/// Everything the synthesizer sees for one timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketContext {
    pub bar: Bar,
    pub technical: TechnicalSnapshot,
    pub sentiment: SentimentSnapshot,
}
