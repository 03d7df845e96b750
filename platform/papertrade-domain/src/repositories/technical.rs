use crate::value_objects::bar::Bar;
use crate::value_objects::technical::TechnicalSnapshot;

pub trait TechnicalIndicatorSource {
    /// Number of trailing bars the provider wants in `window`.
    fn lookback(&self) -> usize;

    /// `window` ends with the bar being evaluated and is shorter than `lookback`
    /// during warm-up.
    fn snapshot(&self, symbol: &str, window: &[Bar]) -> TechnicalSnapshot;
}
