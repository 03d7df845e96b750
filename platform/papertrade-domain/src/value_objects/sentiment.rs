use serde::{Deserialize, Serialize};

/// Aggregated sentiment for one symbol at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SentimentSnapshot {
    /// In `[-1, 1]`.
    pub score: f64,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub sources_used: usize,
    pub agreement_level: f64,
}

impl SentimentSnapshot {
    /// Placeholder used when no source could be consulted. Confidence is zero so it
    /// never satisfies an entry gate.
    pub fn unavailable() -> Self {
        Self {
            score: 0.0,
            confidence: 0.0,
            sources_used: 0,
            agreement_level: 0.0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.sources_used > 0
    }

    /// Clamp provider output back into range; non-finite values count as unavailable.
    pub fn sanitized(self) -> Self {
        if !self.score.is_finite() || !self.confidence.is_finite() {
            return Self::unavailable();
        }
        Self {
            score: self.score.clamp(-1.0, 1.0),
            confidence: self.confidence.clamp(0.0, 1.0),
            sources_used: self.sources_used,
            agreement_level: if self.agreement_level.is_finite() {
                self.agreement_level.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }
}
