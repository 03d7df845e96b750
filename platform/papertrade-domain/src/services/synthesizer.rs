use crate::entities::agent::AgentConfig;
use crate::value_objects::action::Action;
use crate::value_objects::context::MarketContext;
use crate::value_objects::signal::Signal;
use crate::value_objects::technical::Trend;

/// Entry/exit rules of one agent. A neutral trend never confirms either side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSynthesizer {
    pub min_confidence: f64,
    pub entry_threshold: f64,
    pub exit_threshold: f64,
}

impl SignalSynthesizer {
    pub fn from_agent(agent: &AgentConfig) -> Self {
        Self {
            min_confidence: agent.min_confidence,
            entry_threshold: agent.entry_threshold,
            exit_threshold: agent.exit_threshold,
        }
    }

    pub fn decide(&self, ctx: &MarketContext, has_position: bool) -> Signal {
        let confidence = ctx.sentiment.confidence;
        let score = ctx.sentiment.score;
        let trend = ctx.technical.trend;

        if has_position {
            if trend == Trend::Bearish {
                return Signal {
                    action: Action::Sell,
                    confidence,
                    rationale: "bearish trend".to_string(),
                };
            }
            // A placeholder snapshot carries no opinion, so only the trend can exit.
            if ctx.sentiment.is_available() && score <= self.exit_threshold {
                return Signal {
                    action: Action::Sell,
                    confidence,
                    rationale: format!(
                        "sentiment {score:.3} at or below exit threshold {:.3}",
                        self.exit_threshold
                    ),
                };
            }
            return Signal::hold(confidence, "no exit condition");
        }

        match trend {
            Trend::InsufficientData => return Signal::hold(confidence, "warming up"),
            Trend::Bullish => {}
            other => {
                return Signal::hold(
                    confidence,
                    format!("trend {} does not confirm entry", other.as_str()),
                )
            }
        }
        if score < self.entry_threshold {
            return Signal::hold(
                confidence,
                format!(
                    "sentiment {score:.3} below entry threshold {:.3}",
                    self.entry_threshold
                ),
            );
        }
        if confidence < self.min_confidence {
            return Signal::hold(
                confidence,
                format!(
                    "confidence {confidence:.3} below minimum {:.3}",
                    self.min_confidence
                ),
            );
        }

        Signal {
            action: Action::Buy,
            confidence,
            rationale: format!("bullish trend with sentiment {score:.3}"),
        }
    }
}
