use crate::value_objects::action::Action;
use serde::{Deserialize, Serialize};

/// Why a trade happened. Forced exits carry their own reasons so the audit trail can
/// tell them apart from synthesizer exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeReason {
    SignalEntry,
    SignalExit,
    StopLossHit,
    TakeProfitHit,
}

impl TradeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeReason::SignalEntry => "signal_entry",
            TradeReason::SignalExit => "signal_exit",
            TradeReason::StopLossHit => "stop_loss_hit",
            TradeReason::TakeProfitHit => "take_profit_hit",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim() {
            "signal_entry" => Ok(TradeReason::SignalEntry),
            "signal_exit" => Ok(TradeReason::SignalExit),
            "stop_loss_hit" => Ok(TradeReason::StopLossHit),
            "take_profit_hit" => Ok(TradeReason::TakeProfitHit),
            other => Err(format!("unsupported trade reason: {other}")),
        }
    }

    pub fn is_forced(&self) -> bool {
        matches!(self, TradeReason::StopLossHit | TradeReason::TakeProfitHit)
    }
}

/// An executed fill. BUY rows carry zero pnl; the SELL row that closes a position
/// carries the realized result.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Trade {
    pub timestamp: i64,
    pub action: Action,
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub reason: TradeReason,
}

impl Trade {
    pub fn is_close(&self) -> bool {
        self.action == Action::Sell
    }
}
