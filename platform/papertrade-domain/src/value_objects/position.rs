use serde::{Deserialize, Serialize};

/// An open long position. Created by a BUY, removed by the SELL that closes it in full.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub avg_entry_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub opened_at: i64,
}

impl Position {
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.avg_entry_price) * self.quantity
    }
}
