use crate::value_objects::action::Action;
use crate::value_objects::bar::Bar;
use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::position::Position;
use crate::value_objects::trade::{Trade, TradeReason};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    NonPositiveQuantity(f64),
    NonPositivePrice(f64),
    InsufficientCash { required: f64, available: f64 },
    PositionAlreadyOpen(String),
    NoOpenPosition(String),
    PartialCloseUnsupported { requested: f64, held: f64 },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::NonPositiveQuantity(qty) => write!(f, "quantity must be > 0 (got {qty})"),
            LedgerError::NonPositivePrice(price) => write!(f, "price must be > 0 (got {price})"),
            LedgerError::InsufficientCash {
                required,
                available,
            } => write!(
                f,
                "insufficient cash: required {required:.2}, available {available:.2}"
            ),
            LedgerError::PositionAlreadyOpen(symbol) => {
                write!(f, "position already open for {symbol}")
            }
            LedgerError::NoOpenPosition(symbol) => write!(f, "no open position for {symbol}"),
            LedgerError::PartialCloseUnsupported { requested, held } => write!(
                f,
                "partial closes are not supported (requested {requested}, held {held})"
            ),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Stop-loss / take-profit distances applied to every new entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectiveExits {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl ProtectiveExits {
    pub fn levels(&self, entry_price: f64) -> (f64, f64) {
        (
            entry_price * (1.0 - self.stop_loss_pct),
            entry_price * (1.0 + self.take_profit_pct),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForcedExit {
    pub price: f64,
    pub reason: TradeReason,
}

/// Cash, open positions, trade log and equity curve of one run.
///
/// Long only, no leverage: cash never goes below zero and each symbol holds at most
/// one position, which is always closed in full.
#[derive(Debug, Clone)]
pub struct Portfolio {
    cash: f64,
    realized_pnl: f64,
    positions: BTreeMap<String, Position>,
    last_prices: BTreeMap<String, f64>,
    equity_curve: Vec<EquityPoint>,
    trades: Vec<Trade>,
    exits: ProtectiveExits,
}

impl Portfolio {
    pub fn new(initial_cash: f64, exits: ProtectiveExits) -> Self {
        Self {
            cash: initial_cash,
            realized_pnl: 0.0,
            positions: BTreeMap::new(),
            last_prices: BTreeMap::new(),
            equity_curve: Vec::new(),
            trades: Vec::new(),
            exits,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn open_positions(&self) -> usize {
        self.positions.len()
    }

    pub fn position_qty(&self, symbol: &str) -> f64 {
        self.positions
            .get(symbol)
            .map(|pos| pos.quantity)
            .unwrap_or(0.0)
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Total equity with `symbol` valued at `price` and every other holding at its
    /// last marked price.
    pub fn equity_at(&self, symbol: &str, price: f64) -> f64 {
        self.cash
            + self
                .positions
                .values()
                .map(|pos| {
                    let mark = if pos.symbol == symbol {
                        price
                    } else {
                        self.mark_price(pos)
                    };
                    pos.market_value(mark)
                })
                .sum::<f64>()
    }

    pub fn equity(&self) -> f64 {
        self.cash
            + self
                .positions
                .values()
                .map(|pos| pos.market_value(self.mark_price(pos)))
                .sum::<f64>()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.positions
            .values()
            .map(|pos| pos.unrealized_pnl(self.mark_price(pos)))
            .sum()
    }

    fn mark_price(&self, pos: &Position) -> f64 {
        self.last_prices
            .get(&pos.symbol)
            .copied()
            .unwrap_or(pos.avg_entry_price)
    }

    pub fn apply_buy(
        &mut self,
        symbol: &str,
        quantity: f64,
        price: f64,
        timestamp: i64,
    ) -> Result<Trade, LedgerError> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(LedgerError::NonPositiveQuantity(quantity));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(LedgerError::NonPositivePrice(price));
        }
        if self.positions.contains_key(symbol) {
            return Err(LedgerError::PositionAlreadyOpen(symbol.to_string()));
        }
        let cost = quantity * price;
        if cost > self.cash {
            return Err(LedgerError::InsufficientCash {
                required: cost,
                available: self.cash,
            });
        }

        self.cash -= cost;
        let (stop_loss_price, take_profit_price) = self.exits.levels(price);
        self.positions.insert(
            symbol.to_string(),
            Position {
                symbol: symbol.to_string(),
                quantity,
                avg_entry_price: price,
                stop_loss_price,
                take_profit_price,
                opened_at: timestamp,
            },
        );

        let trade = Trade {
            timestamp,
            action: Action::Buy,
            symbol: symbol.to_string(),
            quantity,
            price,
            pnl: 0.0,
            pnl_pct: 0.0,
            reason: TradeReason::SignalEntry,
        };
        self.trades.push(trade.clone());
        Ok(trade)
    }

    pub fn apply_sell(
        &mut self,
        symbol: &str,
        quantity: f64,
        price: f64,
        timestamp: i64,
        reason: TradeReason,
    ) -> Result<Trade, LedgerError> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(LedgerError::NonPositiveQuantity(quantity));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(LedgerError::NonPositivePrice(price));
        }
        let held = match self.positions.get(symbol) {
            Some(pos) => pos.quantity,
            None => return Err(LedgerError::NoOpenPosition(symbol.to_string())),
        };
        if quantity != held {
            return Err(LedgerError::PartialCloseUnsupported {
                requested: quantity,
                held,
            });
        }
        let Some(position) = self.positions.remove(symbol) else {
            return Err(LedgerError::NoOpenPosition(symbol.to_string()));
        };

        let pnl = (price - position.avg_entry_price) * quantity;
        let pnl_pct = (price / position.avg_entry_price - 1.0) * 100.0;
        self.cash += quantity * price;
        self.realized_pnl += pnl;
        self.last_prices.insert(symbol.to_string(), price);

        let trade = Trade {
            timestamp,
            action: Action::Sell,
            symbol: symbol.to_string(),
            quantity,
            price,
            pnl,
            pnl_pct,
            reason,
        };
        self.trades.push(trade.clone());
        Ok(trade)
    }

    /// Stop-loss wins when one bar breaches both levels.
    pub fn check_forced_exit(&self, bar: &Bar) -> Option<ForcedExit> {
        let position = self.positions.get(&bar.symbol)?;
        if bar.low <= position.stop_loss_price {
            return Some(ForcedExit {
                price: position.stop_loss_price,
                reason: TradeReason::StopLossHit,
            });
        }
        if bar.high >= position.take_profit_price {
            return Some(ForcedExit {
                price: position.take_profit_price,
                reason: TradeReason::TakeProfitHit,
            });
        }
        None
    }

    /// Appends one equity point; called once per bar whether or not anything traded.
    pub fn mark_to_market(&mut self, timestamp: i64, symbol: &str, price: f64) -> EquityPoint {
        if price.is_finite() && price > 0.0 {
            self.last_prices.insert(symbol.to_string(), price);
        }
        let point = EquityPoint {
            timestamp,
            equity: self.equity(),
            cash: self.cash,
            position_qty: self.position_qty(symbol),
            unrealized_pnl: self.unrealized_pnl(),
            realized_pnl: self.realized_pnl,
        };
        self.equity_curve.push(point.clone());
        point
    }

    pub fn into_parts(self) -> (Vec<EquityPoint>, Vec<Trade>) {
        (self.equity_curve, self.trades)
    }
}
