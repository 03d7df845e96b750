use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::trade::Trade;
use serde::{Deserialize, Serialize};

/// Per-bar return dispersion below this is treated as zero.
const ZERO_VARIANCE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MetricsSummary {
    pub bars_processed: usize,
    pub total_trades: usize,
    pub closed_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub final_equity: f64,
    pub net_profit: f64,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    /// `0.0` when the return series has no variance.
    pub sharpe_ratio: f64,
    /// Fraction in `[0, 1]` over closed trades.
    pub win_rate: f64,
    pub avg_trade_pnl: f64,
    pub exposure_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsConfig {
    /// Annual rate, converted to a per-bar rate before computing excess returns.
    pub risk_free_rate: f64,
    pub annualization_factor: Option<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            annualization_factor: None,
        }
    }
}

/// Derives the run summary from the ledger's equity curve and trade log.
#[derive(Debug, Clone, Copy)]
pub struct MetricsCalculator {
    config: MetricsConfig,
    bars_per_year: f64,
}

impl MetricsCalculator {
    pub fn new(config: MetricsConfig, bars_per_year: f64) -> Self {
        Self {
            config,
            bars_per_year,
        }
    }

    pub fn annualization_factor(&self) -> f64 {
        self.config
            .annualization_factor
            .filter(|factor| factor.is_finite() && *factor > 0.0)
            .unwrap_or(self.bars_per_year)
    }

    pub fn summarize(
        &self,
        initial_capital: f64,
        equity_curve: &[EquityPoint],
        trades: &[Trade],
    ) -> MetricsSummary {
        let final_equity = equity_curve
            .last()
            .map(|point| point.equity)
            .unwrap_or(initial_capital);
        let net_profit = final_equity - initial_capital;
        let total_return_pct = if initial_capital > 0.0 {
            net_profit / initial_capital * 100.0
        } else {
            0.0
        };

        let closed: Vec<&Trade> = trades.iter().filter(|trade| trade.is_close()).collect();
        let winning_trades = closed.iter().filter(|trade| trade.pnl > 0.0).count();
        let losing_trades = closed.iter().filter(|trade| trade.pnl < 0.0).count();
        let avg_trade_pnl = if closed.is_empty() {
            0.0
        } else {
            closed.iter().map(|trade| trade.pnl).sum::<f64>() / closed.len() as f64
        };

        let exposed_bars = equity_curve
            .iter()
            .filter(|point| point.position_qty > 0.0)
            .count();
        let exposure_pct = if equity_curve.is_empty() {
            0.0
        } else {
            exposed_bars as f64 / equity_curve.len() as f64 * 100.0
        };

        MetricsSummary {
            bars_processed: equity_curve.len(),
            total_trades: trades.len(),
            closed_trades: closed.len(),
            winning_trades,
            losing_trades,
            final_equity,
            net_profit,
            total_return_pct,
            max_drawdown_pct: max_drawdown(equity_curve) * 100.0,
            sharpe_ratio: self.sharpe_ratio(equity_curve),
            win_rate: win_rate(trades),
            avg_trade_pnl,
            exposure_pct,
        }
    }

    pub fn sharpe_ratio(&self, equity_curve: &[EquityPoint]) -> f64 {
        if equity_curve.len() < 2 {
            return 0.0;
        }

        let factor = self.annualization_factor();
        let rf_per_bar = if factor > 0.0 {
            self.config.risk_free_rate / factor
        } else {
            0.0
        };

        let mut returns = Vec::with_capacity(equity_curve.len() - 1);
        for pair in equity_curve.windows(2) {
            let prev = pair[0].equity;
            let curr = pair[1].equity;
            if prev > 0.0 {
                returns.push(curr / prev - 1.0 - rf_per_bar);
            }
        }

        if returns.len() < 2 {
            return 0.0;
        }

        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let var = returns
            .iter()
            .map(|ret| {
                let diff = ret - mean;
                diff * diff
            })
            .sum::<f64>()
            / (returns.len() as f64 - 1.0);

        let std = var.sqrt();
        if !std.is_finite() || std <= ZERO_VARIANCE_EPSILON {
            0.0
        } else {
            mean / std * factor.sqrt()
        }
    }
}

/// Largest peak-to-trough decline as a fraction of the running peak.
pub fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let mut peak = 0.0f64;
    let mut worst = 0.0f64;
    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        } else if peak > 0.0 {
            let drawdown = (peak - point.equity) / peak;
            if drawdown > worst {
                worst = drawdown;
            }
        }
    }
    worst
}

/// Winning closes over all closes; positions still open are not counted.
pub fn win_rate(trades: &[Trade]) -> f64 {
    let mut wins = 0usize;
    let mut total = 0usize;
    for trade in trades.iter().filter(|trade| trade.is_close()) {
        total += 1;
        if trade.pnl > 0.0 {
            wins += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        wins as f64 / total as f64
    }
}
