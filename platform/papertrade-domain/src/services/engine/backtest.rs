use crate::entities::agent::{AgentConfig, ConfigError};
use crate::entities::metrics::MetricsCalculator;
use crate::entities::portfolio::{Portfolio, ProtectiveExits};
use crate::entities::run::{BacktestRun, RunSpec, RunState};
use crate::repositories::sentiment::SentimentSource;
use crate::repositories::technical::TechnicalIndicatorSource;
use crate::services::audit::AuditEvent;
use crate::services::context::build_context;
use crate::services::market_data_source::MarketDataSource;
use crate::services::sizer::{PositionSizer, SizingDecision};
use crate::services::synthesizer::SignalSynthesizer;
use crate::value_objects::action::Action;
use crate::value_objects::bar::Bar;
use crate::value_objects::sentiment::SentimentSnapshot;
use crate::value_objects::signal::Signal;
use crate::value_objects::technical::TechnicalSnapshot;
use crate::value_objects::trade::{Trade, TradeReason};
use serde_json::json;
use std::fmt;
use tracing::{debug, info, warn};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Config(ConfigError),
    AlreadyRun(RunState),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Config(err) => write!(f, "{err}"),
            EngineError::AlreadyRun(state) => {
                write!(f, "backtest already executed (state {state:?})")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::Config(err)
    }
}

/// Executed trades per UTC calendar day.
#[derive(Debug, Clone, Copy)]
struct DailyTradeCounter {
    limit: u32,
    day: Option<i64>,
    count: u32,
}

impl DailyTradeCounter {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            day: None,
            count: 0,
        }
    }

    fn count_for(&self, timestamp: i64) -> u32 {
        if self.day == Some(timestamp.div_euclid(SECONDS_PER_DAY)) {
            self.count
        } else {
            0
        }
    }

    fn limit_reached(&self, timestamp: i64) -> bool {
        self.count_for(timestamp) >= self.limit
    }

    fn record(&mut self, timestamp: i64) {
        let day = timestamp.div_euclid(SECONDS_PER_DAY);
        if self.day != Some(day) {
            self.day = Some(day);
            self.count = 0;
        }
        self.count += 1;
    }
}

/// A bar with every external input already resolved.
#[derive(Debug, Clone)]
struct ResolvedBar {
    bar: Bar,
    technical: TechnicalSnapshot,
    sentiment: SentimentSnapshot,
}

/// Drives one agent over one bar sequence: `INIT -> RUNNING -> FINALIZED`, or
/// `INIT -> FAILED` when the configuration is rejected. Single use.
pub struct BacktestOrchestrator<'a, D>
where
    D: MarketDataSource,
{
    spec: RunSpec,
    agent: AgentConfig,
    data: D,
    technical: &'a dyn TechnicalIndicatorSource,
    sentiment: &'a dyn SentimentSource,
    state: RunState,
    audit_events: Vec<AuditEvent>,
}

impl<'a, D> BacktestOrchestrator<'a, D>
where
    D: MarketDataSource,
{
    pub fn new(
        spec: RunSpec,
        agent: AgentConfig,
        data: D,
        technical: &'a dyn TechnicalIndicatorSource,
        sentiment: &'a dyn SentimentSource,
    ) -> Self {
        Self {
            spec,
            agent,
            data,
            technical,
            sentiment,
            state: RunState::Init,
            audit_events: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn audit_events(&self) -> &[AuditEvent] {
        &self.audit_events
    }

    pub fn run(&mut self) -> Result<BacktestRun, EngineError> {
        if self.state != RunState::Init {
            return Err(EngineError::AlreadyRun(self.state));
        }

        if let Err(err) = self.spec.validate().and_then(|_| self.agent.validate()) {
            self.state = RunState::Failed;
            warn!(run_id = %self.spec.run_id, error = %err, "backtest config rejected");
            self.push_event(
                AuditEvent::new(
                    &self.spec.run_id,
                    0,
                    "config",
                    Some(&self.agent.symbol),
                    "rejected",
                    json!({ "agent_id": self.agent.agent_id }),
                )
                .with_error(err.to_string()),
            );
            return Err(EngineError::Config(err));
        }

        self.state = RunState::Running;
        info!(
            run_id = %self.spec.run_id,
            agent_id = %self.agent.agent_id,
            symbol = %self.agent.symbol,
            timeframe = %self.agent.timeframe.label,
            "backtest started"
        );
        self.push_event(AuditEvent::new(
            &self.spec.run_id,
            0,
            "engine",
            Some(&self.agent.symbol),
            "start",
            json!({
                "agent_id": self.agent.agent_id,
                "timeframe": self.agent.timeframe.label,
                "initial_capital": self.spec.initial_capital,
                "sizing": self.agent.max_position_size.label(),
            }),
        ));

        let inputs = self.prefetch();
        let run = self.simulate(inputs);
        self.state = RunState::Finalized;
        Ok(run)
    }

    fn push_event(&mut self, event: AuditEvent) {
        self.audit_events.push(event);
    }

    fn prefetch(&mut self) -> Vec<ResolvedBar> {
        let mut bars: Vec<Bar> = Vec::new();
        let mut skipped = 0usize;
        while let Some(bar) = self.data.next_bar() {
            let last_ts = bars.last().map(|prev| prev.timestamp);
            let reason = if last_ts.is_some_and(|prev| bar.timestamp <= prev) {
                Some("non_increasing_timestamp")
            } else if !bar.close.is_finite() || bar.close <= 0.0 {
                Some("invalid_close")
            } else if bar.symbol != self.agent.symbol {
                Some("symbol_mismatch")
            } else {
                None
            };

            if let Some(reason) = reason {
                skipped += 1;
                warn!(
                    run_id = %self.spec.run_id,
                    timestamp = bar.timestamp,
                    reason,
                    "skipping bar"
                );
                self.push_event(AuditEvent::new(
                    &self.spec.run_id,
                    bar.timestamp,
                    "data",
                    Some(&bar.symbol),
                    "skip_bar",
                    json!({ "reason": reason, "previous_timestamp": last_ts }),
                ));
                continue;
            }
            bars.push(bar);
        }
        if skipped > 0 {
            warn!(run_id = %self.spec.run_id, skipped, "dropped bars during prefetch");
        }

        let lookback = self.technical.lookback().max(1);
        let technicals: Vec<TechnicalSnapshot> = (0..bars.len())
            .map(|idx| {
                let start = (idx + 1).saturating_sub(lookback);
                self.technical.snapshot(&self.agent.symbol, &bars[start..=idx])
            })
            .collect();

        let mut unavailable = 0usize;
        let mut first_error: Option<String> = None;
        let sentiments: Vec<SentimentSnapshot> = bars
            .iter()
            .map(
                |bar| match self.sentiment.snapshot(&self.agent.symbol, bar.timestamp) {
                    Ok(Some(snapshot)) => snapshot.sanitized(),
                    Ok(None) => {
                        unavailable += 1;
                        SentimentSnapshot::unavailable()
                    }
                    Err(err) => {
                        unavailable += 1;
                        first_error.get_or_insert(err);
                        SentimentSnapshot::unavailable()
                    }
                },
            )
            .collect();

        if unavailable > 0 {
            warn!(
                run_id = %self.spec.run_id,
                bars = unavailable,
                error = first_error.as_deref().unwrap_or(""),
                "sentiment unavailable, using zero-confidence snapshot"
            );
            let mut event = AuditEvent::new(
                &self.spec.run_id,
                bars.first().map(|bar| bar.timestamp).unwrap_or(0),
                "sentiment",
                Some(&self.agent.symbol),
                "unavailable",
                json!({ "bars": unavailable }),
            );
            if let Some(err) = first_error {
                event = event.with_error(err);
            }
            self.push_event(event);
        }

        bars.into_iter()
            .zip(technicals)
            .zip(sentiments)
            .map(|((bar, technical), sentiment)| ResolvedBar {
                bar,
                technical,
                sentiment,
            })
            .collect()
    }

    fn simulate(&mut self, inputs: Vec<ResolvedBar>) -> BacktestRun {
        let symbol = self.agent.symbol.clone();
        let mut ledger = Portfolio::new(
            self.spec.initial_capital,
            ProtectiveExits {
                stop_loss_pct: self.agent.stop_loss_pct,
                take_profit_pct: self.agent.take_profit_pct,
            },
        );
        let sizer = PositionSizer::new(self.agent.max_position_size, self.agent.quantity_rule);
        let synthesizer = SignalSynthesizer::from_agent(&self.agent);
        let mut daily = DailyTradeCounter::new(self.agent.max_daily_trades);
        let mut last_ts = 0i64;

        for input in inputs {
            let ts = input.bar.timestamp;
            let close = input.bar.close;
            last_ts = ts;

            let mut forced_this_bar = false;
            if let Some(exit) = ledger.check_forced_exit(&input.bar) {
                let qty = ledger.position_qty(&symbol);
                match ledger.apply_sell(&symbol, qty, exit.price, ts, exit.reason) {
                    Ok(trade) => {
                        forced_this_bar = true;
                        daily.record(ts);
                        info!(
                            run_id = %self.spec.run_id,
                            timestamp = ts,
                            reason = exit.reason.as_str(),
                            price = exit.price,
                            pnl = trade.pnl,
                            "forced exit"
                        );
                        self.push_event(trade_event(&self.spec.run_id, "forced_exit", &trade));
                    }
                    Err(err) => {
                        self.push_event(
                            AuditEvent::new(
                                &self.spec.run_id,
                                ts,
                                "ledger",
                                Some(&symbol),
                                "reject",
                                json!({ "reason": exit.reason.as_str(), "qty": qty }),
                            )
                            .with_error(err.to_string()),
                        );
                    }
                }
            }

            let ctx = build_context(input.bar, input.technical, input.sentiment);
            let signal = if forced_this_bar {
                Signal::hold(ctx.sentiment.confidence, "forced exit this bar")
            } else {
                synthesizer.decide(&ctx, ledger.has_position(&symbol))
            };

            match signal.action {
                Action::Buy => {
                    if daily.limit_reached(ts) {
                        self.downgrade(ts, &symbol, &signal, "daily trade limit reached");
                    } else {
                        match sizer.size(ledger.cash(), ledger.equity_at(&symbol, close), close) {
                            SizingDecision::Shares(qty) => {
                                match ledger.apply_buy(&symbol, qty, close, ts) {
                                    Ok(trade) => {
                                        daily.record(ts);
                                        debug!(
                                            run_id = %self.spec.run_id,
                                            timestamp = ts,
                                            qty,
                                            price = close,
                                            rationale = %signal.rationale,
                                            "entry"
                                        );
                                        self.push_event(trade_event(
                                            &self.spec.run_id,
                                            "trade",
                                            &trade,
                                        ));
                                    }
                                    Err(err) => self.push_event(
                                        AuditEvent::new(
                                            &self.spec.run_id,
                                            ts,
                                            "ledger",
                                            Some(&symbol),
                                            "reject",
                                            json!({ "action": "BUY", "qty": qty, "price": close }),
                                        )
                                        .with_error(err.to_string()),
                                    ),
                                }
                            }
                            SizingDecision::Insufficient => {
                                self.downgrade(ts, &symbol, &signal, "insufficient capital");
                            }
                        }
                    }
                }
                Action::Sell => {
                    let qty = ledger.position_qty(&symbol);
                    match ledger.apply_sell(&symbol, qty, close, ts, TradeReason::SignalExit) {
                        Ok(trade) => {
                            daily.record(ts);
                            debug!(
                                run_id = %self.spec.run_id,
                                timestamp = ts,
                                pnl = trade.pnl,
                                rationale = %signal.rationale,
                                "exit"
                            );
                            self.push_event(trade_event(&self.spec.run_id, "trade", &trade));
                        }
                        Err(err) => self.push_event(
                            AuditEvent::new(
                                &self.spec.run_id,
                                ts,
                                "ledger",
                                Some(&symbol),
                                "reject",
                                json!({ "action": "SELL", "qty": qty, "price": close }),
                            )
                            .with_error(err.to_string()),
                        ),
                    }
                }
                Action::Hold => {}
            }

            ledger.mark_to_market(ts, &symbol, close);
        }

        let calculator = MetricsCalculator::new(
            self.spec.metrics,
            self.agent.timeframe.bars_per_year(self.spec.calendar),
        );
        let summary = calculator.summarize(
            self.spec.initial_capital,
            ledger.equity_curve(),
            ledger.trades(),
        );
        let open_at_end = ledger.has_position(&symbol);
        let (equity_curve, trades) = ledger.into_parts();

        info!(
            run_id = %self.spec.run_id,
            bars = summary.bars_processed,
            trades = summary.total_trades,
            total_return_pct = summary.total_return_pct,
            "backtest finalized"
        );
        self.push_event(AuditEvent::new(
            &self.spec.run_id,
            last_ts,
            "engine",
            Some(&symbol),
            "complete",
            json!({
                "bars_processed": summary.bars_processed,
                "trades": summary.total_trades,
                "closed_trades": summary.closed_trades,
                "net_profit": summary.net_profit,
                "sharpe": summary.sharpe_ratio,
                "max_drawdown_pct": summary.max_drawdown_pct,
                "open_position_at_end": open_at_end,
            }),
        ));

        BacktestRun {
            run_id: self.spec.run_id.clone(),
            agent_id: self.agent.agent_id.clone(),
            symbol,
            timeframe: self.agent.timeframe.label.clone(),
            start_date: self.spec.start_date,
            end_date: self.spec.end_date,
            initial_capital: self.spec.initial_capital,
            final_capital: summary.final_equity,
            trades,
            equity_curve,
            metrics: summary,
            config_snapshot: self.config_snapshot(),
            state: RunState::Finalized,
            audit_events: self.audit_events.clone(),
        }
    }

    fn downgrade(&mut self, ts: i64, symbol: &str, signal: &Signal, reason: &str) {
        debug!(run_id = %self.spec.run_id, timestamp = ts, reason, "entry downgraded to HOLD");
        self.push_event(AuditEvent::new(
            &self.spec.run_id,
            ts,
            "signal",
            Some(symbol),
            "downgrade",
            json!({
                "from": signal.action.as_str(),
                "reason": reason,
                "confidence": signal.confidence,
                "rationale": signal.rationale,
            }),
        ));
    }

    fn config_snapshot(&self) -> serde_json::Value {
        json!({
            "agent": self.agent.snapshot(),
            "run": {
                "initial_capital": self.spec.initial_capital,
                "start_date": self.spec.start_date.to_string(),
                "end_date": self.spec.end_date.to_string(),
                "calendar": self.spec.calendar,
                "metrics": self.spec.metrics,
            },
        })
    }
}

fn trade_event(run_id: &str, stage: &str, trade: &Trade) -> AuditEvent {
    AuditEvent::new(
        run_id,
        trade.timestamp,
        stage,
        Some(&trade.symbol),
        trade.action.as_str(),
        json!({
            "qty": trade.quantity,
            "price": trade.price,
            "pnl": trade.pnl,
            "pnl_pct": trade.pnl_pct,
            "reason": trade.reason.as_str(),
        }),
    )
}
