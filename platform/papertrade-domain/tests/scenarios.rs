use chrono::NaiveDate;
use papertrade_domain::entities::agent::{AgentConfig, ConfigError};
use papertrade_domain::entities::metrics::MetricsConfig;
use papertrade_domain::entities::run::{BacktestRun, RunSpec, RunState};
use papertrade_domain::entities::sizing::{PositionSizing, QuantityRule};
use papertrade_domain::repositories::sentiment::SentimentSource;
use papertrade_domain::repositories::technical::TechnicalIndicatorSource;
use papertrade_domain::services::engine::backtest::{BacktestOrchestrator, EngineError};
use papertrade_domain::services::market_data_source::VecBarSource;
use papertrade_domain::services::sentiment::{SentimentBook, SentimentObservation};
use papertrade_domain::services::technical::{TechnicalConfig, WindowedTechnicalProvider};
use papertrade_domain::value_objects::action::Action;
use papertrade_domain::value_objects::bar::Bar;
use papertrade_domain::value_objects::sentiment::SentimentSnapshot;
use papertrade_domain::value_objects::technical::{TechnicalSnapshot, Trend};
use papertrade_domain::value_objects::timeframe::{MarketCalendar, Timeframe};
use papertrade_domain::value_objects::trade::TradeReason;

const DAY: i64 = 86_400;

struct ConstantTrend(Trend);

impl TechnicalIndicatorSource for ConstantTrend {
    fn lookback(&self) -> usize {
        1
    }

    fn snapshot(&self, _symbol: &str, _window: &[Bar]) -> TechnicalSnapshot {
        TechnicalSnapshot::with_trend(self.0)
    }
}

struct ConstantSentiment(SentimentSnapshot);

impl SentimentSource for ConstantSentiment {
    fn snapshot(&self, _symbol: &str, _ts: i64) -> Result<Option<SentimentSnapshot>, String> {
        Ok(Some(self.0))
    }
}

/// Deterministic pseudo-random sentiment so neutral-trend runs see every kind of score.
struct NoisySentiment;

impl SentimentSource for NoisySentiment {
    fn snapshot(&self, _symbol: &str, ts: i64) -> Result<Option<SentimentSnapshot>, String> {
        let step = (ts / DAY) % 7;
        Ok(Some(SentimentSnapshot {
            score: -1.0 + step as f64 / 3.0,
            confidence: 1.0,
            sources_used: 3,
            agreement_level: 1.0,
        }))
    }
}

fn bullish() -> ConstantSentiment {
    ConstantSentiment(SentimentSnapshot {
        score: 0.8,
        confidence: 0.9,
        sources_used: 3,
        agreement_level: 1.0,
    })
}

fn agent() -> AgentConfig {
    AgentConfig {
        agent_id: "momentum".to_string(),
        symbol: "AAPL".to_string(),
        timeframe: Timeframe::parse("1d").expect("tf"),
        max_position_size: PositionSizing::Fraction(0.5),
        stop_loss_pct: 0.03,
        take_profit_pct: 0.06,
        min_confidence: 0.6,
        entry_threshold: 0.3,
        exit_threshold: -0.2,
        max_daily_trades: 4,
        quantity_rule: QuantityRule::WholeShares,
    }
}

fn spec(initial_capital: f64) -> RunSpec {
    RunSpec {
        run_id: "scenario".to_string(),
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
        end_date: NaiveDate::from_ymd_opt(2024, 12, 31).expect("date"),
        initial_capital,
        calendar: MarketCalendar::Equities,
        metrics: MetricsConfig::default(),
    }
}

fn bar(day: i64, low: f64, high: f64, close: f64) -> Bar {
    Bar {
        symbol: "AAPL".to_string(),
        timeframe: "1day".to_string(),
        timestamp: day * DAY,
        open: close,
        high,
        low,
        close,
        volume: 1_000.0,
    }
}

fn flat(day: i64, close: f64) -> Bar {
    bar(day, close, close, close)
}

fn run_with(
    spec: RunSpec,
    agent: AgentConfig,
    bars: Vec<Bar>,
    technical: &dyn TechnicalIndicatorSource,
    sentiment: &dyn SentimentSource,
) -> BacktestRun {
    BacktestOrchestrator::new(spec, agent, VecBarSource::new(bars), technical, sentiment)
        .run()
        .expect("run")
}

#[test]
fn no_data_completes_with_zero_trades() {
    let run = run_with(
        spec(10_000.0),
        agent(),
        Vec::new(),
        &ConstantTrend(Trend::Bullish),
        &bullish(),
    );
    assert_eq!(run.state, RunState::Finalized);
    assert_eq!(run.metrics.total_trades, 0);
    assert_eq!(run.metrics.total_return_pct, 0.0);
    assert_eq!(run.metrics.win_rate, 0.0);
    assert_eq!(run.metrics.sharpe_ratio, 0.0);
}

#[test]
fn stop_loss_fills_at_stop_price_not_close() {
    let bars = vec![flat(1, 100.0), bar(2, 96.0, 100.5, 99.0)];
    let run = run_with(
        spec(10_000.0),
        agent(),
        bars,
        &ConstantTrend(Trend::Bullish),
        &bullish(),
    );

    assert_eq!(run.trades.len(), 2);
    let exit = &run.trades[1];
    assert_eq!(exit.action, Action::Sell);
    assert_eq!(exit.reason, TradeReason::StopLossHit);
    assert!((exit.price - 97.00).abs() < 1e-9);
    assert!((exit.pnl - (97.0 - 100.0) * exit.quantity).abs() < 1e-9);
    assert!(run
        .audit_events
        .iter()
        .any(|event| event.stage == "forced_exit" && event.details["reason"] == "stop_loss_hit"));
}

#[test]
fn neutral_trend_never_trades() {
    let bars: Vec<Bar> = (1..=60)
        .map(|day| flat(day, 100.0 + (day % 5) as f64))
        .collect();
    let run = run_with(
        spec(10_000.0),
        agent(),
        bars,
        &ConstantTrend(Trend::Neutral),
        &NoisySentiment,
    );
    assert!(run.trades.is_empty());
    assert_eq!(run.metrics.bars_processed, 60);
}

#[test]
fn constant_price_bullish_run_buys_exactly_once() {
    let bars: Vec<Bar> = (1..=30).map(|day| flat(day, 100.0)).collect();
    let run = run_with(
        spec(10_000.0),
        agent(),
        bars,
        &ConstantTrend(Trend::Bullish),
        &bullish(),
    );

    assert_eq!(run.trades.len(), 1);
    assert_eq!(run.trades[0].action, Action::Buy);
    assert_eq!(run.metrics.closed_trades, 0);
    assert_eq!(run.metrics.win_rate, 0.0);
    assert_eq!(run.metrics.total_return_pct, 0.0);
    assert!(run.equity_curve.iter().skip(1).all(|point| point.position_qty == 50.0));
}

#[test]
fn cash_below_price_downgrades_to_hold() {
    let bars = vec![flat(1, 150.0), flat(2, 150.0)];
    let mut agent = agent();
    agent.max_position_size = PositionSizing::Fraction(1.0);
    let run = run_with(
        spec(120.0),
        agent,
        bars,
        &ConstantTrend(Trend::Bullish),
        &bullish(),
    );
    assert!(run.trades.is_empty());
    assert_eq!(run.final_capital, 120.0);
}

#[test]
fn invalid_sizing_fails_before_the_loop() {
    let mut agent = agent();
    agent.max_position_size = PositionSizing::Absolute(-5.0);
    let technical = ConstantTrend(Trend::Bullish);
    let sentiment = bullish();
    let mut engine = BacktestOrchestrator::new(
        spec(10_000.0),
        agent,
        VecBarSource::new(vec![flat(1, 100.0)]),
        &technical,
        &sentiment,
    );
    match engine.run() {
        Err(EngineError::Config(ConfigError::InvalidSizing(_))) => {}
        other => panic!("expected sizing error, got {:?}", other.map(|run| run.run_id)),
    }
    assert_eq!(engine.state(), RunState::Failed);
}

#[test]
fn windowed_provider_warms_up_before_first_entry() {
    let technical = WindowedTechnicalProvider::new(TechnicalConfig {
        lookback: 6,
        sma_short: 2,
        sma_long: 5,
        rsi_period: 3,
        volume_window: 3,
        neutral_band: 0.001,
    })
    .expect("technical config");
    let sentiment = SentimentBook::new(
        vec![SentimentObservation {
            timestamp: 0,
            symbol: "AAPL".to_string(),
            source: "news".to_string(),
            score: 0.8,
            confidence: 0.9,
        }],
        365 * DAY,
        1,
    );
    let bars: Vec<Bar> = (1..=10).map(|day| flat(day, 99.0 + day as f64)).collect();

    let run = run_with(spec(10_000.0), agent(), bars, &technical, &sentiment);

    let first = run.trades.first().expect("an entry after warm-up");
    assert_eq!(first.action, Action::Buy);
    assert_eq!(first.timestamp, 6 * DAY);
    assert!((first.price - 105.0).abs() < 1e-9);
}

/// Synthetic fixture shaped like the reference run: 34 round trips, 31 take-profit exits
/// and 3 stop-outs.
#[test]
fn regression_fixture_reproduces_reference_run() {
    let losing_cycles = [5usize, 17, 29];
    let mut bars = Vec::new();
    for cycle in 0..34usize {
        let entry_day = (cycle as i64) * 2 + 1;
        bars.push(flat(entry_day, 100.0));
        if losing_cycles.contains(&cycle) {
            bars.push(bar(entry_day + 1, 96.0, 100.0, 97.5));
        } else {
            bars.push(bar(entry_day + 1, 100.0, 106.0, 104.0));
        }
    }

    let mut agent = agent();
    agent.max_position_size = PositionSizing::Absolute(1_000.0);
    agent.take_profit_pct = 0.0577;
    let run = run_with(
        spec(20_000.0),
        agent,
        bars,
        &ConstantTrend(Trend::Bullish),
        &bullish(),
    );

    assert_eq!(run.metrics.closed_trades, 34);
    assert_eq!(run.metrics.total_trades, 68);
    assert_eq!(run.metrics.winning_trades, 31);
    assert_eq!(run.metrics.losing_trades, 3);
    assert!((run.metrics.win_rate - 31.0 / 34.0).abs() < 1e-12);
    assert!((run.metrics.win_rate - 0.91).abs() < 0.01);
    assert!((run.metrics.total_return_pct - 8.4935).abs() < 1e-6);
    assert!((run.metrics.total_return_pct - 8.5).abs() < 0.05);
    assert!(run.metrics.max_drawdown_pct > 0.0);
    let stops = run
        .trades
        .iter()
        .filter(|trade| trade.reason == TradeReason::StopLossHit)
        .count();
    assert_eq!(stops, 3);
}

#[test]
fn repeated_runs_are_identical() {
    let bars: Vec<Bar> = (1..=40)
        .map(|day| {
            let close = 100.0 + ((day * 7) % 11) as f64;
            bar(day, close - 3.5, close + 4.0, close)
        })
        .collect();
    let first = run_with(
        spec(10_000.0),
        agent(),
        bars.clone(),
        &ConstantTrend(Trend::Bullish),
        &bullish(),
    );
    let second = run_with(
        spec(10_000.0),
        agent(),
        bars,
        &ConstantTrend(Trend::Bullish),
        &bullish(),
    );
    assert_eq!(first.trades, second.trades);
    assert_eq!(first.metrics, second.metrics);
    assert_eq!(first.config_snapshot, second.config_snapshot);
}
