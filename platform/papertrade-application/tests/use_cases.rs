use chrono::NaiveDate;
use papertrade_application::backtesting::{run_backtest, technical_provider, BacktestRequest};
use papertrade_application::config::{parse_config, Config};
use papertrade_application::validation::validate;
use papertrade_domain::entities::run::{BacktestRun, RunState};
use papertrade_domain::repositories::market_data::{BarQuery, HistoricalBarSource};
use papertrade_domain::repositories::runs::RunSink;
use papertrade_domain::repositories::sentiment::SentimentSource;
use papertrade_domain::services::ohlcv::{data_quality_from_bars, DataQualityReport};
use papertrade_domain::value_objects::bar::Bar;
use papertrade_domain::value_objects::sentiment::SentimentSnapshot;
use papertrade_domain::value_objects::trade::Trade;
use std::cell::RefCell;

// 2024-01-01T00:00:00Z
const JAN_1_2024: i64 = 1_704_067_200;

const CONFIG: &str = r#"
[run]
initial_capital = 10000.0
out_dir = "runs"
calendar = "continuous"

[data]
ohlcv_dir = "data/ohlcv"

[technical]
lookback = 5
sma_short = 2
sma_long = 5
rsi_period = 3
volume_window = 3
neutral_band = 0.0

[[agents]]
id = "trend"
symbol = "ACME"
timeframe = "1d"
max_position_size = 0.5
stop_loss_pct = 0.05
take_profit_pct = 0.04
min_confidence = 0.5
entry_threshold = 0.2
exit_threshold = -0.2
max_daily_trades = 2

[[agents]]
id = "broken"
symbol = "ACME"
timeframe = "1d"
max_position_size = 0.5
stop_loss_pct = 1.5
take_profit_pct = 0.04
min_confidence = 0.5
entry_threshold = 0.2
exit_threshold = -0.2
max_daily_trades = 2
"#;

fn config() -> Config {
    parse_config(CONFIG).expect("config")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

fn rising_bars(count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let close = 100.0 + i as f64;
            Bar {
                symbol: "ACME".to_string(),
                timeframe: "1day".to_string(),
                timestamp: JAN_1_2024 + 86_400 * i as i64,
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 1_000.0,
            }
        })
        .collect()
}

struct FakeBarSource {
    bars: Vec<Bar>,
    queries: RefCell<Vec<BarQuery>>,
}

impl FakeBarSource {
    fn new(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            queries: RefCell::new(Vec::new()),
        }
    }
}

impl HistoricalBarSource for FakeBarSource {
    fn load_bars(&self, query: &BarQuery) -> Result<(Vec<Bar>, DataQualityReport), String> {
        self.queries.borrow_mut().push(query.clone());
        let bars: Vec<Bar> = self
            .bars
            .iter()
            .filter(|bar| bar.symbol == query.symbol && query.contains(bar.timestamp))
            .cloned()
            .collect();
        let report = data_quality_from_bars(&bars, Some(query.timeframe.step_seconds));
        Ok((bars, report))
    }
}

struct BullishSentiment;

impl SentimentSource for BullishSentiment {
    fn snapshot(&self, _symbol: &str, _timestamp: i64) -> Result<Option<SentimentSnapshot>, String> {
        Ok(Some(SentimentSnapshot {
            score: 0.7,
            confidence: 0.9,
            sources_used: 2,
            agreement_level: 1.0,
        }))
    }
}

#[derive(Default)]
struct RecordingSink {
    saved: RefCell<Vec<(String, usize)>>,
}

impl RunSink for RecordingSink {
    fn save_run(&self, run: &BacktestRun, trades: &[Trade]) -> Result<String, String> {
        self.saved
            .borrow_mut()
            .push((run.run_id.clone(), trades.len()));
        Ok(run.run_id.clone())
    }
}

fn request(agent_id: &str, save: bool) -> BacktestRequest {
    BacktestRequest {
        agent_id: agent_id.to_string(),
        start: date(2024, 1, 1),
        end: date(2024, 1, 31),
        save,
    }
}

#[test]
fn saved_run_is_handed_to_the_sink_with_its_trades() {
    let config = config();
    let bars = FakeBarSource::new(rising_bars(40));
    let technical = technical_provider(&config).expect("technical");
    let sink = RecordingSink::default();

    let outcome = run_backtest(
        &config,
        &request("trend", true),
        &bars,
        &technical,
        &BullishSentiment,
        &sink,
    )
    .expect("backtest");

    assert_eq!(outcome.run.state, RunState::Finalized);
    assert_eq!(outcome.run.metrics.bars_processed, 31);
    assert!(outcome.run.metrics.total_trades > 0);
    assert_eq!(outcome.data_report.rows, 31);
    assert_eq!(outcome.saved_as.as_deref(), Some(outcome.run.run_id.as_str()));
    assert_eq!(
        sink.saved.borrow().as_slice(),
        &[(outcome.run.run_id.clone(), outcome.run.trades.len())]
    );
    assert!(outcome.run.run_id.starts_with("trend_20240101_20240131_"));
    assert!(outcome
        .run
        .audit_events
        .iter()
        .any(|event| event.stage == "timing" && event.action == "load_bars"));

    let queries = bars.queries.borrow();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].symbol, "ACME");
}

#[test]
fn no_save_skips_the_sink() {
    let config = config();
    let bars = FakeBarSource::new(rising_bars(40));
    let technical = technical_provider(&config).expect("technical");
    let sink = RecordingSink::default();

    let outcome = run_backtest(
        &config,
        &request("trend", false),
        &bars,
        &technical,
        &BullishSentiment,
        &sink,
    )
    .expect("backtest");

    assert!(outcome.saved_as.is_none());
    assert!(sink.saved.borrow().is_empty());
}

#[test]
fn run_id_is_deterministic_for_identical_inputs() {
    let config = config();
    let bars = FakeBarSource::new(rising_bars(40));
    let technical = technical_provider(&config).expect("technical");
    let sink = RecordingSink::default();

    let run = |save| {
        run_backtest(
            &config,
            &request("trend", save),
            &bars,
            &technical,
            &BullishSentiment,
            &sink,
        )
        .expect("backtest")
        .run
    };
    let first = run(false);
    let second = run(false);
    assert_eq!(first.run_id, second.run_id);
    assert_eq!(first.trades, second.trades);
    assert_eq!(first.equity_curve, second.equity_curve);
}

#[test]
fn unknown_agent_lists_configured_ids() {
    let config = config();
    let bars = FakeBarSource::new(Vec::new());
    let technical = technical_provider(&config).expect("technical");
    let sink = RecordingSink::default();

    let err = run_backtest(
        &config,
        &request("ghost", true),
        &bars,
        &technical,
        &BullishSentiment,
        &sink,
    )
    .expect_err("unknown agent");
    assert!(err.contains("unknown agent: ghost"));
    assert!(err.contains("trend, broken"));
    assert!(bars.queries.borrow().is_empty());
}

#[test]
fn invalid_agent_fails_without_saving() {
    let config = config();
    let bars = FakeBarSource::new(rising_bars(10));
    let technical = technical_provider(&config).expect("technical");
    let sink = RecordingSink::default();

    let err = run_backtest(
        &config,
        &request("broken", true),
        &bars,
        &technical,
        &BullishSentiment,
        &sink,
    )
    .expect_err("invalid config");
    assert!(err.contains("stop_loss_pct"));
    assert!(sink.saved.borrow().is_empty());
}

#[test]
fn empty_range_is_a_zero_trade_run() {
    let config = config();
    let bars = FakeBarSource::new(rising_bars(10));
    let technical = technical_provider(&config).expect("technical");
    let sink = RecordingSink::default();

    let outcome = run_backtest(
        &config,
        &BacktestRequest {
            agent_id: "trend".to_string(),
            start: date(2023, 6, 1),
            end: date(2023, 6, 30),
            save: true,
        },
        &bars,
        &technical,
        &BullishSentiment,
        &sink,
    )
    .expect("backtest");

    assert_eq!(outcome.run.state, RunState::Finalized);
    assert!(outcome.run.trades.is_empty());
    assert_eq!(outcome.run.final_capital, 10_000.0);
    assert_eq!(outcome.data_report.rows, 0);
    assert_eq!(sink.saved.borrow().len(), 1);
}

#[test]
fn validation_reports_bad_agents_and_strict_mode_fails() {
    let config = config();
    let bars = FakeBarSource::new(rising_bars(10));

    let report = validate(&config, false, &bars).expect("lenient validation");
    let agents = report["agents"].as_array().expect("agents");
    assert_eq!(agents.len(), 2);
    assert_eq!(agents[0]["ok"], true);
    assert_eq!(agents[0]["ohlcv"]["rows"], 10);
    assert_eq!(agents[1]["ok"], false);
    assert!(agents[1]["error"]
        .as_str()
        .is_some_and(|err| err.contains("stop_loss_pct")));

    let err = validate(&config, true, &bars).expect_err("strict");
    assert!(err.starts_with("strict validation failed"));
    assert!(err.contains("broken"));
}

#[test]
fn strict_validation_flags_gaps_on_continuous_calendars() {
    let mut config = config();
    config.agents.retain(|agent| agent.id == "trend");
    let mut bars = rising_bars(10);
    bars.remove(4);
    let source = FakeBarSource::new(bars);

    let report = validate(&config, false, &source).expect("lenient");
    assert_eq!(report["agents"][0]["ohlcv"]["gaps"], 1);
    assert!(validate(&config, true, &source).is_err());

    let clean = FakeBarSource::new(rising_bars(10));
    let report = validate(&config, true, &clean).expect("clean data passes strict");
    assert_eq!(report["problems"].as_array().map(Vec::len), Some(0));
}
