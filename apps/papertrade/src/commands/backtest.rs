use papertrade_application::backtesting::{self, parse_date, BacktestRequest};
use papertrade_application::reporting;
use std::path::PathBuf;
use std::time::Instant;

pub(super) fn run_backtest(
    config_path: Option<PathBuf>,
    agent_id: String,
    start: &str,
    end: &str,
    save: bool,
) -> Result<(), String> {
    let config_path = super::common::resolve_config_path(config_path)?;
    let config = papertrade_application::config::load_config(&config_path)?;
    super::common::print_config_summary("backtest", &config);

    let request = BacktestRequest {
        agent_id,
        start: parse_date(start)?,
        end: parse_date(end)?,
        save,
    };

    let overall_start = Instant::now();
    let crate::infra::EngineDeps {
        market_data,
        sentiment,
        sink,
    } = crate::infra::build_engine_deps(&config)?;
    let technical = backtesting::technical_provider(&config)?;

    let outcome = backtesting::run_backtest(
        &config,
        &request,
        market_data.as_ref(),
        &technical,
        &sentiment,
        sink.as_ref(),
    )?;

    super::common::print_data_quality(&outcome.data_report);
    let run = &outcome.run;
    let m = &run.metrics;
    println!(
        "run: {} state={:?} bars={} trades={} closed={}",
        run.run_id, run.state, m.bars_processed, m.total_trades, m.closed_trades
    );
    println!(
        "result: initial_capital={:.2} final_equity={:.2} net_profit={:.2} total_return_pct={:.2}",
        run.initial_capital, m.final_equity, m.net_profit, m.total_return_pct
    );
    println!(
        "risk: max_drawdown_pct={:.2} sharpe_ratio={:.3} win_rate={:.2} exposure_pct={:.2}",
        m.max_drawdown_pct, m.sharpe_ratio, m.win_rate, m.exposure_pct
    );
    match &outcome.saved_as {
        Some(id) => println!(
            "run output: {}",
            PathBuf::from(&config.run.out_dir).join(id).display()
        ),
        None => println!("run output: not saved (--no-save)"),
    }
    println!(
        "papertrade cli: backtest total_ms={}",
        overall_start.elapsed().as_millis()
    );
    Ok(())
}

pub(super) fn run_list(config_path: Option<PathBuf>) -> Result<(), String> {
    let config_path = super::common::resolve_config_path(config_path)?;
    let config = papertrade_application::config::load_config(&config_path)?;
    let crate::infra::ReportingDeps { reader } = crate::infra::build_reporting_deps(&config);

    let runs = reporting::list_runs(reader.as_ref())?;
    print!("{}", reporting::format_run_list(&runs));
    Ok(())
}

pub(super) fn run_compare(config_path: Option<PathBuf>, run_ids: &[String]) -> Result<(), String> {
    let config_path = super::common::resolve_config_path(config_path)?;
    let config = papertrade_application::config::load_config(&config_path)?;
    let crate::infra::ReportingDeps { reader } = crate::infra::build_reporting_deps(&config);

    let runs = reporting::compare_runs(reader.as_ref(), run_ids)?;
    print!("{}", reporting::format_comparison(&runs));
    Ok(())
}
