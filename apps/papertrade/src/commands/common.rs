use papertrade_application::config::Config;
use papertrade_domain::services::ohlcv::DataQualityReport;
use std::path::PathBuf;

pub(super) fn resolve_config_path(config: Option<PathBuf>) -> Result<PathBuf, String> {
    config
        .or_else(|| {
            std::env::var("PAPERTRADE_CONFIG")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
        })
        .ok_or_else(|| "missing --config and env PAPERTRADE_CONFIG is not set".to_string())
}

pub(super) fn print_config_summary(command: &str, config: &Config) {
    println!(
        "papertrade cli: {} (agents={}, initial_capital={}, calendar={})",
        command,
        config.agents.len(),
        config.run.initial_capital,
        format!("{:?}", config.calendar()).to_lowercase()
    );
    println!(
        "data: ohlcv_dir={}, sentiment={}, staleness={}, expected_sources={}, out_dir={}",
        config.data.ohlcv_dir,
        config.data.sentiment_path.as_deref().unwrap_or("none"),
        config
            .data
            .sentiment_max_staleness
            .as_deref()
            .unwrap_or("default"),
        config.expected_sources(),
        config.run.out_dir
    );
    println!(
        "technical: lookback={}, sma_short={}, sma_long={}, rsi_period={}, volume_window={}, neutral_band={}",
        config.technical.lookback,
        config.technical.sma_short,
        config.technical.sma_long,
        config.technical.rsi_period,
        config.technical.volume_window,
        config.technical.neutral_band
    );
}

pub(super) fn print_data_quality(report: &DataQualityReport) {
    println!(
        "ohlcv report: rows={}, duplicates={}, gaps={}, out_of_order={}, invalid_close={}",
        report.rows, report.duplicates, report.gaps, report.out_of_order, report.invalid_close
    );
}
