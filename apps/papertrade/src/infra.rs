use papertrade_application::config::Config;
use papertrade_domain::repositories::market_data::HistoricalBarSource;
use papertrade_domain::repositories::runs::{RunReader, RunSink};
use papertrade_infrastructure::market_data::ohlcv::CsvBarSource;
use papertrade_infrastructure::persistence::runs::FilesystemRunStore;
use papertrade_infrastructure::sentiment::CsvSentimentSource;
use std::path::Path;

pub struct EngineDeps {
    pub market_data: Box<dyn HistoricalBarSource>,
    pub sentiment: CsvSentimentSource,
    pub sink: Box<dyn RunSink>,
}

pub struct ValidateDeps {
    pub market_data: Box<dyn HistoricalBarSource>,
    pub sentiment: CsvSentimentSource,
}

pub struct ReportingDeps {
    pub reader: Box<dyn RunReader>,
}

pub fn build_engine_deps(config: &Config) -> Result<EngineDeps, String> {
    Ok(EngineDeps {
        market_data: build_market_data(config),
        sentiment: build_sentiment(config)?,
        sink: Box::new(build_run_store(config)),
    })
}

pub fn build_validate_deps(config: &Config) -> Result<ValidateDeps, String> {
    Ok(ValidateDeps {
        market_data: build_market_data(config),
        sentiment: build_sentiment(config)?,
    })
}

pub fn build_reporting_deps(config: &Config) -> ReportingDeps {
    ReportingDeps {
        reader: Box::new(build_run_store(config)),
    }
}

fn build_market_data(config: &Config) -> Box<dyn HistoricalBarSource> {
    Box::new(CsvBarSource::new(&config.data.ohlcv_dir))
}

fn build_run_store(config: &Config) -> FilesystemRunStore {
    FilesystemRunStore::new(&config.run.out_dir)
}

/// The sweep runs combinations on scoped threads, so it needs the concrete `Sync` source.
pub fn build_sentiment(config: &Config) -> Result<CsvSentimentSource, String> {
    CsvSentimentSource::open(
        config.data.sentiment_path.as_deref().map(Path::new),
        config.sentiment_max_staleness_seconds()?,
        config.expected_sources(),
    )
}
