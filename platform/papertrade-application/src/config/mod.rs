use papertrade_domain::entities::agent::{AgentConfig, ConfigError};
use papertrade_domain::entities::metrics::MetricsConfig;
use papertrade_domain::entities::sizing::{PositionSizing, QuantityRule};
use papertrade_domain::services::technical::TechnicalConfig;
use papertrade_domain::value_objects::timeframe::{
    parse_duration_like_seconds, MarketCalendar, Timeframe,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DEFAULT_FRACTIONAL_DECIMALS: u32 = 6;
const DEFAULT_SENTIMENT_STALENESS: &str = "1d";

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub run: RunConfig,
    pub data: DataConfig,
    pub technical: TechnicalConfig,
    pub metrics: Option<MetricsSection>,
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub agents: Vec<AgentSection>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub initial_capital: f64,
    pub out_dir: String,
    pub calendar: Option<MarketCalendar>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    pub ohlcv_dir: String,
    pub sentiment_path: Option<String>,
    pub sentiment_max_staleness: Option<String>,
    pub expected_sources: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    pub risk_free_rate: Option<f64>,
    pub annualization_factor: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

/// `max_position_size` as written in the file, before it is resolved to a
/// [`PositionSizing`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum RawSizing {
    Number(f64),
    Text(String),
}

impl RawSizing {
    pub fn resolve(&self) -> Result<PositionSizing, ConfigError> {
        match self {
            RawSizing::Number(value) => PositionSizing::from_value(*value),
            RawSizing::Text(raw) => PositionSizing::parse(raw),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AgentSection {
    pub id: String,
    pub symbol: String,
    pub timeframe: String,
    pub max_position_size: RawSizing,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub min_confidence: f64,
    pub entry_threshold: f64,
    pub exit_threshold: f64,
    pub max_daily_trades: u32,
    pub fractional_shares: Option<bool>,
    pub fractional_decimals: Option<u32>,
}

impl AgentSection {
    /// Parses the typed config without range checks; the orchestrator validates
    /// before its first bar.
    pub fn to_agent_config(&self) -> Result<AgentConfig, ConfigError> {
        let timeframe = Timeframe::parse(&self.timeframe)
            .map_err(|err| ConfigError::invalid("timeframe", err))?;
        let quantity_rule = if self.fractional_shares.unwrap_or(false) {
            QuantityRule::Fractional {
                decimals: self
                    .fractional_decimals
                    .unwrap_or(DEFAULT_FRACTIONAL_DECIMALS),
            }
        } else {
            QuantityRule::WholeShares
        };
        Ok(AgentConfig {
            agent_id: self.id.clone(),
            symbol: self.symbol.trim().to_uppercase(),
            timeframe,
            max_position_size: self.max_position_size.resolve()?,
            stop_loss_pct: self.stop_loss_pct,
            take_profit_pct: self.take_profit_pct,
            min_confidence: self.min_confidence,
            entry_threshold: self.entry_threshold,
            exit_threshold: self.exit_threshold,
            max_daily_trades: self.max_daily_trades,
            quantity_rule,
        })
    }
}

impl Config {
    pub fn agent(&self, agent_id: &str) -> Option<&AgentSection> {
        self.agents.iter().find(|agent| agent.id == agent_id)
    }

    pub fn calendar(&self) -> MarketCalendar {
        self.run.calendar.unwrap_or_default()
    }

    pub fn metrics_config(&self) -> MetricsConfig {
        let section = self.metrics.as_ref();
        MetricsConfig {
            risk_free_rate: section.and_then(|m| m.risk_free_rate).unwrap_or(0.0),
            annualization_factor: section.and_then(|m| m.annualization_factor),
        }
    }

    pub fn sentiment_max_staleness_seconds(&self) -> Result<i64, String> {
        parse_duration_like_seconds(
            self.data
                .sentiment_max_staleness
                .as_deref()
                .unwrap_or(DEFAULT_SENTIMENT_STALENESS),
        )
    }

    pub fn expected_sources(&self) -> usize {
        self.data.expected_sources.unwrap_or(1).max(1)
    }
}

/// Resolves and fully validates one `[[agents]]` entry.
pub fn resolve_agent(config: &Config, agent_id: &str) -> Result<AgentConfig, ConfigError> {
    let section = config
        .agent(agent_id)
        .ok_or_else(|| ConfigError::UnknownAgent(agent_id.to_string()))?;
    let agent = section.to_agent_config()?;
    agent.validate()?;
    Ok(agent)
}

pub fn load_config(path: &Path) -> Result<Config, String> {
    let (config, _source) = load_config_with_source(path)?;
    Ok(config)
}

pub fn load_config_with_source(path: &Path) -> Result<(Config, String), String> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {}", path.display(), err))?;
    let config = parse_config(&contents)
        .map_err(|err| format!("failed to parse TOML {}: {}", path.display(), err))?;
    Ok((config, contents))
}

pub fn parse_config(contents: &str) -> Result<Config, String> {
    toml::from_str(contents).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::{parse_config, resolve_agent, Config, RawSizing};
    use papertrade_domain::entities::agent::ConfigError;
    use papertrade_domain::entities::sizing::{PositionSizing, QuantityRule};
    use papertrade_domain::value_objects::timeframe::MarketCalendar;

    const BASE: &str = r#"
[run]
initial_capital = 10000.0
out_dir = "runs"

[data]
ohlcv_dir = "data/ohlcv"

[technical]
lookback = 50
sma_short = 20
sma_long = 50
rsi_period = 14
volume_window = 20
neutral_band = 0.002
"#;

    fn with_agent(agent: &str) -> Config {
        parse_config(&format!("{BASE}\n[[agents]]\n{agent}")).expect("config should parse")
    }

    const AGENT: &str = r#"
id = "momentum"
symbol = "aapl"
timeframe = "1d"
max_position_size = 0.25
stop_loss_pct = 0.03
take_profit_pct = 0.06
min_confidence = 0.6
entry_threshold = 0.3
exit_threshold = -0.2
max_daily_trades = 4
"#;

    #[test]
    fn parse_config_rejects_malformed_toml() {
        let err = parse_config("[run\ninitial_capital = 1").expect_err("malformed");
        assert!(!err.is_empty());
    }

    #[test]
    fn parse_config_rejects_unknown_fields() {
        let err = parse_config(&format!("{BASE}\n[logging]\nlevel = \"info\"\ncolour = true\n"))
            .expect_err("unknown field");
        assert!(err.contains("colour"));
    }

    #[test]
    fn missing_risk_field_is_an_error() {
        let agent = AGENT.replace("stop_loss_pct = 0.03\n", "");
        let err = parse_config(&format!("{BASE}\n[[agents]]\n{agent}")).expect_err("missing");
        assert!(err.contains("stop_loss_pct"));
    }

    #[test]
    fn resolves_agent_with_defaults() {
        let config = with_agent(AGENT);
        assert_eq!(config.calendar(), MarketCalendar::Equities);
        assert_eq!(config.metrics_config().risk_free_rate, 0.0);
        assert_eq!(config.expected_sources(), 1);
        assert_eq!(config.sentiment_max_staleness_seconds(), Ok(86_400));

        let agent = resolve_agent(&config, "momentum").expect("agent");
        assert_eq!(agent.symbol, "AAPL");
        assert_eq!(agent.timeframe.label, "1day");
        assert_eq!(agent.max_position_size, PositionSizing::Fraction(0.25));
        assert_eq!(agent.quantity_rule, QuantityRule::WholeShares);
    }

    #[test]
    fn sizing_accepts_numbers_and_strings() {
        for (raw, expected) in [
            ("5000", PositionSizing::Absolute(5000.0)),
            ("5000.0", PositionSizing::Absolute(5000.0)),
            ("\"25%\"", PositionSizing::Fraction(0.25)),
            ("\"$1500\"", PositionSizing::Absolute(1500.0)),
        ] {
            let agent = AGENT.replace(
                "max_position_size = 0.25",
                &format!("max_position_size = {raw}"),
            );
            let config = with_agent(&agent);
            let resolved = resolve_agent(&config, "momentum").expect("agent");
            assert_eq!(resolved.max_position_size, expected, "raw {raw}");
        }
    }

    #[test]
    fn unparseable_sizing_is_a_config_error() {
        assert!(matches!(
            RawSizing::Text("a lot".to_string()).resolve(),
            Err(ConfigError::InvalidSizing(_))
        ));
        assert!(RawSizing::Number(-1.0).resolve().is_err());
    }

    #[test]
    fn negative_stop_loss_is_rejected_at_resolution() {
        let agent = AGENT.replace("stop_loss_pct = 0.03", "stop_loss_pct = -0.03");
        let config = with_agent(&agent);
        let err = resolve_agent(&config, "momentum").expect_err("invalid");
        assert!(err.to_string().contains("stop_loss_pct"));
    }

    #[test]
    fn unknown_agent_is_reported() {
        let config = with_agent(AGENT);
        assert_eq!(
            resolve_agent(&config, "nope").map(|a| a.agent_id),
            Err(ConfigError::UnknownAgent("nope".to_string()))
        );
    }

    #[test]
    fn fractional_shares_use_default_precision() {
        let agent = format!("{AGENT}fractional_shares = true\n");
        let config = with_agent(&agent);
        let resolved = resolve_agent(&config, "momentum").expect("agent");
        assert_eq!(
            resolved.quantity_rule,
            QuantityRule::Fractional { decimals: 6 }
        );
    }
}
