mod backtest;
mod common;
mod sweep;
mod validate;

use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug)]
pub enum Command {
    Backtest {
        agent_id: String,
        start: String,
        end: String,
        save: bool,
        config: Option<PathBuf>,
    },
    List {
        config: Option<PathBuf>,
    },
    Compare {
        run_ids: Vec<String>,
        config: Option<PathBuf>,
    },
    Sweep {
        sweep: PathBuf,
    },
    Validate {
        config: Option<PathBuf>,
        strict: bool,
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Default)]
pub struct LoggingDefaults {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Backtest { .. } => "backtest_run",
            Command::List { .. } => "backtest_list",
            Command::Compare { .. } => "backtest_compare",
            Command::Sweep { .. } => "backtest_sweep",
            Command::Validate { .. } => "validate",
        }
    }

    /// `[logging]` from the command's config, read before tracing is installed. Any load
    /// error is left for the command itself to report.
    pub fn logging_defaults(&self) -> LoggingDefaults {
        let config = match self {
            Command::Backtest { config, .. }
            | Command::List { config }
            | Command::Compare { config, .. }
            | Command::Validate { config, .. } => common::resolve_config_path(config.clone())
                .ok()
                .and_then(|path| papertrade_application::config::load_config(&path).ok()),
            Command::Sweep { sweep } => {
                papertrade_application::experiments::sweep::load_sweep(sweep)
                    .ok()
                    .map(|loaded| loaded.base_config)
            }
        };
        config
            .and_then(|config| config.logging)
            .map(|logging| LoggingDefaults {
                level: logging.level,
                format: logging.format,
            })
            .unwrap_or_default()
    }
}

pub fn run(command: Command) -> Result<(), String> {
    let kind = command.kind();
    let start = Instant::now();
    let result = dispatch(command);
    record_metrics(kind, start, &result);
    result
}

fn record_metrics(kind: &'static str, start: Instant, result: &Result<(), String>) {
    let result_label = if result.is_ok() { "ok" } else { "err" };
    metrics::counter!("papertrade.cli.commands_total", "kind" => kind, "result" => result_label)
        .increment(1);
    metrics::histogram!("papertrade.cli.command_ms", "kind" => kind, "result" => result_label)
        .record(start.elapsed().as_millis() as f64);
}

fn dispatch(command: Command) -> Result<(), String> {
    match command {
        Command::Backtest {
            agent_id,
            start,
            end,
            save,
            config,
        } => backtest::run_backtest(config, agent_id, &start, &end, save),
        Command::List { config } => backtest::run_list(config),
        Command::Compare { run_ids, config } => backtest::run_compare(config, &run_ids),
        Command::Sweep { sweep } => sweep::run_sweep(&sweep),
        Command::Validate {
            config,
            strict,
            out,
        } => validate::run_validate(config, strict, out),
    }
}
