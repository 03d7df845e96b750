mod commands;
mod infra;
mod obs;

use clap::{Parser, Subcommand};
use commands::Command;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "papertrade")]
#[command(about = "Paper-trading backtests for configured agents", version, arg_required_else_help = true)]
#[command(
    after_help = "Examples:\n  papertrade backtest run momentum-aapl --start 2024-01-01 --end 2024-06-30 --config configs/sample.toml\n  papertrade backtest list --config configs/sample.toml\n  papertrade backtest compare <run_id> <run_id> --config configs/sample.toml\n  papertrade backtest sweep --sweep configs/sweep.toml\n  papertrade validate --config configs/sample.toml --strict\n"
)]
struct Cli {
    /// Log filter (e.g. `info`, `papertrade_domain=debug`). Env PAPERTRADE_LOG wins when set.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format: text | json.
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Serve Prometheus metrics on host:port while the command runs.
    #[arg(long, global = true)]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Run, list, compare and sweep backtests.
    Backtest {
        #[command(subcommand)]
        command: BacktestCommand,
    },
    /// Check agents and their OHLCV data without running anything.
    Validate {
        /// Config file path (TOML). If omitted, uses env PAPERTRADE_CONFIG.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Fail on any config error or data-quality issue.
        #[arg(long, default_value_t = false)]
        strict: bool,
        /// Also write the JSON report to this path.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum BacktestCommand {
    /// Backtest one agent over a date range.
    Run {
        agent_id: String,
        /// First day of the range (YYYY-MM-DD, inclusive).
        #[arg(long)]
        start: String,
        /// Last day of the range (YYYY-MM-DD, inclusive).
        #[arg(long)]
        end: String,
        /// Skip persisting the run.
        #[arg(long, default_value_t = false)]
        no_save: bool,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List persisted runs.
    List {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print metrics of persisted runs side by side.
    Compare {
        #[arg(required = true, num_args = 1..)]
        run_ids: Vec<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run a grid of agent-parameter combinations.
    Sweep {
        #[arg(long)]
        sweep: PathBuf,
    },
}

impl From<CliCommand> for Command {
    fn from(command: CliCommand) -> Self {
        match command {
            CliCommand::Validate {
                config,
                strict,
                out,
            } => Command::Validate {
                config,
                strict,
                out,
            },
            CliCommand::Backtest { command } => match command {
                BacktestCommand::Run {
                    agent_id,
                    start,
                    end,
                    no_save,
                    config,
                } => Command::Backtest {
                    agent_id,
                    start,
                    end,
                    save: !no_save,
                    config,
                },
                BacktestCommand::List { config } => Command::List { config },
                BacktestCommand::Compare { run_ids, config } => Command::Compare { run_ids, config },
                BacktestCommand::Sweep { sweep } => Command::Sweep { sweep },
            },
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let command = Command::from(cli.command);

    let defaults = command.logging_defaults();
    let log_level = cli
        .log_level
        .or(defaults.level)
        .unwrap_or_else(|| "info".to_string());
    let log_format = cli
        .log_format
        .or(defaults.format)
        .unwrap_or_else(|| "text".to_string());

    if let Err(err) = obs::init_tracing(&log_level, &log_format) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
    if let Err(err) = obs::init_metrics(cli.metrics_addr.as_deref()) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }

    if let Err(err) = commands::run(command) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
