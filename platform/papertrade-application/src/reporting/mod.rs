use papertrade_domain::entities::run::RunRecord;
use papertrade_domain::repositories::runs::RunReader;
use std::fmt::Write as _;
use std::time::Instant;
use tracing::info_span;

/// Persisted runs, oldest range first, ties broken by id.
pub fn list_runs(reader: &dyn RunReader) -> Result<Vec<RunRecord>, String> {
    let _span = info_span!("list_runs").entered();
    let stage_start = Instant::now();
    let mut runs = reader.list_runs()?;
    runs.sort_by(|a, b| {
        a.start_date
            .cmp(&b.start_date)
            .then_with(|| a.end_date.cmp(&b.end_date))
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
    metrics::histogram!("papertrade.report.list_ms")
        .record(stage_start.elapsed().as_millis() as f64);
    Ok(runs)
}

/// Loads the requested runs in the order given. Unknown ids are an error.
pub fn compare_runs(reader: &dyn RunReader, run_ids: &[String]) -> Result<Vec<RunRecord>, String> {
    let _span = info_span!("compare_runs", runs = run_ids.len()).entered();
    if run_ids.is_empty() {
        return Err("compare requires at least one run id".to_string());
    }
    run_ids
        .iter()
        .map(|run_id| {
            reader
                .load_run(run_id)
                .map_err(|err| format!("failed to load run {run_id}: {err}"))
        })
        .collect()
}

pub fn format_run_list(runs: &[RunRecord]) -> String {
    if runs.is_empty() {
        return "no saved runs\n".to_string();
    }
    let id_width = runs
        .iter()
        .map(|run| run.run_id.len())
        .max()
        .unwrap_or(0)
        .max("run_id".len());
    let agent_width = runs
        .iter()
        .map(|run| run.agent_id.len())
        .max()
        .unwrap_or(0)
        .max("agent".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<agent_width$}  {:<8}  {:<10}  {:<10}  {:>6}  {:>10}",
        "run_id", "agent", "symbol", "start", "end", "trades", "return_%"
    );
    for run in runs {
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<agent_width$}  {:<8}  {:<10}  {:<10}  {:>6}  {:>10.2}",
            run.run_id,
            run.agent_id,
            run.symbol,
            run.start_date,
            run.end_date,
            run.metrics.total_trades,
            run.metrics.total_return_pct
        );
    }
    out
}

/// One row per metric, one column per run.
pub fn format_comparison(runs: &[RunRecord]) -> String {
    let rows: [(&str, fn(&RunRecord) -> String); 12] = [
        ("agent", |r| r.agent_id.clone()),
        ("symbol", |r| format!("{} {}", r.symbol, r.timeframe)),
        ("range", |r| format!("{}..{}", r.start_date, r.end_date)),
        ("initial_capital", |r| format!("{:.2}", r.initial_capital)),
        ("final_capital", |r| format!("{:.2}", r.final_capital)),
        ("total_return_%", |r| format!("{:.2}", r.metrics.total_return_pct)),
        ("max_drawdown_%", |r| format!("{:.2}", r.metrics.max_drawdown_pct)),
        ("sharpe", |r| format!("{:.3}", r.metrics.sharpe_ratio)),
        ("win_rate_%", |r| format!("{:.1}", r.metrics.win_rate * 100.0)),
        ("trades", |r| r.metrics.total_trades.to_string()),
        ("closed_trades", |r| r.metrics.closed_trades.to_string()),
        ("avg_trade_pnl", |r| format!("{:.2}", r.metrics.avg_trade_pnl)),
    ];

    let label_width = rows
        .iter()
        .map(|(label, _)| label.len())
        .max()
        .unwrap_or(0)
        .max("metric".len());
    let columns: Vec<Vec<String>> = runs
        .iter()
        .map(|run| rows.iter().map(|(_, cell)| cell(run)).collect())
        .collect();
    let widths: Vec<usize> = runs
        .iter()
        .zip(columns.iter())
        .map(|(run, cells)| {
            cells
                .iter()
                .map(String::len)
                .chain(std::iter::once(run.run_id.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    let _ = write!(out, "{:<label_width$}", "metric");
    for (run, width) in runs.iter().zip(widths.iter()) {
        let _ = write!(out, "  {:>width$}", run.run_id, width = *width);
    }
    out.push('\n');
    for (row_idx, (label, _)) in rows.iter().enumerate() {
        let _ = write!(out, "{label:<label_width$}");
        for (cells, width) in columns.iter().zip(widths.iter()) {
            let _ = write!(out, "  {:>width$}", cells[row_idx], width = *width);
        }
        out.push('\n');
    }
    out
}
