use papertrade_domain::entities::run::RunRecord;
use papertrade_domain::services::audit::AuditEvent;
use papertrade_domain::value_objects::action::Action;
use papertrade_domain::value_objects::equity_point::EquityPoint;
use papertrade_domain::value_objects::trade::{Trade, TradeReason};
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::Path;

pub fn write_audit_jsonl(path: &Path, events: &[AuditEvent]) -> Result<(), String> {
    let mut file =
        fs::File::create(path).map_err(|err| format!("failed to create logs: {}", err))?;
    for event in events {
        let line = serde_json::to_string(event)
            .map_err(|err| format!("failed to serialize audit event: {}", err))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|err| format!("failed to write audit event: {}", err))?;
    }
    Ok(())
}

pub fn write_trades_csv(path: &Path, trades: &[Trade]) -> Result<(), String> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|err| format!("failed to create trades csv {}: {}", path.display(), err))?;
    wtr.write_record([
        "timestamp_utc",
        "symbol",
        "action",
        "qty",
        "price",
        "pnl",
        "pnl_pct",
        "reason",
    ])
    .map_err(|err| format!("failed to write trades csv header: {}", err))?;

    for trade in trades {
        wtr.write_record([
            trade.timestamp.to_string(),
            trade.symbol.clone(),
            trade.action.as_str().to_string(),
            trade.quantity.to_string(),
            trade.price.to_string(),
            trade.pnl.to_string(),
            trade.pnl_pct.to_string(),
            trade.reason.as_str().to_string(),
        ])
        .map_err(|err| format!("failed to write trades row: {}", err))?;
    }

    wtr.flush()
        .map_err(|err| format!("failed to flush trades csv: {}", err))
}

#[derive(Debug, Deserialize)]
struct TradeRow {
    timestamp_utc: i64,
    symbol: String,
    action: String,
    qty: f64,
    price: f64,
    pnl: f64,
    pnl_pct: f64,
    reason: String,
}

pub fn read_trades_csv(path: &Path) -> Result<Vec<Trade>, String> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|err| format!("failed to open trades csv {}: {}", path.display(), err))?;
    let mut trades = Vec::new();
    for row in reader.deserialize::<TradeRow>() {
        let row = row.map_err(|err| format!("failed to parse trades row: {}", err))?;
        trades.push(Trade {
            timestamp: row.timestamp_utc,
            action: Action::parse(&row.action)?,
            symbol: row.symbol,
            quantity: row.qty,
            price: row.price,
            pnl: row.pnl,
            pnl_pct: row.pnl_pct,
            reason: TradeReason::parse(&row.reason)?,
        });
    }
    Ok(trades)
}

pub fn write_equity_csv(path: &Path, points: &[EquityPoint]) -> Result<(), String> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|err| format!("failed to create equity csv {}: {}", path.display(), err))?;
    wtr.write_record([
        "timestamp_utc",
        "equity",
        "cash",
        "position_qty",
        "unrealized_pnl",
        "realized_pnl",
    ])
    .map_err(|err| format!("failed to write equity csv header: {}", err))?;

    for point in points {
        wtr.write_record([
            point.timestamp.to_string(),
            point.equity.to_string(),
            point.cash.to_string(),
            point.position_qty.to_string(),
            point.unrealized_pnl.to_string(),
            point.realized_pnl.to_string(),
        ])
        .map_err(|err| format!("failed to write equity row: {}", err))?;
    }

    wtr.flush()
        .map_err(|err| format!("failed to flush equity csv: {}", err))
}

pub fn write_run_json(path: &Path, record: &RunRecord) -> Result<(), String> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|err| format!("failed to serialize run record: {}", err))?;
    fs::write(path, json)
        .map_err(|err| format!("failed to write run record {}: {}", path.display(), err))
}

pub fn read_run_json(path: &Path) -> Result<RunRecord, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed to read run record {}: {}", path.display(), err))?;
    serde_json::from_str(&raw)
        .map_err(|err| format!("failed to parse run record {}: {}", path.display(), err))
}
