use chrono::NaiveDate;
use papertrade_domain::services::audit::AuditEvent;
use sha2::{Digest, Sha256};

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| format!("invalid date '{value}' (expected YYYY-MM-DD): {err}"))
}

/// `{agent_id}_{start}_{end}_{hash8}`; the hash pins the resolved config and the
/// amount of data the run saw.
pub fn build_run_id(
    agent_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    config_snapshot: &serde_json::Value,
    bar_count: usize,
) -> String {
    let canonical = serde_json::to_string(config_snapshot)
        .unwrap_or_else(|_| "{\"error\":\"snapshot\"}".to_string());
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(b"\n");
    hasher.update(bar_count.to_string().as_bytes());
    let bytes = hasher.finalize();
    format!(
        "{}_{}_{}_{}",
        agent_id,
        start.format("%Y%m%d"),
        end.format("%Y%m%d"),
        to_hex_short(&bytes[..], 8)
    )
}

pub fn to_hex_short(bytes: &[u8], chars: usize) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(chars);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        if out.len() >= chars {
            break;
        }
        out.push(HEX[(b & 0x0f) as usize] as char);
        if out.len() >= chars {
            break;
        }
    }
    out
}

pub fn timing_event(
    run_id: &str,
    symbol: Option<&str>,
    action: &str,
    duration_ms: u64,
    details: serde_json::Value,
) -> AuditEvent {
    AuditEvent::new(
        run_id,
        0,
        "timing",
        symbol,
        action,
        serde_json::json!({
            "duration_ms": duration_ms,
            "details": details,
        }),
    )
}
