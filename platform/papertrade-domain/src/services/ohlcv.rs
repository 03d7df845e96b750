use crate::value_objects::bar::Bar;
use serde::Serialize;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DataQualityReport {
    pub rows: usize,
    pub duplicates: usize,
    pub gaps: usize,
    pub out_of_order: usize,
    pub invalid_close: usize,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
    pub first_gap: Option<i64>,
    pub max_gap_seconds: Option<i64>,
}

impl DataQualityReport {
    pub fn is_clean(&self) -> bool {
        self.duplicates == 0 && self.gaps == 0 && self.out_of_order == 0 && self.invalid_close == 0
    }
}

/// Scans bars in the order given. Gaps are steps wider than `expected_step_seconds`;
/// for calendar markets weekends and holidays show up as gaps too.
pub fn data_quality_from_bars(
    bars: &[Bar],
    expected_step_seconds: Option<i64>,
) -> DataQualityReport {
    let mut report = DataQualityReport {
        rows: bars.len(),
        ..DataQualityReport::default()
    };
    if bars.is_empty() {
        return report;
    }

    let step = expected_step_seconds.unwrap_or(1).max(1);
    report.first_timestamp = Some(bars[0].timestamp);

    let mut last_ts: Option<i64> = None;
    for bar in bars {
        let ts = bar.timestamp;
        if !bar.close.is_finite() || bar.close <= 0.0 {
            report.invalid_close += 1;
        }

        if let Some(prev) = last_ts {
            if ts == prev {
                report.duplicates += 1;
            } else if ts < prev {
                report.out_of_order += 1;
            } else {
                let diff = ts - prev;
                if diff > step {
                    report.gaps += 1;
                    if report.first_gap.is_none() {
                        report.first_gap = Some(ts);
                    }
                    report.max_gap_seconds =
                        Some(report.max_gap_seconds.map_or(diff, |current| current.max(diff)));
                }
            }
        }

        last_ts = Some(ts);
        report.last_timestamp = Some(ts);
    }

    report
}
