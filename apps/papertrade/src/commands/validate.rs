use std::path::PathBuf;

pub(super) fn run_validate(
    config_path: Option<PathBuf>,
    strict: bool,
    out: Option<PathBuf>,
) -> Result<(), String> {
    let config_path = super::common::resolve_config_path(config_path)?;
    let config = papertrade_application::config::load_config(&config_path)?;
    super::common::print_config_summary("validate", &config);

    let crate::infra::ValidateDeps {
        market_data,
        sentiment,
    } = crate::infra::build_validate_deps(&config)?;
    let sentiment_report = sentiment.report();
    println!(
        "sentiment report: rows={}, kept={}, missing_values={}, invalid_values={}",
        sentiment_report.rows,
        sentiment_report.kept,
        sentiment_report.missing_values,
        sentiment_report.invalid_values
    );

    let report =
        papertrade_application::validation::validate(&config, strict, market_data.as_ref())?;

    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|err| format!("failed to render validation report: {err}"))?;
    println!("{rendered}");

    if let Some(out_path) = out {
        std::fs::write(&out_path, rendered)
            .map_err(|err| format!("failed to write report {}: {}", out_path.display(), err))?;
    }

    Ok(())
}
