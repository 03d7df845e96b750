use papertrade_application::experiments::sweep;
use std::path::Path;

pub(super) fn run_sweep(sweep_path: &Path) -> Result<(), String> {
    let loaded = sweep::load_sweep(sweep_path)?;
    super::common::print_config_summary("sweep", &loaded.base_config);
    println!(
        "sweep: id={}, agent={}, range={}..{}, base_config={}",
        loaded.sweep.sweep.id,
        loaded.sweep.sweep.agent,
        loaded.sweep.sweep.start,
        loaded.sweep.sweep.end,
        loaded.base_config_path.display()
    );

    let crate::infra::EngineDeps {
        market_data,
        sentiment,
        ..
    } = crate::infra::build_engine_deps(&loaded.base_config)?;

    let result = sweep::run_sweep(&loaded, market_data.as_ref(), &sentiment)?;
    let failed = result.runs.iter().filter(|run| !run.is_finalized()).count();
    println!(
        "sweep runs: total={}, finalized={}, failed={}",
        result.runs.len(),
        result.runs.len() - failed,
        failed
    );
    for run in result.runs.iter().filter(|run| !run.is_finalized()) {
        println!(
            "failed: {} {}",
            run.run_id,
            run.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!("sweep output: {}", result.sweep_dir.display());
    Ok(())
}
