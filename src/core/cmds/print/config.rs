use std::path::{Path, PathBuf};

use log::info;

use crate::types::AppResult;
use crate::types::config::config;

fn path_or_unset(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}

fn list(paths: &[PathBuf]) -> String {
    let items: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    format!("[{}]", items.join(", "))
}

pub async fn execute(format: String) -> AppResult<()> {
    let effective = config().to_effective();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&effective)?);
        return Ok(());
    }

    info!("Effective Configuration:");
    info!("");
    info!("Global:");
    info!("  work_dir: {}", effective.work_dir().display());

    let log = effective.log();
    info!("");
    info!("Log:");
    info!("  level: {}", log.level());
    match log.color() {
        Some(true) => info!("  color: on"),
        Some(false) => info!("  color: off"),
        None => info!("  color: auto"),
    }

    let compiler = effective.compiler();
    info!("");
    info!("Compiler:");
    info!("  mutated: {}", path_or_unset(compiler.mutated()));
    info!("  tracking: {}", path_or_unset(compiler.tracking()));
    info!("  mutation_info: {}", path_or_unset(compiler.mutation_info()));
    info!(
        "  tracking_mutation_info: {}",
        path_or_unset(compiler.tracking_mutation_info())
    );
    info!("  sanitizer: {}", compiler.sanitizer());
    info!("  flags: [{}]", compiler.flags().join(", "));

    let generator = effective.generator();
    info!("");
    info!("Generator:");
    info!("  kind: {}", generator.kind());
    info!("  path: {}", generator.path().display());
    info!("  include_dirs: {}", list(generator.include_dirs()));
    info!("  timeout: {}s", generator.timeout());

    let policy = effective.timeouts().policy();
    info!("");
    info!("Timeouts:");
    info!("  compile: {}s", policy.compile_secs);
    info!("  run: {}s", policy.run_secs);
    info!(
        "  mutant compile: max({}s, baseline x {})",
        policy.min_mutant_compile_secs, policy.mutant_compile_multiplier
    );
    info!(
        "  mutant run: max({}s, baseline x {})",
        policy.min_mutant_run_secs, policy.mutant_run_multiplier
    );

    let campaign = effective.campaign();
    info!("");
    info!("Campaign:");
    info!("  total_time: {}s", campaign.total_time());
    info!(
        "  max_time_since_last_kill: {}s",
        campaign.max_time_since_last_kill()
    );
    info!("  max_programs: {}", campaign.max_programs());
    match campaign.seed() {
        Some(seed) => info!("  seed: {seed}"),
        None => info!("  seed: (random)"),
    }
    for flags in campaign.sanitizers() {
        info!("  sanitizer: {}", flags.join(" "));
    }

    let reduce = effective.reduce();
    info!("");
    info!("Reduce:");
    info!("  reducer: {}", reduce.reducer().display());
    info!("  timeout: {}s", reduce.timeout());

    info!("");
    info!("Package:");
    info!("  compilers: [{}]", effective.package().compilers().join(", "));

    Ok(())
}
