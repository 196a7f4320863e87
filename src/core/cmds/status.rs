use std::collections::BTreeMap;

use log::info;
use serde::Serialize;

use crate::core::cli::StatusArgs;
use crate::core::store::WorkDir;
use crate::types::config::Config;
use crate::types::{AppResult, KillStatus, ReductionStatus};

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct CampaignStats {
    pub tests: usize,
    pub terminated_early: usize,
    pub covered: usize,
    pub killed: usize,
    pub skipped: usize,
    pub survived: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct StatusReport {
    pub campaign: CampaignStats,
    /// Distinct killed mutants per kill type.
    pub kills: BTreeMap<KillStatus, usize>,
    /// Reductions per status; a reduction without a summary is still in progress.
    pub reductions: BTreeMap<String, usize>,
    pub testsuite_cases: usize,
}

pub fn generate_status_report(work: &WorkDir) -> AppResult<StatusReport> {
    let mut report = StatusReport::default();

    if work.tests_dir().is_dir() {
        for (_, summary) in work.get_kill_summaries()? {
            let c = &mut report.campaign;
            c.tests += 1;
            c.terminated_early += usize::from(summary.terminated_early);
            c.covered += summary.covered_mutants.len();
            c.killed += summary.killed_mutants.len();
            c.skipped += summary.skipped_mutants.len();
            c.survived += summary.survived_mutants.len();
        }
    }

    if work.killed_mutants_dir().is_dir() {
        for mutation in work.get_killed_mutants()? {
            if let Some(kill) = work.get_kill_info(mutation)? {
                *report.kills.entry(kill.kill_type).or_default() += 1;
            }
        }
    }

    if work.reductions_dir().is_dir() {
        for mutation in work.get_reductions()? {
            let status = match work.get_reduction_summary(mutation)? {
                Some(summary) => summary.reduction_status,
                None => ReductionStatus::Pending,
            };
            *report.reductions.entry(status.to_string()).or_default() += 1;
        }
    }

    if work.testsuite_dir().is_dir() {
        report.testsuite_cases = work.get_testsuite_cases()?.len();
    }

    Ok(report)
}

fn print_table_format(work: &WorkDir, report: &StatusReport) {
    info!("Campaign Status Report ({})", work.root().display());
    info!("");
    let c = &report.campaign;
    if c.tests == 0 {
        info!("No tests found. Use the 'run' command to start a campaign.");
        return;
    }
    info!("Tests: {} ({} terminated early)", c.tests, c.terminated_early);
    info!(
        "Mutants: {} covered, {} killed, {} skipped, {} survived",
        c.covered, c.killed, c.skipped, c.survived
    );

    info!("");
    info!("Kills by type:");
    if report.kills.is_empty() {
        info!("  (none)");
    }
    for (kill_type, count) in &report.kills {
        info!("  {kill_type}: {count}");
    }

    info!("");
    info!("Reductions:");
    if report.reductions.is_empty() {
        info!("  (none)");
    }
    for (status, count) in &report.reductions {
        info!("  {status}: {count}");
    }

    info!("");
    info!("Test suite cases: {}", report.testsuite_cases);
}

pub async fn execute_status(cfg: &Config, args: StatusArgs) -> AppResult<()> {
    let work = WorkDir::new(cfg.work_dir());
    let report = generate_status_report(&work)?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_table_format(&work, &report),
    }
    Ok(())
}
