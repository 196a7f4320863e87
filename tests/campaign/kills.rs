use std::fs;

use dredd_runner::Campaign;
use dredd_runner::types::{AppError, KillStatus};
use pretty_assertions::assert_eq;

use crate::common::{Fixture, running};

#[tokio::test]
async fn campaign_classifies_and_records_each_covered_mutant() {
    let fixture = Fixture::new();
    let work = fixture.work();
    work.ensure_campaign_layout().unwrap();
    // Killed by an earlier worker; must never be tried again.
    assert!(work.claim_kill(7).unwrap().won());

    let campaign = Campaign::from_config(&fixture.config()).unwrap();
    let report = campaign.run(&work, running()).await.unwrap();

    assert_eq!(report.programs, 1);
    assert_eq!(report.tests.len(), 1);
    assert!(!report.interrupted);
    let test = &report.tests[0];
    assert!(test.starts_with("csmith_"));
    assert!(work.test_dir(test).join("prog.c").is_file());

    let summary = work.get_kill_summary(test).unwrap();
    assert_eq!(summary.covered_mutants, vec![1, 3, 5, 7]);
    assert_eq!(summary.killed_mutants, vec![3, 5]);
    assert_eq!(summary.skipped_mutants, vec![7]);
    assert_eq!(summary.survived_mutants, vec![1]);
    assert!(!summary.terminated_early);

    let crash = work.get_kill_info(3).unwrap().unwrap();
    assert_eq!(crash.kill_type, KillStatus::KillCompilerCrash);
    assert_eq!(&crash.killing_test, test);
    let stdout = work.get_kill_info(5).unwrap().unwrap();
    assert_eq!(stdout.kill_type, KillStatus::KillDifferentStdout);

    assert!(work.get_kill_info(7).unwrap().is_none());
    assert!(work.get_kill_info(1).unwrap().is_none());
}

#[tokio::test]
async fn second_worker_skips_recorded_tests_and_kills() {
    let fixture = Fixture::new();
    let work = fixture.work();
    let campaign = Campaign::from_config(&fixture.config()).unwrap();

    let first = campaign.run(&work, running()).await.unwrap();
    assert_eq!(first.tests.len(), 1);
    assert_eq!(first.kills, 2);

    // Same seed: the only program it generates is already claimed.
    let second = campaign.run(&work, running()).await.unwrap();
    assert!(second.tests.is_empty());
    assert_eq!(second.kills, 0);
    assert_eq!(work.get_tests().unwrap(), first.tests);
}

#[tokio::test]
async fn later_programs_skip_mutants_killed_earlier() {
    let fixture = Fixture::new();
    let mut cfg = fixture.config();
    if let Some(campaign) = cfg.campaign.as_mut() {
        campaign.max_programs = Some(2);
    }
    let work = fixture.work();
    let report = Campaign::from_config(&cfg)
        .unwrap()
        .run(&work, running())
        .await
        .unwrap();
    assert_eq!(report.tests.len(), 2);

    let later = work.get_kill_summary(&report.tests[1]).unwrap();
    assert!(later.killed_mutants.is_empty());
    assert_eq!(later.skipped_mutants, vec![3, 5]);
    assert_eq!(later.survived_mutants, vec![1, 7]);
}

#[tokio::test]
async fn same_seed_generates_same_tests() {
    let first = Fixture::new();
    let second = Fixture::new();
    let mut cfg_first = first.config();
    let mut cfg_second = second.config();
    for cfg in [&mut cfg_first, &mut cfg_second] {
        if let Some(campaign) = cfg.campaign.as_mut() {
            campaign.max_programs = Some(3);
        }
    }

    let a = Campaign::from_config(&cfg_first)
        .unwrap()
        .run(&first.work(), running())
        .await
        .unwrap();
    let b = Campaign::from_config(&cfg_second)
        .unwrap()
        .run(&second.work(), running())
        .await
        .unwrap();
    assert_eq!(a.tests, b.tests);
}

#[tokio::test]
async fn inconsistent_mutation_trees_abort_the_campaign() {
    let fixture = Fixture::new();
    fs::write(
        fixture.dir.path().join("tracking.json"),
        r#"{"infoForFiles": [{"mutationTreeRoot": {"mutationGroups": [{"removeStmt": {"mutationId": 0}}]}}]}"#,
    )
    .unwrap();

    let campaign = Campaign::from_config(&fixture.config()).unwrap();
    let err = campaign.run(&fixture.work(), running()).await.unwrap_err();
    assert!(matches!(err, AppError::InconsistentMutationTrees(_)));
    assert!(!fixture.work().tests_dir().exists());
}
