use std::sync::atomic::Ordering;

use dredd_runner::Campaign;
use pretty_assertions::assert_eq;

use crate::common::{Fixture, running, write_script};

#[tokio::test]
async fn cleared_running_flag_stops_before_generating() {
    let fixture = Fixture::new();
    let mut cfg = fixture.config();
    if let Some(campaign) = cfg.campaign.as_mut() {
        campaign.max_programs = Some(0);
        campaign.total_time = Some(0);
    }
    let flag = running();
    flag.store(false, Ordering::SeqCst);

    let report = Campaign::from_config(&cfg)
        .unwrap()
        .run(&fixture.work(), flag)
        .await
        .unwrap();
    assert_eq!(report.programs, 0);
    assert!(report.interrupted);
}

#[tokio::test]
async fn failing_generator_discards_candidates() {
    let fixture = Fixture::new();
    let mut cfg = fixture.config();
    if let Some(generator) = cfg.generator.as_mut() {
        generator.path = Some("false".into());
    }
    if let Some(campaign) = cfg.campaign.as_mut() {
        campaign.max_programs = Some(3);
    }

    let work = fixture.work();
    let report = Campaign::from_config(&cfg)
        .unwrap()
        .run(&work, running())
        .await
        .unwrap();
    assert_eq!(report.programs, 3);
    assert!(report.tests.is_empty());
    assert!(work.get_tests().unwrap().is_empty());
}

#[tokio::test]
async fn deadline_between_mutants_marks_the_summary_terminated_early() {
    let fixture = Fixture::new();
    let slow = fixture.tool("slow-mutant-cc");
    write_script(
        &slow,
        &format!(
            "#!/bin/sh\n[ -n \"$DREDD_ENABLED_MUTATION\" ] && sleep 2\nexec '{}' \"$@\"\n",
            fixture.tool("fake-cc").display()
        ),
    );
    let mut cfg = fixture.config();
    if let Some(compiler) = cfg.compiler.as_mut() {
        compiler.mutated = Some(slow);
    }
    if let Some(campaign) = cfg.campaign.as_mut() {
        campaign.total_time = Some(1);
        campaign.max_programs = Some(0);
    }

    let work = fixture.work();
    let report = Campaign::from_config(&cfg)
        .unwrap()
        .run(&work, running())
        .await
        .unwrap();
    assert_eq!(report.tests.len(), 1);
    assert!(!report.interrupted);

    let test = &report.tests[0];
    assert!(work.test_dir(test).join("kill_summary.json").is_file());
    let summary = work.get_kill_summary(test).unwrap();
    assert!(summary.terminated_early);
    assert_eq!(summary.covered_mutants, vec![1, 3, 5, 7]);
    let considered =
        summary.killed_mutants.len() + summary.skipped_mutants.len() + summary.survived_mutants.len();
    assert!(considered < summary.covered_mutants.len());
}

#[tokio::test]
async fn unclassifiable_mutant_cuts_its_test_short() {
    let fixture = Fixture::new();
    // Mutation 5 "compiles" without producing a binary.
    let broken = fixture.tool("broken-mutant-cc");
    write_script(
        &broken,
        &format!(
            "#!/bin/sh\n[ \"$DREDD_ENABLED_MUTATION\" = 5 ] && exit 0\nexec '{}' \"$@\"\n",
            fixture.tool("fake-cc").display()
        ),
    );
    let mut cfg = fixture.config();
    if let Some(compiler) = cfg.compiler.as_mut() {
        compiler.mutated = Some(broken);
    }

    let work = fixture.work();
    let report = Campaign::from_config(&cfg)
        .unwrap()
        .run(&work, running())
        .await
        .unwrap();
    assert_eq!(report.unclassified, vec![5]);

    let summary = work.get_kill_summary(&report.tests[0]).unwrap();
    assert!(summary.terminated_early);
    assert_eq!(summary.killed_mutants, vec![3]);
    assert_eq!(summary.survived_mutants, vec![1]);
    assert!(summary.skipped_mutants.is_empty());
    assert!(!work.is_killed(7));
}
