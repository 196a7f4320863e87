use std::fs;
use std::sync::Arc;

use dredd_runner::Reduction;
use dredd_runner::core::cmds::package::Packager;
use dredd_runner::core::cmds::replay::{load_cases, replay_compiler};
use dredd_runner::core::store::REFERENCE_OUTPUT_FILE;
use dredd_runner::types::{CompileArgs, KillStatus};
use dredd_runner::TimeoutPolicy;
use pretty_assertions::assert_eq;

use crate::common::{Fixture, running};

const ORACLE: &str = env!("CARGO_BIN_EXE_dredd-runner");
const PROGRAM: &str = "int main(void) { return 0; }\n";

async fn reduced_fixture() -> Fixture {
    let fixture = Fixture::new();
    fixture.record_test("csmith_1", &[("prog.c", PROGRAM)], &[(3, KillStatus::KillCompilerCrash)]);
    fixture.record_test("csmith_2", &[("prog.c", PROGRAM)], &[(5, KillStatus::KillDifferentStdout)]);
    Reduction::from_config(&fixture.config(), ORACLE)
        .unwrap()
        .run(&fixture.work(), running())
        .await
        .unwrap();
    fixture
}

#[tokio::test]
async fn successful_reductions_become_test_cases() {
    let fixture = reduced_fixture().await;
    let work = fixture.work();

    let packaged = Packager::from_config(&fixture.config(), false, false)
        .run(&work)
        .await
        .unwrap();
    assert_eq!(packaged, vec![3, 5]);
    assert_eq!(work.get_testsuite_cases().unwrap(), vec![3, 5]);

    let crash_case = work.testsuite_case_dir(3);
    assert!(crash_case.join("prog.c").is_file());
    assert!(!crash_case.join(REFERENCE_OUTPUT_FILE).exists());
    let output = fs::read_to_string(work.testsuite_case_dir(5).join(REFERENCE_OUTPUT_FILE)).unwrap();
    assert_eq!(output, "42\n");

    // Packaging again finds every case claimed.
    let again = Packager::from_config(&fixture.config(), false, false)
        .run(&work)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn replay_reports_miscompiling_compilers() {
    let fixture = reduced_fixture().await;
    let work = fixture.work();
    Packager::from_config(&fixture.config(), false, false)
        .run(&work)
        .await
        .unwrap();

    let cases: Vec<_> = load_cases(&work).unwrap().into_iter().map(Arc::new).collect();
    assert_eq!(cases.len(), 2);
    let args = CompileArgs {
        flags: vec!["-O3".to_string()],
        include_dirs: vec![],
    };
    let policy = TimeoutPolicy::default();

    let good = replay_compiler(&fixture.tool("fake-cc"), &cases, &args, &policy, 2).await;
    assert_eq!((good.passed, good.total), (2, 2));

    let miscompiling = fixture.mutant_compiler(5);
    let bad = replay_compiler(&miscompiling, &cases, &args, &policy, 2).await;
    assert_eq!((bad.passed, bad.total), (1, 2));

    let crashing = fixture.mutant_compiler(3);
    let worst = replay_compiler(&crashing, &cases, &args, &policy, 1).await;
    assert_eq!(worst.passed, 0);
}

#[tokio::test]
async fn rejected_cases_release_their_claim() {
    let fixture = reduced_fixture().await;
    let mut cfg = fixture.config();
    let crashing = fixture.mutant_compiler(3);
    if let Some(package) = cfg.package.as_mut() {
        package.compilers = Some(vec![crashing.display().to_string()]);
    }

    let work = fixture.work();
    let packaged = Packager::from_config(&cfg, false, false).run(&work).await.unwrap();
    assert!(packaged.is_empty());
    assert!(work.get_testsuite_cases().unwrap().is_empty());
}
