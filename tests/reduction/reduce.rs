use std::fs;

use dredd_runner::Reduction;
use dredd_runner::core::oracle::{ORACLE_CONFIG_FILE, OracleConfig};
use dredd_runner::core::packing::{DELIMITER, PACKED_FILE};
use dredd_runner::types::{KillStatus, ReductionStatus};
use pretty_assertions::assert_eq;

use crate::common::{Fixture, running};

const ORACLE: &str = env!("CARGO_BIN_EXE_dredd-runner");
const PROGRAM: &str = "int main(void) { return 0; }\n";

#[tokio::test]
async fn crash_and_miscompilation_kills_reduce_successfully() {
    let fixture = Fixture::new();
    fixture.record_test("csmith_1", &[("prog.c", PROGRAM)], &[(3, KillStatus::KillCompilerCrash)]);
    fixture.record_test("csmith_2", &[("prog.c", PROGRAM)], &[(5, KillStatus::KillDifferentStdout)]);

    let reduction = Reduction::from_config(&fixture.config(), ORACLE).unwrap();
    let work = fixture.work();
    let statuses = reduction.run(&work, running()).await.unwrap();

    assert_eq!(statuses.get(&3), Some(&ReductionStatus::Success));
    assert_eq!(statuses.get(&5), Some(&ReductionStatus::Success));

    let crash_dir = work.reduction_dir(3);
    assert!(crash_dir.join("original").join("prog.c").is_file());
    let oracle = OracleConfig::read(&crash_dir.join(ORACLE_CONFIG_FILE)).unwrap();
    assert_eq!(oracle.mutation_id, 3);
    assert_eq!(oracle.kill_type, KillStatus::KillCompilerCrash);
    let reference = oracle.crash_reference.unwrap();
    let stderr = fs::read_to_string(reference.join("stderr.txt")).unwrap();
    assert!(stderr.contains("Assertion `x' failed."));

    let summary = work.get_reduction_summary(5).unwrap().unwrap();
    assert_eq!(summary.reduction_status, ReductionStatus::Success);
    assert!(summary.reduction_start_time <= summary.reduction_end_time);
}

#[tokio::test]
async fn wrong_kill_type_is_not_interesting() {
    let fixture = Fixture::new();
    // The mutant changes stdout, not the exit code.
    fixture.record_test(
        "csmith_1",
        &[("prog.c", PROGRAM)],
        &[(5, KillStatus::KillDifferentExitCodes)],
    );

    let reduction = Reduction::from_config(&fixture.config(), ORACLE).unwrap();
    let statuses = reduction.run(&fixture.work(), running()).await.unwrap();
    assert_eq!(statuses.get(&5), Some(&ReductionStatus::Failed));
}

#[tokio::test]
async fn reducer_past_its_deadline_times_out() {
    let fixture = Fixture::new();
    fixture.record_test("csmith_1", &[("prog.c", PROGRAM)], &[(3, KillStatus::KillCompilerCrash)]);
    let mut cfg = fixture.config();
    if let Some(reduce) = cfg.reduce.as_mut() {
        reduce.reducer = Some(fixture.tool("slow-reduce"));
        reduce.timeout = Some(1);
    }

    let start = std::time::Instant::now();
    let work = fixture.work();
    let statuses = Reduction::from_config(&cfg, ORACLE)
        .unwrap()
        .run(&work, running())
        .await
        .unwrap();
    assert!(start.elapsed().as_secs() < 20);
    assert_eq!(statuses.get(&3), Some(&ReductionStatus::Timeout));
    let summary = work.get_reduction_summary(3).unwrap().unwrap();
    assert_eq!(summary.reduction_status, ReductionStatus::Timeout);
}

#[tokio::test]
async fn claimed_reductions_are_left_alone() {
    let fixture = Fixture::new();
    fixture.record_test("csmith_1", &[("prog.c", PROGRAM)], &[(3, KillStatus::KillCompilerCrash)]);
    let work = fixture.work();
    work.ensure_reductions_layout().unwrap();
    assert!(work.claim_reduction(3).unwrap().won());

    let statuses = Reduction::from_config(&fixture.config(), ORACLE)
        .unwrap()
        .run(&work, running())
        .await
        .unwrap();
    assert!(statuses.is_empty());
    assert!(work.get_reduction_summary(3).unwrap().is_none());
}

#[tokio::test]
async fn multi_file_programs_are_packed_and_unpacked() {
    let fixture = Fixture::new();
    fixture.record_test(
        "yarpgen_9",
        &[
            ("driver.c", "#include \"init.h\"\nint main(void) { return f(); }\n"),
            ("func.c", "#include \"init.h\"\nint f(void) { return X; }\n"),
            ("init.h", "#define X 0\nint f(void);\n"),
        ],
        &[(5, KillStatus::KillDifferentStdout)],
    );

    let work = fixture.work();
    let statuses = Reduction::from_config(&fixture.config(), ORACLE)
        .unwrap()
        .run(&work, running())
        .await
        .unwrap();
    assert_eq!(statuses.get(&5), Some(&ReductionStatus::Success));

    let dir = work.reduction_dir(5);
    let packed = fs::read_to_string(dir.join(PACKED_FILE)).unwrap();
    assert_eq!(packed.matches(DELIMITER).count(), 1);
    assert!(packed.contains("#define X 0"));

    let oracle = OracleConfig::read(&dir.join(ORACLE_CONFIG_FILE)).unwrap();
    assert_eq!(oracle.program, PACKED_FILE);
    assert_eq!(
        oracle.packed_sources,
        Some(vec!["driver.c".to_string(), "func.c".to_string()])
    );
    let driver = fs::read_to_string(dir.join("driver.c")).unwrap();
    assert!(driver.contains("int main(void)"));
    assert!(!driver.contains(DELIMITER));
    assert!(dir.join("func.c").is_file());
}

#[tokio::test]
async fn reduction_with_missing_sources_ends_in_exception() {
    let fixture = Fixture::new();
    // The test directory holds no program to copy.
    fixture.record_test("csmith_1", &[], &[(5, KillStatus::KillDifferentStdout)]);

    let work = fixture.work();
    let reduction = Reduction::from_config(&fixture.config(), ORACLE).unwrap();
    let statuses = reduction.run(&work, running()).await.unwrap();
    assert_eq!(statuses.get(&5), Some(&ReductionStatus::Exception));

    let summary = work.get_reduction_summary(5).unwrap().unwrap();
    assert_eq!(summary.reduction_status, ReductionStatus::Exception);
    assert!(summary.reduction_start_time <= summary.reduction_end_time);

    // The summary makes the job terminal; a later run leaves it alone.
    let statuses = reduction.run(&work, running()).await.unwrap();
    assert!(statuses.is_empty());
    assert_eq!(
        work.get_reduction_summary(5).unwrap().unwrap().reduction_status,
        ReductionStatus::Exception
    );
}

#[tokio::test]
async fn reducer_that_cannot_start_ends_in_exception() {
    let fixture = Fixture::new();
    fixture.record_test("csmith_1", &[("prog.c", PROGRAM)], &[(5, KillStatus::KillDifferentStdout)]);
    let mut cfg = fixture.config();
    if let Some(reduce) = cfg.reduce.as_mut() {
        reduce.reducer = Some(fixture.tool("no-such-reducer"));
    }

    let work = fixture.work();
    let statuses = Reduction::from_config(&cfg, ORACLE)
        .unwrap()
        .run(&work, running())
        .await
        .unwrap();
    assert_eq!(statuses.get(&5), Some(&ReductionStatus::Exception));
    let summary = work.get_reduction_summary(5).unwrap().unwrap();
    assert_eq!(summary.reduction_status, ReductionStatus::Exception);
    // The oracle was written before the reducer was started.
    assert!(work.reduction_dir(5).join(ORACLE_CONFIG_FILE).is_file());
}
