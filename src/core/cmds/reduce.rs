use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};

use crate::core::classifier::{KillClassifier, TimeoutPolicy};
use crate::core::generator::files_for_test;
use crate::core::oracle::{
    self, CRASH_REFERENCE_DIR, CRASH_STDERR_FILE, ORACLE_CONFIG_FILE, ORACLE_SCRIPT_FILE,
    OracleConfig,
};
use crate::core::packing::{self, PACKED_FILE};
use crate::core::process::{Invocation, ProcessOutcome};
use crate::core::store::{Claim, WorkDir};
use crate::types::config::Config;
use crate::types::{
    AppError, AppResult, CompileArgs, KillInfo, KillStatus, MutationId, ProgramFiles,
    ReductionStatus, ReductionSummary,
};

pub const ORIGINAL_DIR: &str = "original";
pub const REDUCTION_LOG_FILE: &str = "reduction_log.txt";

/// Tool paths written into oracle configurations must still resolve from the reducer's
/// scratch directories. Bare names are left for `PATH` lookup.
fn absolute_tool(path: &Path) -> AppResult<PathBuf> {
    if path.components().count() > 1 {
        Ok(std::path::absolute(path)?)
    } else {
        Ok(path.to_path_buf())
    }
}

/// Every recorded kill worth reducing, keyed by mutation id.
pub fn collect_kills(work: &WorkDir) -> AppResult<BTreeMap<MutationId, KillInfo>> {
    let mut kills = BTreeMap::new();
    for (test, summary) in work.get_kill_summaries()? {
        for mutation in summary.killed_mutants {
            match work.get_kill_info(mutation)? {
                Some(info) if info.kill_type.is_kill() => {
                    kills.insert(mutation, info);
                }
                Some(_) => {}
                None => warn!("{test} lists mutant {mutation} as killed but it has no kill info"),
            }
        }
    }
    Ok(kills)
}

struct PreparedReduction {
    dir: PathBuf,
    /// File handed to the reducer, relative to `dir`.
    program: String,
    packed_sources: Option<Vec<String>>,
}

pub struct Reduction {
    mutated_compiler: PathBuf,
    sanitizer_compiler: PathBuf,
    flags: Vec<String>,
    include_dirs: Vec<PathBuf>,
    sanitizers: Vec<Vec<String>>,
    policy: TimeoutPolicy,
    reducer: PathBuf,
    timeout: Duration,
    /// Executable the generated `interesting.sh` calls back into.
    oracle_exe: PathBuf,
}

impl Reduction {
    pub fn from_config(cfg: &Config, oracle_exe: impl AsRef<Path>) -> AppResult<Self> {
        let compiler = cfg.compiler();
        let mutated = compiler
            .mutated()
            .ok_or_else(|| AppError::Config("compiler.mutated is not set".to_string()))?;
        let include_dirs = cfg
            .generator()
            .include_dirs()
            .iter()
            .map(std::path::absolute)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            mutated_compiler: absolute_tool(mutated)?,
            sanitizer_compiler: absolute_tool(Path::new(compiler.sanitizer()))?,
            flags: compiler.flags(),
            include_dirs,
            sanitizers: cfg.campaign().sanitizers(),
            policy: cfg.timeouts().policy(),
            reducer: absolute_tool(&cfg.reduce().reducer())?,
            timeout: Duration::from_secs(cfg.reduce().timeout()),
            oracle_exe: std::path::absolute(oracle_exe.as_ref())?,
        })
    }

    fn compile_args(&self) -> CompileArgs {
        CompileArgs {
            flags: self.flags.clone(),
            include_dirs: self.include_dirs.clone(),
        }
    }

    /// Reduce every unclaimed kill in ascending mutation order. Individual failures are
    /// logged and do not stop the remaining reductions.
    pub async fn run(
        &self,
        work: &WorkDir,
        running: Arc<AtomicBool>,
    ) -> AppResult<BTreeMap<MutationId, ReductionStatus>> {
        let kills = collect_kills(work)?;
        work.ensure_reductions_layout()?;
        info!("{} kills eligible for reduction", kills.len());

        let mut statuses = BTreeMap::new();
        for (mutation, kill) in kills {
            if !running.load(Ordering::SeqCst) {
                warn!("Reduction interrupted, stopping...");
                break;
            }
            if work.claim_reduction(mutation)? == Claim::AlreadyExists {
                info!(
                    "Skipping reduction for mutant {mutation} as {} already exists.",
                    work.reduction_dir(mutation).display()
                );
                continue;
            }
            info!(
                "Preparing to reduce mutant {mutation} ({} from {})",
                kill.kill_type, kill.killing_test
            );
            match self.reduce_one(work, mutation, &kill).await {
                Ok(status) => {
                    info!("Reduction of {mutation} finished with status {status}");
                    statuses.insert(mutation, status);
                }
                Err(e) => error!("Reduction of {mutation} failed: {e}"),
            }
        }
        Ok(statuses)
    }

    /// Every claimed reduction ends with a summary, even when it never reaches the reducer.
    async fn reduce_one(
        &self,
        work: &WorkDir,
        mutation: MutationId,
        kill: &KillInfo,
    ) -> AppResult<ReductionStatus> {
        let start = Utc::now();
        let prepared = match self.prepare(work, mutation, kill).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Could not prepare the reduction of {mutation}: {e}");
                work.add_reduction_summary(
                    mutation,
                    &ReductionSummary {
                        reduction_status: ReductionStatus::Exception,
                        reduction_start_time: start,
                        reduction_end_time: Utc::now(),
                    },
                )?;
                return Ok(ReductionStatus::Exception);
            }
        };
        self.supervise(work, mutation, prepared).await
    }

    /// Copy the killing program into the reduction directory and write its oracle.
    async fn prepare(
        &self,
        work: &WorkDir,
        mutation: MutationId,
        kill: &KillInfo,
    ) -> AppResult<PreparedReduction> {
        let dir = std::path::absolute(work.reduction_dir(mutation))?;
        let files = files_for_test(&kill.killing_test).ok_or_else(|| {
            AppError::Custom(format!("cannot tell the files of test {}", kill.killing_test))
        })?;

        let original = dir.join(ORIGINAL_DIR);
        fs::create_dir(&original)?;
        files.copy_between(&work.test_dir(&kill.killing_test), &original)?;

        let (program, packed_sources) = if files.is_multi_file() {
            fs::write(
                dir.join(PACKED_FILE),
                packing::pack_program(&original, &files)?,
            )?;
            (PACKED_FILE.to_string(), Some(files.sources.clone()))
        } else {
            let name = files.sources[0].clone();
            fs::copy(original.join(&name), dir.join(&name))?;
            (name, None)
        };

        let crash_reference = if kill.kill_type == KillStatus::KillCompilerCrash {
            Some(self.record_crash(&dir, &original, &files, mutation).await?)
        } else {
            None
        };

        let config_path = dir.join(ORACLE_CONFIG_FILE);
        OracleConfig {
            program: program.clone(),
            packed_sources: packed_sources.clone(),
            mutated_compiler: self.mutated_compiler.clone(),
            sanitizer_compiler: self.sanitizer_compiler.clone(),
            compile_args: self.compile_args(),
            mutation_id: mutation,
            kill_type: kill.kill_type,
            timeouts: self.policy.clone(),
            sanitizers: self.sanitizers.clone(),
            crash_reference,
        }
        .write(&config_path)?;
        oracle::write_script(&dir.join(ORACLE_SCRIPT_FILE), &self.oracle_exe, &config_path)?;

        Ok(PreparedReduction {
            dir,
            program,
            packed_sources,
        })
    }

    /// Run the reducer to completion or its deadline and record the outcome.
    async fn supervise(
        &self,
        work: &WorkDir,
        mutation: MutationId,
        prepared: PreparedReduction,
    ) -> AppResult<ReductionStatus> {
        let PreparedReduction {
            dir,
            program,
            packed_sources,
        } = prepared;
        let start = Utc::now();
        let outcome = Invocation::new(&self.reducer, self.timeout)
            .arg(format!("./{ORACLE_SCRIPT_FILE}"))
            .arg(&program)
            .current_dir(&dir)
            .log_output_to(dir.join(REDUCTION_LOG_FILE))
            .isolate_process_group()
            .run()
            .await;
        let status = match outcome {
            Ok(ProcessOutcome::TimedOut { .. }) => {
                info!("Reduction of {mutation} timed out.");
                ReductionStatus::Timeout
            }
            Ok(ProcessOutcome::Finished(result)) if !result.success() => {
                info!("Reduction of {mutation} failed.");
                ReductionStatus::Failed
            }
            Ok(ProcessOutcome::Finished(_)) => ReductionStatus::Success,
            Err(e) => {
                error!("Reducer for {mutation} could not be supervised: {e}");
                ReductionStatus::Exception
            }
        };
        let end = Utc::now();

        let unpacked = match &packed_sources {
            Some(sources)
                if matches!(status, ReductionStatus::Success | ReductionStatus::Timeout) =>
            {
                let reduced = ProgramFiles {
                    sources: sources.clone(),
                    headers: Vec::new(),
                };
                packing::unpack_program(&dir.join(PACKED_FILE), &reduced, &dir)
            }
            _ => Ok(()),
        };

        work.add_reduction_summary(
            mutation,
            &ReductionSummary {
                reduction_status: status,
                reduction_start_time: start,
                reduction_end_time: end,
            },
        )?;
        unpacked?;
        Ok(status)
    }

    /// Compile the original program with the mutant and keep its stderr as the reference crash.
    async fn record_crash(
        &self,
        dir: &Path,
        original: &Path,
        files: &ProgramFiles,
        mutation: MutationId,
    ) -> AppResult<PathBuf> {
        let reference_dir = dir.join(CRASH_REFERENCE_DIR);
        fs::create_dir_all(&reference_dir)?;
        let scratch = tempfile::tempdir()?;
        let classifier = KillClassifier::new(
            &self.mutated_compiler,
            self.compile_args(),
            self.policy.clone(),
            scratch.path(),
        );
        let timeout = self.policy.mutant_compile(self.policy.compile());

        let mut stderr = Vec::new();
        for source in files.source_paths(original) {
            if let ProcessOutcome::Finished(result) = classifier
                .compile_object(&source, Some(mutation), timeout)
                .await?
            {
                stderr.extend_from_slice(&result.stderr);
            }
        }
        fs::write(reference_dir.join(CRASH_STDERR_FILE), stderr)?;
        Ok(reference_dir)
    }
}

pub async fn execute_reduce(
    cfg: &Config,
    running: Arc<AtomicBool>,
) -> AppResult<BTreeMap<MutationId, ReductionStatus>> {
    let work = WorkDir::new(cfg.work_dir());
    if !work.tests_dir().is_dir() || !work.killed_mutants_dir().is_dir() {
        return Err(AppError::Config(format!(
            "{} is not a campaign work directory",
            work.root().display()
        )));
    }
    let reduction = Reduction::from_config(cfg, std::env::current_exe()?)?;
    let statuses = reduction.run(&work, running).await?;
    info!("{} reductions completed in this run", statuses.len());
    Ok(statuses)
}
