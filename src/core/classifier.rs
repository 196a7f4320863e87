//! Kill classification of a single mutant against a baseline measurement.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::process::{Invocation, ProcessOutcome};
use crate::types::{AppResult, BaselineMeasurement, CompileArgs, Hash, KillStatus, MutationId};

/// Environment variable selecting the single mutation enabled in the mutated compiler.
pub const ENABLED_MUTATION_ENV: &str = "DREDD_ENABLED_MUTATION";
/// Environment variable naming the file the tracking compiler writes covered ids to.
pub const TRACKING_FILE_ENV: &str = "DREDD_MUTANT_TRACKING_FILE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutPolicy {
    /// Deadline for compiling with an unmutated compiler.
    pub compile_secs: u64,
    /// Deadline for running a binary built by an unmutated compiler.
    pub run_secs: u64,
    pub min_mutant_compile_secs: u64,
    pub mutant_compile_multiplier: f64,
    pub min_mutant_run_secs: u64,
    pub mutant_run_multiplier: f64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            compile_secs: 10,
            run_secs: 5,
            min_mutant_compile_secs: 10,
            mutant_compile_multiplier: 5.0,
            min_mutant_run_secs: 5,
            mutant_run_multiplier: 10.0,
        }
    }
}

impl TimeoutPolicy {
    pub fn compile(&self) -> Duration {
        Duration::from_secs(self.compile_secs)
    }

    pub fn run(&self) -> Duration {
        Duration::from_secs(self.run_secs)
    }

    pub fn mutant_compile(&self, baseline: Duration) -> Duration {
        scaled_timeout(
            self.min_mutant_compile_secs,
            self.mutant_compile_multiplier,
            baseline,
        )
    }

    pub fn mutant_run(&self, baseline: Duration) -> Duration {
        scaled_timeout(self.min_mutant_run_secs, self.mutant_run_multiplier, baseline)
    }
}

/// `max(min, baseline × multiplier)`.
pub fn scaled_timeout(min_secs: u64, multiplier: f64, baseline: Duration) -> Duration {
    let scaled = Duration::try_from_secs_f64(baseline.as_secs_f64() * multiplier.max(0.0))
        .unwrap_or(Duration::MAX);
    Duration::from_secs(min_secs).max(scaled)
}

/// Verdict for the run stage, given that the mutant binary differs from the baseline binary.
pub fn verdict_for_run(baseline: &BaselineMeasurement, outcome: &ProcessOutcome) -> KillStatus {
    match outcome {
        ProcessOutcome::TimedOut { .. } => KillStatus::KillRuntimeTimeout,
        ProcessOutcome::Finished(result) if result.exit_code != baseline.exit_code => {
            KillStatus::KillDifferentExitCodes
        }
        ProcessOutcome::Finished(result) if result.stdout != baseline.stdout => {
            KillStatus::KillDifferentStdout
        }
        ProcessOutcome::Finished(_) => KillStatus::SurvivedBinaryDifference,
    }
}

/// Compiles and runs programs with one compiler, optionally enabling a single mutation.
///
/// Every build goes into `scratch`; the caller owns that directory.
#[derive(Debug, Clone)]
pub struct KillClassifier {
    compiler: PathBuf,
    args: CompileArgs,
    policy: TimeoutPolicy,
    scratch: PathBuf,
}

impl KillClassifier {
    pub fn new(
        compiler: impl AsRef<Path>,
        args: CompileArgs,
        policy: TimeoutPolicy,
        scratch: impl AsRef<Path>,
    ) -> Self {
        Self {
            compiler: compiler.as_ref().to_path_buf(),
            args,
            policy,
            scratch: scratch.as_ref().to_path_buf(),
        }
    }

    pub fn policy(&self) -> &TimeoutPolicy {
        &self.policy
    }

    fn compile_invocation(
        &self,
        extra: &[String],
        sources: &[PathBuf],
        output: &Path,
        mutation: Option<MutationId>,
        timeout: Duration,
    ) -> Invocation {
        let mut invocation = Invocation::new(&self.compiler, timeout)
            .args(self.args.command_line_with(extra, sources, output))
            .isolate_process_group();
        if let Some(id) = mutation {
            invocation = invocation.env(ENABLED_MUTATION_ENV, id.to_string());
        }
        invocation
    }

    /// Build and run `sources` with no mutation enabled. Returns `None` when the program is
    /// unusable as a baseline (compile failure, run failure, or timeout of either).
    pub async fn measure_baseline(
        &self,
        sources: &[PathBuf],
    ) -> AppResult<Option<BaselineMeasurement>> {
        let exe = self.scratch.join("__regular.exe");
        remove_if_present(&exe)?;

        let compile = self
            .compile_invocation(&[], sources, &exe, None, self.policy.compile())
            .run()
            .await?;
        let compiled = match compile {
            ProcessOutcome::TimedOut { .. } => {
                info!("Compiler timeout.");
                return Ok(None);
            }
            ProcessOutcome::Finished(result) if !result.success() => {
                info!("Compilation failed without mutants.");
                debug!("stderr: {}", result.stderr_lossy());
                return Ok(None);
            }
            ProcessOutcome::Finished(result) => result,
        };
        let binary_hash = Hash::of_file(&exe).await?;

        let run = Invocation::new(&exe, self.policy.run()).run().await?;
        let executed = match run {
            ProcessOutcome::TimedOut { .. } => {
                info!("Runtime timeout.");
                return Ok(None);
            }
            ProcessOutcome::Finished(result) if !result.success() => {
                info!("Execution of generated program failed without mutants.");
                return Ok(None);
            }
            ProcessOutcome::Finished(result) => result,
        };

        Ok(Some(BaselineMeasurement {
            sources: sources.to_vec(),
            binary_hash,
            compile_duration: compiled.elapsed,
            run_duration: executed.elapsed,
            stdout: executed.stdout,
            exit_code: executed.exit_code,
        }))
    }

    /// Decide whether `baseline`'s program kills `mutation`.
    pub async fn classify(
        &self,
        baseline: &BaselineMeasurement,
        mutation: MutationId,
    ) -> AppResult<KillStatus> {
        let exe = self.scratch.join("__mutant.exe");
        remove_if_present(&exe)?;

        let compile_timeout = self.policy.mutant_compile(baseline.compile_duration);
        let compile = self
            .compile_invocation(&[], &baseline.sources, &exe, Some(mutation), compile_timeout)
            .run()
            .await?;
        match &compile {
            ProcessOutcome::TimedOut { .. } => return Ok(KillStatus::KillCompilerCrash),
            ProcessOutcome::Finished(result) if !result.success() => {
                return Ok(KillStatus::KillCompilerCrash);
            }
            ProcessOutcome::Finished(_) => {}
        }

        if Hash::of_file(&exe).await? == baseline.binary_hash {
            return Ok(KillStatus::SurvivedIdentical);
        }

        let run_timeout = self.policy.mutant_run(baseline.run_duration);
        let run = Invocation::new(&exe, run_timeout).run().await?;
        Ok(verdict_for_run(baseline, &run))
    }

    /// Compile one source file to an object file (`-c`), with `mutation` enabled if given.
    pub async fn compile_object(
        &self,
        source: &Path,
        mutation: Option<MutationId>,
        timeout: Duration,
    ) -> io::Result<ProcessOutcome> {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string());
        let object = self.scratch.join(format!("__{stem}.o"));
        remove_if_present(&object)?;
        self.compile_invocation(
            &["-c".to_string()],
            &[source.to_path_buf()],
            &object,
            mutation,
            timeout,
        )
        .run()
        .await
    }
}

pub(crate) fn remove_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
