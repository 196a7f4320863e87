use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};

use crate::core::classifier::{TimeoutPolicy, remove_if_present};
use crate::core::cli::PackageArgs;
use crate::core::cmds::reduce::ORIGINAL_DIR;
use crate::core::generator::files_for_test;
use crate::core::oracle::{ORACLE_CONFIG_FILE, OracleConfig};
use crate::core::process::Invocation;
use crate::core::store::{Claim, REFERENCE_OUTPUT_FILE, WorkDir};
use crate::types::config::Config;
use crate::types::{
    AppError, AppResult, CompileArgs, KillInfo, MutationId, ProgramFiles,
    ReductionStatus,
};

const WARNING_FLAGS: [&str; 2] = ["-pedantic", "-Wall"];
const OPT_LEVELS: [&str; 2] = ["-O0", "-O3"];

/// Result of building a program with one compiler, and running it when asked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildCheck {
    /// Every source compiled to an object file.
    Compiled,
    /// The program was linked and ran successfully, printing this.
    Ran(Vec<u8>),
    Failed(String),
}

/// Compile `sources` with `compiler`. Crash reproducers compile each source with `-c`;
/// otherwise the program is linked and run.
pub async fn check_build(
    compiler: &Path,
    args: &CompileArgs,
    sources: &[PathBuf],
    scratch: &Path,
    run: bool,
    policy: &TimeoutPolicy,
) -> AppResult<BuildCheck> {
    let compiler_name = compiler.display();
    if !run {
        for source in sources {
            let object = scratch.join("__check.o");
            remove_if_present(&object)?;
            let outcome = Invocation::new(compiler, policy.compile())
                .args(args.command_line_with(&["-c".to_string()], &[source.clone()], &object))
                .isolate_process_group()
                .run()
                .await?;
            if outcome.succeeded().is_none() {
                return Ok(BuildCheck::Failed(format!(
                    "{compiler_name} failed to compile {}",
                    source.display()
                )));
            }
        }
        return Ok(BuildCheck::Compiled);
    }

    let exe = scratch.join("__check.exe");
    remove_if_present(&exe)?;
    let compiled = Invocation::new(compiler, policy.compile())
        .args(args.command_line(sources, &exe))
        .isolate_process_group()
        .run()
        .await?;
    if compiled.succeeded().is_none() {
        return Ok(BuildCheck::Failed(format!(
            "{compiler_name} compilation failed"
        )));
    }
    match Invocation::new(&exe, policy.run()).run().await?.succeeded() {
        Some(result) => Ok(BuildCheck::Ran(result.stdout)),
        None => Ok(BuildCheck::Failed(format!(
            "execution of the {compiler_name} build failed"
        ))),
    }
}

pub struct Packager {
    compilers: Vec<PathBuf>,
    include_dirs: Vec<PathBuf>,
    policy: TimeoutPolicy,
    include_timeout: bool,
    use_unreduced: bool,
}

impl Packager {
    pub fn from_config(cfg: &Config, include_timeout: bool, use_unreduced: bool) -> Self {
        Self {
            compilers: cfg
                .package()
                .compilers()
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            include_dirs: cfg.generator().include_dirs().to_vec(),
            policy: cfg.timeouts().policy(),
            include_timeout,
            use_unreduced,
        }
    }

    fn accepts(&self, status: ReductionStatus) -> bool {
        status == ReductionStatus::Success
            || (self.include_timeout && status == ReductionStatus::Timeout)
            || self.use_unreduced
    }

    /// Directory and files of the program to package for `mutation`.
    fn program_of(
        &self,
        work: &WorkDir,
        mutation: MutationId,
        kill: &KillInfo,
    ) -> AppResult<Option<(PathBuf, ProgramFiles)>> {
        let reduction_dir = work.reduction_dir(mutation);
        let (dir, files) = if self.use_unreduced {
            let Some(files) = files_for_test(&kill.killing_test) else {
                return Ok(None);
            };
            (reduction_dir.join(ORIGINAL_DIR), files)
        } else {
            let oracle = OracleConfig::read(&reduction_dir.join(ORACLE_CONFIG_FILE))?;
            let sources = oracle.packed_sources.unwrap_or_else(|| vec![oracle.program]);
            (
                reduction_dir,
                ProgramFiles {
                    sources,
                    headers: Vec::new(),
                },
            )
        };
        if files.all().any(|f| !dir.join(f).is_file()) {
            return Ok(None);
        }
        Ok(Some((dir, files)))
    }

    /// Build the program with every reference compiler at every optimization level.
    /// Returns the agreed output for miscompilations, or why the case was rejected.
    async fn check_case(
        &self,
        scratch: &Path,
        files: &ProgramFiles,
        crash: bool,
    ) -> AppResult<Result<Option<Vec<u8>>, String>> {
        let sources = files.source_paths(scratch);
        let mut reference: Option<Vec<u8>> = None;
        for compiler in &self.compilers {
            for opt in OPT_LEVELS {
                let mut flags: Vec<String> = WARNING_FLAGS.iter().map(|f| f.to_string()).collect();
                flags.push(opt.to_string());
                let args = CompileArgs {
                    flags,
                    include_dirs: self.include_dirs.clone(),
                };
                match check_build(compiler, &args, &sources, scratch, !crash, &self.policy).await? {
                    BuildCheck::Failed(reason) => return Ok(Err(format!("{reason} at {opt}"))),
                    BuildCheck::Compiled => {}
                    BuildCheck::Ran(output) => {
                        if reference.is_none() {
                            reference = Some(output);
                        } else if reference.as_ref() != Some(&output) {
                            return Ok(Err(format!(
                                "{} {opt} gives different output",
                                compiler.display()
                            )));
                        }
                    }
                }
            }
        }
        Ok(Ok(reference))
    }

    async fn package_one(
        &self,
        work: &WorkDir,
        mutation: MutationId,
        dir: &Path,
        files: &ProgramFiles,
        crash: bool,
    ) -> AppResult<bool> {
        let scratch = tempfile::tempdir()?;
        files.copy_between(dir, scratch.path())?;
        match self.check_case(scratch.path(), files, crash).await? {
            Ok(reference) => {
                let case_dir = work.testsuite_case_dir(mutation);
                files.copy_between(dir, &case_dir)?;
                if let Some(output) = reference {
                    fs::write(case_dir.join(REFERENCE_OUTPUT_FILE), output)?;
                }
                Ok(true)
            }
            Err(reason) => {
                info!("Skipping mutant {mutation}: {reason}");
                Ok(false)
            }
        }
    }

    /// Package every acceptable reduction; returns the ids added to the test suite.
    pub async fn run(&self, work: &WorkDir) -> AppResult<Vec<MutationId>> {
        work.ensure_testsuite_layout()?;
        let mut packaged = Vec::new();

        for mutation in work.get_reductions()? {
            let Some(summary) = work.get_reduction_summary(mutation)? else {
                continue;
            };
            let Some(kill) = work.get_kill_info(mutation)? else {
                continue;
            };
            if !self.accepts(summary.reduction_status) {
                info!(
                    "Skipping testsuite generation for mutant {mutation}: reduction has status {}.",
                    summary.reduction_status
                );
                continue;
            }
            let Some((dir, files)) = self.program_of(work, mutation, &kill)? else {
                info!("Skipping mutant {mutation}: program files are missing");
                continue;
            };
            if work.claim_testsuite_case(mutation)? == Claim::AlreadyExists {
                continue;
            }

            info!("Starting testsuite generation for {mutation}.");
            let crash = !kill.kill_type.is_miscompilation();
            match self.package_one(work, mutation, &dir, &files, crash).await {
                Ok(true) => {
                    info!("Testsuite generation for {mutation} succeeded.");
                    packaged.push(mutation);
                }
                Ok(false) => work.release_testsuite_case(mutation)?,
                Err(e) => {
                    error!("Testsuite generation for {mutation} failed: {e}");
                    work.release_testsuite_case(mutation)?;
                }
            }
        }
        Ok(packaged)
    }
}

pub async fn execute_package(cfg: &Config, args: PackageArgs) -> AppResult<Vec<MutationId>> {
    let work = WorkDir::new(cfg.work_dir());
    if !work.killed_mutants_dir().is_dir() || !work.reductions_dir().is_dir() {
        return Err(AppError::Config(format!(
            "{} has no killed_mutants or reductions directory",
            work.root().display()
        )));
    }
    let packager = Packager::from_config(cfg, args.include_timeout, args.use_unreduced);
    let packaged = packager.run(&work).await?;
    info!("Added {} test cases to {}", packaged.len(), work.testsuite_dir().display());
    Ok(packaged)
}
