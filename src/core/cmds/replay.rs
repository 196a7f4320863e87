use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::classifier::TimeoutPolicy;
use crate::core::cli::ReplayArgs;
use crate::core::cmds::package::{BuildCheck, check_build};
use crate::core::store::{REFERENCE_OUTPUT_FILE, WorkDir};
use crate::types::config::Config;
use crate::types::{AppError, AppResult, CompileArgs, MutationId};

#[derive(Debug, Clone)]
pub struct ReplayCase {
    pub id: MutationId,
    pub sources: Vec<PathBuf>,
    /// Present for miscompilation cases.
    pub reference_output: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReplaySummary {
    pub compiler: PathBuf,
    pub passed: usize,
    pub total: usize,
}

fn c_sources(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut sources: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "c"))
        .collect();
    sources.sort();
    Ok(sources)
}

pub fn load_cases(work: &WorkDir) -> AppResult<Vec<ReplayCase>> {
    let mut cases = Vec::new();
    for id in work.get_testsuite_cases()? {
        let dir = work.testsuite_case_dir(id);
        let sources = c_sources(&dir)?;
        if sources.is_empty() {
            warn!("Test case {} has no sources", dir.display());
            continue;
        }
        let reference_path = dir.join(REFERENCE_OUTPUT_FILE);
        let reference_output = if reference_path.exists() {
            Some(fs::read(reference_path)?)
        } else {
            None
        };
        cases.push(ReplayCase {
            id,
            sources,
            reference_output,
        });
    }
    Ok(cases)
}

async fn check_case(
    compiler: &Path,
    case: &ReplayCase,
    args: &CompileArgs,
    policy: &TimeoutPolicy,
) -> AppResult<bool> {
    let scratch = tempfile::tempdir()?;
    let run = case.reference_output.is_some();
    let check = check_build(compiler, args, &case.sources, scratch.path(), run, policy).await?;
    Ok(match check {
        BuildCheck::Compiled => true,
        BuildCheck::Ran(output) => {
            let matches = case.reference_output.as_deref() == Some(output.as_slice());
            if !matches {
                info!("Comparison failed for {} with test case {}", compiler.display(), case.id);
            }
            matches
        }
        BuildCheck::Failed(reason) => {
            info!("Test case {}: {reason}", case.id);
            false
        }
    })
}

/// Check every case against `compiler`, at most `jobs` at a time.
pub async fn replay_compiler(
    compiler: &Path,
    cases: &[Arc<ReplayCase>],
    args: &CompileArgs,
    policy: &TimeoutPolicy,
    jobs: usize,
) -> ReplaySummary {
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let mut set = JoinSet::new();
    for case in cases {
        let semaphore = Arc::clone(&semaphore);
        let case = Arc::clone(case);
        let compiler = compiler.to_path_buf();
        let args = args.clone();
        let policy = policy.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            match check_case(&compiler, &case, &args, &policy).await {
                Ok(passed) => Some(passed),
                Err(e) => {
                    warn!("Test case {} could not be checked: {e}", case.id);
                    Some(false)
                }
            }
        });
    }

    let mut passed = 0;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Some(true)) => passed += 1,
            Ok(_) => {}
            Err(e) => warn!("Replay task failed: {e}"),
        }
    }
    ReplaySummary {
        compiler: compiler.to_path_buf(),
        passed,
        total: cases.len(),
    }
}

pub async fn execute_replay(cfg: &Config, args: ReplayArgs) -> AppResult<Vec<ReplaySummary>> {
    let work = WorkDir::new(cfg.work_dir());
    if !work.testsuite_dir().is_dir() {
        return Err(AppError::Config(format!(
            "{} does not exist",
            work.testsuite_dir().display()
        )));
    }
    let cases: Vec<Arc<ReplayCase>> = load_cases(&work)?.into_iter().map(Arc::new).collect();
    let jobs = args.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let compile_args = CompileArgs {
        flags: vec!["-pedantic".to_string(), "-Wall".to_string(), "-O3".to_string()],
        include_dirs: cfg.generator().include_dirs().to_vec(),
    };
    let policy = cfg.timeouts().policy();

    let mut summaries = Vec::new();
    for compiler in &args.compilers {
        let summary = replay_compiler(compiler, &cases, &compile_args, &policy, jobs).await;
        info!(
            "RESULT OF {}: {}/{}",
            summary.compiler.display(),
            summary.passed,
            summary.total
        );
        summaries.push(summary);
    }
    Ok(summaries)
}
