//! Interestingness oracle for reductions.
//!
//! A reduction directory holds an `oracle.json` describing what must keep happening for a
//! candidate to be interesting, and an `interesting.sh` that calls back into this binary.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::classifier::{KillClassifier, TimeoutPolicy};
use crate::core::packing;
use crate::core::process::ProcessOutcome;
use crate::core::sanitizer::SanitizerCheck;
use crate::types::{AppResult, CompileArgs, KillStatus, MutationId, ProgramFiles};

pub const ORACLE_CONFIG_FILE: &str = "oracle.json";
pub const ORACLE_SCRIPT_FILE: &str = "interesting.sh";
pub const CRASH_REFERENCE_DIR: &str = "crash_reference";
pub const CRASH_STDERR_FILE: &str = "stderr.txt";

static CRASH_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Assertion .* failed|UNREACHABLE executed|LLVM ERROR:|internal compiler error|Segmentation fault|Illegal instruction|Aborted",
    )
    .unwrap()
});

/// First line of a crashing compiler's stderr that identifies the crash, if any.
pub fn crash_signature(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .find(|line| CRASH_SIGNATURE.is_match(line))
        .map(|line| line.trim().to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// File the reducer shrinks, relative to the directory the oracle runs in.
    pub program: String,
    /// For packed programs, the source names the packed file splits into.
    #[serde(default)]
    pub packed_sources: Option<Vec<String>>,
    pub mutated_compiler: PathBuf,
    pub sanitizer_compiler: PathBuf,
    pub compile_args: CompileArgs,
    pub mutation_id: MutationId,
    pub kill_type: KillStatus,
    pub timeouts: TimeoutPolicy,
    pub sanitizers: Vec<Vec<String>>,
    /// Directory holding the stderr of the original crash (crash kills only).
    #[serde(default)]
    pub crash_reference: Option<PathBuf>,
}

impl OracleConfig {
    pub fn read(path: &Path) -> AppResult<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    pub fn write(&self, path: &Path) -> AppResult<()> {
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    fn is_crash(&self) -> bool {
        self.kill_type == KillStatus::KillCompilerCrash
    }

    fn crash_signature(&self) -> AppResult<Option<String>> {
        let Some(dir) = &self.crash_reference else {
            return Ok(None);
        };
        let path = dir.join(CRASH_STDERR_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Ok(crash_signature(&fs::read_to_string(path)?))
    }
}

fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// Write an executable script that evaluates the oracle at `config_path` using `exe`.
pub fn write_script(script_path: &Path, exe: &Path, config_path: &Path) -> AppResult<()> {
    let script = format!(
        "#!/bin/sh\nexec {} oracle --config {}\n",
        shell_quote(exe),
        shell_quote(config_path)
    );
    fs::write(script_path, script)?;
    let mut permissions = fs::metadata(script_path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(script_path, permissions)?;
    Ok(())
}

/// True if the candidate in `dir` still exhibits the kill recorded in `config`.
pub async fn evaluate(config: &OracleConfig, dir: &Path) -> AppResult<bool> {
    let scratch = tempfile::tempdir()?;

    let sources = match &config.packed_sources {
        Some(names) => {
            let files = ProgramFiles {
                sources: names.clone(),
                headers: Vec::new(),
            };
            if packing::unpack_program(&dir.join(&config.program), &files, scratch.path()).is_err()
            {
                info!("Candidate lost a file boundary");
                return Ok(false);
            }
            files.source_paths(scratch.path())
        }
        None => vec![dir.join(&config.program)],
    };

    let classifier = KillClassifier::new(
        &config.mutated_compiler,
        config.compile_args.clone(),
        config.timeouts.clone(),
        scratch.path(),
    );

    if config.is_crash() {
        crash_reproduces(config, &classifier, &sources).await
    } else {
        miscompilation_reproduces(config, &classifier, &sources, scratch.path()).await
    }
}

async fn crash_reproduces(
    config: &OracleConfig,
    classifier: &KillClassifier,
    sources: &[PathBuf],
) -> AppResult<bool> {
    let signature = config.crash_signature()?;
    let policy = classifier.policy();

    let mut crashed = false;
    for source in sources {
        let reference = classifier
            .compile_object(source, None, policy.compile())
            .await?;
        let reference_elapsed = match reference {
            ProcessOutcome::Finished(result) if result.success() => result.elapsed,
            _ => {
                info!("Reference compiler rejects {}", source.display());
                return Ok(false);
            }
        };

        let timeout = policy.mutant_compile(reference_elapsed);
        match classifier
            .compile_object(source, Some(config.mutation_id), timeout)
            .await?
        {
            ProcessOutcome::TimedOut { .. } if signature.is_none() => crashed = true,
            ProcessOutcome::TimedOut { .. } => {}
            ProcessOutcome::Finished(result) if !result.success() => match &signature {
                Some(signature) if !result.stderr_lossy().contains(signature.as_str()) => {
                    debug!("Mutant crashed without signature `{signature}`");
                }
                _ => crashed = true,
            },
            ProcessOutcome::Finished(_) => {}
        }
    }
    Ok(crashed)
}

async fn miscompilation_reproduces(
    config: &OracleConfig,
    classifier: &KillClassifier,
    sources: &[PathBuf],
    scratch: &Path,
) -> AppResult<bool> {
    let sanitizers = SanitizerCheck::new(
        &config.sanitizer_compiler,
        config.compile_args.clone(),
        config.sanitizers.clone(),
        config.timeouts.clone(),
    );
    if !sanitizers.passes(sources, scratch).await? {
        return Ok(false);
    }

    let Some(baseline) = classifier.measure_baseline(sources).await? else {
        return Ok(false);
    };
    let verdict = classifier.classify(&baseline, config.mutation_id).await?;
    debug!("Verdict {verdict}, looking for {}", config.kill_type);
    Ok(verdict == config.kill_type)
}
