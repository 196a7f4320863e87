//! Well-definedness check: a program must build and run cleanly under every sanitizer set.

use std::path::{Path, PathBuf};

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::classifier::{TimeoutPolicy, remove_if_present};
use crate::core::process::{Invocation, ProcessOutcome};
use crate::types::{AppResult, CompileArgs};

/// Sanitized builds get this many times the ordinary compile and run deadlines.
const SANITIZER_SLOWDOWN: u32 = 10;

static SANITIZER_REPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"runtime error:|ERROR: (AddressSanitizer|MemorySanitizer|LeakSanitizer|UndefinedBehaviorSanitizer)|WARNING: MemorySanitizer",
    )
    .unwrap()
});

pub fn has_sanitizer_report(stderr: &str) -> bool {
    SANITIZER_REPORT.is_match(stderr)
}

#[derive(Debug, Clone)]
pub struct SanitizerCheck {
    compiler: PathBuf,
    args: CompileArgs,
    flag_sets: Vec<Vec<String>>,
    policy: TimeoutPolicy,
}

impl SanitizerCheck {
    pub fn new(
        compiler: impl AsRef<Path>,
        args: CompileArgs,
        flag_sets: Vec<Vec<String>>,
        policy: TimeoutPolicy,
    ) -> Self {
        Self {
            compiler: compiler.as_ref().to_path_buf(),
            args,
            flag_sets,
            policy,
        }
    }

    /// True if `sources` compile and run without error under each flag set in turn.
    pub async fn passes(&self, sources: &[PathBuf], scratch: &Path) -> AppResult<bool> {
        let compile_timeout = self.policy.compile() * SANITIZER_SLOWDOWN;
        let run_timeout = self.policy.run() * SANITIZER_SLOWDOWN;

        for (index, flags) in self.flag_sets.iter().enumerate() {
            let label = flags.join(" ");
            let exe = scratch.join(format!("__sanitized_{index}.exe"));
            remove_if_present(&exe)?;

            let compile = Invocation::new(&self.compiler, compile_timeout)
                .args(self.args.command_line_with(flags, sources, &exe))
                .isolate_process_group()
                .run()
                .await?;
            match compile {
                ProcessOutcome::TimedOut { .. } => {
                    info!("Compilation of generated program with {label} timed out.");
                    return Ok(false);
                }
                ProcessOutcome::Finished(result) if !result.success() => {
                    info!("Compilation of generated program with {label} failed.");
                    debug!("stderr: {}", result.stderr_lossy());
                    return Ok(false);
                }
                ProcessOutcome::Finished(_) => {}
            }

            match Invocation::new(&exe, run_timeout).run().await? {
                ProcessOutcome::TimedOut { .. } => {
                    info!("Execution of generated program with {label} timed out.");
                    return Ok(false);
                }
                ProcessOutcome::Finished(result)
                    if !result.success() || has_sanitizer_report(&result.stderr_lossy()) =>
                {
                    info!("Sanitizer error detected in generated program ({label}).");
                    return Ok(false);
                }
                ProcessOutcome::Finished(_) => {}
            }
        }
        Ok(true)
    }
}
