//! Deadline-bounded execution of external commands.
//!
//! Every compiler, generator, sanitizer, binary and reducer invocation goes through
//! [`Invocation::run`]. A non-zero exit is an ordinary [`ProcessResult`]; only a missed
//! deadline produces [`ProcessOutcome::TimedOut`].

use std::ffi::{OsStr, OsString};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Finished(ProcessResult),
    TimedOut { elapsed: Duration },
}

impl ProcessOutcome {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessOutcome::TimedOut { .. })
    }

    /// The result of a process that ran to completion, regardless of exit code.
    pub fn finished(self) -> Option<ProcessResult> {
        match self {
            ProcessOutcome::Finished(result) => Some(result),
            ProcessOutcome::TimedOut { .. } => None,
        }
    }

    /// The result of a process that ran to completion with exit code zero.
    pub fn succeeded(self) -> Option<ProcessResult> {
        self.finished().filter(ProcessResult::success)
    }
}

/// Process group created for an isolated child. Signals the whole group at most once.
struct GroupGuard {
    pgid: Option<libc::pid_t>,
}

impl GroupGuard {
    fn terminate(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            debug!("Sending SIGTERM to process group {pgid}");
            let ret = unsafe { libc::killpg(pgid, libc::SIGTERM) };
            if ret != 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ESRCH) {
                    warn!("Failed to signal process group {pgid}: {err}");
                }
            }
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// A single external command together with its deadline.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
    timeout: Duration,
    isolate_group: bool,
    output_log: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl AsRef<OsStr>, timeout: Duration) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            envs: Vec::new(),
            cwd: None,
            timeout,
            isolate_group: false,
            output_log: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Start the child as leader of a new process group and signal the whole group when the
    /// deadline expires, so that descendants do not outlive it.
    pub fn isolate_process_group(mut self) -> Self {
        self.isolate_group = true;
        self
    }

    /// Append stdout and stderr to `path` instead of capturing them.
    pub fn log_output_to(mut self, path: impl AsRef<Path>) -> Self {
        self.output_log = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub async fn run(&self) -> io::Result<ProcessOutcome> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        match &self.output_log {
            Some(path) => {
                let log = OpenOptions::new().create(true).append(true).open(path)?;
                command.stdout(Stdio::from(log.try_clone()?));
                command.stderr(Stdio::from(log));
            }
            None => {
                command.stdout(Stdio::piped());
                command.stderr(Stdio::piped());
            }
        }
        if self.isolate_group {
            command.process_group(0);
        }

        debug!("Running `{}` (timeout {:?})", self.display(), self.timeout);
        let start = Instant::now();
        let child = command.spawn()?;
        let mut group = GroupGuard {
            pgid: if self.isolate_group {
                child.id().map(|pid| pid as libc::pid_t)
            } else {
                None
            },
        };

        let wait = child.wait_with_output();
        tokio::pin!(wait);
        match tokio::time::timeout(self.timeout, &mut wait).await {
            Ok(Ok(output)) => {
                group.disarm();
                Ok(ProcessOutcome::Finished(ProcessResult {
                    exit_code: output.status.code(),
                    stdout: output.stdout,
                    stderr: output.stderr,
                    elapsed: start.elapsed(),
                }))
            }
            // The guard terminates the group on the way out.
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let elapsed = start.elapsed();
                debug!("`{}` timed out after {elapsed:?}", self.display());
                group.terminate();
                Ok(ProcessOutcome::TimedOut { elapsed })
            }
        }
    }
}
