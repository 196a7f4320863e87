use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Hash;

pub type MutationId = u64;

/// Names of the files making up a generated program, relative to the directory holding them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramFiles {
    /// Translation units passed to the compiler, in order.
    pub sources: Vec<String>,
    /// Headers the sources include textually.
    #[serde(default)]
    pub headers: Vec<String>,
}

impl ProgramFiles {
    pub fn single(source: &str) -> Self {
        Self {
            sources: vec![source.to_string()],
            headers: Vec::new(),
        }
    }

    pub fn is_multi_file(&self) -> bool {
        self.sources.len() > 1 || !self.headers.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.sources.iter().chain(self.headers.iter())
    }

    pub fn source_paths(&self, dir: &Path) -> Vec<PathBuf> {
        self.sources.iter().map(|s| dir.join(s)).collect()
    }

    /// Copy every file from `from` into `to`. Fails if any file is missing.
    pub fn copy_between(&self, from: &Path, to: &Path) -> io::Result<()> {
        for name in self.all() {
            fs::copy(from.join(name), to.join(name))?;
        }
        Ok(())
    }
}

/// Flags shared by every compilation of a program, independent of the compiler used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileArgs {
    pub flags: Vec<String>,
    pub include_dirs: Vec<PathBuf>,
}

impl CompileArgs {
    pub fn command_line(&self, sources: &[PathBuf], output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.flags.iter().map(OsString::from).collect();
        for dir in &self.include_dirs {
            args.push("-I".into());
            args.push(dir.into());
        }
        args.extend(sources.iter().map(OsString::from));
        args.push("-o".into());
        args.push(output.into());
        args
    }

    /// Same as [`CompileArgs::command_line`] with `extra` flags appended before the sources.
    pub fn command_line_with(
        &self,
        extra: &[String],
        sources: &[PathBuf],
        output: &Path,
    ) -> Vec<OsString> {
        let mut with_extra = self.clone();
        with_extra.flags.extend(extra.iter().cloned());
        with_extra.command_line(sources, output)
    }
}

/// One generated unit under test.
#[derive(Debug, Clone)]
pub struct CandidateProgram {
    pub seed: u64,
    /// Test identifier, also the directory name under `tests/`.
    pub name: String,
    /// Directory holding the generated files.
    pub dir: PathBuf,
    pub files: ProgramFiles,
    pub compile_args: CompileArgs,
}

impl CandidateProgram {
    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.files.source_paths(&self.dir)
    }
}

/// Measurement of a program built by the unmutated reference compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineMeasurement {
    pub sources: Vec<PathBuf>,
    pub binary_hash: Hash,
    pub compile_duration: Duration,
    pub run_duration: Duration,
    pub stdout: Vec<u8>,
    pub exit_code: Option<i32>,
}
