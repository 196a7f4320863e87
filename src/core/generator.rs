//! Random program generators.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::core::process::{Invocation, ProcessOutcome};
use crate::types::config::GeneratorConfig;
use crate::types::{AppResult, CandidateProgram, CompileArgs, ProgramFiles};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GeneratorKind {
    #[default]
    Csmith,
    Yarpgen,
}

impl GeneratorKind {
    pub fn default_executable(&self) -> &'static str {
        match self {
            GeneratorKind::Csmith => "csmith",
            GeneratorKind::Yarpgen => "yarpgen",
        }
    }

    pub fn files(&self) -> ProgramFiles {
        match self {
            GeneratorKind::Csmith => ProgramFiles::single("prog.c"),
            GeneratorKind::Yarpgen => ProgramFiles {
                sources: vec!["driver.c".to_string(), "func.c".to_string()],
                headers: vec!["init.h".to_string()],
            },
        }
    }
}

/// A tool producing a C program from a seed.
pub trait ProgramGenerator: Send + Sync {
    /// Prefix of test names, e.g. `csmith` in `csmith_1234`.
    fn name(&self) -> &'static str;

    /// The files a successful run leaves in its output directory.
    fn files(&self) -> ProgramFiles;

    /// Command that writes the program for `seed` into `out_dir`.
    fn command(&self, seed: u64, out_dir: &Path) -> Invocation;

    /// Include directories needed to compile the generated program.
    fn include_dirs(&self) -> &[PathBuf];

    fn test_name(&self, seed: u64) -> String {
        format!("{}_{}", self.name(), seed)
    }
}

pub struct Csmith {
    executable: PathBuf,
    include_dirs: Vec<PathBuf>,
    timeout: Duration,
}

impl Csmith {
    pub fn new(executable: impl AsRef<Path>, include_dirs: Vec<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            include_dirs,
            timeout,
        }
    }
}

impl ProgramGenerator for Csmith {
    fn name(&self) -> &'static str {
        "csmith"
    }

    fn files(&self) -> ProgramFiles {
        GeneratorKind::Csmith.files()
    }

    fn command(&self, seed: u64, out_dir: &Path) -> Invocation {
        Invocation::new(&self.executable, self.timeout)
            .arg("--seed")
            .arg(seed.to_string())
            .arg("-o")
            .arg(out_dir.join("prog.c"))
    }

    fn include_dirs(&self) -> &[PathBuf] {
        &self.include_dirs
    }
}

pub struct Yarpgen {
    executable: PathBuf,
    include_dirs: Vec<PathBuf>,
    timeout: Duration,
}

impl Yarpgen {
    pub fn new(executable: impl AsRef<Path>, include_dirs: Vec<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            include_dirs,
            timeout,
        }
    }
}

impl ProgramGenerator for Yarpgen {
    fn name(&self) -> &'static str {
        "yarpgen"
    }

    fn files(&self) -> ProgramFiles {
        GeneratorKind::Yarpgen.files()
    }

    fn command(&self, seed: u64, out_dir: &Path) -> Invocation {
        Invocation::new(&self.executable, self.timeout)
            .arg("--std=c")
            .arg(format!("--seed={seed}"))
            .arg("-o")
            .arg(out_dir)
    }

    fn include_dirs(&self) -> &[PathBuf] {
        &self.include_dirs
    }
}

/// Files of a recorded test, recovered from its `<generator>_<seed>` name.
pub fn files_for_test(test: &str) -> Option<ProgramFiles> {
    let (prefix, _) = test.rsplit_once('_')?;
    GeneratorKind::from_str(prefix).ok().map(|kind| kind.files())
}

pub fn from_config(cfg: &GeneratorConfig) -> Box<dyn ProgramGenerator> {
    let timeout = Duration::from_secs(cfg.timeout());
    let include_dirs = cfg.include_dirs().to_vec();
    match cfg.kind() {
        GeneratorKind::Csmith => Box::new(Csmith::new(cfg.path(), include_dirs, timeout)),
        GeneratorKind::Yarpgen => Box::new(Yarpgen::new(cfg.path(), include_dirs, timeout)),
    }
}

/// Run `generator` for `seed` into a fresh `out_dir`. Returns `None` when the generator
/// times out, fails, or does not produce every expected file.
pub async fn generate(
    generator: &dyn ProgramGenerator,
    seed: u64,
    out_dir: &Path,
    flags: &[String],
) -> AppResult<Option<CandidateProgram>> {
    if out_dir.exists() {
        fs::remove_dir_all(out_dir)?;
    }
    fs::create_dir_all(out_dir)?;

    let invocation = generator.command(seed, out_dir);
    match invocation.run().await? {
        ProcessOutcome::TimedOut { .. } => {
            info!("{} timed out (seed {seed})", generator.name());
            return Ok(None);
        }
        ProcessOutcome::Finished(result) if !result.success() => {
            info!("{} terminated abnormally (seed {seed})", generator.name());
            debug!("{}", invocation.display());
            debug!("stderr: {}", result.stderr_lossy());
            return Ok(None);
        }
        ProcessOutcome::Finished(_) => {}
    }

    let files = generator.files();
    if let Some(missing) = files.all().find(|f| !out_dir.join(f).is_file()) {
        info!("{} did not produce {missing} (seed {seed})", generator.name());
        return Ok(None);
    }

    Ok(Some(CandidateProgram {
        seed,
        name: generator.test_name(seed),
        dir: out_dir.to_path_buf(),
        files,
        compile_args: CompileArgs {
            flags: flags.to_vec(),
            include_dirs: generator.include_dirs().to_vec(),
        },
    }))
}
