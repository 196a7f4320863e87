use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// All relative paths will be interpreted relative to this directory.
    /// All child processes will be run in this directory.
    #[arg(long, global = true)]
    pub cwd: Option<String>,

    /// Location of the work directory (tests, killed_mutants, reductions, testsuite)
    #[arg(long = "work-dir", global = true)]
    pub work_dir: Option<String>,

    /// Logging level (overrides config). One of: trace, debug, info, warn, error
    #[arg(long = "log.level", global = true)]
    pub log_level: Option<String>,

    /// Logging color control: "on" to force colors, "off" to disable; omit for auto
    #[arg(long = "log.color", global = true)]
    pub log_color: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example configuration file
    Init,

    /// Run a mutant-killing campaign
    Run(RunArgs),

    /// Reduce every program that killed a mutant
    Reduce,

    /// Decide whether the candidate in the current directory is interesting (exit 0) or not
    Oracle(OracleArgs),

    /// Turn reduced programs into a regression test suite
    Package(PackageArgs),

    /// Check the packaged test suite against other compilers
    Replay(ReplayArgs),

    /// Show campaign overview read from the work directory
    Status(StatusArgs),

    /// Print various information
    Print {
        #[command(subcommand)]
        command: PrintArgs,
    },
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Seed for the random number generator choosing program seeds.
    /// Replaces config [campaign].seed if provided.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Total time to allow for testing, in seconds; 0 tests indefinitely.
    /// Replaces config [campaign].total_time if provided.
    #[arg(long = "total-time")]
    pub total_time: Option<u64>,

    /// Stop if no kill has occurred for this many seconds; 0 disables the check.
    /// Replaces config [campaign].max_time_since_last_kill if provided.
    #[arg(long = "max-time-since-last-kill")]
    pub max_time_since_last_kill: Option<u64>,

    /// Stop after generating this many programs; 0 means no limit.
    /// Replaces config [campaign].max_programs if provided.
    #[arg(long = "max-programs")]
    pub max_programs: Option<u64>,
}

/// Arguments for the oracle command
#[derive(Parser, Debug)]
pub struct OracleArgs {
    /// Oracle configuration written by the reduce command
    #[arg(long)]
    pub config: PathBuf,
}

/// Arguments for the package command
#[derive(Parser, Debug)]
pub struct PackageArgs {
    /// Also package reductions that hit their deadline, in their final form
    #[arg(long = "include-timeout")]
    pub include_timeout: bool,

    /// Package the original, unreduced program instead of the reduced one
    #[arg(long = "use-unreduced")]
    pub use_unreduced: bool,
}

/// Arguments for the replay command
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Compiler executable to check; may be repeated
    #[arg(long = "compiler", required = true)]
    pub compilers: Vec<PathBuf>,

    /// Number of test cases checked concurrently (default: available parallelism)
    #[arg(long)]
    pub jobs: Option<usize>,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Output format: "table" (default) or "json"
    #[arg(long, default_value = "table")]
    pub format: String,
}

/// Arguments for the print command
#[derive(Subcommand, Debug)]
pub enum PrintArgs {
    /// Print the effective global configuration
    Config(PrintConfigArgs),
}

/// Arguments for the print config subcommand
#[derive(Parser, Debug)]
pub struct PrintConfigArgs {
    /// Output format: "table" (default) or "json"
    #[arg(long, default_value = "table")]
    pub format: String,
}
