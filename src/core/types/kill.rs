use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Verdict for one (program, mutation id) trial.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum KillStatus {
    /// The mutant produced a byte-identical binary.
    #[serde(alias = "KillStatus.SURVIVED_IDENTICAL")]
    SurvivedIdentical,
    /// The binary changed but exit code and stdout did not.
    #[serde(alias = "KillStatus.SURVIVED_BINARY_DIFFERENCE")]
    SurvivedBinaryDifference,
    #[serde(alias = "KillStatus.KILL_COMPILER_CRASH")]
    KillCompilerCrash,
    #[serde(alias = "KillStatus.KILL_RUNTIME_TIMEOUT")]
    KillRuntimeTimeout,
    #[serde(alias = "KillStatus.KILL_DIFFERENT_EXIT_CODES")]
    KillDifferentExitCodes,
    #[serde(alias = "KillStatus.KILL_DIFFERENT_STDOUT")]
    KillDifferentStdout,
}

impl KillStatus {
    pub fn is_kill(&self) -> bool {
        !matches!(
            self,
            KillStatus::SurvivedIdentical | KillStatus::SurvivedBinaryDifference
        )
    }

    /// Kills that manifest when running the compiled program rather than in the compiler.
    pub fn is_miscompilation(&self) -> bool {
        matches!(
            self,
            KillStatus::KillRuntimeTimeout
                | KillStatus::KillDifferentExitCodes
                | KillStatus::KillDifferentStdout
        )
    }
}

/// Contents of `killed_mutants/<id>/kill_info.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillInfo {
    pub killing_test: String,
    pub kill_type: KillStatus,
}
