use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::MutationId;

/// Contents of `tests/<test-id>/kill_summary.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSummary {
    pub terminated_early: bool,
    pub covered_mutants: Vec<MutationId>,
    pub killed_mutants: Vec<MutationId>,
    pub skipped_mutants: Vec<MutationId>,
    pub survived_mutants: Vec<MutationId>,
}

impl KillSummary {
    /// Builds a summary with every list sorted ascending.
    ///
    /// `terminated_early` is true when the killed, skipped and survived ids together do not
    /// account for every covered id.
    pub fn new(
        covered: Vec<MutationId>,
        mut killed: Vec<MutationId>,
        mut skipped: Vec<MutationId>,
        mut survived: Vec<MutationId>,
    ) -> Self {
        let mut covered = covered;
        covered.sort_unstable();
        killed.sort_unstable();
        skipped.sort_unstable();
        survived.sort_unstable();

        let mut considered: Vec<MutationId> = killed
            .iter()
            .chain(skipped.iter())
            .chain(survived.iter())
            .copied()
            .collect();
        considered.sort_unstable();

        Self {
            terminated_early: considered != covered,
            covered_mutants: covered,
            killed_mutants: killed,
            skipped_mutants: skipped,
            survived_mutants: survived,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReductionStatus {
    Pending,
    Success,
    Failed,
    Timeout,
    Exception,
}

/// Contents of `reductions/<id>/reduction_summary.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionSummary {
    pub reduction_status: ReductionStatus,
    pub reduction_start_time: DateTime<Utc>,
    pub reduction_end_time: DateTime<Utc>,
}
