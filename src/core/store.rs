//! The work directory is the only database: a record exists iff its directory exists.
//!
//! Claims use `create_dir`, which is atomic on POSIX file systems, so several workers may
//! share one work directory without further locking. Losing a claim is an ordinary result.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::types::{AppResult, KillInfo, KillSummary, MutationId, ReductionSummary};

pub const KILL_INFO_FILE: &str = "kill_info.json";
pub const KILL_SUMMARY_FILE: &str = "kill_summary.json";
pub const REDUCTION_SUMMARY_FILE: &str = "reduction_summary.json";
pub const REFERENCE_OUTPUT_FILE: &str = "prog.reference_output";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Claimed,
    AlreadyExists,
}

impl Claim {
    pub fn won(self) -> bool {
        self == Claim::Claimed
    }
}

/// Atomically create `path`. Its parent must exist.
pub fn claim_dir(path: &Path) -> io::Result<Claim> {
    match fs::create_dir(path) {
        Ok(()) => Ok(Claim::Claimed),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(Claim::AlreadyExists),
        Err(e) => Err(e),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Subdirectory names that parse as mutation ids, ascending.
fn numeric_entries(dir: &Path) -> io::Result<Vec<MutationId>> {
    let mut ids = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| entry.file_name().to_str()?.parse::<MutationId>().ok())
            .collect::<Vec<_>>(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e),
    };
    ids.sort_unstable();
    Ok(ids)
}

#[derive(Clone, Debug)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tests_dir(&self) -> PathBuf {
        self.root.join("tests")
    }

    pub fn killed_mutants_dir(&self) -> PathBuf {
        self.root.join("killed_mutants")
    }

    pub fn reductions_dir(&self) -> PathBuf {
        self.root.join("reductions")
    }

    pub fn testsuite_dir(&self) -> PathBuf {
        self.root.join("testsuite")
    }

    pub fn test_dir(&self, test: &str) -> PathBuf {
        self.tests_dir().join(test)
    }

    pub fn kill_dir(&self, mutation: MutationId) -> PathBuf {
        self.killed_mutants_dir().join(mutation.to_string())
    }

    pub fn reduction_dir(&self, mutation: MutationId) -> PathBuf {
        self.reductions_dir().join(mutation.to_string())
    }

    pub fn testsuite_case_dir(&self, mutation: MutationId) -> PathBuf {
        self.testsuite_dir().join(mutation.to_string())
    }

    /// Create the campaign directories if absent. Safe to race with other workers.
    pub fn ensure_campaign_layout(&self) -> AppResult<()> {
        fs::create_dir_all(self.tests_dir())?;
        fs::create_dir_all(self.killed_mutants_dir())?;
        Ok(())
    }

    pub fn ensure_reductions_layout(&self) -> AppResult<()> {
        fs::create_dir_all(self.reductions_dir())?;
        Ok(())
    }

    pub fn ensure_testsuite_layout(&self) -> AppResult<()> {
        fs::create_dir_all(self.testsuite_dir())?;
        Ok(())
    }

    pub fn claim_test(&self, test: &str) -> AppResult<Claim> {
        Ok(claim_dir(&self.test_dir(test))?)
    }

    pub fn claim_kill(&self, mutation: MutationId) -> AppResult<Claim> {
        Ok(claim_dir(&self.kill_dir(mutation))?)
    }

    pub fn claim_reduction(&self, mutation: MutationId) -> AppResult<Claim> {
        Ok(claim_dir(&self.reduction_dir(mutation))?)
    }

    pub fn claim_testsuite_case(&self, mutation: MutationId) -> AppResult<Claim> {
        Ok(claim_dir(&self.testsuite_case_dir(mutation))?)
    }

    /// Give up a testsuite claim so that a later run can retry the case.
    pub fn release_testsuite_case(&self, mutation: MutationId) -> AppResult<()> {
        match fs::remove_dir_all(self.testsuite_case_dir(mutation)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    pub fn is_killed(&self, mutation: MutationId) -> bool {
        self.kill_dir(mutation).exists()
    }

    /// Every mutation id recorded as killed, read from disk on each call.
    pub fn get_killed_mutants(&self) -> AppResult<BTreeSet<MutationId>> {
        Ok(numeric_entries(&self.killed_mutants_dir())?
            .into_iter()
            .collect())
    }

    pub fn add_kill_info(&self, mutation: MutationId, info: &KillInfo) -> AppResult<()> {
        write_json(&self.kill_dir(mutation).join(KILL_INFO_FILE), info)
    }

    pub fn get_kill_info(&self, mutation: MutationId) -> AppResult<Option<KillInfo>> {
        let path = self.kill_dir(mutation).join(KILL_INFO_FILE);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    pub fn add_kill_summary(&self, test: &str, summary: &KillSummary) -> AppResult<()> {
        write_json(&self.test_dir(test).join(KILL_SUMMARY_FILE), summary)
    }

    /// Test names with a written kill summary, sorted. Tests still in progress are omitted.
    pub fn get_tests(&self) -> AppResult<Vec<String>> {
        let mut tests = Vec::new();
        let entries = match fs::read_dir(self.tests_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(tests),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if !entry.path().join(KILL_SUMMARY_FILE).exists() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                tests.push(name.to_string());
            }
        }
        tests.sort();
        Ok(tests)
    }

    pub fn get_kill_summary(&self, test: &str) -> AppResult<KillSummary> {
        read_json(&self.test_dir(test).join(KILL_SUMMARY_FILE))
    }

    /// Like [`WorkDir::get_kill_summary`], but unreadable summaries are logged and skipped.
    pub fn get_kill_summaries(&self) -> AppResult<Vec<(String, KillSummary)>> {
        let mut summaries = Vec::new();
        for test in self.get_tests()? {
            match self.get_kill_summary(&test) {
                Ok(summary) => summaries.push((test, summary)),
                Err(e) => warn!("Ignoring unreadable kill summary for {test}: {e}"),
            }
        }
        Ok(summaries)
    }

    pub fn get_reductions(&self) -> AppResult<Vec<MutationId>> {
        Ok(numeric_entries(&self.reductions_dir())?)
    }

    pub fn add_reduction_summary(
        &self,
        mutation: MutationId,
        summary: &ReductionSummary,
    ) -> AppResult<()> {
        write_json(
            &self.reduction_dir(mutation).join(REDUCTION_SUMMARY_FILE),
            summary,
        )
    }

    pub fn get_reduction_summary(&self, mutation: MutationId) -> AppResult<Option<ReductionSummary>> {
        let path = self.reduction_dir(mutation).join(REDUCTION_SUMMARY_FILE);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    pub fn get_testsuite_cases(&self) -> AppResult<Vec<MutationId>> {
        Ok(numeric_entries(&self.testsuite_dir())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KillStatus;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Barrier};

    #[test]
    fn claims_are_won_once() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path());
        work.ensure_campaign_layout().unwrap();
        work.ensure_campaign_layout().unwrap();

        assert_eq!(work.claim_kill(7).unwrap(), Claim::Claimed);
        assert_eq!(work.claim_kill(7).unwrap(), Claim::AlreadyExists);
        assert!(work.is_killed(7));
    }

    #[test]
    fn concurrent_claims_have_a_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path());
        work.ensure_campaign_layout().unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let work = work.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    work.claim_kill(11).unwrap()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| c.won())
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn killed_set_is_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path());
        assert!(work.get_killed_mutants().unwrap().is_empty());

        work.ensure_campaign_layout().unwrap();
        work.claim_kill(12).unwrap();
        work.claim_kill(3).unwrap();
        fs::create_dir(work.killed_mutants_dir().join("not-a-number")).unwrap();

        let killed: Vec<_> = work.get_killed_mutants().unwrap().into_iter().collect();
        assert_eq!(killed, vec![3, 12]);
    }

    #[test]
    fn kill_records_and_summaries_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path());
        work.ensure_campaign_layout().unwrap();

        work.claim_kill(4).unwrap();
        let info = KillInfo {
            killing_test: "csmith_99".to_string(),
            kill_type: KillStatus::KillDifferentExitCodes,
        };
        work.add_kill_info(4, &info).unwrap();
        assert_eq!(work.get_kill_info(4).unwrap(), Some(info));
        assert_eq!(work.get_kill_info(5).unwrap(), None);

        // A claimed test without a summary is still in progress.
        work.claim_test("csmith_99").unwrap();
        assert!(work.get_tests().unwrap().is_empty());

        let summary = KillSummary::new(vec![4, 2], vec![4], vec![], vec![2]);
        work.add_kill_summary("csmith_99", &summary).unwrap();
        assert_eq!(work.get_tests().unwrap(), vec!["csmith_99".to_string()]);
        assert_eq!(work.get_kill_summary("csmith_99").unwrap(), summary);
    }
}
