use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::classifier::{
    KillClassifier, TRACKING_FILE_ENV, TimeoutPolicy, remove_if_present,
};
use crate::core::generator::{self, ProgramGenerator};
use crate::core::mutation_tree::MutationTree;
use crate::core::process::{Invocation, ProcessOutcome};
use crate::core::sanitizer::SanitizerCheck;
use crate::core::store::{Claim, WorkDir};
use crate::types::config::Config;
use crate::types::{
    AppError, AppResult, BaselineMeasurement, CompileArgs, KillInfo, KillSummary, MutationId,
};

/// Stops the campaign once the total budget or the budget since the last kill is spent.
/// A zero budget disables that bound.
#[derive(Debug, Clone)]
pub struct TerminationPolicy {
    start: Instant,
    last_kill: Instant,
    total: Duration,
    since_last_kill: Duration,
}

impl TerminationPolicy {
    pub fn new(total: Duration, since_last_kill: Duration, now: Instant) -> Self {
        Self {
            start: now,
            last_kill: now,
            total,
            since_last_kill,
        }
    }

    pub fn record_kill(&mut self, now: Instant) {
        self.last_kill = now;
    }

    pub fn expired_at(&self, now: Instant) -> bool {
        if !self.total.is_zero() && now.duration_since(self.start) > self.total {
            return true;
        }
        if !self.since_last_kill.is_zero()
            && now.duration_since(self.last_kill) > self.since_last_kill
        {
            return true;
        }
        false
    }

    pub fn expired(&self) -> bool {
        self.expired_at(Instant::now())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CampaignReport {
    /// Programs requested from the generator, including discarded ones.
    pub programs: u64,
    /// Tests recorded in the work directory by this worker.
    pub tests: Vec<String>,
    /// Mutants killed by this worker's tests.
    pub kills: u64,
    /// Mutants whose classification failed; each cut its test's summary short.
    pub unclassified: Vec<MutationId>,
    pub interrupted: bool,
}

/// Everything one worker needs to run a campaign, resolved from configuration.
pub struct Campaign {
    mutated_compiler: PathBuf,
    tracking_compiler: PathBuf,
    mutation_info: PathBuf,
    tracking_mutation_info: PathBuf,
    sanitizer_compiler: PathBuf,
    sanitizers: Vec<Vec<String>>,
    flags: Vec<String>,
    generator: Box<dyn ProgramGenerator>,
    policy: TimeoutPolicy,
    total_time: Duration,
    max_time_since_last_kill: Duration,
    max_programs: u64,
    seed: Option<u64>,
}

fn required(value: Option<&Path>, key: &str) -> AppResult<PathBuf> {
    value
        .map(Path::to_path_buf)
        .ok_or_else(|| AppError::Config(format!("{key} is not set")))
}

impl Campaign {
    pub fn from_config(cfg: &Config) -> AppResult<Self> {
        let compiler = cfg.compiler();
        let campaign = cfg.campaign();
        Ok(Self {
            mutated_compiler: required(compiler.mutated(), "compiler.mutated")?,
            tracking_compiler: required(compiler.tracking(), "compiler.tracking")?,
            mutation_info: required(compiler.mutation_info(), "compiler.mutation_info")?,
            tracking_mutation_info: required(
                compiler.tracking_mutation_info(),
                "compiler.tracking_mutation_info",
            )?,
            sanitizer_compiler: PathBuf::from(compiler.sanitizer()),
            sanitizers: campaign.sanitizers(),
            flags: compiler.flags(),
            generator: generator::from_config(&cfg.generator()),
            policy: cfg.timeouts().policy(),
            total_time: Duration::from_secs(campaign.total_time()),
            max_time_since_last_kill: Duration::from_secs(campaign.max_time_since_last_kill()),
            max_programs: campaign.max_programs(),
            seed: campaign.seed(),
        })
    }

    /// Both builds must have been instrumented from the same source, or ids would not agree.
    pub fn check_mutation_trees(&self) -> AppResult<MutationTree> {
        if self.mutation_info == self.tracking_mutation_info {
            return Err(AppError::Config(
                "compiler.mutation_info and compiler.tracking_mutation_info must be different files"
                    .to_string(),
            ));
        }
        info!("Building the real mutation tree...");
        let tree = MutationTree::from_file(&self.mutation_info)?;
        info!("Building the mutation tree associated with mutant coverage tracking...");
        let tracking_tree = MutationTree::from_file(&self.tracking_mutation_info)?;
        info!("Checking that the two mutation trees match...");
        tree.check_consistent_with(&tracking_tree)?;
        info!(
            "Check complete: {} mutations over {} nodes",
            tree.mutation_count(),
            tree.node_count()
        );
        Ok(tree)
    }

    fn compile_args(&self) -> CompileArgs {
        CompileArgs {
            flags: self.flags.clone(),
            include_dirs: self.generator.include_dirs().to_vec(),
        }
    }

    pub async fn run(&self, work: &WorkDir, running: Arc<AtomicBool>) -> AppResult<CampaignReport> {
        self.check_mutation_trees()?;
        work.ensure_campaign_layout()?;

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let scratch = tempfile::tempdir()?;
        let gen_dir = scratch.path().join("__gen");
        let compile_args = self.compile_args();
        let classifier = KillClassifier::new(
            &self.mutated_compiler,
            compile_args.clone(),
            self.policy.clone(),
            scratch.path(),
        );
        let sanitizers = SanitizerCheck::new(
            &self.sanitizer_compiler,
            compile_args.clone(),
            self.sanitizers.clone(),
            self.policy.clone(),
        );

        let mut termination =
            TerminationPolicy::new(self.total_time, self.max_time_since_last_kill, Instant::now());
        let mut report = CampaignReport::default();

        while !termination.expired() && running.load(Ordering::SeqCst) {
            if self.max_programs > 0 && report.programs >= self.max_programs {
                info!("Generated {} programs, stopping.", report.programs);
                break;
            }
            report.programs += 1;

            let seed = u64::from(rng.random::<u32>());
            let Some(program) =
                generator::generate(self.generator.as_ref(), seed, &gen_dir, &self.flags).await?
            else {
                continue;
            };
            let sources = program.source_paths();

            let Some(baseline) = classifier.measure_baseline(&sources).await? else {
                continue;
            };
            if !sanitizers.passes(&sources, scratch.path()).await? {
                continue;
            }
            let Some(covered) = self.track_coverage(&sources, scratch.path()).await? else {
                continue;
            };

            if work.claim_test(&program.name)? == Claim::AlreadyExists {
                info!("Skipping seed {seed} as a directory for it already exists");
                continue;
            }
            program
                .files
                .copy_between(&program.dir, &work.test_dir(&program.name))?;

            let (summary, unclassified) = self
                .try_mutants(
                    work,
                    &classifier,
                    &baseline,
                    &program.name,
                    covered,
                    &mut termination,
                    &running,
                )
                .await?;
            report.kills += summary.killed_mutants.len() as u64;
            report.unclassified.extend(unclassified);
            work.add_kill_summary(&program.name, &summary)?;
            report.tests.push(program.name);
        }

        report.interrupted = !running.load(Ordering::SeqCst);
        Ok(report)
    }

    /// Compile with the tracking compiler and read back the covered ids, ascending and
    /// deduplicated. `None` if the tracking build timed out.
    async fn track_coverage(
        &self,
        sources: &[PathBuf],
        scratch: &Path,
    ) -> AppResult<Option<Vec<MutationId>>> {
        let tracking_file = scratch.join("__dredd_covered_mutants");
        let exe = scratch.join("__tracking.exe");
        remove_if_present(&tracking_file)?;
        remove_if_present(&exe)?;

        let outcome = Invocation::new(&self.tracking_compiler, self.policy.compile())
            .args(self.compile_args().command_line(sources, &exe))
            .env(TRACKING_FILE_ENV, &tracking_file)
            .isolate_process_group()
            .run()
            .await?;
        if let ProcessOutcome::TimedOut { .. } = outcome {
            info!("Mutant tracking compilation timed out.");
            return Ok(None);
        }

        Ok(Some(read_covered_mutants(&tracking_file)?))
    }

    /// Classify the covered mutants in ascending order. Stops at the first mutant that cannot
    /// be classified and returns it alongside the summary, which is then terminated early.
    #[allow(clippy::too_many_arguments)]
    async fn try_mutants(
        &self,
        work: &WorkDir,
        classifier: &KillClassifier,
        baseline: &BaselineMeasurement,
        test: &str,
        covered: Vec<MutationId>,
        termination: &mut TerminationPolicy,
        running: &AtomicBool,
    ) -> AppResult<(KillSummary, Option<MutationId>)> {
        let already_killed = work.get_killed_mutants()?;
        let (mut skipped, candidates): (Vec<MutationId>, Vec<MutationId>) =
            covered.iter().copied().partition(|m| already_killed.contains(m));
        info!("Number of mutants to try: {}", candidates.len());

        let mut killed = Vec::new();
        let mut survived = Vec::new();
        let mut unclassified = None;
        for mutant in candidates {
            if termination.expired() || !running.load(Ordering::SeqCst) {
                break;
            }
            if work.is_killed(mutant) {
                info!("Skipping mutant {mutant} as it is noted as already killed.");
                skipped.push(mutant);
                continue;
            }

            info!("Trying mutant {mutant}");
            let status = match classifier.classify(baseline, mutant).await {
                Ok(status) => status,
                Err(e) => {
                    error!("Failed to classify mutant {mutant}: {e}");
                    warn!("Not trying the remaining mutants of {test}; its summary is incomplete.");
                    unclassified = Some(mutant);
                    break;
                }
            };
            info!("Mutant result: {status}");
            if !status.is_kill() {
                survived.push(mutant);
                continue;
            }

            killed.push(mutant);
            termination.record_kill(Instant::now());
            match work.claim_kill(mutant)? {
                Claim::Claimed => {
                    work.add_kill_info(
                        mutant,
                        &KillInfo {
                            killing_test: test.to_string(),
                            kill_type: status,
                        },
                    )?;
                    info!("Kill! Recorded mutant {mutant} as killed by {test}.");
                }
                Claim::AlreadyExists => {
                    info!("Mutant {mutant} was independently discovered to be killed.");
                }
            }
        }

        Ok((
            KillSummary::new(covered, killed, skipped, survived),
            unclassified,
        ))
    }
}

/// Parse a tracking file: one id per line, duplicates allowed. A missing file means no coverage.
pub fn read_covered_mutants(path: &Path) -> AppResult<Vec<MutationId>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut covered = BTreeSet::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match line.parse::<MutationId>() {
            Ok(id) => {
                covered.insert(id);
            }
            Err(_) => warn!("Ignoring malformed line in {}: {line}", path.display()),
        }
    }
    Ok(covered.into_iter().collect())
}

pub async fn execute_run(cfg: &Config, running: Arc<AtomicBool>) -> AppResult<CampaignReport> {
    let campaign = Campaign::from_config(cfg)?;
    let work = WorkDir::new(cfg.work_dir());
    let report = campaign.run(&work, running).await?;
    info!(
        "Campaign finished: {} programs generated, {} tests recorded, {} mutants killed",
        report.programs,
        report.tests.len(),
        report.kills
    );
    if !report.unclassified.is_empty() {
        warn!(
            "Mutants {:?} could not be classified; their tests were cut short",
            report.unclassified
        );
    }
    if report.interrupted {
        warn!("Campaign interrupted");
    }
    Ok(report)
}
