use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::core::classifier::TimeoutPolicy;
use crate::core::generator::GeneratorKind;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LogConfig {
    pub level: Option<String>,
    pub color: Option<bool>, // None = auto-detect (semantic)
}

impl LogConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }

    pub fn color(&self) -> Option<bool> {
        self.color // None has semantic meaning (auto-detect)
    }

    pub fn to_effective(&self) -> Self {
        Self {
            level: Some(self.level().to_string()),
            color: self.color,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CompilerConfig {
    pub mutated: Option<PathBuf>,
    pub tracking: Option<PathBuf>,
    pub mutation_info: Option<PathBuf>,
    pub tracking_mutation_info: Option<PathBuf>,
    pub sanitizer: Option<String>,
    pub flags: Option<Vec<String>>,
}

impl CompilerConfig {
    pub fn mutated(&self) -> Option<&Path> {
        self.mutated.as_deref()
    }

    pub fn tracking(&self) -> Option<&Path> {
        self.tracking.as_deref()
    }

    pub fn mutation_info(&self) -> Option<&Path> {
        self.mutation_info.as_deref()
    }

    pub fn tracking_mutation_info(&self) -> Option<&Path> {
        self.tracking_mutation_info.as_deref()
    }

    pub fn sanitizer(&self) -> &str {
        self.sanitizer.as_deref().unwrap_or("clang")
    }

    pub fn flags(&self) -> Vec<String> {
        self.flags.clone().unwrap_or_else(|| vec!["-O3".to_string()])
    }

    pub fn to_effective(&self) -> Self {
        Self {
            mutated: self.mutated.clone(),
            tracking: self.tracking.clone(),
            mutation_info: self.mutation_info.clone(),
            tracking_mutation_info: self.tracking_mutation_info.clone(),
            sanitizer: Some(self.sanitizer().to_string()),
            flags: Some(self.flags()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GeneratorConfig {
    pub kind: Option<GeneratorKind>,
    pub path: Option<PathBuf>,
    pub include_dirs: Option<Vec<PathBuf>>,
    pub timeout: Option<u64>,
}

impl GeneratorConfig {
    pub fn kind(&self) -> GeneratorKind {
        self.kind.unwrap_or_default()
    }

    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.kind().default_executable()))
    }

    pub fn include_dirs(&self) -> &[PathBuf] {
        self.include_dirs.as_deref().unwrap_or(&[])
    }

    pub fn timeout(&self) -> u64 {
        self.timeout.unwrap_or(20)
    }

    pub fn to_effective(&self) -> Self {
        Self {
            kind: Some(self.kind()),
            path: Some(self.path()),
            include_dirs: Some(self.include_dirs().to_vec()),
            timeout: Some(self.timeout()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TimeoutConfig {
    pub compile: Option<u64>,
    pub run: Option<u64>,
    pub min_mutant_compile: Option<u64>,
    pub mutant_compile_multiplier: Option<f64>,
    pub min_mutant_run: Option<u64>,
    pub mutant_run_multiplier: Option<f64>,
}

impl TimeoutConfig {
    pub fn policy(&self) -> TimeoutPolicy {
        let defaults = TimeoutPolicy::default();
        TimeoutPolicy {
            compile_secs: self.compile.unwrap_or(defaults.compile_secs),
            run_secs: self.run.unwrap_or(defaults.run_secs),
            min_mutant_compile_secs: self
                .min_mutant_compile
                .unwrap_or(defaults.min_mutant_compile_secs),
            mutant_compile_multiplier: self
                .mutant_compile_multiplier
                .unwrap_or(defaults.mutant_compile_multiplier),
            min_mutant_run_secs: self.min_mutant_run.unwrap_or(defaults.min_mutant_run_secs),
            mutant_run_multiplier: self
                .mutant_run_multiplier
                .unwrap_or(defaults.mutant_run_multiplier),
        }
    }

    pub fn to_effective(&self) -> Self {
        let policy = self.policy();
        Self {
            compile: Some(policy.compile_secs),
            run: Some(policy.run_secs),
            min_mutant_compile: Some(policy.min_mutant_compile_secs),
            mutant_compile_multiplier: Some(policy.mutant_compile_multiplier),
            min_mutant_run: Some(policy.min_mutant_run_secs),
            mutant_run_multiplier: Some(policy.mutant_run_multiplier),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CampaignConfig {
    pub total_time: Option<u64>,
    pub max_time_since_last_kill: Option<u64>,
    pub max_programs: Option<u64>,
    pub seed: Option<u64>,
    pub sanitizers: Option<Vec<Vec<String>>>,
}

impl CampaignConfig {
    /// Seconds; 0 means unbounded.
    pub fn total_time(&self) -> u64 {
        self.total_time.unwrap_or(86400)
    }

    /// Seconds; 0 means unbounded.
    pub fn max_time_since_last_kill(&self) -> u64 {
        self.max_time_since_last_kill.unwrap_or(86400)
    }

    /// 0 means unbounded.
    pub fn max_programs(&self) -> u64 {
        self.max_programs.unwrap_or(0)
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn sanitizers(&self) -> Vec<Vec<String>> {
        self.sanitizers.clone().unwrap_or_else(|| {
            vec![
                vec![
                    "-fsanitize=address,undefined".to_string(),
                    "-fno-sanitize-recover=undefined".to_string(),
                ],
                vec!["-fsanitize=memory".to_string()],
            ]
        })
    }

    pub fn to_effective(&self) -> Self {
        Self {
            total_time: Some(self.total_time()),
            max_time_since_last_kill: Some(self.max_time_since_last_kill()),
            max_programs: Some(self.max_programs()),
            seed: self.seed,
            sanitizers: Some(self.sanitizers()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ReduceConfig {
    pub reducer: Option<PathBuf>,
    pub timeout: Option<u64>,
}

impl ReduceConfig {
    pub fn reducer(&self) -> PathBuf {
        self.reducer
            .clone()
            .unwrap_or_else(|| PathBuf::from("creduce"))
    }

    /// Hard deadline for one reduction, in seconds.
    pub fn timeout(&self) -> u64 {
        self.timeout.unwrap_or(43200)
    }

    pub fn to_effective(&self) -> Self {
        Self {
            reducer: Some(self.reducer()),
            timeout: Some(self.timeout()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PackageConfig {
    pub compilers: Option<Vec<String>>,
}

impl PackageConfig {
    pub fn compilers(&self) -> Vec<String> {
        self.compilers
            .clone()
            .unwrap_or_else(|| vec!["clang".to_string(), "gcc".to_string()])
    }

    pub fn to_effective(&self) -> Self {
        Self {
            compilers: Some(self.compilers()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    // Top-level fields
    pub work_dir: Option<PathBuf>,

    // Nested sections
    pub log: Option<LogConfig>,
    pub compiler: Option<CompilerConfig>,
    pub generator: Option<GeneratorConfig>,
    pub timeouts: Option<TimeoutConfig>,
    pub campaign: Option<CampaignConfig>,
    pub reduce: Option<ReduceConfig>,
    pub package: Option<PackageConfig>,
}

impl Config {
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("work"))
    }

    pub fn log(&self) -> LogConfig {
        self.log.clone().unwrap_or_default()
    }

    pub fn compiler(&self) -> CompilerConfig {
        self.compiler.clone().unwrap_or_default()
    }

    pub fn generator(&self) -> GeneratorConfig {
        self.generator.clone().unwrap_or_default()
    }

    pub fn timeouts(&self) -> TimeoutConfig {
        self.timeouts.clone().unwrap_or_default()
    }

    pub fn campaign(&self) -> CampaignConfig {
        self.campaign.clone().unwrap_or_default()
    }

    pub fn reduce(&self) -> ReduceConfig {
        self.reduce.clone().unwrap_or_default()
    }

    pub fn package(&self) -> PackageConfig {
        self.package.clone().unwrap_or_default()
    }

    pub fn to_effective(&self) -> Self {
        Self {
            work_dir: Some(self.work_dir()),
            log: Some(self.log().to_effective()),
            compiler: Some(self.compiler().to_effective()),
            generator: Some(self.generator().to_effective()),
            timeouts: Some(self.timeouts().to_effective()),
            campaign: Some(self.campaign().to_effective()),
            reduce: Some(self.reduce().to_effective()),
            package: Some(self.package().to_effective()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub work_dir: Option<String>,
    pub log_level: Option<String>,
    pub log_color: Option<String>, // "on" | "off"
    pub seed: Option<u64>,
    pub total_time: Option<u64>,
    pub max_time_since_last_kill: Option<u64>,
    pub max_programs: Option<u64>,
}

static CONFIG_FILENAME: OnceCell<String> = OnceCell::new();
static CONFIG: OnceCell<Config> = OnceCell::new();

pub fn set_config_filename(filename: &str) {
    let _ = CONFIG_FILENAME.set(filename.to_string());
}

pub fn get_config_filename() -> &'static str {
    CONFIG_FILENAME
        .get()
        .map(|s| s.as_str())
        .unwrap_or("dredd-runner.toml")
}

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        find_nearest_config_file()
            .and_then(|path| read_config_file(&path))
            .unwrap_or_default()
    })
}

pub fn init_with_overrides(overrides: &CliOverrides) {
    // 1) Config file: walk up from cwd and use the first config file found
    let mut cfg = find_nearest_config_file()
        .and_then(|path| read_config_file(&path))
        .unwrap_or_default();

    // 2) CLI arguments (highest priority). Only override if user specified.
    apply_cli_overrides(&mut cfg, overrides);

    let _ = CONFIG.set(cfg);
}

pub fn read_config_file(path: &Path) -> Option<Config> {
    let contents = fs::read_to_string(path).ok()?;
    match toml::from_str::<Config>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!("Ignoring unparsable config file {}: {e}", path.display());
            None
        }
    }
}

pub fn apply_cli_overrides(cfg: &mut Config, overrides: &CliOverrides) {
    if let Some(work_dir) = &overrides.work_dir
        && !work_dir.trim().is_empty()
    {
        cfg.work_dir = Some(PathBuf::from(work_dir.trim()));
    }

    // Log overrides
    let mut log = cfg.log.clone().unwrap_or_default();
    if let Some(level) = &overrides.log_level
        && !level.trim().is_empty()
    {
        log.level = Some(level.trim().to_string());
    }
    if let Some(color_str) = &overrides.log_color {
        match color_str.to_lowercase().as_str() {
            "on" => log.color = Some(true),
            "off" => log.color = Some(false),
            _ => {}
        }
    }
    if overrides.log_level.is_some() || overrides.log_color.is_some() {
        cfg.log = Some(log);
    }

    // Campaign overrides
    let mut campaign = cfg.campaign.clone().unwrap_or_default();
    if overrides.seed.is_some() {
        campaign.seed = overrides.seed;
    }
    if overrides.total_time.is_some() {
        campaign.total_time = overrides.total_time;
    }
    if overrides.max_time_since_last_kill.is_some() {
        campaign.max_time_since_last_kill = overrides.max_time_since_last_kill;
    }
    if overrides.max_programs.is_some() {
        campaign.max_programs = overrides.max_programs;
    }
    cfg.campaign = Some(campaign);
}

fn find_nearest_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let config_filename = get_config_filename();
    for dir in cwd.ancestors() {
        let candidate = dir.join(config_filename);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

pub fn colors_enabled() -> bool {
    match config().log().color() {
        Some(force) => force,
        None => console::colors_enabled(),
    }
}
