use crate::attempt::{AttemptSettings, Backend, DEFAULT_SEARCH_BUDGET};
use crate::input::DEFAULT_INPUT_SIZE;
use crate::swarm::{DEFAULT_MAX_PROB_RATIO, DEFAULT_MAX_SWARM_CONFIGS, SwarmKind};
use serde::Deserialize;
use std::path::PathBuf;

/// Everything the supervisor reads to decide what to run and how.
///
/// Loaded from TOML with [`HarnessConfig::load_from_file`]; the CLI layers its
/// flags on top.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Test selected for single-test modes.
    #[serde(default)]
    pub which_test: Option<String>,
    /// Replay one saved case.
    #[serde(default)]
    pub input_test_file: Option<PathBuf>,
    /// Replay every saved case under `<dir>/<file>/<test>/`.
    #[serde(default)]
    pub input_test_dir: Option<PathBuf>,
    /// Replay every file in one flat directory against the selected test.
    #[serde(default)]
    pub input_test_files_dir: Option<PathBuf>,
    #[serde(default)]
    pub input_stdin: bool,
    #[serde(default)]
    pub output_test_dir: Option<PathBuf>,

    /// Run attempts in forked children. Unset means on, except when fuzzing.
    #[serde(default)]
    pub fork: Option<bool>,
    #[serde(default)]
    pub fuzz: bool,
    #[serde(default)]
    pub fuzz_save_passing: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub status_interval_secs: Option<u64>,

    #[serde(default)]
    pub take_over: bool,
    #[serde(default)]
    pub abort_on_fail: bool,
    #[serde(default)]
    pub exit_on_fail: bool,
    #[serde(default)]
    pub verbose_reads: bool,

    #[serde(default)]
    pub list_tests: bool,
    /// Shell-style wildcard (`*`, `?`) matched against test names.
    #[serde(default)]
    pub test_filter: Option<String>,
    #[serde(default)]
    pub boring_only: bool,
    #[serde(default)]
    pub run_disabled: bool,

    /// An external symbolic executor drives this process.
    #[serde(default)]
    pub symbolic: bool,
    #[serde(default = "default_input_size")]
    pub input_size: usize,
    #[serde(default = "default_max_swarm_configs")]
    pub max_swarm_configs: usize,
    #[serde(default = "default_swarm_max_prob_ratio")]
    pub swarm_max_prob_ratio: u32,
    #[serde(default = "default_search_budget")]
    pub search_budget: u64,
    /// Route plain `choose`/`one_of` calls through the swarm registry.
    #[serde(default)]
    pub default_swarm: Option<SwarmKind>,
}

pub fn default_timeout_secs() -> u64 {
    3600
}

pub fn default_status_interval_secs() -> u64 {
    30
}

fn default_input_size() -> usize {
    DEFAULT_INPUT_SIZE
}

fn default_max_swarm_configs() -> usize {
    DEFAULT_MAX_SWARM_CONFIGS
}

fn default_swarm_max_prob_ratio() -> u32 {
    DEFAULT_MAX_PROB_RATIO
}

fn default_search_budget() -> u64 {
    DEFAULT_SEARCH_BUDGET
}

impl HarnessConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: HarnessConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values no run could make sense of.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.input_size == 0 {
            anyhow::bail!("input-size must be at least 1 byte");
        }
        if self.max_swarm_configs == 0 {
            anyhow::bail!("max-swarm-configs must be at least 1");
        }
        if self.status_interval_secs == Some(0) {
            anyhow::bail!("status-interval-secs must be positive");
        }
        Ok(())
    }

    /// Whether attempts run in forked children.
    pub fn fork_enabled(&self) -> bool {
        self.fork.unwrap_or(!self.fuzz)
    }

    pub fn status_interval(&self) -> u64 {
        self.status_interval_secs
            .unwrap_or_else(default_status_interval_secs)
    }

    pub fn attempt_settings(&self) -> AttemptSettings {
        AttemptSettings {
            input_size: self.input_size,
            max_swarm_configs: self.max_swarm_configs,
            swarm_max_prob_ratio: self.swarm_max_prob_ratio,
            search_budget: self.search_budget,
            backend: if self.symbolic {
                Backend::Symbolic
            } else {
                Backend::Concrete
            },
            verbose_reads: self.verbose_reads,
            take_over: self.take_over,
            default_swarm: self.default_swarm,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            which_test: None,
            input_test_file: None,
            input_test_dir: None,
            input_test_files_dir: None,
            input_stdin: false,
            output_test_dir: None,
            fork: None,
            fuzz: false,
            fuzz_save_passing: false,
            timeout_secs: default_timeout_secs(),
            seed: None,
            status_interval_secs: None,
            take_over: false,
            abort_on_fail: false,
            exit_on_fail: false,
            verbose_reads: false,
            list_tests: false,
            test_filter: None,
            boring_only: false,
            run_disabled: false,
            symbolic: false,
            input_size: default_input_size(),
            max_swarm_configs: default_max_swarm_configs(),
            swarm_max_prob_ratio: default_swarm_max_prob_ratio(),
            search_budget: default_search_budget(),
            default_swarm: None,
        }
    }
}
