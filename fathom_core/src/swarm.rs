use crate::assume;
use crate::attempt::Attempt;
use crate::generator::pump_limit;
use crate::outcome::{AbandonReason, Flow};
use serde::Deserialize;
use std::fmt;
use std::rc::Rc;

/// Default number of distinct call sites one attempt may register.
pub const DEFAULT_MAX_SWARM_CONFIGS: usize = 1024;
/// Default largest weight a probabilistic config draws per option.
pub const DEFAULT_MAX_PROB_RATIO: u32 = 16;

/// How a call site's option subset is chosen.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SwarmKind {
    /// Each option is kept with probability one half.
    Pure,
    /// Half the time keep everything, otherwise behave like `Pure`.
    Mixed,
    /// Each option gets a random weight in `[0, K]`.
    Prob,
}

impl fmt::Display for SwarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SwarmKind::Pure => "pure",
            SwarmKind::Mixed => "mixed",
            SwarmKind::Prob => "prob",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for SwarmKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pure" => Ok(SwarmKind::Pure),
            "mixed" => Ok(SwarmKind::Mixed),
            "prob" => Ok(SwarmKind::Prob),
            other => Err(format!("Unknown swarm kind '{other}'; expected pure, mixed or prob")),
        }
    }
}

/// Restricted option subset for one call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmConfig {
    pub file: &'static str,
    pub line: u32,
    pub option_count: usize,
    pub kind: SwarmKind,
    selection: Vec<usize>,
}

impl SwarmConfig {
    /// Original option indices, possibly repeated for weighting. Never empty.
    pub fn selection(&self) -> &[usize] {
        &self.selection
    }
}

/// Per-call-site cache of swarm configs, cleared at the start of every attempt.
#[derive(Debug)]
pub struct SwarmRegistry {
    configs: Vec<Rc<SwarmConfig>>,
    limit: usize,
    max_prob_ratio: u32,
}

impl SwarmRegistry {
    pub fn new(limit: usize, max_prob_ratio: u32) -> Self {
        Self {
            configs: Vec::new(),
            limit,
            max_prob_ratio,
        }
    }

    pub fn clear(&mut self) {
        self.configs.clear();
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Configs match on site and option count. A different count at the
    /// same site means the cached entry is stale.
    pub fn find(&self, file: &str, line: u32, option_count: usize) -> Option<Rc<SwarmConfig>> {
        self.configs
            .iter()
            .find(|c| c.line == line && c.option_count == option_count && c.file == file)
            .cloned()
    }

    fn insert(&mut self, config: SwarmConfig) -> Rc<SwarmConfig> {
        let config = Rc::new(config);
        self.configs.push(Rc::clone(&config));
        config
    }
}

impl Default for SwarmRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SWARM_CONFIGS, DEFAULT_MAX_PROB_RATIO)
    }
}

impl Attempt {
    /// Fetch the config for `(file, line, option_count)`, building it on a miss.
    pub fn swarm_config(
        &mut self,
        kind: SwarmKind,
        option_count: usize,
        file: &'static str,
        line: u32,
    ) -> Flow<Rc<SwarmConfig>> {
        if option_count == 0 {
            return self.abandon("Swarm choice over zero options");
        }
        if let Some(config) = self.swarm.find(file, line, option_count) {
            return Ok(config);
        }
        if self.swarm.len() >= self.swarm.limit() {
            return Err(AbandonReason::SwarmRegistryFull {
                limit: self.swarm.limit(),
            }
            .into());
        }
        let selection = self.build_selection(kind, option_count)?;
        tracing::debug!(file, line, option_count, %kind, kept = selection.len(), "Built swarm config");
        Ok(self.swarm.insert(SwarmConfig {
            file,
            line,
            option_count,
            kind,
            selection,
        }))
    }

    fn build_selection(&mut self, kind: SwarmKind, option_count: usize) -> Flow<Vec<usize>> {
        let mut selection = Vec::with_capacity(option_count);
        match kind {
            SwarmKind::Prob => {
                let ratio = self.swarm.max_prob_ratio;
                for option in 0..option_count {
                    let weight = self.in_range(0u32, ratio)?;
                    selection.extend(std::iter::repeat_n(option, weight as usize));
                }
            }
            SwarmKind::Pure | SwarmKind::Mixed => {
                let full = kind == SwarmKind::Mixed && self.bool()?;
                if kind == SwarmKind::Mixed && self.is_symbolic() {
                    // One config per path is plenty for symbolic exploration.
                    assume!(self, full);
                }
                for option in 0..option_count {
                    if full {
                        selection.push(option);
                        continue;
                    }
                    let keep = self.bool()?;
                    if self.is_symbolic() {
                        assume!(self, keep);
                    }
                    if keep {
                        selection.push(option);
                    }
                }
            }
        }
        if selection.is_empty() {
            selection.push(self.in_range(0, option_count - 1)?);
        }
        Ok(selection)
    }

    /// Uniform pick over a config's selection, mapped back to an original index.
    pub fn swarm_pick(&mut self, config: &SwarmConfig) -> Flow<usize> {
        let len = config.selection.len();
        let max = pump_limit(len)?;
        let index = self.in_range(0, len - 1)?;
        let index = self.pump(index, max)?;
        Ok(config.selection[index])
    }
}
