pub mod attempt;
pub mod config;
pub mod corpus;
pub mod executor;
pub mod generator;
pub mod hooks;
pub mod input;
pub mod outcome;
pub mod range;
pub mod registry;
pub mod shm;
pub mod supervisor;
pub mod swarm;

pub use attempt::{Attempt, AttemptSettings, Backend};
pub use config::HarnessConfig;
pub use corpus::{CaseStore, CorpusError, InMemoryCorpus, OnDiskCorpus};
pub use executor::{AttemptReport, Executor, InProcessExecutor};
pub use hooks::{HOOK_TABLE, Hook, HookEntry};
pub use input::{Fill, InputStream};
pub use outcome::{AbandonReason, Escape, Flow, Outcome, RunSummary, Verdict};
pub use registry::{TestCase, TestFn, TestRegistry};
pub use supervisor::Supervisor;
pub use swarm::{SwarmConfig, SwarmKind, SwarmRegistry};

#[doc(hidden)]
pub use tracing as __tracing;
