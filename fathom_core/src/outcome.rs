use std::fmt;
use thiserror::Error;

/// Reasons an attempt is discarded rather than judged.
///
/// Every variant is local to one attempt: the supervisor logs it, records the
/// attempt as [`Verdict::Abandoned`] and moves on to the next attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    /// A read went past the end of the input buffer.
    #[error("Exceeded input limit of {capacity} bytes; raise input-size to read more bytes")]
    InputExhausted { capacity: usize },

    /// A symbolize call was given an inverted or out-of-bounds region.
    #[error("Invalid data bounds for symbolize: begin {begin}, end {end}, length {len}")]
    InvalidRegion { begin: usize, end: usize, len: usize },

    /// A generator was called with arguments it cannot honour.
    #[error("{0}")]
    Usage(String),

    /// More distinct swarm call sites than the registry can hold.
    #[error("Exceeded swarm config limit of {limit}; this is highly unusual")]
    SwarmRegistryFull { limit: usize },

    /// A satisfying search ran out of candidates or iterations.
    #[error("Satisfying search exhausted after {iterations} iterations")]
    SearchExhausted { iterations: u64 },

    /// An `assume` did not hold.
    #[error("{file}({line}): Assumption {expr} failed")]
    Assumption {
        expr: String,
        file: &'static str,
        line: u32,
    },

    /// The test body gave up on this input.
    #[error("{0}")]
    Requested(String),

    /// The saved case backing this attempt could not be loaded.
    #[error("Unable to load test input: {0}")]
    Io(String),
}

impl AbandonReason {
    /// Assumption failures are expected during generation and logged quietly.
    pub fn is_assumption(&self) -> bool {
        matches!(self, AbandonReason::Assumption { .. })
    }
}

/// Single-level escape from a test body back to the attempt boundary.
///
/// Generators and control-flow helpers return `Err(Escape)`; test code
/// propagates it with `?`. Only the attempt boundary inspects it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Escape {
    #[error("passed")]
    Pass,
    #[error("failed{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Fail(Option<String>),
    #[error("abandoned: {0}")]
    Abandon(AbandonReason),
}

impl Escape {
    pub fn fail(reason: impl Into<String>) -> Self {
        Escape::Fail(Some(reason.into()))
    }

    pub fn abandon(reason: AbandonReason) -> Self {
        Escape::Abandon(reason)
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Escape::Abandon(AbandonReason::Usage(message.into()))
    }
}

impl From<AbandonReason> for Escape {
    fn from(reason: AbandonReason) -> Self {
        Escape::Abandon(reason)
    }
}

/// Result type threaded through test bodies and generators.
pub type Flow<T = ()> = Result<T, Escape>;

/// Terminal classification of one attempt.
///
/// The discriminants double as the exit codes of an isolated child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Verdict {
    Passed = 0,
    Failed = 1,
    Crashed = 2,
    Abandoned = 3,
}

impl Verdict {
    pub fn exit_code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Verdict::Passed),
            1 => Some(Verdict::Failed),
            2 => Some(Verdict::Crashed),
            3 => Some(Verdict::Abandoned),
            _ => None,
        }
    }

    /// File suffix used when persisting a case with this verdict.
    /// Abandoned attempts are never persisted.
    pub fn case_suffix(self) -> Option<&'static str> {
        match self {
            Verdict::Passed => Some("pass"),
            Verdict::Failed => Some("fail"),
            Verdict::Crashed => Some("crash"),
            Verdict::Abandoned => None,
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Verdict::Failed | Verdict::Crashed)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::Passed => "Passed",
            Verdict::Failed => "Failed",
            Verdict::Crashed => "Crashed",
            Verdict::Abandoned => "Abandoned",
        };
        f.write_str(label)
    }
}

/// Outcome record of one attempt: a verdict plus an optional reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub verdict: Verdict,
    pub reason: Option<String>,
}

impl Outcome {
    pub fn passed() -> Self {
        Self {
            verdict: Verdict::Passed,
            reason: None,
        }
    }

    pub fn failed(reason: Option<String>) -> Self {
        Self {
            verdict: Verdict::Failed,
            reason,
        }
    }

    pub fn crashed(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Crashed,
            reason: Some(reason.into()),
        }
    }

    pub fn abandoned(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Abandoned,
            reason: Some(reason.into()),
        }
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Self::passed()
    }
}

/// Tally of verdicts across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: u64,
    pub failed: u64,
    pub crashed: u64,
    pub abandoned: u64,
}

impl RunSummary {
    pub fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Passed => self.passed += 1,
            Verdict::Failed => self.failed += 1,
            Verdict::Crashed => self.crashed += 1,
            Verdict::Abandoned => self.abandoned += 1,
        }
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.crashed += other.crashed;
        self.abandoned += other.abandoned;
    }

    pub fn total(&self) -> u64 {
        self.passed + self.failed + self.crashed + self.abandoned
    }

    pub fn failures(&self) -> u64 {
        self.failed + self.crashed
    }
}
