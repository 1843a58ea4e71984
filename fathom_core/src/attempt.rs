use crate::input::{DEFAULT_INPUT_SIZE, Fill, InputStream};
use crate::outcome::{AbandonReason, Escape, Flow, Verdict};
use crate::swarm::{DEFAULT_MAX_PROB_RATIO, DEFAULT_MAX_SWARM_CONFIGS, SwarmKind, SwarmRegistry};
use std::panic::Location;

/// Default iteration budget for satisfying searches.
pub const DEFAULT_SEARCH_BUDGET: u64 = 1 << 32;

/// Who is driving value generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Bytes are real: replayed from a file or synthesized by the fuzz loop.
    #[default]
    Concrete,
    /// An external symbolic-execution engine intercepts reads and
    /// treats assumptions as path constraints.
    Symbolic,
}

/// Knobs that shape every attempt a supervisor runs.
#[derive(Debug, Clone)]
pub struct AttemptSettings {
    pub input_size: usize,
    pub max_swarm_configs: usize,
    pub swarm_max_prob_ratio: u32,
    pub search_budget: u64,
    pub backend: Backend,
    pub verbose_reads: bool,
    pub take_over: bool,
    pub default_swarm: Option<SwarmKind>,
}

impl Default for AttemptSettings {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            max_swarm_configs: DEFAULT_MAX_SWARM_CONFIGS,
            swarm_max_prob_ratio: DEFAULT_MAX_PROB_RATIO,
            search_budget: DEFAULT_SEARCH_BUDGET,
            backend: Backend::Concrete,
            verbose_reads: false,
            take_over: false,
            default_swarm: None,
        }
    }
}

/// Attempt-scoped context handed to every test body.
///
/// Owns the input stream and swarm registry for the lifetime of one attempt.
/// Generators are methods on this type; see `generator` and `range`.
#[derive(Debug)]
pub struct Attempt {
    pub(crate) input: InputStream,
    pub(crate) swarm: SwarmRegistry,
    pub(crate) backend: Backend,
    pub(crate) verbose_reads: bool,
    pub(crate) search_budget: u64,
    pub(crate) default_swarm: Option<SwarmKind>,
    soft_failed: bool,
    take_over: bool,
}

impl Attempt {
    pub fn new(settings: &AttemptSettings) -> Self {
        let mut input = InputStream::new(settings.input_size);
        input.set_symbolic(settings.backend == Backend::Symbolic);
        input.set_verbose_reads(settings.verbose_reads);
        Self {
            input,
            swarm: SwarmRegistry::new(settings.max_swarm_configs, settings.swarm_max_prob_ratio),
            backend: settings.backend,
            verbose_reads: settings.verbose_reads,
            search_budget: settings.search_budget,
            default_swarm: settings.default_swarm,
            soft_failed: false,
            take_over: settings.take_over,
        }
    }

    /// Reset per-attempt state. The input cursor rewinds but loaded bytes stay.
    pub fn begin(&mut self) {
        self.swarm.clear();
        self.soft_failed = false;
        self.input.rewind();
    }

    /// Load a saved byte stream and begin an attempt over it.
    pub fn begin_with(&mut self, data: &[u8]) -> usize {
        let loaded = self.input.load(data);
        self.begin();
        loaded
    }

    /// Begin an attempt with no real input; every byte comes from the fill policy.
    pub fn begin_fresh(&mut self) {
        self.input.reset();
        self.begin();
    }

    pub fn input(&self) -> &InputStream {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputStream {
        &mut self.input
    }

    pub fn swarm(&self) -> &SwarmRegistry {
        &self.swarm
    }

    pub fn set_fill(&mut self, fill: Fill) {
        self.input.set_fill(fill);
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn is_symbolic(&self) -> bool {
        self.backend == Backend::Symbolic
    }

    pub fn soft_failed(&self) -> bool {
        self.soft_failed
    }

    pub fn take_over(&self) -> bool {
        self.take_over
    }

    pub(crate) fn set_take_over(&mut self, take_over: bool) {
        self.take_over = take_over;
    }

    /// End the attempt as passed (unless a soft failure was recorded).
    pub fn pass<T>(&mut self) -> Flow<T> {
        Err(Escape::Pass)
    }

    /// End the attempt as failed.
    ///
    /// In take-over mode the process exits with the fail status on the spot
    /// so a supervising parent learns about it synchronously.
    pub fn fail<T>(&mut self, reason: impl Into<String>) -> Flow<T> {
        let reason = reason.into();
        if self.take_over {
            tracing::error!("Failed: {reason}");
            std::process::exit(Verdict::Failed.exit_code());
        }
        Err(Escape::fail(reason))
    }

    /// Record a failure and keep running.
    pub fn soft_fail(&mut self) {
        self.soft_failed = true;
    }

    /// Soft-fail when `cond` is false. Returns `cond`.
    pub fn check(&mut self, cond: bool) -> bool {
        if !cond {
            self.soft_fail();
        }
        cond
    }

    /// Abandon the attempt unless `cond` holds.
    #[track_caller]
    pub fn assume(&mut self, cond: bool) -> Flow {
        let location = Location::caller();
        self.assume_at(cond, "condition", location.file(), location.line())
    }

    #[doc(hidden)]
    pub fn assume_at(&mut self, cond: bool, expr: &str, file: &'static str, line: u32) -> Flow {
        if cond {
            return Ok(());
        }
        Err(Escape::Abandon(AbandonReason::Assumption {
            expr: expr.to_string(),
            file,
            line,
        }))
    }

    /// Discard the attempt: the input is not worth judging.
    pub fn abandon<T>(&mut self, reason: impl Into<String>) -> Flow<T> {
        Err(Escape::Abandon(AbandonReason::Requested(reason.into())))
    }
}

impl Default for Attempt {
    fn default() -> Self {
        Self::new(&AttemptSettings::default())
    }
}

/// Fail the attempt unless the expression holds.
#[macro_export]
macro_rules! ensure {
    ($attempt:expr, $cond:expr) => {
        if !$cond {
            return $attempt.fail(format!(
                "{}({}): Assertion {} failed",
                file!(),
                line!(),
                stringify!($cond)
            ));
        }
    };
    ($attempt:expr, $cond:expr, $($arg:tt)+) => {
        if !$cond {
            return $attempt.fail(format!(
                "{}({}): {}",
                file!(),
                line!(),
                format_args!($($arg)+)
            ));
        }
    };
}

/// Soft-fail the attempt unless the expression holds, then keep going.
#[macro_export]
macro_rules! check {
    ($attempt:expr, $cond:expr) => {
        if !$attempt.check($cond) {
            $crate::__tracing::error!(
                "{}({}): Check {} failed",
                file!(),
                line!(),
                stringify!($cond)
            );
        }
    };
}

/// Abandon the attempt unless the expression holds.
#[macro_export]
macro_rules! assume {
    ($attempt:expr, $cond:expr) => {
        $attempt.assume_at($cond, stringify!($cond), file!(), line!())?
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_clears_soft_failure_and_rewinds() {
        let mut attempt = Attempt::default();
        attempt.begin_with(&[1, 2, 3]);
        attempt.input_mut().read_byte().unwrap();
        attempt.soft_fail();
        assert!(attempt.soft_failed());

        attempt.begin();
        assert!(!attempt.soft_failed());
        assert_eq!(attempt.input().cursor(), 0);
        assert_eq!(attempt.input().initialized(), 3, "Loaded bytes must survive begin");
    }

    #[test]
    fn check_only_soft_fails_on_false() {
        let mut attempt = Attempt::default();
        assert!(attempt.check(true));
        assert!(!attempt.soft_failed());
        assert!(!attempt.check(false));
        assert!(attempt.soft_failed());
    }

    #[test]
    fn assume_reports_the_caller_location() {
        let mut attempt = Attempt::default();
        let err = attempt.assume(false).unwrap_err();
        match err {
            Escape::Abandon(AbandonReason::Assumption { file, .. }) => {
                assert!(file.ends_with("attempt.rs"), "Unexpected file {file}")
            }
            other => panic!("Expected an assumption abandon, got {other:?}"),
        }
    }

    fn body_with_macros(attempt: &mut Attempt, value: u32) -> Flow {
        assume!(attempt, value != 0);
        check!(attempt, value % 2 == 0);
        ensure!(attempt, value < 100, "value {value} too large");
        Ok(())
    }

    #[test]
    fn control_macros_map_to_escapes() {
        let mut attempt = Attempt::default();
        assert!(matches!(
            body_with_macros(&mut attempt, 0),
            Err(Escape::Abandon(AbandonReason::Assumption { .. }))
        ));

        attempt.begin();
        assert_eq!(body_with_macros(&mut attempt, 3), Ok(()));
        assert!(attempt.soft_failed());

        attempt.begin();
        match body_with_macros(&mut attempt, 200) {
            Err(Escape::Fail(Some(reason))) => assert!(reason.contains("value 200 too large")),
            other => panic!("Expected a failure, got {other:?}"),
        }
    }
}
