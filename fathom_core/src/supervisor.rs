//! Drives attempts: picks the run mode, prepares each attempt's input,
//! hands it to an executor and acts on the verdict.

use crate::attempt::Attempt;
use crate::config::HarnessConfig;
use crate::corpus::{
    self, CaseStore, LoadedCase, OnDiskCorpus, case_dir_for, list_case_files, list_regular_files,
    read_case, recorded_verdict,
};
use crate::executor::{AttemptReport, Executor, InProcessExecutor, isolated_executor, run_boundary};
use crate::input::Fill;
use crate::outcome::{AbandonReason, RunSummary, Verdict};
use crate::registry::{TestCase, TestFn, TestRegistry};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Environment variable naming the test an external fuzz engine drives.
pub const WHICH_TEST_ENV: &str = "FATHOM_WHICH_TEST";

/// Exit status used by `exit-on-fail`.
const EXIT_ON_FAIL_STATUS: i32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Replay,
    RunAll,
    Fuzz,
}

pub struct Supervisor {
    config: HarnessConfig,
    registry: TestRegistry,
    attempt: Attempt,
    executor: Box<dyn Executor>,
    store: Option<Box<dyn CaseStore>>,
}

impl Supervisor {
    pub fn new(config: HarnessConfig, registry: TestRegistry) -> anyhow::Result<Self> {
        config.validate()?;
        let attempt = Attempt::new(&config.attempt_settings());
        let executor: Box<dyn Executor> = if config.fork_enabled() {
            isolated_executor(config.input_size)?
        } else {
            Box::new(InProcessExecutor::new())
        };
        let store: Option<Box<dyn CaseStore>> = match &config.output_test_dir {
            Some(dir) => Some(Box::new(OnDiskCorpus::new(dir.clone())?)),
            None => None,
        };
        Ok(Self {
            config,
            registry,
            attempt,
            executor,
            store,
        })
    }

    /// Replace where saved cases go, e.g. with an in-memory store.
    pub fn with_store(mut self, store: Box<dyn CaseStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn registry(&self) -> &TestRegistry {
        &self.registry
    }

    pub fn store(&self) -> Option<&dyn CaseStore> {
        self.store.as_deref()
    }

    /// Run whichever mode the configuration selects.
    ///
    /// Modes are checked in priority order: one saved file, take-over replay
    /// of `input_test_dir`, the per-test saved-case tree, a flat directory,
    /// standard input, listing, fuzzing, and finally running every registered
    /// test once.
    pub fn run(&mut self) -> anyhow::Result<RunSummary> {
        if self.registry.is_empty() {
            anyhow::bail!("No tests registered; nothing to run");
        }
        if self.config.fuzz && self.config.fork == Some(true) {
            anyhow::bail!("Forking should not be combined with brute force fuzzing");
        }

        // Listing ranks below every replay source: `list_tests` together with
        // an input source replays rather than lists.
        if let Some(path) = self.config.input_test_file.clone() {
            return self.replay_file(&path);
        }
        if self.config.take_over && self.config.input_test_dir.is_some() {
            let Some(test) = self.selected_test() else {
                return Ok(RunSummary::default());
            };
            return self.take_over(test.entry);
        }
        if let Some(dir) = self.config.input_test_dir.clone() {
            return self.replay_case_tree(&dir);
        }
        if let Some(dir) = self.config.input_test_files_dir.clone() {
            return self.replay_flat_dir(&dir);
        }
        if self.config.input_stdin {
            return self.replay_stdin();
        }
        if self.config.list_tests {
            self.list_tests(&mut io::stderr().lock())?;
            return Ok(RunSummary::default());
        }
        if self.config.fuzz {
            return self.fuzz();
        }
        self.run_all()
    }

    /// Write every registered test with its declaring line, then category
    /// counts and the total.
    pub fn list_tests(&self, out: &mut impl Write) -> io::Result<()> {
        let mut boring = 0;
        let mut disabled = 0;
        writeln!(out, "Available Tests:\n")?;
        for test in self.registry.iter() {
            if test.is_boring() {
                boring += 1;
            } else if test.is_disabled() {
                disabled += 1;
            }
            writeln!(out, " *  {} (line {})", test.name, test.line)?;
        }
        writeln!(out, "\nBoring Tests: {boring}\nDisabled Tests: {disabled}")?;
        writeln!(out, "\nTotal Number of Tests: {}", self.registry.len())?;
        Ok(())
    }

    /// The test single-test modes run: `which_test`, or the first declared.
    fn selected_test(&self) -> Option<TestCase> {
        match &self.config.which_test {
            Some(name) => {
                let found = self.registry.find(name).copied();
                if found.is_none() {
                    tracing::info!("Could not find matching test for {name}");
                }
                found
            }
            None => {
                let first = self.registry.first().copied();
                if let Some(test) = &first {
                    tracing::warn!(
                        "No test specified, defaulting to first test defined ({})",
                        test.name
                    );
                }
                first
            }
        }
    }

    fn replay_file(&mut self, path: &Path) -> anyhow::Result<RunSummary> {
        let mut summary = RunSummary::default();
        let Some(test) = self.selected_test() else {
            return Ok(summary);
        };
        let loaded = read_case(path, self.attempt.input().capacity());
        summary.record(self.replay_loaded(&test, &path.display().to_string(), loaded));
        Ok(summary)
    }

    fn replay_stdin(&mut self) -> anyhow::Result<RunSummary> {
        let mut summary = RunSummary::default();
        let Some(test) = self.selected_test() else {
            return Ok(summary);
        };
        let loaded = corpus::read_limited(io::stdin().lock(), self.attempt.input().capacity());
        summary.record(self.replay_loaded(&test, "** STDIN **", loaded));
        Ok(summary)
    }

    fn replay_flat_dir(&mut self, dir: &Path) -> anyhow::Result<RunSummary> {
        let mut summary = RunSummary::default();
        let Some(test) = self.selected_test() else {
            return Ok(summary);
        };
        let files = match list_regular_files(dir) {
            Ok(files) => files,
            Err(e) => {
                tracing::info!("No tests to run: {e}");
                return Ok(summary);
            }
        };
        for path in files {
            summary.record(self.replay_path(&test, &path));
        }
        tracing::info!(
            "Ran {} tests; {} tests failed",
            summary.total(),
            summary.failures()
        );
        Ok(summary)
    }

    /// Replay `<dir>/<file basename>/<test name>/*.{pass,fail,crash}` for
    /// every registered test that has saved cases.
    fn replay_case_tree(&mut self, root: &Path) -> anyhow::Result<RunSummary> {
        let mut summary = RunSummary::default();
        let tests: Vec<TestCase> = self.registry.iter().copied().collect();
        for test in tests {
            let dir = case_dir_for(root, test.file_basename(), test.name);
            let files = match list_case_files(&dir) {
                Ok(files) => files,
                Err(_) => {
                    tracing::info!("Skipping test `{}`, no saved test cases", test.name);
                    continue;
                }
            };
            let mut per_test = RunSummary::default();
            for path in files {
                per_test.record(self.replay_path(&test, &path));
            }
            tracing::info!(
                "Ran {} tests for {}; {} tests failed",
                per_test.total(),
                test.name,
                per_test.total() - per_test.passed
            );
            summary.merge(per_test);
        }
        Ok(summary)
    }

    fn replay_path(&mut self, test: &TestCase, path: &Path) -> Verdict {
        let loaded = read_case(path, self.attempt.input().capacity());
        let verdict = self.replay_loaded(test, &path.display().to_string(), loaded);
        if let Some(recorded) = recorded_verdict(path) {
            if recorded != verdict && verdict != Verdict::Abandoned {
                tracing::warn!("Test case {} was saved as {recorded} but replayed as {verdict}", path.display());
            }
        }
        verdict
    }

    fn replay_loaded(
        &mut self,
        test: &TestCase,
        source: &str,
        loaded: Result<LoadedCase, corpus::CorpusError>,
    ) -> Verdict {
        let capacity = self.attempt.input().capacity();
        let loaded = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                let reason = AbandonReason::Io(e.to_string());
                tracing::error!("Abandoned: {reason}");
                return Verdict::Abandoned;
            }
        };
        if loaded.truncated {
            tracing::warn!(
                "Test case {source} is larger than the {capacity}-byte input; using the first {capacity} bytes"
            );
        }
        tracing::info!("Running: {} from {}({})", test.name, test.file, test.line);
        self.attempt.set_fill(Fill::Zero);
        self.attempt.begin_with(&loaded.bytes);
        let report = self.executor.execute(test.entry, &mut self.attempt);
        match report.outcome.verdict {
            Verdict::Failed => tracing::error!("Test case {source} failed"),
            Verdict::Crashed => tracing::error!("Test case {source} crashed"),
            _ => {}
        }
        self.conclude(test, report, Mode::Replay)
    }

    fn run_all(&mut self) -> anyhow::Result<RunSummary> {
        let filter = self.config.test_filter.clone();
        let mut summary = RunSummary::default();
        let tests: Vec<TestCase> = self.registry.iter().copied().collect();
        for test in tests {
            if self.config.boring_only && !test.is_boring() {
                continue;
            }
            if let Some(filter) = &filter {
                if !wildcard_match(filter, test.name) {
                    continue;
                }
            }
            if !self.config.run_disabled && test.is_disabled() {
                continue;
            }
            tracing::info!("Running: {} from {}({})", test.name, test.file, test.line);
            self.attempt.set_fill(Fill::Zero);
            self.attempt.begin_fresh();
            let report = self.executor.execute(test.entry, &mut self.attempt);
            summary.record(self.conclude(&test, report, Mode::RunAll));
        }
        Ok(summary)
    }

    /// Brute-force loop: fresh pseudorandom bytes per attempt until the
    /// wall-clock timeout passes. The timeout is only checked between attempts.
    fn fuzz(&mut self) -> anyhow::Result<RunSummary> {
        tracing::info!("Starting fuzzing");
        let mut summary = RunSummary::default();
        let Some(test) = self.selected_test() else {
            return Ok(summary);
        };

        let seed = match self.config.seed {
            Some(seed) => seed,
            None => {
                let seed = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default();
                tracing::warn!("No seed provided; using {seed}");
                seed
            }
        };
        self.attempt
            .set_fill(Fill::Random(ChaCha8Rng::seed_from_u64(seed)));

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let status_interval = Duration::from_secs(self.config.status_interval());
        let start = Instant::now();
        let mut last_status = start;

        while start.elapsed() < timeout {
            if last_status.elapsed() >= status_interval {
                tracing::info!(
                    "{:.0} tests/second: {} failed/{} passed/{} abandoned",
                    rate(summary.total(), start.elapsed()),
                    summary.failures(),
                    summary.passed,
                    summary.abandoned
                );
                last_status = Instant::now();
            }
            self.attempt.begin_fresh();
            let report = self.executor.execute(test.entry, &mut self.attempt);
            summary.record(self.conclude(&test, report, Mode::Fuzz));
        }

        self.attempt.set_fill(Fill::Zero);
        tracing::info!(
            "Done fuzzing! Ran {} tests ({:.0} tests/second) with {} failed/{} passed/{} abandoned tests",
            summary.total(),
            rate(summary.total(), start.elapsed()),
            summary.failures(),
            summary.passed,
            summary.abandoned
        );
        Ok(summary)
    }

    /// Replay every saved case in `input_test_dir` against `entry`, each in
    /// its own child, with failures exiting the child on the spot.
    pub fn take_over(&mut self, entry: TestFn) -> anyhow::Result<RunSummary> {
        let mut summary = RunSummary::default();
        let Some(dir) = self.config.input_test_dir.clone() else {
            anyhow::bail!("Take-over replay needs an input test directory");
        };
        let files = match list_case_files(&dir) {
            Ok(files) => files,
            Err(_) => {
                tracing::info!("Skipping take-over test, no saved test cases");
                return Ok(summary);
            }
        };

        let mut executor = isolated_executor(self.config.input_size)?;
        // Without fork a take-over failure would end this very process.
        self.attempt.set_take_over(cfg!(unix));
        self.attempt.set_fill(Fill::Zero);
        for path in files {
            let bytes = match read_case(&path, self.attempt.input().capacity()) {
                Ok(loaded) => loaded.bytes,
                Err(e) => {
                    tracing::error!("Abandoned: {e}");
                    summary.record(Verdict::Abandoned);
                    continue;
                }
            };
            self.attempt.begin_with(&bytes);
            let report = executor.execute(entry, &mut self.attempt);
            let verdict = report.outcome.verdict;
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            if verdict == Verdict::Passed {
                tracing::debug!("Passed: TakeOver test with data from `{name}`");
            } else {
                tracing::error!("{verdict}: TakeOver test with data from `{name}`");
            }
            summary.record(verdict);
        }
        self.attempt.set_take_over(self.config.take_over);
        Ok(summary)
    }

    /// Run the designated test in-process over bytes handed over by an
    /// external fuzz engine.
    ///
    /// Inputs larger than the input capacity are ignored and yield `None`.
    pub fn test_one_input(&mut self, data: &[u8]) -> anyhow::Result<Option<Verdict>> {
        if data.len() > self.attempt.input().capacity() {
            return Ok(None);
        }
        let env_choice = std::env::var(WHICH_TEST_ENV).ok();
        let test = self.fuzz_target(env_choice.as_deref())?;

        self.attempt.set_fill(Fill::Zero);
        self.attempt.begin_with(data);
        let outcome = run_boundary(test.entry, &mut self.attempt);
        let report = AttemptReport {
            outcome,
            consumed: self.attempt.input().consumed().to_vec(),
        };
        // The engine owns the fuzzing; each call is a single run, so passes
        // are saved like any replay.
        Ok(Some(self.conclude(&test, report, Mode::Replay)))
    }

    /// Raw-pointer form of [`Supervisor::test_one_input`].
    ///
    /// # Safety
    /// `data` must point at `size` readable bytes, or `size` must be zero.
    pub unsafe fn test_one_input_raw(
        &mut self,
        data: *const u8,
        size: usize,
    ) -> anyhow::Result<Option<Verdict>> {
        let bytes = if data.is_null() || size == 0 {
            &[][..]
        } else {
            // Safety: guaranteed by the caller.
            unsafe { std::slice::from_raw_parts(data, size) }
        };
        self.test_one_input(bytes)
    }

    /// `which_test` wins, then a name prefix from the environment, then the
    /// first declared test.
    fn fuzz_target(&self, env_choice: Option<&str>) -> anyhow::Result<TestCase> {
        if let Some(name) = &self.config.which_test {
            return self
                .registry
                .find(name)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("Could not find matching test for {name}"));
        }
        if let Some(prefix) = env_choice {
            return self.registry.find_prefix(prefix).copied().ok_or_else(|| {
                anyhow::anyhow!("Could not find matching test for {prefix} (from {WHICH_TEST_ENV})")
            });
        }
        self.registry
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("No tests registered; nothing to run"))
    }

    /// Persist what the rules ask for and honour the stop-on-failure switches.
    fn conclude(&mut self, test: &TestCase, report: AttemptReport, mode: Mode) -> Verdict {
        let verdict = report.outcome.verdict;
        let save = match verdict {
            Verdict::Failed | Verdict::Crashed => true,
            Verdict::Passed => mode != Mode::Fuzz || self.config.fuzz_save_passing,
            Verdict::Abandoned => false,
        };
        if save {
            self.save_case(verdict, &report.consumed);
        }

        if verdict.is_failure() && mode != Mode::RunAll {
            if self.config.abort_on_fail {
                tracing::error!("Aborting after {verdict} attempt of {}", test.name);
                std::process::abort();
            }
            if self.config.exit_on_fail {
                tracing::error!("Exiting after {verdict} attempt of {}", test.name);
                std::process::exit(EXIT_ON_FAIL_STATUS);
            }
        }
        verdict
    }

    fn save_case(&mut self, verdict: Verdict, bytes: &[u8]) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        match store.save(verdict, bytes) {
            Ok(name) if verdict.is_failure() => {
                tracing::info!("Saved test case in file {name}")
            }
            Ok(name) => tracing::debug!("Saved test case in file {name}"),
            Err(e) => tracing::error!("Failed to save test case: {e}"),
        }
    }
}

/// Shell-style wildcard match over the whole name: `*` is any run, `?` one char.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    // Position of the last `*` and the name index it is currently covering.
    let mut backtrack: Option<(usize, usize)> = None;
    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, covered)) => {
                    p = star + 1;
                    n = covered + 1;
                    backtrack = Some((star, covered + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

/// Export `LLVMFuzzerTestOneInput` for an external fuzz engine, driving the
/// tests of the given registry expression.
#[macro_export]
macro_rules! fuzz_entry_point {
    ($registry:expr) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn LLVMFuzzerTestOneInput(data: *const u8, size: usize) -> i32 {
            thread_local! {
                static SUPERVISOR: ::std::cell::RefCell<Option<$crate::supervisor::Supervisor>> =
                    const { ::std::cell::RefCell::new(None) };
            }
            SUPERVISOR.with(|cell| {
                let mut slot = cell.borrow_mut();
                if slot.is_none() {
                    let mut config = $crate::config::HarnessConfig::default();
                    config.fork = Some(false);
                    match $crate::supervisor::Supervisor::new(config, $registry) {
                        Ok(supervisor) => *slot = Some(supervisor),
                        Err(e) => {
                            $crate::__tracing::error!("{e:#}");
                            ::std::process::exit(255);
                        }
                    }
                }
                let Some(supervisor) = slot.as_mut() else {
                    return 0;
                };
                // Safety: the fuzz engine hands us `size` readable bytes at `data`.
                match unsafe { supervisor.test_one_input_raw(data, size) } {
                    Ok(_) => 0,
                    Err(e) => {
                        $crate::__tracing::error!("{e:#}");
                        ::std::process::exit(255);
                    }
                }
            })
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::InMemoryCorpus;
    use crate::outcome::Flow;
    use crate::swarm::SwarmKind;
    use crate::test_case;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn lucky_number(attempt: &mut Attempt) -> Flow {
        let x = attempt.u32()?;
        if x == 31337 {
            return attempt.fail("found the lucky number");
        }
        Ok(())
    }

    fn always_passes(attempt: &mut Attempt) -> Flow {
        attempt.u8()?;
        Ok(())
    }

    fn odd_fails(attempt: &mut Attempt) -> Flow {
        let b = attempt.u8()?;
        crate::ensure!(attempt, b % 2 == 0);
        Ok(())
    }

    fn search_to_seven(attempt: &mut Attempt) -> Flow {
        let v = attempt.u32()?;
        let found = attempt.satisfying(v, |v| v % 7 == 0)?;
        crate::ensure!(attempt, found % 7 == 0);
        Ok(())
    }

    #[allow(non_snake_case)]
    fn BoringSmoke(attempt: &mut Attempt) -> Flow {
        attempt.bool()?;
        Ok(())
    }

    #[allow(non_snake_case)]
    fn Flaky_DISABLED(attempt: &mut Attempt) -> Flow {
        attempt.fail("never run by default")
    }

    fn registry() -> TestRegistry {
        [
            test_case!(lucky_number),
            test_case!(always_passes),
            test_case!(odd_fails),
            test_case!(BoringSmoke),
            test_case!(Flaky_DISABLED),
        ]
        .into_iter()
        .collect()
    }

    fn in_process(config: HarnessConfig) -> Supervisor {
        let config = HarnessConfig {
            fork: Some(false),
            ..config
        };
        Supervisor::new(config, registry()).unwrap()
    }

    fn case_files(dir: &Path) -> Vec<PathBuf> {
        list_case_files(dir).unwrap()
    }

    #[test]
    fn zero_registered_tests_is_a_run_error() {
        let mut supervisor = Supervisor::new(
            HarnessConfig {
                fork: Some(false),
                ..Default::default()
            },
            TestRegistry::new(),
        )
        .unwrap();
        assert!(supervisor.run().is_err());
    }

    #[test]
    fn fork_with_fuzz_is_rejected() {
        let mut supervisor = in_process(HarnessConfig::default());
        supervisor.config.fuzz = true;
        supervisor.config.fork = Some(true);
        let err = supervisor.run().unwrap_err();
        assert!(err.to_string().contains("fuzzing"));
    }

    #[test]
    fn lucky_number_replay_fails_and_saves_the_same_bytes() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("lucky.fail");
        fs::write(&input, [0x00, 0x00, 0x7a, 0x69]).unwrap();
        let out = dir.path().join("out");

        let mut supervisor = in_process(HarnessConfig {
            which_test: Some("lucky_number".into()),
            input_test_file: Some(input),
            output_test_dir: Some(out.clone()),
            ..Default::default()
        });
        let summary = supervisor.run().unwrap();
        assert_eq!(summary.failed, 1);

        let saved = case_files(&out);
        assert_eq!(saved.len(), 1);
        assert!(saved[0].to_string_lossy().ends_with(".fail"));
        assert_eq!(fs::read(&saved[0]).unwrap(), vec![0x00, 0x00, 0x7a, 0x69]);
    }

    #[test]
    fn other_patterns_pass_and_passes_are_saved_outside_fuzzing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("other.pass");
        fs::write(&input, [0x00, 0x00, 0x7a, 0x6a, 0xff]).unwrap();

        let mut supervisor = in_process(HarnessConfig {
            which_test: Some("lucky_number".into()),
            input_test_file: Some(input),
            ..Default::default()
        })
        .with_store(Box::new(InMemoryCorpus::new()));
        let summary = supervisor.run().unwrap();
        assert_eq!(summary.passed, 1);
        assert_eq!(supervisor.store().map(|s| s.len()), Some(1));
    }

    #[test]
    fn unknown_which_test_runs_nothing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("x.fail");
        fs::write(&input, [1]).unwrap();
        let mut supervisor = in_process(HarnessConfig {
            which_test: Some("no_such_test".into()),
            input_test_file: Some(input),
            ..Default::default()
        });
        assert_eq!(supervisor.run().unwrap(), RunSummary::default());
    }

    #[test]
    fn missing_replay_file_abandons() {
        let mut supervisor = in_process(HarnessConfig {
            input_test_file: Some(PathBuf::from("/definitely/not/here.fail")),
            ..Default::default()
        });
        assert_eq!(supervisor.run().unwrap().abandoned, 1);
    }

    #[test]
    fn case_tree_replays_per_test_directories() {
        let root = tempdir().unwrap();
        let lucky = case_dir_for(root.path(), "supervisor.rs", "lucky_number");
        fs::create_dir_all(&lucky).unwrap();
        fs::write(lucky.join("a.fail"), [0, 0, 0x7a, 0x69]).unwrap();
        fs::write(lucky.join("b.pass"), [0, 0, 0, 1]).unwrap();
        fs::write(lucky.join("notes.txt"), b"ignored").unwrap();
        let odd = case_dir_for(root.path(), "supervisor.rs", "odd_fails");
        fs::create_dir_all(&odd).unwrap();
        fs::write(odd.join("c.fail"), [3]).unwrap();

        let mut supervisor = in_process(HarnessConfig {
            input_test_dir: Some(root.path().to_path_buf()),
            ..Default::default()
        });
        let summary = supervisor.run().unwrap();
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.passed, 1);
    }

    #[test]
    fn flat_directory_replays_every_regular_file() {
        let dir = tempdir().unwrap();
        for (name, byte) in [("one", 1u8), ("two", 2), ("three", 4)] {
            fs::write(dir.path().join(name), [byte]).unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();

        let mut supervisor = in_process(HarnessConfig {
            which_test: Some("odd_fails".into()),
            input_test_files_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        });
        let summary = supervisor.run().unwrap();
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn run_all_honours_categories_and_filters() {
        let mut supervisor = in_process(HarnessConfig::default());
        // Zero-filled input: lucky_number, always_passes, odd_fails and
        // BoringSmoke all pass; the disabled test is skipped.
        assert_eq!(supervisor.run().unwrap().passed, 4);

        let mut supervisor = in_process(HarnessConfig {
            run_disabled: true,
            ..Default::default()
        });
        assert_eq!(supervisor.run().unwrap().failed, 1);

        let mut supervisor = in_process(HarnessConfig {
            boring_only: true,
            ..Default::default()
        });
        assert_eq!(supervisor.run().unwrap().total(), 1);

        let mut supervisor = in_process(HarnessConfig {
            test_filter: Some("*_?asses".into()),
            ..Default::default()
        });
        assert_eq!(supervisor.run().unwrap().total(), 1);
    }

    #[test]
    fn listing_counts_categories() {
        let supervisor = in_process(HarnessConfig::default());
        let mut out = Vec::new();
        supervisor.list_tests(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Available Tests:"));
        assert!(text.contains(" *  lucky_number (line"));
        assert!(text.contains("Boring Tests: 1"));
        assert!(text.contains("Disabled Tests: 1"));
        assert!(text.contains("Total Number of Tests: 5"));
    }

    #[test]
    fn fuzzing_finds_failures_from_random_bytes() {
        let mut supervisor = in_process(HarnessConfig {
            which_test: Some("odd_fails".into()),
            fuzz: true,
            timeout_secs: 1,
            seed: Some(7),
            ..Default::default()
        });
        let summary = supervisor.run().unwrap();
        assert!(summary.failed > 0);
        assert!(summary.passed > 0);
        assert_eq!(summary.crashed, 0);
    }

    #[test]
    fn fuzzing_saves_passes_only_on_request() {
        let mut supervisor = in_process(HarnessConfig {
            which_test: Some("always_passes".into()),
            fuzz: true,
            timeout_secs: 1,
            seed: Some(7),
            ..Default::default()
        })
        .with_store(Box::new(InMemoryCorpus::new()));
        let summary = supervisor.run().unwrap();
        assert!(summary.passed > 0);
        assert_eq!(supervisor.store().map(|s| s.len()), Some(0));
    }

    #[test]
    fn search_never_fails_under_fuzzing() {
        let registry: TestRegistry = [test_case!(search_to_seven)].into_iter().collect();
        let mut supervisor = Supervisor::new(
            HarnessConfig {
                fuzz: true,
                timeout_secs: 1,
                seed: Some(3),
                search_budget: 0,
                ..Default::default()
            },
            registry,
        )
        .unwrap();
        let summary = supervisor.run().unwrap();
        assert_eq!(summary.failures(), 0);
        assert!(summary.abandoned > 0);
    }

    #[test]
    fn fuzz_engine_entry_ignores_oversized_input() {
        let mut supervisor = in_process(HarnessConfig {
            input_size: 4,
            which_test: Some("lucky_number".into()),
            ..Default::default()
        });
        assert_eq!(supervisor.test_one_input(&[0; 5]).unwrap(), None);
        assert_eq!(
            supervisor.test_one_input(&[0, 0, 0x7a, 0x69]).unwrap(),
            Some(Verdict::Failed)
        );
        let data = [0u8, 0, 0, 9];
        // Safety: `data` is a live array of the given length.
        let verdict = unsafe { supervisor.test_one_input_raw(data.as_ptr(), data.len()) };
        assert_eq!(verdict.unwrap(), Some(Verdict::Passed));
    }

    #[test]
    fn fuzz_engine_entry_saves_passes_like_a_replay() {
        let mut supervisor = in_process(HarnessConfig {
            which_test: Some("lucky_number".into()),
            ..Default::default()
        })
        .with_store(Box::new(InMemoryCorpus::new()));
        assert_eq!(
            supervisor.test_one_input(&[0, 0, 0, 1]).unwrap(),
            Some(Verdict::Passed)
        );
        assert_eq!(
            supervisor.test_one_input(&[0, 0, 0x7a, 0x69]).unwrap(),
            Some(Verdict::Failed)
        );
        assert_eq!(supervisor.store().map(|s| s.len()), Some(2));
    }

    fn swarm_magic(attempt: &mut Attempt) -> Flow {
        let op = *attempt.swarm_one_of(SwarmKind::Pure, &[1u8, 2, 3, 4])?;
        let b = attempt.u8()?;
        if op == 3 && b == 0x42 {
            return attempt.fail("op 3 met the magic byte");
        }
        Ok(())
    }

    #[test]
    fn fuzzed_failure_replays_to_the_same_verdict_and_prefix() {
        let dir = tempdir().unwrap();
        let found = dir.path().join("found");
        let registry: TestRegistry = [test_case!(swarm_magic)].into_iter().collect();
        let mut fuzzer = Supervisor::new(
            HarnessConfig {
                fuzz: true,
                timeout_secs: 1,
                seed: Some(11),
                output_test_dir: Some(found.clone()),
                ..Default::default()
            },
            registry,
        )
        .unwrap();
        assert!(fuzzer.run().unwrap().failed > 0);

        let saved = case_files(&found);
        assert!(!saved.is_empty());
        assert!(saved.iter().all(|p| p.to_string_lossy().ends_with(".fail")));
        let original = fs::read(&saved[0]).unwrap();

        let replayed = dir.path().join("replayed");
        let registry: TestRegistry = [test_case!(swarm_magic)].into_iter().collect();
        let mut replayer = Supervisor::new(
            HarnessConfig {
                fork: Some(false),
                output_test_dir: Some(replayed.clone()),
                ..Default::default()
            },
            registry,
        )
        .unwrap();
        let summary = replayer.replay_file(&saved[0]).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(replayer.attempt.input().consumed(), original.as_slice());

        let resaved = case_files(&replayed);
        assert_eq!(resaved.len(), 1);
        assert_eq!(fs::read(&resaved[0]).unwrap(), original);
    }

    #[test]
    fn fuzz_target_prefers_config_then_prefix_then_first() {
        let supervisor = in_process(HarnessConfig::default());
        assert_eq!(supervisor.fuzz_target(None).unwrap().name, "lucky_number");
        assert_eq!(supervisor.fuzz_target(Some("odd")).unwrap().name, "odd_fails");
        assert!(supervisor.fuzz_target(Some("zzz")).is_err());

        let supervisor = in_process(HarnessConfig {
            which_test: Some("always_passes".into()),
            ..Default::default()
        });
        assert_eq!(supervisor.fuzz_target(Some("odd")).unwrap().name, "always_passes");
    }

    #[test]
    fn wildcard_matches_whole_names() {
        assert!(wildcard_match("lucky*", "lucky_number"));
        assert!(!wildcard_match("lucky*", "unlucky"));
        assert!(wildcard_match("a.c?", "a.cd"));
        assert!(!wildcard_match("a.c?", "abcd"));
        assert!(wildcard_match("*_?asses", "always_passes"));
        assert!(wildcard_match("*", ""));
        assert!(!wildcard_match("?", ""));
        assert!(wildcard_match("a*b*c", "aXbYbZc"));
    }

    #[cfg(unix)]
    mod forked {
        use super::*;

        fn crashes_on_big_byte(attempt: &mut Attempt) -> Flow {
            let a = attempt.u8()?;
            let b = attempt.u8()?;
            if a > 200 {
                std::process::abort();
            }
            let _ = b;
            Ok(())
        }

        fn take_over_body(attempt: &mut Attempt) -> Flow {
            if attempt.u8()? == 1 {
                return attempt.fail("one");
            }
            Ok(())
        }

        #[test]
        fn crashing_replay_saves_consumed_prefix() {
            let dir = tempdir().unwrap();
            let input = dir.path().join("boom.crash");
            fs::write(&input, [250, 1, 2, 3]).unwrap();
            let out = dir.path().join("out");
            let registry: TestRegistry =
                [test_case!(crashes_on_big_byte)].into_iter().collect();
            let mut supervisor = Supervisor::new(
                HarnessConfig {
                    input_test_file: Some(input),
                    output_test_dir: Some(out.clone()),
                    ..Default::default()
                },
                registry,
            )
            .unwrap();
            let summary = supervisor.run().unwrap();
            assert_eq!(summary.crashed, 1);
            let saved = case_files(&out);
            assert_eq!(saved.len(), 1);
            assert!(saved[0].to_string_lossy().ends_with(".crash"));
            assert_eq!(fs::read(&saved[0]).unwrap(), vec![250, 1]);
        }

        #[test]
        fn take_over_flag_dispatches_from_run() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("a.fail"), [0, 0, 0x7a, 0x69]).unwrap();
            fs::write(dir.path().join("b.pass"), [0, 0, 0, 1]).unwrap();
            let mut supervisor = Supervisor::new(
                HarnessConfig {
                    which_test: Some("lucky_number".into()),
                    input_test_dir: Some(dir.path().to_path_buf()),
                    take_over: true,
                    ..Default::default()
                },
                registry(),
            )
            .unwrap();
            let summary = supervisor.run().unwrap();
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.passed, 1);
            assert!(supervisor.attempt.take_over());
        }

        #[test]
        fn take_over_replays_flat_case_directory() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("a.fail"), [1]).unwrap();
            fs::write(dir.path().join("b.pass"), [2]).unwrap();
            fs::write(dir.path().join("README"), b"skip me").unwrap();
            let mut supervisor = Supervisor::new(
                HarnessConfig {
                    input_test_dir: Some(dir.path().to_path_buf()),
                    ..Default::default()
                },
                registry(),
            )
            .unwrap();
            let summary = supervisor.take_over(take_over_body).unwrap();
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.passed, 1);
            assert!(!supervisor.attempt.take_over());
        }
    }
}
