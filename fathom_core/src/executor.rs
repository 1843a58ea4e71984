use crate::attempt::Attempt;
use crate::outcome::{Escape, Outcome, Verdict};
use crate::registry::TestFn;
#[cfg(unix)]
use crate::shm::SharedRegion;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// What one attempt produced: its outcome and the exact bytes it consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    pub outcome: Outcome,
    pub consumed: Vec<u8>,
}

/// Runs one attempt of a test body over an already-prepared [`Attempt`].
///
/// The caller loads or resets the input beforehand; the executor only decides
/// where the body runs and how its ending is observed.
pub trait Executor {
    fn execute(&mut self, test: TestFn, attempt: &mut Attempt) -> AttemptReport;
}

/// Invoke `test` and classify how it ended.
///
/// This is the attempt boundary: every `Escape` raised anywhere below lands
/// here, and so does any panic escaping the body.
pub fn run_boundary(test: TestFn, attempt: &mut Attempt) -> Outcome {
    tracing::debug!("Running attempt");
    let result = catch_unwind(AssertUnwindSafe(|| test(attempt)));

    let outcome = match result {
        Ok(Ok(())) | Ok(Err(Escape::Pass)) => {
            if attempt.soft_failed() {
                Outcome::failed(None)
            } else {
                Outcome::passed()
            }
        }
        Ok(Err(Escape::Fail(reason))) => Outcome::failed(reason),
        Ok(Err(Escape::Abandon(reason))) => {
            if reason.is_assumption() {
                tracing::debug!("Abandoned: {reason}");
            } else {
                tracing::error!("Abandoned: {reason}");
            }
            Outcome::abandoned(reason.to_string())
        }
        Err(panic_payload) => Outcome::failed(Some(panic_message(panic_payload.as_ref()))),
    };

    match (outcome.verdict, &outcome.reason) {
        (Verdict::Passed, _) => tracing::debug!("Passed"),
        (Verdict::Failed, Some(reason)) => tracing::error!("Failed: {reason}"),
        (Verdict::Failed, None) => tracing::error!("Failed"),
        _ => {}
    }
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("Panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("Panicked: {s}")
    } else {
        "Panicked with unknown payload".to_string()
    }
}

/// Runs the attempt in the current process. A hard crash takes the whole
/// harness down with it.
#[derive(Debug, Default)]
pub struct InProcessExecutor;

impl InProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for InProcessExecutor {
    fn execute(&mut self, test: TestFn, attempt: &mut Attempt) -> AttemptReport {
        let outcome = run_boundary(test, attempt);
        AttemptReport {
            outcome,
            consumed: attempt.input().consumed().to_vec(),
        }
    }
}

/// Runs every attempt in a forked child and joins it before returning.
///
/// The child reports through a [`SharedRegion`] mapped before the fork: the
/// outcome record plus a mirror of each byte it reads, so the consumed prefix
/// survives even when the child is killed by a signal.
#[cfg(unix)]
#[derive(Debug)]
pub struct ForkExecutor {
    region: SharedRegion,
}

#[cfg(unix)]
impl ForkExecutor {
    pub fn new(input_capacity: usize) -> std::io::Result<Self> {
        Ok(Self {
            region: SharedRegion::map(input_capacity)?,
        })
    }

    fn run_child(&self, test: TestFn, attempt: &mut Attempt) -> ! {
        attempt.input_mut().attach_mirror(self.region.mirror());
        let outcome = run_boundary(test, attempt);
        self.region.write_outcome(&outcome);
        // Safety: `_exit` skips atexit handlers and destructors that belong
        // to the parent's copy of the process state.
        unsafe { libc::_exit(outcome.verdict.exit_code()) }
    }

    fn join(&self, pid: libc::pid_t) -> Outcome {
        let mut status: libc::c_int = 0;
        loop {
            // Safety: `pid` is our own child and `status` outlives the call.
            let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
            if rc == pid {
                break;
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Outcome::crashed(format!("Failed to join attempt process: {err}"));
            }
        }

        if libc::WIFSIGNALED(status) {
            return Outcome::crashed(format!(
                "Terminated by signal {}",
                libc::WTERMSIG(status)
            ));
        }
        let code = libc::WEXITSTATUS(status);
        if let Some(outcome) = self.region.read_outcome() {
            return outcome;
        }
        // Take-over mode exits straight from `fail` without writing a record.
        match Verdict::from_code(code) {
            Some(verdict) => Outcome {
                verdict,
                reason: None,
            },
            None => Outcome::crashed(format!("Exited with code {code}")),
        }
    }
}

#[cfg(unix)]
impl Executor for ForkExecutor {
    fn execute(&mut self, test: TestFn, attempt: &mut Attempt) -> AttemptReport {
        self.region.reset();
        // Safety: the child only runs the attempt and leaves through `_exit`.
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            let err = std::io::Error::last_os_error();
            tracing::warn!("fork failed ({err}); running attempt in-process");
            return InProcessExecutor.execute(test, attempt);
        }
        if pid == 0 {
            self.run_child(test, attempt);
        }

        let outcome = self.join(pid);
        if outcome.verdict == Verdict::Crashed {
            if let Some(reason) = &outcome.reason {
                tracing::error!("Crashed: {reason}");
            }
        }
        AttemptReport {
            outcome,
            consumed: self.region.consumed_bytes(),
        }
    }
}

/// Executor to use when isolation was requested.
///
/// Platforms without `fork` fall back to in-process execution.
pub fn isolated_executor(input_capacity: usize) -> anyhow::Result<Box<dyn Executor>> {
    #[cfg(unix)]
    {
        let executor = ForkExecutor::new(input_capacity)
            .map_err(|e| anyhow::anyhow!("Failed to map shared outcome region: {e}"))?;
        Ok(Box::new(executor))
    }
    #[cfg(not(unix))]
    {
        let _ = input_capacity;
        tracing::warn!("Process isolation is unavailable on this platform; running in-process");
        Ok(Box::new(InProcessExecutor::new()))
    }
}
