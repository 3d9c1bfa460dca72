#![allow(unsafe_code)]
//! Oracle adapters.
//!
//! This module uses unsafe code on Unix for signalling the tester's process
//! group (kill/killpg).
//!
//! The [`Oracle`] trait is the seam between the reduction machinery and the
//! user-supplied interestingness test. [`SubprocessTest`] is the standard
//! adapter: it serialises a candidate into a per-probe workspace and runs an
//! external tester executable on it, mapping exit code 0 to an interesting
//! verdict. [`FnOracle`] wraps a plain closure for in-process oracles.
//!
//! # Cancellation
//!
//! Probe cancellation is cooperative. The scheduler sets the probe's
//! [`CancelToken`]; the adapter notices it while waiting for the tester,
//! delivers SIGTERM to the tester's process group, escalates to SIGKILL
//! after a short grace window, and resolves the probe as cancelled. A
//! cancelled probe removes its workspace and publishes nothing.

use crate::config::Configuration;
use crate::outcome::Outcome;
use crate::scheduler::ProbeId;
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long the adapter sleeps between child status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One-shot cooperative cancellation flag shared between the scheduler and
/// a single probe.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    fired: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.fired.store(true, Ordering::Release);
    }

    /// True once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Decides the interestingness of candidate configurations.
///
/// Implementations must be deterministic: equal candidates must receive
/// equal verdicts, otherwise the outcome cache and the reduction path built
/// on top of it are meaningless.
pub trait Oracle: Send + Sync {
    /// Evaluate one candidate.
    ///
    /// Must return [`Outcome::Cancelled`] if `cancel` fires before a
    /// definitive answer is available, and must clean up any per-probe state
    /// on that path.
    fn run(&self, config: &Configuration, id: &ProbeId, cancel: &CancelToken) -> Outcome;

    /// Called when the probe `id` became the new working configuration.
    /// Adapters that retain winner workspaces drop the superseded one here.
    fn promote(&self, id: &ProbeId) {
        let _ = id;
    }
}

/// Builds test case content from a configuration by concatenating the
/// selected atoms of the original input.
#[derive(Debug)]
pub struct ConcatTestBuilder {
    atoms: Arc<Vec<String>>,
}

impl ConcatTestBuilder {
    /// A builder over the atom table of the original input.
    #[must_use]
    pub fn new(atoms: Arc<Vec<String>>) -> Self {
        Self { atoms }
    }

    /// Serialise `config` to the bytes the tester will see.
    #[must_use]
    pub fn build(&self, config: &Configuration) -> String {
        config
            .units()
            .iter()
            .map(|&unit| self.atoms[unit].as_str())
            .collect()
    }
}

/// What happens to a probe workspace once its verdict is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupPolicy {
    /// Remove losing and cancelled workspaces immediately; keep each winner
    /// until a later winner supersedes it.
    #[default]
    KeepWinners,
    /// Remove every workspace as soon as its verdict is known.
    All,
}

/// Runs an external tester executable on serialised candidates.
///
/// Each probe gets its own workspace directory under the session root,
/// named after the probe id. The candidate is written there and the tester
/// is invoked with the candidate path as its only argument, with the
/// workspace as working directory. Exit code 0 means interesting; any other
/// exit, including signal death and timeout, means uninteresting.
pub struct SubprocessTest {
    builder: Arc<ConcatTestBuilder>,
    command: PathBuf,
    work_dir: PathBuf,
    filename: String,
    timeout: Option<Duration>,
    cleanup: CleanupPolicy,
    grace: Duration,
    retained_winner: Mutex<Option<PathBuf>>,
}

impl SubprocessTest {
    /// A tester adapter rooted at `work_dir`.
    ///
    /// `filename` is the name the candidate file gets inside each probe
    /// workspace, conventionally the basename of the original input.
    #[must_use]
    pub fn new(
        builder: Arc<ConcatTestBuilder>,
        command: PathBuf,
        work_dir: PathBuf,
        filename: String,
    ) -> Self {
        Self {
            builder,
            command,
            work_dir,
            filename,
            timeout: None,
            cleanup: CleanupPolicy::default(),
            grace: Duration::from_millis(500),
            retained_winner: Mutex::new(None),
        }
    }

    /// Kill the tester if it runs longer than `timeout`. The probe then
    /// counts as uninteresting.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Workspace cleanup policy.
    #[must_use]
    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Grace window between SIGTERM and SIGKILL when cancelling.
    #[must_use]
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn run_inner(
        &self,
        config: &Configuration,
        id: &ProbeId,
        cancel: &CancelToken,
    ) -> io::Result<Outcome> {
        let dir = self.work_dir.join(id.rel_path());
        fs::create_dir_all(&dir)?;
        let case = dir.join(&self.filename);
        fs::write(&case, self.builder.build(config))?;

        let mut command = Command::new(&self.command);
        command
            .arg(&case)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so cancellation reaches the tester's
            // children as well.
            command.process_group(0);
        }

        let mut child = command.spawn()?;
        let started = Instant::now();

        let outcome = loop {
            if let Some(status) = child.try_wait()? {
                debug!(probe = %id, ?status, "tester exited");
                break if status.code() == Some(0) {
                    Outcome::Interesting
                } else {
                    Outcome::Uninteresting
                };
            }
            if cancel.is_cancelled() {
                self.terminate(&mut child);
                break Outcome::Cancelled;
            }
            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    warn!(probe = %id, ?timeout, "tester timed out; treating as uninteresting");
                    self.terminate(&mut child);
                    break Outcome::Uninteresting;
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        let remove = match (self.cleanup, outcome) {
            (CleanupPolicy::All, _) => true,
            (CleanupPolicy::KeepWinners, Outcome::Interesting) => false,
            (CleanupPolicy::KeepWinners, _) => true,
        };
        if remove {
            let _ = fs::remove_dir_all(&dir);
        }

        Ok(outcome)
    }

    /// Terminate the tester's process group: SIGTERM first, SIGKILL once the
    /// grace window elapses, then reap.
    fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            #[allow(clippy::cast_possible_wrap)]
            let pgid = child.id() as i32;
            unsafe {
                libc::kill(-pgid, libc::SIGTERM);
            }
            let deadline = Instant::now() + self.grace;
            while Instant::now() < deadline {
                match child.try_wait() {
                    Ok(Some(_)) => return,
                    Ok(None) => thread::sleep(POLL_INTERVAL),
                    Err(_) => break,
                }
            }
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.kill();
        }
        let _ = child.wait();
    }
}

impl Oracle for SubprocessTest {
    fn run(&self, config: &Configuration, id: &ProbeId, cancel: &CancelToken) -> Outcome {
        match self.run_inner(config, id, cancel) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(probe = %id, %error, "tester infrastructure failure; treating as uninteresting");
                Outcome::Uninteresting
            }
        }
    }

    fn promote(&self, id: &ProbeId) {
        if self.cleanup != CleanupPolicy::KeepWinners {
            return;
        }
        let dir = self.work_dir.join(id.rel_path());
        let superseded = self.retained_winner.lock().replace(dir.clone());
        if let Some(previous) = superseded {
            if previous != dir {
                let _ = fs::remove_dir_all(previous);
            }
        }
    }
}

/// In-process oracle backed by a closure. Counts its invocations, which
/// doubles as the oracle-call meter in tests and embeddings.
pub struct FnOracle<F> {
    f: F,
    calls: std::sync::atomic::AtomicUsize,
}

impl<F> FnOracle<F>
where
    F: Fn(&Configuration) -> crate::outcome::Verdict + Send + Sync,
{
    /// Wrap `f` as an oracle.
    pub fn new(f: F) -> Self {
        Self {
            f,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Number of times the oracle has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl<F> Oracle for FnOracle<F>
where
    F: Fn(&Configuration) -> crate::outcome::Verdict + Send + Sync,
{
    fn run(&self, config: &Configuration, _id: &ProbeId, _cancel: &CancelToken) -> Outcome {
        self.calls.fetch_add(1, Ordering::Relaxed);
        (self.f)(config).into()
    }
}
