//! Build session state machine and its background worker.
//! 建置工作階段的狀態機與背景工作者。
//!
//! `Idle -> Preparing -> Running -> (Succeeded | Failed | Cancelled)`.
//! Preparation runs on the caller's thread; everything from `build_begin`
//! onwards runs on one worker thread per session. `Running` phases of all
//! sessions sharing a [`BuildLock`] never overlap.
//! 準備階段在呼叫端執行緒進行；自 `build_begin` 起皆在每個工作階段專屬的背景執行緒上執行。
//! 共用同一把 [`BuildLock`] 的工作階段，其 `Running` 階段不會重疊。

use std::fmt;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bitflags::bitflags;
use thiserror::Error;
use trellis_config::{BuildOptions, BuildPreferences, Verbosity};
use trellis_hierarchy::{panic_message, SinkCookie};

use crate::callbacks::{BuildStatusCallback, CallbackSet};
use crate::cancel::CancelToken;
use crate::compiler::{CompileContext, CompileOutput, Compiler};
use crate::diagnostics::{summary_line, Diagnostic};
use crate::lock::BuildLock;
use crate::output::OutputSink;
use crate::prepare::{build_inputs, is_up_to_date, prepare, PrepareError};

bitflags! {
    /// Options for `start_build` and `start_clean`.
    /// `start_build` 與 `start_clean` 的選項旗標。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BuildFlags: u32 {
        /// Compile even when outputs look current; implies `CLEAN`.
        const REBUILD = 0b01;
        /// Delete stale outputs before building.
        const CLEAN = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BuildState {
    #[default]
    Idle,
    Preparing,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl BuildState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BuildState::Succeeded | BuildState::Failed | BuildState::Cancelled
        )
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BuildState::Idle => "idle",
            BuildState::Preparing => "preparing",
            BuildState::Running => "running",
            BuildState::Succeeded => "succeeded",
            BuildState::Failed => "failed",
            BuildState::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a build is already running for {0}")]
    Busy(String),
    #[error(transparent)]
    Prepare(#[from] PrepareError),
    #[error("failed to start build worker: {0}")]
    Spawn(#[source] io::Error),
}

/// Session tuning taken from the user's build preferences.
/// 取自使用者建置偏好設定的工作階段參數。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub lock_poll: Duration,
    pub hard_timeout: Option<Duration>,
    pub verbosity: Verbosity,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_preferences(&BuildPreferences::default())
    }
}

impl SessionSettings {
    pub fn from_preferences(preferences: &BuildPreferences) -> Self {
        Self {
            lock_poll: preferences.lock_poll_interval(),
            hard_timeout: preferences.hard_timeout(),
            verbosity: preferences.verbosity,
        }
    }
}

#[derive(Debug, Default)]
struct RunStatus {
    state: BuildState,
    settled: bool,
}

/// Status of one run, shared between the session and that run's worker.
/// Every run gets a fresh one, so a worker can only ever touch its own.
/// 單次執行的狀態，由工作階段與該次的背景工作者共用；每次執行各自獨立。
#[derive(Debug, Default)]
struct Shared {
    status: Mutex<RunStatus>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RunStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self) -> BuildState {
        self.lock().state
    }

    fn is_settled(&self) -> bool {
        self.lock().settled
    }

    /// Moves a live run forward. A settled run keeps its final state.
    fn advance(&self, state: BuildState) -> bool {
        let mut status = self.lock();
        if status.settled {
            return false;
        }
        tracing::debug!(from = %status.state, to = %state, "build state");
        status.state = state;
        true
    }

    /// Records the final state; only the first caller wins.
    fn settle(&self, state: BuildState) -> bool {
        let mut status = self.lock();
        if status.settled {
            return false;
        }
        tracing::debug!(from = %status.state, to = %state, "build settled");
        status.state = state;
        status.settled = true;
        true
    }
}

/// Settles a run exactly once: the worker and `stop` race for it.
/// 每次執行只結束一次：背景工作者與 `stop` 競爭此權利。
#[derive(Clone)]
struct Finisher {
    shared: Arc<Shared>,
    callbacks: CallbackSet,
}

impl Finisher {
    fn finish(&self, state: BuildState) -> bool {
        if !self.shared.settle(state) {
            return false;
        }
        self.callbacks.end(state == BuildState::Succeeded);
        true
    }
}

/// The worker's view of the output pane. Goes quiet once its run is settled,
/// so a stopped worker never writes into a later run.
/// 背景工作者使用的輸出；所屬執行結束後即不再寫入。
struct RunOutput {
    shared: Arc<Shared>,
    inner: Arc<dyn OutputSink>,
}

impl OutputSink for RunOutput {
    fn write_line(&self, line: &str) {
        let status = self.shared.lock();
        if !status.settled {
            self.inner.write_line(line);
        }
    }
}

/// One project configuration's build, driven by the shell.
/// 由外殼驅動、針對單一專案組態的建置。
pub struct BuildSession {
    name: String,
    options: Arc<BuildOptions>,
    sources: Arc<Vec<PathBuf>>,
    compiler: Arc<dyn Compiler>,
    lock: BuildLock,
    output: Arc<dyn OutputSink>,
    callbacks: CallbackSet,
    settings: SessionSettings,
    cancel: CancelToken,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl fmt::Debug for BuildSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildSession")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("callbacks", &self.callbacks)
            .field("in_flight", &!self.query_status())
            .finish()
    }
}

impl BuildSession {
    pub fn new(
        options: BuildOptions,
        sources: Vec<PathBuf>,
        compiler: Arc<dyn Compiler>,
        lock: BuildLock,
        output: Arc<dyn OutputSink>,
        settings: SessionSettings,
    ) -> Self {
        let name = format!(
            "{} {}",
            options.project_name,
            options.configuration
        );
        Self {
            name,
            options: Arc::new(options),
            sources: Arc::new(sources),
            compiler,
            lock,
            output,
            callbacks: CallbackSet::default(),
            settings,
            cancel: CancelToken::new(),
            shared: Arc::new(Shared::default()),
            worker: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn advise(&self, callback: Arc<dyn BuildStatusCallback>) -> SinkCookie {
        self.callbacks.advise(callback)
    }

    pub fn unadvise(&self, cookie: SinkCookie) -> bool {
        self.callbacks.unadvise(cookie)
    }

    /// State of the latest run. A finished run keeps reporting its terminal
    /// state; the session is idle again in the sense that `query_start_build`
    /// accepts a new run, and `state()` only reads `Idle` before the first one.
    /// 最近一次執行的狀態。結束後仍回報終止狀態；此時工作階段已可再次啟動，
    /// 只有在第一次執行前 `state()` 才會是 `Idle`。
    pub fn state(&self) -> BuildState {
        self.shared.get()
    }

    /// True when no worker is in flight. A stopped worker still winding down
    /// counts as in flight until it exits.
    /// 沒有進行中的背景工作者時為 true；已停止但尚未結束的工作者仍算進行中。
    pub fn query_status(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Whether `start_build` would be accepted right now.
    /// 目前是否可以呼叫 `start_build`。
    pub fn query_start_build(&self) -> bool {
        self.query_status() || self.shared.is_settled()
    }

    pub fn query_start_clean(&self) -> bool {
        self.query_start_build()
    }

    /// Prepares outputs on the calling thread, then spawns the worker that
    /// compiles. Returns as soon as the worker is running.
    /// 在呼叫端執行緒準備輸出，接著啟動負責編譯的背景工作者並立即返回。
    pub fn start_build(&mut self, flags: BuildFlags) -> Result<(), SessionError> {
        self.start(flags, false)
    }

    /// Deletes outputs on the calling thread; observers still see one
    /// begin/end pair from the worker.
    /// 在呼叫端執行緒刪除輸出；觀察者仍會從背景工作者收到一組 begin/end。
    pub fn start_clean(&mut self, flags: BuildFlags) -> Result<(), SessionError> {
        self.start(flags | BuildFlags::CLEAN, true)
    }

    /// Asks the running build to stop at its next cancellation check; the
    /// worker settles it as `Cancelled`.
    /// 要求進行中的建置在下次檢查時停止，由背景工作者以 `Cancelled` 結束。
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels the running build and settles it as `Cancelled` right away.
    /// The worker winds down on its own and writes nothing further; the next
    /// `start_build` waits for it to exit. Outputs are undefined.
    /// 取消進行中的建置並立即以 `Cancelled` 結束；背景工作者自行收尾且不再輸出，
    /// 下一次 `start_build` 會等它結束。輸出內容不保證。
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if self.query_status() {
            return;
        }
        if self.finisher().finish(BuildState::Cancelled) {
            tracing::info!(session = %self.name, "build stopped");
            self.output.write_line("Build stopped.");
        }
    }

    /// Blocks until the worker exits and returns the final state.
    /// 阻塞直到背景工作者結束並回傳最終狀態。
    pub fn wait(&mut self) -> BuildState {
        if let Some(worker) = self.worker.take() {
            self.join_worker(worker);
        }
        self.state()
    }

    fn finisher(&self) -> Finisher {
        Finisher {
            shared: Arc::clone(&self.shared),
            callbacks: self.callbacks.clone(),
        }
    }

    fn join_worker(&self, worker: JoinHandle<()>) {
        if worker.join().is_err() {
            tracing::error!(session = %self.name, "build worker panicked");
            self.finisher().finish(BuildState::Failed);
        }
    }

    fn start(&mut self, flags: BuildFlags, clean_only: bool) -> Result<(), SessionError> {
        if let Some(worker) = self.worker.take() {
            if !worker.is_finished() && !self.shared.is_settled() {
                self.worker = Some(worker);
                return Err(SessionError::Busy(self.name.clone()));
            }
            // A stopped worker may still hold the build lock.
            self.join_worker(worker);
        }

        self.cancel = CancelToken::new();
        self.cancel.arm(self.settings.hard_timeout);
        self.shared = Arc::new(Shared::default());
        self.shared.advance(BuildState::Preparing);
        let clean = flags.intersects(BuildFlags::CLEAN | BuildFlags::REBUILD);
        if let Err(err) = prepare(&self.options, clean, self.output.as_ref(), self.settings.verbosity) {
            self.output.write_line(&format!("error: {err}"));
            self.shared.settle(BuildState::Failed);
            return Err(err.into());
        }

        let finisher = self.finisher();
        let output: Arc<dyn OutputSink> = Arc::new(RunOutput {
            shared: Arc::clone(&self.shared),
            inner: Arc::clone(&self.output),
        });
        let job = Job {
            name: self.name.clone(),
            options: Arc::clone(&self.options),
            sources: Arc::clone(&self.sources),
            compiler: Arc::clone(&self.compiler),
            lock: self.lock.clone(),
            output,
            callbacks: self.callbacks.clone(),
            settings: self.settings,
            cancel: self.cancel.clone(),
            finisher,
            force: flags.contains(BuildFlags::REBUILD),
            clean_only,
        };
        let worker = thread::Builder::new()
            .name(format!("build: {}", self.name))
            .spawn(move || job.run())
            .map_err(|err| {
                self.shared.settle(BuildState::Failed);
                SessionError::Spawn(err)
            })?;
        self.worker = Some(worker);
        Ok(())
    }
}

/// Everything the worker owns for one run.
struct Job {
    name: String,
    options: Arc<BuildOptions>,
    sources: Arc<Vec<PathBuf>>,
    compiler: Arc<dyn Compiler>,
    lock: BuildLock,
    output: Arc<dyn OutputSink>,
    callbacks: CallbackSet,
    settings: SessionSettings,
    cancel: CancelToken,
    finisher: Finisher,
    force: bool,
    clean_only: bool,
}

impl Job {
    fn run(self) {
        let state = self.execute();
        if self.finisher.finish(state) {
            tracing::info!(session = %self.name, %state, "build finished");
        }
    }

    fn execute(&self) -> BuildState {
        if !self.callbacks.begin() {
            self.cancel.cancel();
            self.note("Build cancelled by an observer.");
            return BuildState::Cancelled;
        }
        if self.clean_only {
            self.note(&format!("Clean complete -- {}", self.name));
            return BuildState::Succeeded;
        }

        let inputs = build_inputs(&self.options, &self.sources);
        if !self.force && is_up_to_date(&inputs, &self.options.output_assembly) {
            self.note(&format!("{} is up to date.", self.options.project_name));
            return BuildState::Succeeded;
        }

        let Some(_guard) = self
            .lock
            .acquire(&self.name, self.settings.lock_poll, &self.cancel)
        else {
            return self.cancelled();
        };
        if self.cancel.is_cancelled() {
            return self.cancelled();
        }
        if !self.finisher.shared.advance(BuildState::Running) {
            return BuildState::Cancelled;
        }
        tracing::info!(session = %self.name, sources = self.sources.len(), "build started");
        self.note(&format!(
            "------ Build started: Project: {}, Configuration: {} ------",
            self.options.project_name, self.options.configuration
        ));
        for reference in &self.options.unresolved_references {
            self.output.write_line(&format!(
                "warning: project reference {reference} could not be resolved"
            ));
        }

        let context = CompileContext::new(
            &self.callbacks,
            &self.cancel,
            self.output.as_ref(),
            self.settings.verbosity,
        );
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.compiler
                .compile(&self.options, &self.sources, &context)
        }));
        let success = match outcome {
            Ok(Ok(CompileOutput {
                success,
                diagnostics,
                ..
            })) => {
                for diagnostic in &diagnostics {
                    context.report(diagnostic);
                }
                success
            }
            Ok(Err(err)) => {
                tracing::error!(session = %self.name, error = %err, "compilation step failed");
                context.report(&Diagnostic::internal(&err));
                false
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(session = %self.name, panic = %message, "compiler panicked");
                context.report(&Diagnostic::internal(message));
                false
            }
        };

        if self.cancel.is_cancelled() {
            return self.cancelled();
        }
        self.output.write_line(&summary_line(
            context.error_count(),
            context.warning_count(),
        ));
        if success && context.error_count() == 0 {
            BuildState::Succeeded
        } else {
            BuildState::Failed
        }
    }

    fn cancelled(&self) -> BuildState {
        if self.cancel.timed_out() {
            tracing::warn!(session = %self.name, "build hit the hard timeout");
            self.output.write_line("Build cancelled: time limit exceeded.");
        } else {
            self.output.write_line("Build cancelled.");
        }
        BuildState::Cancelled
    }

    fn note(&self, line: &str) {
        if self.settings.verbosity > Verbosity::Quiet {
            self.output.write_line(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_and_clean_flags_combine() {
        let flags = BuildFlags::REBUILD | BuildFlags::CLEAN;
        assert!(flags.contains(BuildFlags::CLEAN));
        assert!(BuildFlags::default().is_empty());
        assert!(BuildFlags::REBUILD.intersects(BuildFlags::CLEAN | BuildFlags::REBUILD));
    }

    #[test]
    fn terminal_states() {
        assert!(!BuildState::Idle.is_terminal());
        assert!(!BuildState::Running.is_terminal());
        assert!(BuildState::Cancelled.is_terminal());
        assert_eq!(BuildState::Succeeded.to_string(), "succeeded");
    }

    #[test]
    fn settings_follow_preferences() {
        let preferences = BuildPreferences {
            hard_timeout_secs: Some(90),
            lock_poll_ms: 40,
            verbosity: Verbosity::Quiet,
        };
        let settings = SessionSettings::from_preferences(&preferences);
        assert_eq!(settings.hard_timeout, Some(Duration::from_secs(90)));
        assert_eq!(settings.lock_poll, Duration::from_millis(40));
        assert_eq!(settings.verbosity, Verbosity::Quiet);
    }
}
