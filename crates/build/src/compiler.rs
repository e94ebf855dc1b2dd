use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use trellis_config::{BuildOptions, CompilerPreferences, Verbosity};
use trellis_runexec::{RunError, RunExecutor, RunSpec};

use crate::callbacks::CallbackSet;
use crate::cancel::CancelToken;
use crate::diagnostics::{Diagnostic, Severity};
use crate::output::OutputSink;

/// The compilation service a build session drives.
/// 建置工作階段所驅動的編譯服務。
pub trait Compiler: Send + Sync {
    fn compile(
        &self,
        options: &BuildOptions,
        sources: &[PathBuf],
        context: &CompileContext<'_>,
    ) -> Result<CompileOutput, CompileError>;
}

/// What a compilation produced. Diagnostics already streamed through
/// `CompileContext::report` are not repeated here.
/// 編譯結果；已透過 `CompileContext::report` 回報的診斷不會重複列出。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
    pub success: bool,
    pub output_path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to run compiler: {0}")]
    Launch(#[from] RunError),
    #[error("{0}")]
    Other(String),
}

/// Handed to the compiler for cancellation checks and streaming output.
/// 交給編譯器，用於檢查取消與串流輸出。
pub struct CompileContext<'a> {
    callbacks: &'a CallbackSet,
    cancel: &'a CancelToken,
    sink: &'a dyn OutputSink,
    verbosity: Verbosity,
    errors: AtomicUsize,
    warnings: AtomicUsize,
}

impl<'a> CompileContext<'a> {
    pub(crate) fn new(
        callbacks: &'a CallbackSet,
        cancel: &'a CancelToken,
        sink: &'a dyn OutputSink,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            callbacks,
            cancel,
            sink,
            verbosity,
            errors: AtomicUsize::new(0),
            warnings: AtomicUsize::new(0),
        }
    }

    /// Fires a `tick` at every observer and reports whether the build
    /// should stop. An observer refusing the tick cancels the build.
    /// 向所有觀察者發送 `tick` 並回報是否應停止；任一觀察者拒絕即取消建置。
    pub fn should_cancel(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        if !self.callbacks.tick() {
            self.cancel.cancel();
            return true;
        }
        false
    }

    pub fn report(&self, diagnostic: &Diagnostic) {
        match diagnostic.severity {
            Severity::Error => {
                self.errors.fetch_add(1, Ordering::SeqCst);
            }
            Severity::Warning => {
                self.warnings.fetch_add(1, Ordering::SeqCst);
            }
            Severity::Info => {}
        }
        self.sink.write_line(&diagnostic.to_string());
    }

    /// Free-form compiler chatter, shown only at detailed verbosity.
    /// 編譯器的一般訊息，僅在詳細模式下顯示。
    pub fn message(&self, line: &str) {
        if self.verbosity >= Verbosity::Detailed {
            self.sink.write_line(line);
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }
}

/// Runs a command-line compiler that takes `/switch:value` options.
/// 執行採用 `/switch:value` 參數的命令列編譯器。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn from_preferences(preferences: &CompilerPreferences) -> Self {
        Self {
            program: preferences.program.clone(),
            args: preferences.args.clone(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Full invocation: fixed arguments, option switches, then sources.
    /// 完整呼叫：固定參數、選項開關，最後是原始碼檔案。
    pub fn command(&self, options: &BuildOptions, sources: &[PathBuf]) -> RunSpec {
        RunSpec::new(&self.program)
            .with_args(self.args.iter().cloned())
            .with_args(switches(options))
            .with_args(sources.iter().map(|source| display(source)))
            .with_working_dir(options.project_dir())
    }
}

impl Compiler for CommandCompiler {
    fn compile(
        &self,
        options: &BuildOptions,
        sources: &[PathBuf],
        context: &CompileContext<'_>,
    ) -> Result<CompileOutput, CompileError> {
        let spec = self.command(options, sources);
        context.message(&spec.display_command());
        let result = RunExecutor::execute_with_cancel(&spec, &|| context.should_cancel())?;

        let mut diagnostics = Vec::new();
        for line in result.lines() {
            match Diagnostic::parse(&line) {
                Some(diagnostic) => diagnostics.push(diagnostic),
                None if !line.trim().is_empty() => context.message(&line),
                None => {}
            }
        }
        let success = result.success() && !diagnostics.iter().any(Diagnostic::is_error);
        Ok(CompileOutput {
            success,
            output_path: options.output_assembly.clone(),
            diagnostics,
        })
    }
}

/// Compiler switches for `options`, in a stable order.
/// 依固定順序產生的編譯器開關。
pub fn switches(options: &BuildOptions) -> Vec<String> {
    let mut args = vec![
        format!("/out:{}", display(&options.output_assembly)),
        format!("/target:{}", options.output_kind.as_str()),
    ];
    if !options.defines.is_empty() {
        args.push(format!("/define:{}", options.defines.join(";")));
    }
    for reference in &options.referenced_assemblies {
        args.push(format!("/reference:{}", display(reference)));
    }
    if options.debug_symbols {
        args.push("/debug".to_string());
    }
    if options.optimize {
        args.push("/optimize".to_string());
    }
    args.push(format!("/warn:{}", options.warning_level));
    if options.warnings_as_errors {
        args.push("/warnaserror".to_string());
    }
    if options.allow_unsafe_blocks {
        args.push("/unsafe".to_string());
    }
    if options.check_for_overflow {
        args.push("/checked".to_string());
    }
    if let Some(doc) = &options.documentation_file {
        args.push(format!("/doc:{}", display(doc)));
    }
    if let Some(main) = &options.startup_object {
        args.push(format!("/main:{main}"));
    }
    if let Some(icon) = &options.application_icon {
        args.push(format!("/win32icon:{}", display(icon)));
    }
    args
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
