pub mod callbacks;
pub mod cancel;
pub mod compiler;
pub mod diagnostics;
pub mod lock;
pub mod output;
pub mod prepare;
pub mod session;
pub mod workspace;

pub use callbacks::BuildStatusCallback;
pub use cancel::CancelToken;
pub use compiler::{switches, CommandCompiler, CompileContext, CompileError, CompileOutput, Compiler};
pub use diagnostics::{summary_line, Diagnostic, Severity, INTERNAL_ERROR_CODE};
pub use lock::{BuildLock, BuildLockGuard};
pub use output::{MemoryOutput, OutputSink, TracingOutput};
pub use prepare::{build_inputs, clean_targets, is_up_to_date, prepare, PrepareError, PrepareReport};
pub use session::{BuildFlags, BuildSession, BuildState, SessionError, SessionSettings};
pub use workspace::{ContextError, Workspace};
