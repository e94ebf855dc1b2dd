//! Runs an external tool (typically the compiler) to completion while
//! watching a cancellation hook and an optional deadline.
//! 執行外部工具（通常是編譯器）直到結束，期間監看取消勾點與可選的期限。
//!
//! Output is drained on helper threads so a chatty child never blocks on a
//! full pipe while the caller polls for cancellation.
//! 輸出由輔助執行緒讀取，避免子行程在管線滿載時阻塞。

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(15);

/// Errors raised while launching or supervising a tool.
/// 啟動或監看外部工具時的錯誤。
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to poll process status: {0}")]
    Poll(#[source] io::Error),
    #[error("failed to read process output: {0}")]
    Output(#[source] io::Error),
    #[error("failed to terminate process: {0}")]
    Kill(#[source] io::Error),
}

/// Serializable description of one tool invocation.
/// 可序列化的工具呼叫描述。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl RunSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            timeout_ms: None,
        }
    }

    pub fn push_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }

    /// Kills the tool once `timeout` has elapsed.
    /// 超過 `timeout` 後終止工具。
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_millis().clamp(1, u128::from(u64::MAX)) as u64;
        self.timeout_ms = Some(millis);
        self
    }

    /// Command line as it would be typed, for build logs.
    /// 以可讀形式呈現的命令列，用於建置記錄。
    pub fn display_command(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.contains(' ') {
                    format!("\"{part}\"")
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a supervised run ended.
/// 受監看執行的結束方式。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration_ms: u128,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl RunResult {
    pub fn success(&self) -> bool {
        !self.timed_out && !self.cancelled && matches!(self.exit_code, Some(0))
    }

    /// Stdout then stderr, decoded lossily and split into lines.
    /// 依序合併標準輸出與錯誤輸出並切成行。
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        [&self.stdout, &self.stderr].into_iter().flat_map(|bytes| {
            String::from_utf8_lossy(bytes)
                .lines()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
    }
}

pub struct RunExecutor;

impl RunExecutor {
    /// Runs `spec` to completion.
    /// 執行 `spec` 直到結束。
    pub fn execute(spec: &RunSpec) -> Result<RunResult, RunError> {
        Self::execute_with_cancel(spec, &|| false)
    }

    /// Runs `spec`, killing the child as soon as `should_cancel` answers
    /// true or the timeout expires.
    /// 執行 `spec`；當 `should_cancel` 回傳 true 或逾時即終止子行程。
    pub fn execute_with_cancel(
        spec: &RunSpec,
        should_cancel: &dyn Fn() -> bool,
    ) -> Result<RunResult, RunError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(command = %spec.display_command(), "spawning tool");
        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| RunError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let timeout = spec.timeout_ms.map(Duration::from_millis);
        let mut timed_out = false;
        let mut cancelled = false;
        let status = loop {
            if let Some(status) = child.try_wait().map_err(RunError::Poll)? {
                break status;
            }
            if should_cancel() {
                cancelled = true;
                break terminate(&mut child)?;
            }
            if timeout.is_some_and(|limit| start.elapsed() >= limit) {
                timed_out = true;
                break terminate(&mut child)?;
            }
            thread::sleep(POLL_INTERVAL);
        };

        let result = RunResult {
            exit_code: status.code(),
            stdout: collect(stdout)?,
            stderr: collect(stderr)?,
            duration_ms: start.elapsed().as_millis(),
            timed_out,
            cancelled,
        };
        tracing::debug!(
            exit_code = ?result.exit_code,
            duration_ms = result.duration_ms as u64,
            timed_out,
            cancelled,
            "tool finished"
        );
        Ok(result)
    }
}

fn terminate(child: &mut Child) -> Result<ExitStatus, RunError> {
    match child.kill() {
        Ok(()) => {}
        // Already exited between the poll and the kill.
        Err(err) if err.kind() == io::ErrorKind::InvalidInput => {}
        Err(err) => return Err(RunError::Kill(err)),
    }
    child.wait().map_err(RunError::Poll)
}

type Drain = Option<JoinHandle<io::Result<Vec<u8>>>>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Drain {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            pipe.read_to_end(&mut buffer)?;
            Ok(buffer)
        })
    })
}

fn collect(handle: Drain) -> Result<Vec<u8>, RunError> {
    match handle {
        Some(handle) => match handle.join() {
            Ok(bytes) => bytes.map_err(RunError::Output),
            Err(_) => Err(RunError::Output(io::Error::new(
                io::ErrorKind::Other,
                "output reader panicked",
            ))),
        },
        None => Ok(Vec::new()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[test]
    fn captures_both_streams_in_order() {
        let spec = RunSpec::new("sh")
            .with_args(["-c", "echo out1; echo err1 >&2; echo out2; exit 3"]);
        let result = RunExecutor::execute(&spec).expect("tool should run / 工具應可執行");
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.success());
        assert_eq!(
            result.lines().collect::<Vec<_>>(),
            vec!["out1", "out2", "err1"]
        );
    }

    #[test]
    fn honours_environment_and_working_directory() {
        let temp = tempdir().expect("tempdir");
        let spec = RunSpec::new("sh")
            .with_args(["-c", "printf '%s:' \"$TRELLIS_MARK\"; pwd"])
            .with_env("TRELLIS_MARK", "ok")
            .with_working_dir(temp.path());
        let result = RunExecutor::execute(&spec).expect("tool should run");
        assert!(result.success());
        let text = String::from_utf8_lossy(&result.stdout);
        assert_eq!(
            text.trim_end(),
            format!("ok:{}", temp.path().display())
        );
    }

    #[test]
    fn large_output_does_not_stall() {
        let spec = RunSpec::new("sh")
            .with_args(["-c", "i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done"])
            .with_timeout(Duration::from_secs(20));
        let result = RunExecutor::execute(&spec).expect("tool should run");
        assert!(result.success());
        assert_eq!(result.lines().count(), 20000);
    }

    #[test]
    fn cancellation_kills_the_child() {
        let polls = AtomicUsize::new(0);
        let spec = RunSpec::new("sh").with_args(["-c", "exec sleep 5"]);
        let started = Instant::now();
        let result = RunExecutor::execute_with_cancel(&spec, &|| {
            polls.fetch_add(1, Ordering::SeqCst) >= 3
        })
        .expect("tool should run");
        assert!(result.cancelled);
        assert!(!result.timed_out);
        assert!(!result.success());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn timeout_kills_the_child() {
        let spec = RunSpec::new("sh")
            .with_args(["-c", "exec sleep 5"])
            .with_timeout(Duration::from_millis(100));
        let result = RunExecutor::execute(&spec).expect("tool should run");
        assert!(result.timed_out);
        assert!(!result.cancelled);
    }

    #[test]
    fn missing_program_reports_spawn_error() {
        let err = RunExecutor::execute(&RunSpec::new("trellis-no-such-tool")).unwrap_err();
        assert!(matches!(err, RunError::Spawn { ref program, .. } if program == "trellis-no-such-tool"));
    }

    #[test]
    fn display_command_quotes_spaces() {
        let spec = RunSpec::new("csc").with_args(["/out:bin/My App.exe", "a.cs"]);
        assert_eq!(spec.display_command(), "csc \"/out:bin/My App.exe\" a.cs");
    }
}
