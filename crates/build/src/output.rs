use std::sync::{Mutex, PoisonError};

/// Append-only channel for build messages (the IDE's output pane).
/// 建置訊息的只增輸出通道（IDE 的輸出窗格）。
pub trait OutputSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Keeps every line in memory.
/// 將所有輸出行保存在記憶體中。
#[derive(Debug, Default)]
pub struct MemoryOutput {
    lines: Mutex<Vec<String>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|line| line.contains(needle))
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl OutputSink for MemoryOutput {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

/// Forwards output lines to `tracing` at info level.
/// 將輸出行轉送至 `tracing`。
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingOutput;

impl OutputSink for TracingOutput {
    fn write_line(&self, line: &str) {
        tracing::info!(target: "trellis::build::output", "{line}");
    }
}
