use std::fmt;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

/// `file(line,col): error CODE: message`, with the location optional.
static DIAGNOSTIC_LINE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?P<file>[^()]+?)\((?P<line>\d+)(?:,(?P<col>\d+))?\)\s*:\s*)?(?P<sev>error|warning|info)(?:\s+(?P<code>[A-Za-z]+\d+))?\s*:\s*(?P<msg>.*)$",
    )
    .ok()
});

pub const INTERNAL_ERROR_CODE: &str = "ICE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured compiler message.
/// 一則結構化的編譯器訊息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub file: Option<PathBuf>,
    pub line: u32,
    pub column: u32,
    pub code: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            file: None,
            line: 0,
            column: 0,
            code: None,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn at(mut self, file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Error recorded when the compilation step itself blew up.
    /// 編譯步驟本身失敗時記錄的錯誤。
    pub fn internal(detail: impl fmt::Display) -> Self {
        Self::error(format!("Internal Compiler Error: {detail}")).with_code(INTERNAL_ERROR_CODE)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Parses one line of compiler output. Lines that are not diagnostics
    /// yield `None`.
    /// 解析一行編譯器輸出；非診斷訊息的行回傳 `None`。
    pub fn parse(line: &str) -> Option<Self> {
        let caps = DIAGNOSTIC_LINE.as_ref()?.captures(line.trim())?;
        let severity = match &caps["sev"] {
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            _ => Severity::Info,
        };
        let number = |name: &str| {
            caps.name(name)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0)
        };
        Some(Self {
            severity,
            file: caps.name("file").map(|m| PathBuf::from(m.as_str().trim())),
            line: number("line"),
            column: number("col"),
            code: caps.name("code").map(|m| m.as_str().to_string()),
            message: caps["msg"].trim().to_string(),
        })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}({},{}): ", file.display(), self.line, self.column)?;
        }
        write!(f, "{}", self.severity)?;
        if let Some(code) = &self.code {
            write!(f, " {code}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Final line written to the output once a build ends.
/// 建置結束時寫入輸出的總結行。
pub fn summary_line(errors: usize, warnings: usize) -> String {
    format!("Build complete -- {errors} errors, {warnings} warnings")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_located_diagnostic() {
        let diag = Diagnostic::parse("src/Program.cs(12,7): error CS1002: ; expected")
            .expect("diagnostic");
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.file, Some(PathBuf::from("src/Program.cs")));
        assert_eq!((diag.line, diag.column), (12, 7));
        assert_eq!(diag.code.as_deref(), Some("CS1002"));
        assert_eq!(diag.message, "; expected");
        assert_eq!(
            diag.to_string(),
            "src/Program.cs(12,7): error CS1002: ; expected"
        );
    }

    #[test]
    fn parses_unlocated_warning_and_rejects_noise() {
        let diag = Diagnostic::parse("warning CS1668: Invalid search path 'x'").expect("warning");
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.file, None);
        assert_eq!(diag.to_string(), "warning CS1668: Invalid search path 'x'");

        assert!(Diagnostic::parse("Microsoft (R) Visual C# Compiler").is_none());
        assert!(Diagnostic::parse("").is_none());
    }

    #[test]
    fn internal_error_and_summary_format() {
        let ice = Diagnostic::internal("compiler crashed");
        assert!(ice.is_error());
        assert_eq!(
            ice.to_string(),
            "error ICE: Internal Compiler Error: compiler crashed"
        );
        assert_eq!(summary_line(2, 1), "Build complete -- 2 errors, 1 warnings");
    }
}
