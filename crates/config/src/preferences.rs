use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trellis_hierarchy::write_atomic;

const PREFERENCES_VERSION: u32 = 1;
const MIN_LOCK_POLL_MS: u64 = 5;
const MAX_LOCK_POLL_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("failed to read preferences {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse preferences {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize preferences {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write preferences {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// User preferences for building.
/// 建置相關的使用者偏好設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub build: BuildPreferences,
    #[serde(default)]
    pub compiler: CompilerPreferences,
}

fn default_version() -> u32 {
    PREFERENCES_VERSION
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            build: BuildPreferences::default(),
            compiler: CompilerPreferences::default(),
        }
    }
}

impl Preferences {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = PREFERENCES_VERSION;
        }
        self.build.sanitize();
        self.compiler.sanitize();
    }
}

/// How much the build writes to its output pane.
/// 建置輸出詳細程度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Detailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPreferences {
    /// Seconds after which a running build is cancelled. `None` disables it.
    #[serde(default)]
    pub hard_timeout_secs: Option<u64>,
    #[serde(default = "default_lock_poll_ms")]
    pub lock_poll_ms: u64,
    #[serde(default)]
    pub verbosity: Verbosity,
}

fn default_lock_poll_ms() -> u64 {
    15
}

impl Default for BuildPreferences {
    fn default() -> Self {
        Self {
            hard_timeout_secs: None,
            lock_poll_ms: default_lock_poll_ms(),
            verbosity: Verbosity::default(),
        }
    }
}

impl BuildPreferences {
    fn sanitize(&mut self) {
        self.lock_poll_ms = self.lock_poll_ms.clamp(MIN_LOCK_POLL_MS, MAX_LOCK_POLL_MS);
        if self.hard_timeout_secs == Some(0) {
            self.hard_timeout_secs = None;
        }
    }

    pub fn hard_timeout(&self) -> Option<Duration> {
        self.hard_timeout_secs.map(Duration::from_secs)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerPreferences {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_program() -> String {
    "csc".to_string()
}

impl Default for CompilerPreferences {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
        }
    }
}

impl CompilerPreferences {
    fn sanitize(&mut self) {
        if self.program.trim().is_empty() {
            self.program = default_program();
        }
        self.args.retain(|arg| !arg.trim().is_empty());
    }
}

#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    data: Preferences,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>, preferences: Preferences) -> Self {
        Self {
            path: path.into(),
            data: preferences,
        }
    }

    /// Loads preferences, falling back to defaults when the file is absent.
    /// 載入偏好設定；檔案不存在時採用預設值。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no preferences file, using defaults");
            return Ok(Self {
                path,
                data: Preferences::default(),
            });
        }

        let contents = fs::read_to_string(&path).map_err(|source| PreferencesError::Read {
            path: path.clone(),
            source,
        })?;
        let mut data: Preferences =
            serde_json::from_str(&contents).map_err(|source| PreferencesError::Parse {
                path: path.clone(),
                source,
            })?;
        data.sanitize();
        Ok(Self { path, data })
    }

    pub fn preferences(&self) -> &Preferences {
        &self.data
    }

    pub fn update<F>(&mut self, op: F) -> Result<(), PreferencesError>
    where
        F: FnOnce(&mut Preferences),
    {
        op(&mut self.data);
        self.data.sanitize();
        self.save()
    }

    pub fn save(&self) -> Result<(), PreferencesError> {
        let payload = serde_json::to_vec_pretty(&self.data).map_err(|source| {
            PreferencesError::Serialize {
                path: self.path.clone(),
                source,
            }
        })?;
        write_atomic(&self.path, &payload).map_err(|source| PreferencesError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_clamps_poll_and_zero_timeout() {
        let mut prefs = Preferences::default();
        prefs.version = 0;
        prefs.build.lock_poll_ms = 1;
        prefs.build.hard_timeout_secs = Some(0);
        prefs.compiler.program = "  ".into();
        prefs.compiler.args = vec!["/nologo".into(), " ".into()];
        prefs.sanitize();

        assert_eq!(prefs.version, PREFERENCES_VERSION);
        assert_eq!(prefs.build.lock_poll_ms, MIN_LOCK_POLL_MS);
        assert_eq!(prefs.build.hard_timeout(), None);
        assert_eq!(prefs.compiler.program, "csc");
        assert_eq!(prefs.compiler.args, vec!["/nologo".to_string()]);

        prefs.build.lock_poll_ms = 60_000;
        prefs.sanitize();
        assert_eq!(prefs.build.lock_poll_ms, MAX_LOCK_POLL_MS);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("prefs.json");
        fs::write(&path, r#"{ "build": { "hard_timeout_secs": 30 } }"#).unwrap();

        let store = PreferencesStore::load(&path).unwrap();
        let prefs = store.preferences();
        assert_eq!(prefs.build.hard_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(prefs.build.lock_poll_ms, 15);
        assert_eq!(prefs.build.verbosity, Verbosity::Normal);
        assert_eq!(prefs.compiler, CompilerPreferences::default());
    }

    #[test]
    fn update_persists_sanitized_values() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested/prefs.json");
        let mut store = PreferencesStore::load(&path).unwrap();
        store
            .update(|prefs| {
                prefs.build.verbosity = Verbosity::Detailed;
                prefs.build.lock_poll_ms = 0;
            })
            .unwrap();

        let reloaded = PreferencesStore::load(&path).unwrap();
        assert_eq!(reloaded.preferences().build.verbosity, Verbosity::Detailed);
        assert_eq!(reloaded.preferences().build.lock_poll_ms, MIN_LOCK_POLL_MS);
    }
}
