//! Output preparation ahead of a compile: directories, clean, reference copies,
//! and the up-to-date check.
//! 編譯前的輸出準備：建立目錄、清除、複製參考，以及是否為最新的判斷。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use trellis_config::{BuildOptions, Verbosity};
use trellis_hierarchy::paths_equal;

use crate::output::OutputSink;

/// Preparation failures that end the session before it starts.
/// 使建置工作階段無法開始的準備錯誤。
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("failed to create output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What a preparation pass did.
/// 準備階段的處理結果。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrepareReport {
    pub removed: Vec<PathBuf>,
    pub copied: Vec<PathBuf>,
    pub up_to_date: usize,
    pub failures: usize,
}

/// Ensures output directories exist, optionally cleans stale outputs, and
/// copies private references beside the output assembly.
/// 確保輸出目錄存在，必要時清除舊輸出，並將私有參考複製到輸出組件旁。
///
/// Only a missing or unwritable output directory is fatal. Every other
/// failure is written to `sink` and the pass moves on.
/// 只有輸出目錄無法建立才是致命錯誤；其他失敗寫入 `sink` 後繼續。
pub fn prepare(
    options: &BuildOptions,
    clean: bool,
    sink: &dyn OutputSink,
    verbosity: Verbosity,
) -> Result<PrepareReport, PrepareError> {
    let mut report = PrepareReport::default();
    ensure_dir(&options.output_directory)?;
    if let Some(parent) = options
        .documentation_file
        .as_deref()
        .and_then(Path::parent)
    {
        ensure_dir(parent)?;
    }

    if clean {
        for target in clean_targets(options) {
            match fs::remove_file(&target) {
                Ok(()) => {
                    if verbosity >= Verbosity::Detailed {
                        sink.write_line(&format!("Deleted {}", target.display()));
                    }
                    report.removed.push(target);
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    report.failures += 1;
                    note_failure(sink, &format!("could not delete {}", target.display()), &err);
                }
            }
        }
    }

    for copy in &options.copy_local {
        let Some(file_name) = copy.source.file_name() else {
            continue;
        };
        let source_dir = copy.source.parent().unwrap_or_else(|| Path::new(""));
        if paths_equal(source_dir, &options.output_directory) {
            continue;
        }
        let destination = options.output_directory.join(file_name);
        let source_time = match modified(&copy.source) {
            Ok(time) => time,
            Err(err) => {
                report.failures += 1;
                note_failure(
                    sink,
                    &format!("reference {} not found at {}", copy.name, copy.source.display()),
                    &err,
                );
                continue;
            }
        };
        if modified(&destination).is_ok_and(|dest_time| dest_time >= source_time) {
            report.up_to_date += 1;
            continue;
        }
        match copy_file(&copy.source, &destination) {
            Ok(()) => {
                if verbosity >= Verbosity::Detailed {
                    sink.write_line(&format!(
                        "Copied {} to {}",
                        copy.source.display(),
                        destination.display()
                    ));
                }
                report.copied.push(destination);
            }
            Err(err) => {
                report.failures += 1;
                note_failure(
                    sink,
                    &format!(
                        "could not copy {} to {}",
                        copy.source.display(),
                        destination.display()
                    ),
                    &err,
                );
            }
        }
    }

    tracing::debug!(
        project = %options.project_name,
        configuration = %options.configuration,
        removed = report.removed.len(),
        copied = report.copied.len(),
        failures = report.failures,
        "outputs prepared"
    );
    Ok(report)
}

/// Files removed by a clean: the assembly, its debug symbols, and copied
/// references.
/// 清除時刪除的檔案：組件、除錯符號與已複製的參考。
pub fn clean_targets(options: &BuildOptions) -> Vec<PathBuf> {
    let mut targets = vec![
        options.output_assembly.clone(),
        options.output_assembly.with_extension("pdb"),
    ];
    for copy in &options.copy_local {
        if let Some(name) = copy.source.file_name() {
            let target = options.output_directory.join(name);
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }
    targets
}

/// Inputs whose timestamps decide whether a build is needed: the project
/// file, the sources, and referenced assemblies that have a concrete path.
/// 決定是否需要建置的輸入：專案檔、原始碼，以及具有實際路徑的參考組件。
pub fn build_inputs(options: &BuildOptions, sources: &[PathBuf]) -> Vec<PathBuf> {
    let mut inputs = vec![options.project_file.clone()];
    inputs.extend(sources.iter().cloned());
    inputs.extend(
        options
            .referenced_assemblies
            .iter()
            .filter(|reference| reference.is_absolute())
            .cloned(),
    );
    inputs
}

/// True when `output` exists and every input is strictly older than it.
/// A missing input counts as changed.
/// `output` 存在且所有輸入皆嚴格較舊時為 true；缺少的輸入視為已變更。
pub fn is_up_to_date(inputs: &[PathBuf], output: &Path) -> bool {
    let Ok(output_time) = modified(output) else {
        return false;
    };
    inputs
        .iter()
        .all(|input| modified(input).is_ok_and(|input_time| input_time < output_time))
}

fn ensure_dir(path: &Path) -> Result<(), PrepareError> {
    fs::create_dir_all(path).map_err(|source| PrepareError::OutputDirectory {
        path: path.to_path_buf(),
        source,
    })
}

fn modified(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

fn copy_file(source: &Path, destination: &Path) -> io::Result<()> {
    if let Ok(metadata) = fs::metadata(destination) {
        clear_readonly(destination, metadata.permissions())?;
    }
    fs::copy(source, destination)?;
    let permissions = fs::metadata(destination)?.permissions();
    clear_readonly(destination, permissions)
}

#[allow(clippy::permissions_set_readonly_false)]
fn clear_readonly(path: &Path, mut permissions: fs::Permissions) -> io::Result<()> {
    if permissions.readonly() {
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

fn note_failure(sink: &dyn OutputSink, what: &str, err: &io::Error) {
    tracing::warn!(error = %err, "{what}");
    sink.write_line(&format!("warning: {what}: {err}"));
}
