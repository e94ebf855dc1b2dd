use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trellis_hierarchy::{write_atomic, Project, ProjectError};

use crate::configuration::ConfigKey;
use crate::projects::{ProjectRegistry, RegistryError};
use crate::registry::FixedConfiguration;
use crate::serde_path;

/// Binding between a workspace and a project file.
/// 工作區指向的專案檔。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectBinding {
    #[serde(with = "serde_path")]
    pub path: PathBuf,
}

/// Workspace file: a named list of projects plus the active configuration.
/// 工作區檔案：專案清單與作用中組態。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceDescriptor {
    pub name: String,
    #[serde(default)]
    pub projects: Vec<ProjectBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_configuration: Option<String>,
}

impl WorkspaceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            projects: Vec::new(),
            active_configuration: None,
        }
    }

    pub fn add_project(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.projects.iter().any(|binding| binding.path == path) {
            self.projects.push(ProjectBinding { path });
        }
    }

    /// Build manager answering the workspace's active configuration.
    /// 回覆工作區作用中組態的建置管理員。
    pub fn build_manager(&self) -> Option<FixedConfiguration> {
        self.active_configuration
            .as_deref()
            .and_then(ConfigKey::parse)
            .map(FixedConfiguration)
    }
}

/// Errors raised by workspace persistence.
/// 工作區儲存相關的錯誤。
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to read workspace {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid workspace descriptor {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write workspace {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Reads and writes workspace descriptors.
/// 讀寫工作區描述檔。
#[derive(Debug)]
pub struct WorkspaceStore {
    path: PathBuf,
}

impl WorkspaceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<WorkspaceDescriptor, WorkspaceError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| WorkspaceError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| WorkspaceError::Invalid {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, descriptor: &WorkspaceDescriptor) -> Result<(), WorkspaceError> {
        let payload =
            serde_json::to_vec_pretty(descriptor).map_err(|source| WorkspaceError::Invalid {
                path: self.path.clone(),
                source,
            })?;
        write_atomic(&self.path, &payload).map_err(|source| WorkspaceError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Loads every bound project into a fresh registry. Relative bindings
    /// resolve against the descriptor's directory.
    /// 將所有專案載入新的登錄表；相對路徑以描述檔所在目錄為基準。
    pub fn open_projects(
        &self,
        descriptor: &WorkspaceDescriptor,
    ) -> Result<ProjectRegistry, WorkspaceError> {
        let base = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut registry = ProjectRegistry::new();
        for binding in &descriptor.projects {
            let path = if binding.path.is_absolute() {
                binding.path.clone()
            } else {
                base.join(&binding.path)
            };
            registry.insert(Project::load(&path)?)?;
        }
        tracing::info!(
            workspace = %descriptor.name,
            projects = registry.len(),
            "workspace opened"
        );
        Ok(registry)
    }
}
