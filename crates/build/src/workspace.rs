use std::sync::Arc;

use thiserror::Error;
use trellis_config::{
    BuildOptions, ConfigKey, ConfigRegistry, Configuration, Preferences, ProjectRegistry,
    RegistryError, WorkspaceDescriptor, WorkspaceError, WorkspaceStore,
};
use trellis_hierarchy::Project;
use uuid::Uuid;

use crate::compiler::Compiler;
use crate::lock::BuildLock;
use crate::output::OutputSink;
use crate::session::{BuildSession, SessionSettings};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("no project with guid {0} is open")]
    UnknownProject(Uuid),
    #[error("project {project} has no configuration {key}")]
    UnknownConfiguration { project: String, key: ConfigKey },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

/// Everything builds share: open projects, configurations, the build lock,
/// the compiler, and the user's preferences.
/// 建置共用的一切：已開啟的專案、組態、建置鎖、編譯器與使用者偏好設定。
pub struct Workspace {
    projects: ProjectRegistry,
    configs: ConfigRegistry,
    lock: BuildLock,
    compiler: Arc<dyn Compiler>,
    preferences: Preferences,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("projects", &self.projects.len())
            .field("configs", &self.configs)
            .field("lock", &self.lock)
            .field("preferences", &self.preferences)
            .finish()
    }
}

impl Workspace {
    pub fn new(compiler: Arc<dyn Compiler>, preferences: Preferences) -> Self {
        Self {
            projects: ProjectRegistry::new(),
            configs: ConfigRegistry::new(),
            lock: BuildLock::new(),
            compiler,
            preferences,
        }
    }

    /// Opens every project of a workspace descriptor; the descriptor's
    /// active configuration becomes the build manager's answer.
    /// 開啟工作區描述檔中的所有專案；其作用中組態成為建置管理員的回覆。
    pub fn open(
        store: &WorkspaceStore,
        descriptor: &WorkspaceDescriptor,
        compiler: Arc<dyn Compiler>,
        preferences: Preferences,
    ) -> Result<Self, ContextError> {
        let mut workspace = Self::new(compiler, preferences);
        workspace.projects = store.open_projects(descriptor)?;
        if let Some(manager) = descriptor.build_manager() {
            workspace.configs.set_build_manager(Some(Box::new(manager)));
        }
        Ok(workspace)
    }

    pub fn add_project(&mut self, project: Project) -> Result<Uuid, ContextError> {
        Ok(self.projects.insert(project)?)
    }

    pub fn projects(&self) -> &ProjectRegistry {
        &self.projects
    }

    pub fn projects_mut(&mut self) -> &mut ProjectRegistry {
        &mut self.projects
    }

    pub fn configs(&self) -> &ConfigRegistry {
        &self.configs
    }

    pub fn configs_mut(&mut self) -> &mut ConfigRegistry {
        &mut self.configs
    }

    pub fn lock(&self) -> &BuildLock {
        &self.lock
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// The configuration `key` names, or the active one when `key` is `None`.
    /// `key` 指定的組態；為 `None` 時取作用中組態。
    pub fn configuration(
        &self,
        project: Uuid,
        key: Option<&ConfigKey>,
    ) -> Result<Configuration, ContextError> {
        let project = self.project(project)?;
        match key {
            None => Ok(self.configs.resolve(project)),
            Some(key) => {
                if project
                    .configuration_groups()
                    .iter()
                    .any(|group| key.matches(group))
                {
                    Ok(Configuration::evaluate(project, key.clone()))
                } else {
                    Err(ContextError::UnknownConfiguration {
                        project: project.name(),
                        key: key.clone(),
                    })
                }
            }
        }
    }

    /// Translates a configuration and wraps it in a session bound to this
    /// workspace's lock and compiler.
    /// 轉換組態並建立綁定本工作區建置鎖與編譯器的工作階段。
    pub fn create_session(
        &self,
        project: Uuid,
        key: Option<&ConfigKey>,
        output: Arc<dyn OutputSink>,
    ) -> Result<BuildSession, ContextError> {
        let configuration = self.configuration(project, key)?;
        let project = self.project(project)?;
        let options =
            BuildOptions::translate(project, &configuration, &self.projects, &self.configs);
        tracing::debug!(
            project = %project.name(),
            configuration = %configuration.key(),
            "build session created"
        );
        Ok(BuildSession::new(
            options,
            project.compile_items(),
            Arc::clone(&self.compiler),
            self.lock.clone(),
            output,
            SessionSettings::from_preferences(&self.preferences.build),
        ))
    }

    fn project(&self, guid: Uuid) -> Result<&Project, ContextError> {
        self.projects
            .find_project_by_guid(guid)
            .ok_or(ContextError::UnknownProject(guid))
    }
}
