use thiserror::Error;
use trellis_hierarchy::{ObserverResult, Project, SinkCookie, SinkSet};
use uuid::Uuid;

use crate::configuration::{default_group, ConfigKey, Configuration};

/// Supplies the active configuration of a project (the solution build
/// manager in an IDE).
/// 提供專案目前作用中的組態（IDE 中的方案建置管理員）。
pub trait BuildManager {
    fn active_configuration(&self, project: Uuid) -> Option<ConfigKey>;
}

/// Build manager that answers the same configuration for every project.
/// 對所有專案都回覆同一組態的建置管理員。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedConfiguration(pub ConfigKey);

impl BuildManager for FixedConfiguration {
    fn active_configuration(&self, _project: Uuid) -> Option<ConfigKey> {
        Some(self.0.clone())
    }
}

/// Receives configuration-name and platform-name changes.
/// 接收組態名稱與平台名稱變更的觀察者。
pub trait ConfigEvents {
    fn on_cfg_name_added(&mut self, _name: &str) -> ObserverResult {
        Ok(())
    }

    fn on_cfg_name_deleted(&mut self, _name: &str) -> ObserverResult {
        Ok(())
    }

    fn on_cfg_name_renamed(&mut self, _old: &str, _new: &str) -> ObserverResult {
        Ok(())
    }

    fn on_platform_name_added(&mut self, _platform: &str) -> ObserverResult {
        Ok(())
    }

    fn on_platform_name_deleted(&mut self, _platform: &str) -> ObserverResult {
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("configuration {0:?} does not exist")]
    UnknownConfiguration(String),
    #[error("configuration {0:?} already exists")]
    DuplicateConfiguration(String),
    #[error("platform {0:?} does not exist")]
    UnknownPlatform(String),
    #[error("platform {0:?} already exists")]
    DuplicatePlatform(String),
    #[error("invalid configuration or platform name {0:?}")]
    InvalidName(String),
}

/// Resolves and edits the configurations of a project.
/// 解析並編輯專案的組態。
///
/// Configurations live in the project's persisted property groups; the
/// registry reads them on demand and writes changes straight back.
/// 組態存放在專案的屬性群組中；登錄表按需讀取並直接寫回變更。
#[derive(Default)]
pub struct ConfigRegistry {
    manager: Option<Box<dyn BuildManager>>,
    sinks: SinkSet<dyn ConfigEvents>,
}

impl std::fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("manager", &self.manager.is_some())
            .field("sinks", &self.sinks)
            .finish()
    }
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_build_manager(manager: Box<dyn BuildManager>) -> Self {
        Self {
            manager: Some(manager),
            sinks: SinkSet::new(),
        }
    }

    pub fn set_build_manager(&mut self, manager: Option<Box<dyn BuildManager>>) {
        self.manager = manager;
    }

    pub fn advise(&mut self, sink: Box<dyn ConfigEvents>) -> SinkCookie {
        self.sinks.advise(sink)
    }

    pub fn unadvise(&mut self, cookie: SinkCookie) -> bool {
        self.sinks.unadvise(cookie)
    }

    /// Returns the configuration for `name|platform`, persisting a new
    /// property group with default settings when none exists yet.
    /// 取得 `名稱|平台` 的組態；若尚未存在則以預設設定建立並儲存新群組。
    pub fn get_or_create(&mut self, project: &mut Project, name: &str, platform: &str) -> Configuration {
        let key = ConfigKey::new(name, platform);
        let known_name = self.names(project).iter().any(|n| n.eq_ignore_ascii_case(name));
        let known_platform = self
            .platforms(project)
            .iter()
            .any(|p| p.eq_ignore_ascii_case(platform));
        if !project
            .configuration_groups()
            .iter()
            .any(|group| key.matches(group))
        {
            project
                .configuration_groups_mut()
                .push(default_group(name, platform));
            tracing::debug!(configuration = %key, "configuration created");
            if !known_name {
                self.sinks
                    .notify("cfg_name_added", |sink| sink.on_cfg_name_added(name));
            }
            if !known_platform {
                self.sinks.notify("platform_name_added", |sink| {
                    sink.on_platform_name_added(platform)
                });
            }
        }
        Configuration::evaluate(project, key)
    }

    /// Distinct configuration names in declaration order.
    /// 依宣告順序列出不重複的組態名稱。
    pub fn names(&self, project: &Project) -> Vec<String> {
        distinct(project.configuration_groups().iter().map(|g| g.name.as_str()))
    }

    /// Distinct platform names in declaration order.
    /// 依宣告順序列出不重複的平台名稱。
    pub fn platforms(&self, project: &Project) -> Vec<String> {
        distinct(
            project
                .configuration_groups()
                .iter()
                .map(|g| g.platform.as_str()),
        )
    }

    /// Every persisted configuration.
    /// 所有已儲存的組態。
    pub fn configurations(&self, project: &Project) -> Vec<Configuration> {
        project
            .configuration_groups()
            .iter()
            .map(|group| {
                Configuration::evaluate(project, ConfigKey::new(&group.name, &group.platform))
            })
            .collect()
    }

    /// First persisted configuration whose name matches, ignoring case.
    /// 線性搜尋第一個名稱相符（忽略大小寫）的組態。
    pub fn open_config(&self, project: &Project, name: &str) -> Option<Configuration> {
        project
            .configuration_groups()
            .iter()
            .find(|group| group.name.eq_ignore_ascii_case(name))
            .map(|group| {
                Configuration::evaluate(project, ConfigKey::new(&group.name, &group.platform))
            })
    }

    /// Active configuration: the build manager's answer when one is set,
    /// else the first persisted configuration, else `Debug|AnyCPU`.
    /// 作用中組態：優先採用建置管理員的回覆，其次為第一個已儲存組態，最後為 `Debug|AnyCPU`。
    pub fn resolve(&self, project: &Project) -> Configuration {
        let key = self
            .manager
            .as_ref()
            .and_then(|manager| manager.active_configuration(project.guid()))
            .or_else(|| {
                project
                    .configuration_groups()
                    .first()
                    .map(|group| ConfigKey::new(&group.name, &group.platform))
            })
            .unwrap_or_default();
        Configuration::evaluate(project, key)
    }

    /// Writes a setting into the configuration's persisted group.
    /// 將設定寫入該組態已儲存的屬性群組。
    pub fn set_property(
        &mut self,
        project: &mut Project,
        key: &ConfigKey,
        name: &str,
        value: &str,
    ) -> Result<Configuration, ConfigError> {
        let group = project
            .configuration_groups_mut()
            .iter_mut()
            .find(|group| key.matches(group))
            .ok_or_else(|| ConfigError::UnknownConfiguration(key.to_string()))?;
        group.set_property(name, value);
        Ok(Configuration::evaluate(project, key.clone()))
    }

    /// Adds a configuration name for every known platform, cloning the
    /// settings of `clone_from` when given.
    /// 為每個平台新增組態名稱；若指定 `clone_from` 則複製其設定。
    pub fn add_config_name(
        &mut self,
        project: &mut Project,
        name: &str,
        clone_from: Option<&str>,
    ) -> Result<(), ConfigError> {
        validate(name)?;
        if self.names(project).iter().any(|n| n.eq_ignore_ascii_case(name)) {
            return Err(ConfigError::DuplicateConfiguration(name.to_string()));
        }
        let mut platforms = self.platforms(project);
        if platforms.is_empty() {
            platforms.push(trellis_hierarchy::DEFAULT_PLATFORM.to_string());
        }
        for platform in platforms {
            let source = clone_from.and_then(|from| {
                project
                    .configuration_groups()
                    .iter()
                    .find(|group| group.matches(from, &platform))
                    .cloned()
            });
            let group = match source {
                Some(mut group) => {
                    group.name = name.to_string();
                    group
                }
                None => default_group(name, &platform),
            };
            project.configuration_groups_mut().push(group);
        }
        tracing::debug!(name, clone_from, "configuration name added");
        self.sinks
            .notify("cfg_name_added", |sink| sink.on_cfg_name_added(name));
        Ok(())
    }

    pub fn delete_config_name(&mut self, project: &mut Project, name: &str) -> Result<(), ConfigError> {
        let groups = project.configuration_groups_mut();
        let before = groups.len();
        groups.retain(|group| !group.name.eq_ignore_ascii_case(name));
        if groups.len() == before {
            return Err(ConfigError::UnknownConfiguration(name.to_string()));
        }
        self.sinks
            .notify("cfg_name_deleted", |sink| sink.on_cfg_name_deleted(name));
        Ok(())
    }

    pub fn rename_config_name(
        &mut self,
        project: &mut Project,
        old: &str,
        new: &str,
    ) -> Result<(), ConfigError> {
        validate(new)?;
        let names = self.names(project);
        if !names.iter().any(|n| n.eq_ignore_ascii_case(old)) {
            return Err(ConfigError::UnknownConfiguration(old.to_string()));
        }
        if !old.eq_ignore_ascii_case(new) && names.iter().any(|n| n.eq_ignore_ascii_case(new)) {
            return Err(ConfigError::DuplicateConfiguration(new.to_string()));
        }
        for group in project.configuration_groups_mut() {
            if group.name.eq_ignore_ascii_case(old) {
                group.name = new.to_string();
            }
        }
        self.sinks
            .notify("cfg_name_renamed", |sink| sink.on_cfg_name_renamed(old, new));
        Ok(())
    }

    /// Adds a platform to every configuration name.
    /// 為每個組態名稱新增平台。
    pub fn add_platform_name(
        &mut self,
        project: &mut Project,
        platform: &str,
        clone_from: Option<&str>,
    ) -> Result<(), ConfigError> {
        validate(platform)?;
        if self
            .platforms(project)
            .iter()
            .any(|p| p.eq_ignore_ascii_case(platform))
        {
            return Err(ConfigError::DuplicatePlatform(platform.to_string()));
        }
        for name in self.names(project) {
            let source = clone_from.and_then(|from| {
                project
                    .configuration_groups()
                    .iter()
                    .find(|group| group.matches(&name, from))
                    .cloned()
            });
            let group = match source {
                Some(mut group) => {
                    group.platform = platform.to_string();
                    group
                }
                None => default_group(&name, platform),
            };
            project.configuration_groups_mut().push(group);
        }
        self.sinks.notify("platform_name_added", |sink| {
            sink.on_platform_name_added(platform)
        });
        Ok(())
    }

    pub fn delete_platform_name(
        &mut self,
        project: &mut Project,
        platform: &str,
    ) -> Result<(), ConfigError> {
        let groups = project.configuration_groups_mut();
        let before = groups.len();
        groups.retain(|group| !group.platform.eq_ignore_ascii_case(platform));
        if groups.len() == before {
            return Err(ConfigError::UnknownPlatform(platform.to_string()));
        }
        self.sinks.notify("platform_name_deleted", |sink| {
            sink.on_platform_name_deleted(platform)
        });
        Ok(())
    }
}

fn validate(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() || name.contains('|') {
        Err(ConfigError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.iter().any(|seen| seen.eq_ignore_ascii_case(value)) {
            out.push(value.to_string());
        }
    }
    out
}
