use std::path::Path;

use thiserror::Error;
use trellis_hierarchy::Project;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a project with guid {0} is already registered")]
    DuplicateGuid(Uuid),
}

/// All projects open in one workspace, addressed by GUID.
/// 同一工作區內所有已開啟的專案，以 GUID 定址。
#[derive(Debug, Default)]
pub struct ProjectRegistry {
    projects: Vec<Project>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, project: Project) -> Result<Uuid, RegistryError> {
        let guid = project.guid();
        if self.find_project_by_guid(guid).is_some() {
            return Err(RegistryError::DuplicateGuid(guid));
        }
        tracing::debug!(%guid, name = %project.name(), "project registered");
        self.projects.push(project);
        Ok(guid)
    }

    pub fn remove(&mut self, guid: Uuid) -> Option<Project> {
        let index = self.projects.iter().position(|p| p.guid() == guid)?;
        Some(self.projects.remove(index))
    }

    pub fn find_project_by_guid(&self, guid: Uuid) -> Option<&Project> {
        self.projects.iter().find(|project| project.guid() == guid)
    }

    pub fn get_mut(&mut self, guid: Uuid) -> Option<&mut Project> {
        self.projects
            .iter_mut()
            .find(|project| project.guid() == guid)
    }

    /// Project whose file is `path`.
    /// 專案檔路徑為 `path` 的專案。
    pub fn find_by_path(&self, path: &Path) -> Option<&Project> {
        self.projects.iter().find(|project| project.path() == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Project> + '_ {
        self.projects.iter()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_guid_and_reject_duplicates() {
        let mut registry = ProjectRegistry::new();
        let project = Project::new("/w/a/a.proj", "a").unwrap();
        let guid = registry.insert(project).unwrap();
        assert_eq!(
            registry.find_project_by_guid(guid).map(Project::name),
            Some("a".to_string())
        );
        assert!(registry.find_project_by_guid(Uuid::new_v4()).is_none());
        assert!(registry.find_by_path(Path::new("/w/a/a.proj")).is_some());

        let mut doc = Project::new("/w/b/b.proj", "b").unwrap().to_document();
        doc.guid = Some(guid.to_string());
        let twin = Project::from_document("/w/b/b.proj".into(), doc).unwrap();
        assert_eq!(registry.insert(twin), Err(RegistryError::DuplicateGuid(guid)));

        assert!(registry.remove(guid).is_some());
        assert!(registry.is_empty());
    }
}
