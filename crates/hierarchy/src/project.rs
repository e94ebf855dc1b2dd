use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::document::{
    lookup, upsert, ConfigurationGroup, ItemElement, ItemType, ProjectDocument, PropertyEntry,
};
use crate::handle_table::ItemId;
use crate::node::{attr, Node, NodeKind, BUILD_ACTION_COMPILE, BUILD_ACTION_CONTENT};
use crate::tree::{library_file_name, Hierarchy, HierarchyError};
use crate::util::{normalize, relative_to, resolve_stored, split_stored, to_stored, write_atomic};

/// Caption of the virtual folder holding references.
pub const REFERENCES_CAPTION: &str = "References";

/// File extensions that get `BuildAction="Compile"` when added.
/// 加入時會標記為編譯項目的副檔名。
pub const COMPILE_EXTENSIONS: &[&str] = &["cs", "ssc", "vb", "fs"];

/// Errors raised while loading, editing or saving a project.
/// 載入、編輯或儲存專案時的錯誤。
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to read project {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse project {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: quick_xml::DeError,
    },
    #[error("failed to serialize project {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: quick_xml::DeError,
    },
    #[error("failed to write project {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

/// A reference as the build sees it.
/// 建置流程所看到的參考資訊。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceInfo {
    pub item: ItemId,
    pub name: String,
    pub assembly_name: String,
    /// Resolved `HintPath`, when one is stored.
    pub hint_path: Option<PathBuf>,
    /// `Private` is anything but `false`.
    pub private: bool,
}

impl ReferenceInfo {
    /// Path handed to the compiler: the hint path, else `<assembly>.dll`.
    /// 交給編譯器的路徑：優先使用提示路徑，否則為 `<組件>.dll`。
    pub fn assembly_path(&self) -> PathBuf {
        self.hint_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(library_file_name(&self.assembly_name)))
    }
}

/// A reference to another project in the same workspace.
/// 指向同一工作區中其他專案的參考。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectReferenceInfo {
    pub item: ItemId,
    pub name: String,
    pub guid: Option<Uuid>,
}

/// One loaded project: identity, properties, configuration groups and tree.
/// 已載入的專案：識別、屬性、組態群組與專案樹。
#[derive(Debug)]
pub struct Project {
    guid: Uuid,
    properties: Vec<PropertyEntry>,
    configurations: Vec<ConfigurationGroup>,
    tree: Hierarchy,
    references_folder: ItemId,
}

impl Project {
    /// Creates an empty project that will be stored at `path`.
    /// 建立將儲存於 `path` 的空專案。
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self, ProjectError> {
        let mut tree = Hierarchy::new(path, name);
        let references_folder =
            tree.add_child(ItemId::ROOT, Node::reference_folder(REFERENCES_CAPTION))?;
        Ok(Self {
            guid: Uuid::new_v4(),
            properties: Vec::new(),
            configurations: Vec::new(),
            tree,
            references_folder,
        })
    }

    /// Reads and parses a project file.
    /// 讀取並解析專案檔。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref().to_path_buf();
        let contents = fs::read_to_string(&path).map_err(|source| ProjectError::Read {
            path: path.clone(),
            source,
        })?;
        let doc = ProjectDocument::from_xml(&contents).map_err(|source| ProjectError::Parse {
            path: path.clone(),
            source,
        })?;
        let project = Self::from_document(path, doc)?;
        tracing::info!(
            path = %project.path().display(),
            guid = %project.guid,
            items = project.tree.len(),
            "project loaded"
        );
        Ok(project)
    }

    /// Builds the tree from a parsed document: references first, then files
    /// with their folder chains, then explicit folders.
    /// 由文件建立專案樹：先參考，再檔案（含資料夾鏈），最後是明確宣告的資料夾。
    pub fn from_document(path: PathBuf, doc: ProjectDocument) -> Result<Self, ProjectError> {
        let name = doc
            .name
            .clone()
            .or_else(|| doc.property("Name").map(str::to_string))
            .unwrap_or_else(|| file_stem(&path));
        let guid = doc
            .guid
            .as_deref()
            .or_else(|| doc.property("ProjectGuid"))
            .and_then(|text| match Uuid::parse_str(text.trim()) {
                Ok(guid) => Some(guid),
                Err(err) => {
                    tracing::warn!(guid = text, error = %err, "ignoring malformed project guid");
                    None
                }
            })
            .unwrap_or_else(Uuid::new_v4);

        let mut project = Self::new(path, name)?;
        project.guid = guid;
        project.properties = doc.properties;
        project.configurations = doc.configurations;

        let (references, rest): (Vec<_>, Vec<_>) = doc.items.into_iter().partition(|item| {
            matches!(
                item.item_type,
                ItemType::Reference | ItemType::ProjectReference
            )
        });
        for item in references {
            let node = Node::from_attributes(NodeKind::Reference, item.attributes);
            project.tree.add_child(project.references_folder, node)?;
        }
        let (folders, files): (Vec<_>, Vec<_>) = rest
            .into_iter()
            .partition(|item| item.item_type == ItemType::Folder);
        for item in files {
            let parent = match item.get(attr::REL_PATH) {
                Some(raw) => project.folder_for_file(raw)?,
                None => ItemId::ROOT,
            };
            let node = Node::from_attributes(NodeKind::File, item.attributes);
            project.tree.add_child(parent, node)?;
        }
        for item in folders {
            if let Some(raw) = item.get(attr::REL_PATH) {
                project.ensure_folder(raw)?;
            }
        }
        Ok(project)
    }

    /// Serialises the tree and properties back into a document.
    /// 將專案樹與屬性轉回文件。
    pub fn to_document(&self) -> ProjectDocument {
        let mut items = Vec::new();
        for id in self.tree.subtree(ItemId::ROOT) {
            let Some(node) = self.tree.node(id) else {
                continue;
            };
            let item_type = match node.kind() {
                NodeKind::Folder => ItemType::Folder,
                NodeKind::File => ItemType::File,
                NodeKind::Reference if node.is_project_reference() => ItemType::ProjectReference,
                NodeKind::Reference => ItemType::Reference,
                NodeKind::Root | NodeKind::ReferenceFolder => continue,
            };
            items.push(ItemElement {
                item_type,
                attributes: node.attributes().clone(),
            });
        }
        ProjectDocument {
            name: Some(self.name()),
            guid: Some(self.guid.braced().to_string().to_uppercase()),
            properties: self.properties.clone(),
            configurations: self.configurations.clone(),
            items,
        }
    }

    /// Writes the project file atomically.
    /// 以原子方式寫回專案檔。
    pub fn save(&self) -> Result<(), ProjectError> {
        let path = self.path().to_path_buf();
        let xml = self
            .to_document()
            .to_xml()
            .map_err(|source| ProjectError::Serialize {
                path: path.clone(),
                source,
            })?;
        write_atomic(&path, xml.as_bytes())
            .map_err(|source| ProjectError::Write { path: path.clone(), source })?;
        tracing::info!(path = %path.display(), "project saved");
        Ok(())
    }

    /// Saves under a new file name. Relative item paths are kept as stored.
    /// 另存新檔；相對路徑維持原樣。
    pub fn save_as(&mut self, path: impl Into<PathBuf>) -> Result<(), ProjectError> {
        self.tree.set_file_path(path.into());
        self.save()
    }

    pub fn name(&self) -> String {
        self.tree.caption(ItemId::ROOT).unwrap_or_default()
    }

    pub fn guid(&self) -> Uuid {
        self.guid
    }

    pub fn path(&self) -> &Path {
        self.tree.file_path()
    }

    pub fn base_dir(&self) -> &Path {
        self.tree.base_dir()
    }

    pub fn tree(&self) -> &Hierarchy {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Hierarchy {
        &mut self.tree
    }

    pub fn references_folder(&self) -> ItemId {
        self.references_folder
    }

    /// Project-wide (unconditional) properties.
    /// 專案層級（不分組態）的屬性。
    pub fn properties(&self) -> &[PropertyEntry] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        lookup(&self.properties, name)
    }

    pub fn set_property(&mut self, name: &str, value: impl Into<String>) {
        upsert(&mut self.properties, name, value.into());
    }

    pub fn configuration_groups(&self) -> &[ConfigurationGroup] {
        &self.configurations
    }

    pub fn configuration_groups_mut(&mut self) -> &mut Vec<ConfigurationGroup> {
        &mut self.configurations
    }

    /// Adds files handed over by the shell (drag-and-drop, "add existing").
    /// Paths already in the tree are skipped.
    /// 加入外殼交來的檔案清單；已存在於樹中的路徑會被略過。
    pub fn add_files(&mut self, paths: &[PathBuf]) -> Result<Vec<ItemId>, ProjectError> {
        let mut added = Vec::new();
        for path in paths {
            let absolute = if path.is_absolute() {
                path.clone()
            } else {
                self.base_dir().join(path)
            };
            let absolute = normalize(&absolute).unwrap_or(absolute);
            if self.tree.find_by_path(ItemId::ROOT, &absolute).is_some() {
                tracing::debug!(path = %absolute.display(), "file already in project");
                continue;
            }
            let action = build_action_for(&absolute);
            let node = match relative_to(&absolute, self.base_dir()) {
                Some(rel) if !rel.as_os_str().is_empty() => Node::file(to_stored(&rel)),
                _ => {
                    let caption = absolute
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    Node::file(absolute.to_string_lossy())
                        .with_attribute(attr::LINKED_INTO_PROJECT_AT, caption)
                }
            };
            let node = node.with_attribute(attr::BUILD_ACTION, action);
            let parent = match node.attribute(attr::REL_PATH) {
                Some(raw) => {
                    let raw = raw.to_string();
                    self.folder_for_file(&raw)?
                }
                None => ItemId::ROOT,
            };
            added.push(self.tree.add_child(parent, node)?);
        }
        Ok(added)
    }

    /// Ensures a folder chain for a project-relative path exists.
    /// 確保專案相對路徑對應的資料夾鏈存在。
    pub fn add_folder(&mut self, rel_path: &str) -> Result<ItemId, ProjectError> {
        self.ensure_folder(rel_path)
    }

    /// Adds an assembly reference; an existing reference with the same name
    /// is returned instead of creating a duplicate.
    /// 加入組件參考；若已有同名參考則直接回傳既有的代號。
    pub fn add_reference(
        &mut self,
        name: &str,
        hint_path: Option<&Path>,
        private: Option<bool>,
    ) -> Result<ItemId, ProjectError> {
        if let Some(existing) = self.find_reference(|node| {
            !node.is_project_reference() && node.caption().eq_ignore_ascii_case(name)
        }) {
            return Ok(existing);
        }
        let mut node = Node::reference(name).with_attribute(attr::ASSEMBLY_NAME, name);
        if let Some(hint) = hint_path {
            let stored = relative_to(hint, self.base_dir())
                .map(|rel| to_stored(&rel))
                .unwrap_or_else(|| hint.to_string_lossy().into_owned());
            node = node.with_attribute(attr::HINT_PATH, stored);
        }
        if let Some(private) = private {
            node = node.with_attribute(attr::PRIVATE, private.to_string());
        }
        Ok(self.tree.add_child(self.references_folder, node)?)
    }

    /// Adds a reference to another project by GUID.
    /// 以 GUID 加入專案參考。
    pub fn add_project_reference(&mut self, guid: Uuid, name: &str) -> Result<ItemId, ProjectError> {
        if let Some(existing) = self.find_reference(|node| {
            node.attribute(attr::PROJECT)
                .and_then(|text| Uuid::parse_str(text).ok())
                == Some(guid)
        }) {
            return Ok(existing);
        }
        let node = Node::reference(name)
            .with_attribute(attr::PROJECT, guid.braced().to_string().to_uppercase());
        Ok(self.tree.add_child(self.references_folder, node)?)
    }

    /// Removes an item (and its subtree) from wherever it sits.
    /// 從所在位置移除項目與其子樹。
    pub fn remove_item(&mut self, id: ItemId) -> Result<(), ProjectError> {
        let parent = self.tree.parent(id).ok_or(HierarchyError::NotFound(id))?;
        Ok(self.tree.remove_child(parent, id)?)
    }

    /// Files whose build action is `Compile`, as resolved paths.
    /// 建置動作為 `Compile` 的檔案路徑。
    pub fn compile_items(&self) -> Vec<PathBuf> {
        self.tree
            .subtree(ItemId::ROOT)
            .into_iter()
            .filter(|id| {
                self.tree.node(*id).is_some_and(|node| {
                    node.kind() == NodeKind::File
                        && node
                            .attribute(attr::BUILD_ACTION)
                            .is_some_and(|action| action.eq_ignore_ascii_case(BUILD_ACTION_COMPILE))
                })
            })
            .filter_map(|id| self.tree.full_path(id))
            .collect()
    }

    pub fn references(&self) -> Vec<ReferenceInfo> {
        self.tree
            .children(self.references_folder)
            .filter_map(|id| {
                let node = self.tree.node(id)?;
                if node.is_project_reference() {
                    return None;
                }
                let name = node.caption().into_owned();
                Some(ReferenceInfo {
                    item: id,
                    assembly_name: node
                        .attribute(attr::ASSEMBLY_NAME)
                        .map(str::to_string)
                        .unwrap_or_else(|| name.clone()),
                    hint_path: node
                        .attribute(attr::HINT_PATH)
                        .map(|hint| {
                            let joined = resolve_stored(self.base_dir(), hint);
                            normalize(&joined).unwrap_or(joined)
                        }),
                    private: !node
                        .attribute(attr::PRIVATE)
                        .is_some_and(|value| value.eq_ignore_ascii_case("false")),
                    name,
                })
            })
            .collect()
    }

    pub fn project_references(&self) -> Vec<ProjectReferenceInfo> {
        self.tree
            .children(self.references_folder)
            .filter_map(|id| {
                let node = self.tree.node(id)?;
                let guid_text = node.attribute(attr::PROJECT)?;
                Some(ProjectReferenceInfo {
                    item: id,
                    name: node.caption().into_owned(),
                    guid: Uuid::parse_str(guid_text.trim()).ok(),
                })
            })
            .collect()
    }

    fn find_reference(&self, predicate: impl Fn(&Node) -> bool) -> Option<ItemId> {
        self.tree
            .children(self.references_folder)
            .find(|id| self.tree.node(*id).is_some_and(&predicate))
    }

    /// Parent folder for a file stored at `raw`, created on demand. Linked
    /// files (rooted or escaping the project directory) sit under the root.
    fn folder_for_file(&mut self, raw: &str) -> Result<ItemId, ProjectError> {
        let segments: Vec<&str> = split_stored(raw).collect();
        let escapes = segments.first().is_some_and(|first| *first == "..");
        if escapes || Path::new(raw).has_root() || raw.starts_with('\\') || segments.len() < 2 {
            return Ok(ItemId::ROOT);
        }
        let dir = segments[..segments.len() - 1].join("/");
        self.ensure_folder(&dir)
    }

    fn ensure_folder(&mut self, rel_path: &str) -> Result<ItemId, ProjectError> {
        let mut parent = ItemId::ROOT;
        let mut prefix: Vec<&str> = Vec::new();
        for segment in split_stored(rel_path) {
            prefix.push(segment);
            let stored = prefix.join("/");
            let full = resolve_stored(self.base_dir(), &stored);
            let full = normalize(&full).unwrap_or(full);
            let existing = self
                .tree
                .parse_canonical_name(&full.to_string_lossy());
            parent = if !existing.is_nil() && self.tree.kind(existing) == Some(NodeKind::Folder) {
                existing
            } else {
                self.tree.add_child(parent, Node::folder(stored))?
            };
        }
        Ok(parent)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn build_action_for(path: &Path) -> &'static str {
    let compiled = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| COMPILE_EXTENSIONS.contains(&ext.as_str()));
    if compiled {
        BUILD_ACTION_COMPILE
    } else {
        BUILD_ACTION_CONTENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
<Project Name="demo">
  <Property Name="AssemblyName" Value="demo"/>
  <Folder RelPath="docs"/>
  <File RelPath="src/util/strings.cs" BuildAction="Compile"/>
  <File RelPath="src/main.cs" BuildAction="Compile"/>
  <File RelPath="readme.txt" BuildAction="Content"/>
  <Reference Name="System.Xml" AssemblyName="System.Xml" Private="false"/>
  <Reference Name="Lib" HintPath="lib/Lib.dll"/>
</Project>
"#;

    fn sample() -> Project {
        let doc = ProjectDocument::from_xml(SAMPLE).unwrap();
        Project::from_document(PathBuf::from("/work/demo/demo.proj"), doc).unwrap()
    }

    fn captions(project: &Project, parent: ItemId) -> Vec<String> {
        let tree = project.tree();
        tree.children(parent)
            .filter_map(|id| tree.caption(id))
            .collect()
    }

    #[test]
    fn load_builds_sorted_tree_with_folder_chains() {
        let project = sample();
        assert_eq!(project.name(), "demo");
        assert_eq!(
            captions(&project, ItemId::ROOT),
            vec!["References", "docs", "src", "readme.txt"]
        );
        let src = project
            .tree()
            .parse_canonical_name("/work/demo/src");
        assert_eq!(captions(&project, src), vec!["util", "main.cs"]);
        assert_eq!(
            captions(&project, project.references_folder()),
            vec!["Lib", "System.Xml"]
        );
    }

    #[test]
    fn compile_items_and_references_resolve_paths() {
        let project = sample();
        let mut sources = project.compile_items();
        sources.sort();
        assert_eq!(
            sources,
            vec![
                PathBuf::from("/work/demo/src/main.cs"),
                PathBuf::from("/work/demo/src/util/strings.cs"),
            ]
        );
        let refs = project.references();
        let lib = refs.iter().find(|r| r.name == "Lib").unwrap();
        assert_eq!(lib.hint_path, Some(PathBuf::from("/work/demo/lib/Lib.dll")));
        assert!(lib.private);
        let xml = refs.iter().find(|r| r.name == "System.Xml").unwrap();
        assert!(!xml.private);
        assert_eq!(xml.assembly_path(), PathBuf::from("System.Xml.dll"));
    }

    #[test]
    fn add_files_classifies_and_links_outside_files() {
        let mut project = sample();
        let added = project
            .add_files(&[
                PathBuf::from("/work/demo/src/extra.cs"),
                PathBuf::from("/work/demo/assets/logo.png"),
                PathBuf::from("/shared/common.cs"),
                PathBuf::from("/work/demo/src/main.cs"),
            ])
            .unwrap();
        assert_eq!(added.len(), 3);
        let tree = project.tree();
        let logo = tree.parse_canonical_name("/work/demo/assets/logo.png");
        assert_eq!(
            tree.node(logo).and_then(|n| n.attribute(attr::BUILD_ACTION)),
            Some(BUILD_ACTION_CONTENT)
        );
        let common = tree.parse_canonical_name("/shared/common.cs");
        assert_eq!(tree.parent(common), Some(ItemId::ROOT));
        assert_eq!(tree.caption(common).as_deref(), Some("common.cs"));
        assert_eq!(project.compile_items().len(), 4);
    }

    #[test]
    fn add_reference_deduplicates_by_name() {
        let mut project = sample();
        let before = project.references().len();
        let existing = project.add_reference("system.xml", None, None).unwrap();
        assert_eq!(project.references().len(), before);
        assert_eq!(project.tree().caption(existing).as_deref(), Some("System.Xml"));

        let guid = Uuid::new_v4();
        let first = project.add_project_reference(guid, "core").unwrap();
        let second = project.add_project_reference(guid, "core").unwrap();
        assert_eq!(first, second);
        assert_eq!(project.project_references()[0].guid, Some(guid));
    }

    #[test]
    fn save_and_load_preserve_structure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut project = sample();
        project.save_as(temp.path().join("demo.proj")).unwrap();

        let reloaded = Project::load(temp.path().join("demo.proj")).unwrap();
        assert_eq!(reloaded.guid(), project.guid());
        assert_eq!(reloaded.tree().len(), project.tree().len());
        assert_eq!(
            captions(&reloaded, ItemId::ROOT),
            captions(&project, ItemId::ROOT)
        );
        assert_eq!(reloaded.property("AssemblyName"), Some("demo"));
    }

    #[test]
    fn load_reports_missing_file_with_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("absent.proj");
        let err = Project::load(&missing).unwrap_err();
        assert!(matches!(err, ProjectError::Read { ref path, .. } if path == &missing));
    }
}
