use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::handle_table::ItemId;
use crate::util::split_stored;

/// Names of the string attributes an item element carries.
/// 項目元素可攜帶的字串屬性名稱。
pub mod attr {
    pub const REL_PATH: &str = "RelPath";
    pub const NAME: &str = "Name";
    pub const ASSEMBLY_NAME: &str = "AssemblyName";
    pub const HINT_PATH: &str = "HintPath";
    pub const BUILD_ACTION: &str = "BuildAction";
    pub const SUB_TYPE: &str = "SubType";
    pub const PRIVATE: &str = "Private";
    pub const PROJECT: &str = "Project";
    pub const LINKED_INTO_PROJECT_AT: &str = "LinkedIntoProjectAt";
}

/// Value of the `BuildAction` attribute for compiled sources.
pub const BUILD_ACTION_COMPILE: &str = "Compile";
/// Value of the `BuildAction` attribute for content files.
pub const BUILD_ACTION_CONTENT: &str = "Content";

/// The kind of a tree node.
/// 樹節點的類型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    ReferenceFolder,
    Folder,
    File,
    Reference,
}

impl NodeKind {
    /// Whether the node may own children.
    /// 節點是否可擁有子節點。
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeKind::Root | NodeKind::Folder | NodeKind::ReferenceFolder
        )
    }

    fn rank(self) -> u8 {
        match self {
            NodeKind::Root => 0,
            NodeKind::ReferenceFolder => 1,
            NodeKind::Folder => 2,
            NodeKind::File => 3,
            NodeKind::Reference => 4,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeKind::Root => "project",
            NodeKind::ReferenceFolder => "references",
            NodeKind::Folder => "folder",
            NodeKind::File => "file",
            NodeKind::Reference => "reference",
        };
        f.write_str(label)
    }
}

/// Identifies an editor that currently has the node's document open.
/// 代表目前開啟此節點文件的編輯器。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocCookie(pub u32);

/// One entry of the project tree.
/// 專案樹中的一個節點。
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    kind: NodeKind,
    attributes: BTreeMap<String, String>,
    virtual_name: Option<String>,
    pub(crate) parent: ItemId,
    pub(crate) first_child: ItemId,
    pub(crate) next_sibling: ItemId,
    pub(crate) expanded: bool,
    pub(crate) doc_cookie: Option<DocCookie>,
}

impl Node {
    fn with_kind(kind: NodeKind) -> Self {
        Self {
            kind,
            attributes: BTreeMap::new(),
            virtual_name: None,
            parent: ItemId::NIL,
            first_child: ItemId::NIL,
            next_sibling: ItemId::NIL,
            expanded: false,
            doc_cookie: None,
        }
    }

    pub(crate) fn root(caption: impl Into<String>) -> Self {
        let mut node = Self::with_kind(NodeKind::Root);
        node.virtual_name = Some(caption.into());
        node.expanded = true;
        node
    }

    /// Virtual folder that groups references.
    /// 用來收納參考的虛擬資料夾。
    pub fn reference_folder(caption: impl Into<String>) -> Self {
        let mut node = Self::with_kind(NodeKind::ReferenceFolder);
        node.virtual_name = Some(caption.into());
        node
    }

    pub fn folder(rel_path: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Folder).with_attribute(attr::REL_PATH, rel_path)
    }

    pub fn file(rel_path: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::File).with_attribute(attr::REL_PATH, rel_path)
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Reference).with_attribute(attr::NAME, name)
    }

    /// Builds a node from a persisted element's attributes.
    /// 由已儲存元素的屬性建立節點。
    pub fn from_attributes(kind: NodeKind, attributes: BTreeMap<String, String>) -> Self {
        let mut node = Self::with_kind(kind);
        node.attributes = attributes;
        node
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn parent(&self) -> ItemId {
        self.parent
    }

    pub fn first_child(&self) -> ItemId {
        self.first_child
    }

    pub fn next_sibling(&self) -> ItemId {
        self.next_sibling
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn doc_cookie(&self) -> Option<DocCookie> {
        self.doc_cookie
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub(crate) fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    pub fn virtual_name(&self) -> Option<&str> {
        self.virtual_name.as_deref()
    }

    pub(crate) fn set_virtual_name(&mut self, name: impl Into<String>) {
        self.virtual_name = Some(name.into());
    }

    /// Marks a reference node that points at another project.
    /// 是否為指向其他專案的參考。
    pub fn is_project_reference(&self) -> bool {
        self.kind == NodeKind::Reference && self.attribute(attr::PROJECT).is_some()
    }

    /// Display caption derived from the node kind.
    /// 依節點類型推導出的顯示名稱。
    pub fn caption(&self) -> Cow<'_, str> {
        match self.kind {
            NodeKind::Root | NodeKind::ReferenceFolder => {
                Cow::Borrowed(self.virtual_name.as_deref().unwrap_or_default())
            }
            NodeKind::Folder => Cow::Borrowed(self.last_segment()),
            NodeKind::File => match self.attribute(attr::LINKED_INTO_PROJECT_AT) {
                Some(linked) => Cow::Borrowed(linked),
                None => Cow::Borrowed(self.last_segment()),
            },
            NodeKind::Reference => self
                .attribute(attr::NAME)
                .or_else(|| self.attribute(attr::ASSEMBLY_NAME))
                .map(Cow::Borrowed)
                .unwrap_or_default(),
        }
    }

    fn last_segment(&self) -> &str {
        self.attribute(attr::REL_PATH)
            .and_then(|raw| split_stored(raw).last())
            .unwrap_or_default()
    }
}

/// Sibling order: reference folder, folders, files, then references; nodes
/// of the same kind compare by caption ignoring case.
/// 兄弟節點排序：參考資料夾、資料夾、檔案、參考；同類型以不分大小寫的名稱比較。
pub fn compare_siblings(left: &Node, right: &Node) -> Ordering {
    left.kind
        .rank()
        .cmp(&right.kind.rank())
        .then_with(|| {
            let a = left.caption();
            let b = right.caption();
            let folded = a
                .chars()
                .flat_map(char::to_lowercase)
                .cmp(b.chars().flat_map(char::to_lowercase));
            folded.then_with(|| a.cmp(&b))
        })
}
