use std::fmt;

use thiserror::Error;

use crate::handle_table::ItemId;
use crate::node::{attr, DocCookie, NodeKind};
use crate::tree::{Hierarchy, HierarchyError};

/// Properties the shell can read or write through a handle.
/// 外殼可透過代號讀寫的屬性。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyId {
    Parent,
    FirstChild,
    NextSibling,
    Caption,
    Name,
    SaveName,
    EditLabel,
    Expandable,
    Expanded,
    ExpandByDefault,
    IconIndex,
    ItemDocCookie,
    FullPath,
    BuildAction,
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Loosely typed property value.
/// 屬性值。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Item(ItemId),
    Text(String),
    Bool(bool),
    Int(u32),
    Cookie(Option<DocCookie>),
}

impl PropertyValue {
    fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Item(_) => "item",
            PropertyValue::Text(_) => "text",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Cookie(_) => "cookie",
        }
    }
}

/// Icon slots used by the tree view.
pub mod icon {
    pub const PROJECT: u32 = 0;
    pub const FOLDER_CLOSED: u32 = 1;
    pub const FOLDER_OPEN: u32 = 2;
    pub const FILE: u32 = 3;
    pub const REFERENCE_FOLDER: u32 = 4;
    pub const REFERENCE: u32 = 5;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PropertyError {
    #[error("item {0} not found")]
    NotFound(ItemId),
    #[error("property {0} is read-only")]
    ReadOnly(PropertyId),
    #[error("property {property} expects a {expected} value, got {actual}")]
    TypeMismatch {
        property: PropertyId,
        expected: &'static str,
        actual: &'static str,
    },
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

impl Hierarchy {
    /// Reads a property; `None` when the handle or property does not apply.
    /// 讀取屬性；代號不存在或屬性不適用時回傳 `None`。
    pub fn get_property(&self, id: ItemId, property: PropertyId) -> Option<PropertyValue> {
        let node = self.node(id)?;
        let kind = node.kind();
        let value = match property {
            PropertyId::Parent => PropertyValue::Item(node.parent()),
            PropertyId::FirstChild => PropertyValue::Item(node.first_child()),
            PropertyId::NextSibling => PropertyValue::Item(node.next_sibling()),
            PropertyId::Caption | PropertyId::Name => {
                PropertyValue::Text(node.caption().into_owned())
            }
            PropertyId::EditLabel => {
                if kind == NodeKind::ReferenceFolder {
                    return None;
                }
                PropertyValue::Text(node.caption().into_owned())
            }
            PropertyId::SaveName => {
                if !matches!(kind, NodeKind::Root | NodeKind::File) {
                    return None;
                }
                let path = self.full_path(id)?;
                PropertyValue::Text(path.file_name()?.to_string_lossy().into_owned())
            }
            PropertyId::Expandable => PropertyValue::Bool(!node.first_child().is_nil()),
            PropertyId::Expanded => PropertyValue::Bool(node.is_expanded()),
            PropertyId::ExpandByDefault => PropertyValue::Bool(kind == NodeKind::Root),
            PropertyId::IconIndex => PropertyValue::Int(match kind {
                NodeKind::Root => icon::PROJECT,
                NodeKind::Folder if node.is_expanded() => icon::FOLDER_OPEN,
                NodeKind::Folder => icon::FOLDER_CLOSED,
                NodeKind::File => icon::FILE,
                NodeKind::ReferenceFolder => icon::REFERENCE_FOLDER,
                NodeKind::Reference => icon::REFERENCE,
            }),
            PropertyId::ItemDocCookie => PropertyValue::Cookie(Some(node.doc_cookie()?)),
            PropertyId::FullPath => {
                PropertyValue::Text(self.full_path(id)?.to_string_lossy().into_owned())
            }
            PropertyId::BuildAction => {
                PropertyValue::Text(node.attribute(attr::BUILD_ACTION)?.to_string())
            }
        };
        Some(value)
    }

    /// Writes a property. Only `Expanded`, `EditLabel` and `ItemDocCookie`
    /// are writable.
    /// 寫入屬性；僅 `Expanded`、`EditLabel` 與 `ItemDocCookie` 可寫。
    pub fn set_property(
        &mut self,
        id: ItemId,
        property: PropertyId,
        value: PropertyValue,
    ) -> Result<(), PropertyError> {
        if !self.contains(id) {
            return Err(PropertyError::NotFound(id));
        }
        match (property, value) {
            (PropertyId::Expanded, PropertyValue::Bool(expanded)) => {
                self.set_expanded(id, expanded)?;
            }
            (PropertyId::EditLabel, PropertyValue::Text(label)) => {
                self.rename(id, &label)?;
            }
            (PropertyId::ItemDocCookie, PropertyValue::Cookie(cookie)) => {
                self.set_doc_cookie(id, cookie)?;
            }
            (PropertyId::Expanded, other) => return Err(mismatch(property, "bool", &other)),
            (PropertyId::EditLabel, other) => return Err(mismatch(property, "text", &other)),
            (PropertyId::ItemDocCookie, other) => {
                return Err(mismatch(property, "cookie", &other))
            }
            (read_only, _) => return Err(PropertyError::ReadOnly(read_only)),
        }
        Ok(())
    }
}

fn mismatch(property: PropertyId, expected: &'static str, actual: &PropertyValue) -> PropertyError {
    PropertyError::TypeMismatch {
        property,
        expected,
        actual: actual.kind_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn tree() -> (Hierarchy, ItemId, ItemId) {
        let mut tree = Hierarchy::new("/p/demo.proj", "demo");
        let folder = tree.add_child(ItemId::ROOT, Node::folder("src")).unwrap();
        let file = tree
            .add_child(
                folder,
                Node::file("src/a.cs").with_attribute(attr::BUILD_ACTION, "Compile"),
            )
            .unwrap();
        (tree, folder, file)
    }

    #[test]
    fn structural_properties_expose_links() {
        let (tree, folder, file) = tree();
        assert_eq!(
            tree.get_property(folder, PropertyId::FirstChild),
            Some(PropertyValue::Item(file))
        );
        assert_eq!(
            tree.get_property(file, PropertyId::NextSibling),
            Some(PropertyValue::Item(ItemId::NIL))
        );
        assert_eq!(
            tree.get_property(ItemId::ROOT, PropertyId::Parent),
            Some(PropertyValue::Item(ItemId::NIL))
        );
        assert_eq!(
            tree.get_property(file, PropertyId::SaveName),
            Some(PropertyValue::Text("a.cs".into()))
        );
        assert_eq!(
            tree.get_property(file, PropertyId::BuildAction),
            Some(PropertyValue::Text("Compile".into()))
        );
        assert_eq!(tree.get_property(folder, PropertyId::SaveName), None);
    }

    #[test]
    fn stale_handles_read_as_absent() {
        let (mut tree, folder, file) = tree();
        tree.remove_child(folder, file).unwrap();
        assert_eq!(tree.get_property(file, PropertyId::Caption), None);
        assert_eq!(
            tree.set_property(file, PropertyId::Expanded, PropertyValue::Bool(true)),
            Err(PropertyError::NotFound(file))
        );
    }

    #[test]
    fn expanded_and_icon_follow_state() {
        let (mut tree, folder, _) = tree();
        tree.set_property(folder, PropertyId::Expanded, PropertyValue::Bool(true))
            .unwrap();
        assert_eq!(
            tree.get_property(folder, PropertyId::IconIndex),
            Some(PropertyValue::Int(icon::FOLDER_OPEN))
        );
    }

    #[test]
    fn edit_label_renames_and_rejects_wrong_types() {
        let (mut tree, _, file) = tree();
        tree.set_property(file, PropertyId::EditLabel, PropertyValue::Text("b.cs".into()))
            .unwrap();
        assert_eq!(tree.caption(file).as_deref(), Some("b.cs"));
        assert_eq!(
            tree.set_property(file, PropertyId::EditLabel, PropertyValue::Bool(true)),
            Err(PropertyError::TypeMismatch {
                property: PropertyId::EditLabel,
                expected: "text",
                actual: "bool",
            })
        );
        assert_eq!(
            tree.set_property(file, PropertyId::Caption, PropertyValue::Text("x".into())),
            Err(PropertyError::ReadOnly(PropertyId::Caption))
        );
    }
}
