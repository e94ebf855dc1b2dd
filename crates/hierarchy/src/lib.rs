//! Project hierarchy model: handle table, sorted item tree, change
//! notifications and the persisted project document.
//! 專案階層模型：代號表、排序的項目樹、變更通知與專案文件。

mod util;

pub mod document;
pub mod events;
pub mod handle_table;
pub mod node;
pub mod project;
pub mod property;
pub mod tree;

pub use document::{
    ConfigurationGroup, ItemElement, ItemType, ProjectDocument, PropertyEntry, DEFAULT_PLATFORM,
};
pub use events::{
    panic_message, DocumentCloser, HierarchyEvents, ObserverResult, SinkCookie, SinkSet,
};
pub use handle_table::{HandleTable, HandleTableError, ItemId};
pub use node::{attr, compare_siblings, DocCookie, Node, NodeKind, BUILD_ACTION_COMPILE, BUILD_ACTION_CONTENT};
pub use project::{
    Project, ProjectError, ProjectReferenceInfo, ReferenceInfo, COMPILE_EXTENSIONS,
    REFERENCES_CAPTION,
};
pub use property::{icon, PropertyError, PropertyId, PropertyValue};
pub use tree::{library_file_name, Children, Hierarchy, HierarchyError};
pub use util::{
    normalize as normalize_path, paths_equal, resolve_stored as resolve_stored_path, write_atomic,
};
