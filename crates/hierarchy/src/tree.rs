use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::events::{DocumentCloser, HierarchyEvents, SinkCookie, SinkSet};
use crate::handle_table::{HandleTable, HandleTableError, ItemId};
use crate::node::{attr, compare_siblings, DocCookie, Node, NodeKind};
use crate::property::PropertyId;
use crate::util::{normalize, paths_equal, resolve_stored, split_stored};

/// Tree-manipulation errors.
/// 專案樹操作錯誤類型。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("item {0} not found")]
    NotFound(ItemId),
    #[error("item {0} cannot accept children")]
    InvalidParent(ItemId),
    #[error("item {child} is not a child of {parent}")]
    NotAChild { parent: ItemId, child: ItemId },
    #[error("item {item} cannot move under its own descendant {parent}")]
    Cycle { item: ItemId, parent: ItemId },
    #[error("item {0} cannot be renamed")]
    CannotRename(ItemId),
    #[error("invalid item name {0:?}")]
    InvalidName(String),
    #[error("an item named {0:?} already exists under the same parent")]
    DuplicateName(String),
    #[error(transparent)]
    Handle(#[from] HandleTableError),
}

/// Sorted project tree whose nodes live in a handle table.
/// 以代號表存放節點、維持排序的專案樹。
///
/// The root is addressed as [`ItemId::ROOT`] and is not stored in the table.
/// Parent, child and sibling links are handles, so a node never owns another
/// node directly.
/// 根節點以 `ItemId::ROOT` 表示且不在表格內；父、子與兄弟連結都是代號。
pub struct Hierarchy {
    file: PathBuf,
    base_dir: PathBuf,
    root: Node,
    nodes: HandleTable<Node>,
    sinks: SinkSet<dyn HierarchyEvents>,
    closer: Option<Box<dyn DocumentCloser>>,
}

impl std::fmt::Debug for Hierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hierarchy")
            .field("file", &self.file)
            .field("nodes", &self.nodes.len())
            .field("sinks", &self.sinks)
            .finish()
    }
}

impl Hierarchy {
    /// Creates a tree holding only the root for the project stored at `file`.
    /// 為位於 `file` 的專案建立只含根節點的樹。
    pub fn new(file: impl Into<PathBuf>, caption: impl Into<String>) -> Self {
        let file = file.into();
        let base_dir = base_dir_of(&file);
        Self {
            file,
            base_dir,
            root: Node::root(caption),
            nodes: HandleTable::new(),
            sinks: SinkSet::new(),
            closer: None,
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file
    }

    /// Directory that relative item paths resolve against.
    /// 相對路徑解析時使用的基準目錄。
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub(crate) fn set_file_path(&mut self, file: PathBuf) {
        self.base_dir = base_dir_of(&file);
        self.file = file;
    }

    pub fn advise(&mut self, sink: Box<dyn HierarchyEvents>) -> SinkCookie {
        self.sinks.advise(sink)
    }

    pub fn unadvise(&mut self, cookie: SinkCookie) -> bool {
        self.sinks.unadvise(cookie)
    }

    /// Installs the collaborator that closes editors of removed nodes.
    /// 設定在節點移除時關閉編輯器的協作者。
    pub fn set_document_closer(&mut self, closer: Box<dyn DocumentCloser>) {
        self.closer = Some(closer);
    }

    pub fn node(&self, id: ItemId) -> Option<&Node> {
        if id.is_root() {
            Some(&self.root)
        } else {
            self.nodes.get(id)
        }
    }

    pub(crate) fn node_mut(&mut self, id: ItemId) -> Option<&mut Node> {
        if id.is_root() {
            Some(&mut self.root)
        } else {
            self.nodes.get_mut(id)
        }
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.node(id).is_some()
    }

    /// Number of nodes below the root.
    /// 根節點以外的節點數量。
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, id: ItemId) -> Option<NodeKind> {
        self.node(id).map(Node::kind)
    }

    pub fn caption(&self, id: ItemId) -> Option<String> {
        self.node(id).map(|node| node.caption().into_owned())
    }

    pub fn parent(&self, id: ItemId) -> Option<ItemId> {
        self.node(id).map(Node::parent).filter(|parent| !parent.is_nil())
    }

    pub fn first_child(&self, id: ItemId) -> Option<ItemId> {
        self.node(id).map(Node::first_child).filter(|child| !child.is_nil())
    }

    pub fn next_sibling(&self, id: ItemId) -> Option<ItemId> {
        self.node(id).map(Node::next_sibling).filter(|next| !next.is_nil())
    }

    /// Iterates the children of `parent` in sibling order.
    /// 依兄弟順序列舉 `parent` 的子節點。
    pub fn children(&self, parent: ItemId) -> Children<'_> {
        Children {
            tree: self,
            next: self.node(parent).map_or(ItemId::NIL, Node::first_child),
        }
    }

    /// Pre-order list of `start` and everything below it.
    /// 以前序列出 `start` 與其所有後代。
    pub fn subtree(&self, start: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        let Some(node) = self.node(start) else {
            return out;
        };
        out.push(start);
        let mut stack = vec![node.first_child];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            out.push(id);
            stack.push(node.next_sibling);
            stack.push(node.first_child);
        }
        out
    }

    /// Inserts `node` under `parent`, keeping siblings sorted.
    /// 在 `parent` 下插入節點並維持兄弟排序。
    pub fn add_child(&mut self, parent: ItemId, node: Node) -> Result<ItemId, HierarchyError> {
        let parent_kind = self.kind(parent).ok_or(HierarchyError::NotFound(parent))?;
        if !parent_kind.is_container() {
            return Err(HierarchyError::InvalidParent(parent));
        }
        let id = self.nodes.add(node);
        let previous = self.link(parent, id)?;
        tracing::debug!(%parent, %previous, item = %id, "item added");
        self.sinks
            .notify("item_added", |sink| sink.on_item_added(parent, previous, id));
        Ok(id)
    }

    /// Removes `child` and, for containers, every descendant bottom-up.
    /// 移除 `child`；若為容器節點，先由下而上移除所有後代。
    ///
    /// Each removed node frees its handle, closes its open document and
    /// produces one `on_item_deleted`; a single `on_invalidate_items(parent)`
    /// follows.
    /// 每個被移除的節點都會釋放代號、關閉文件並發出一次 `on_item_deleted`。
    pub fn remove_child(&mut self, parent: ItemId, child: ItemId) -> Result<(), HierarchyError> {
        let linked_parent = self
            .nodes
            .get(child)
            .map(Node::parent)
            .ok_or(HierarchyError::NotAChild { parent, child })?;
        if linked_parent != parent {
            return Err(HierarchyError::NotAChild { parent, child });
        }

        let mut doomed = self.subtree(child);
        doomed.reverse();
        for id in doomed {
            let owner = self.nodes.get(id).map_or(ItemId::NIL, Node::parent);
            self.unlink(owner, id)?;
            self.release(id);
        }
        tracing::debug!(%parent, item = %child, "item removed");
        self.invalidate(parent);
        Ok(())
    }

    fn release(&mut self, id: ItemId) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        if let (Some(cookie), Some(closer)) = (node.doc_cookie, self.closer.as_mut()) {
            closer.close_document(id, cookie);
        }
        self.sinks
            .notify("item_deleted", |sink| sink.on_item_deleted(id));
    }

    fn link(&mut self, parent: ItemId, id: ItemId) -> Result<ItemId, HierarchyError> {
        let mut previous = ItemId::NIL;
        let mut current = self
            .node(parent)
            .ok_or(HierarchyError::NotFound(parent))?
            .first_child;
        {
            let inserted = self.nodes.get(id).ok_or(HierarchyError::NotFound(id))?;
            while !current.is_nil() {
                let existing = self.node(current).ok_or(HierarchyError::NotFound(current))?;
                if compare_siblings(existing, inserted) == Ordering::Greater {
                    break;
                }
                previous = current;
                current = existing.next_sibling;
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = parent;
            node.next_sibling = current;
        }
        let anchor = if previous.is_nil() { parent } else { previous };
        let anchor = self
            .node_mut(anchor)
            .ok_or(HierarchyError::NotFound(anchor))?;
        if previous.is_nil() {
            anchor.first_child = id;
        } else {
            anchor.next_sibling = id;
        }
        Ok(previous)
    }

    fn unlink(&mut self, parent: ItemId, id: ItemId) -> Result<(), HierarchyError> {
        let next = self
            .nodes
            .get(id)
            .ok_or(HierarchyError::NotFound(id))?
            .next_sibling;
        let first = self
            .node(parent)
            .ok_or(HierarchyError::NotAChild { parent, child: id })?
            .first_child;
        if first == id {
            if let Some(owner) = self.node_mut(parent) {
                owner.first_child = next;
            }
        } else {
            let mut current = first;
            loop {
                let sibling = self
                    .node(current)
                    .ok_or(HierarchyError::NotAChild { parent, child: id })?;
                if sibling.next_sibling == id {
                    break;
                }
                current = sibling.next_sibling;
            }
            if let Some(sibling) = self.nodes.get_mut(current) {
                sibling.next_sibling = next;
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = ItemId::NIL;
            node.next_sibling = ItemId::NIL;
        }
        Ok(())
    }

    /// Depth-first search of `start` and its descendants (children first,
    /// then siblings) for the node whose full path equals `path`. Nodes
    /// outside the subtree of `start` are never visited.
    /// 在 `start` 及其子孫中深度優先搜尋（先子節點再兄弟），找出完整路徑等於 `path` 的節點；
    /// 不會走出 `start` 的子樹。
    pub fn find_by_path(&self, start: ItemId, path: &Path) -> Option<ItemId> {
        let first = self.node(start)?.first_child;
        if self
            .full_path(start)
            .is_some_and(|candidate| paths_equal(&candidate, path))
        {
            return Some(start);
        }
        let mut stack = vec![first];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if self
                .full_path(id)
                .is_some_and(|candidate| paths_equal(&candidate, path))
            {
                return Some(id);
            }
            stack.push(node.next_sibling);
            stack.push(node.first_child);
        }
        None
    }

    /// Resolved location of a node. Malformed stored paths fall back to the
    /// raw attribute text.
    /// 節點的完整路徑；若儲存的路徑格式錯誤則退回原始字串。
    pub fn full_path(&self, id: ItemId) -> Option<PathBuf> {
        let node = self.node(id)?;
        let path = match node.kind() {
            NodeKind::Root => self.file.clone(),
            NodeKind::ReferenceFolder => PathBuf::from(node.caption().as_ref()),
            NodeKind::Folder | NodeKind::File => match node.attribute(attr::REL_PATH) {
                Some(raw) => self.resolve(raw),
                None => PathBuf::new(),
            },
            NodeKind::Reference => match node.attribute(attr::HINT_PATH) {
                Some(hint) => self.resolve(hint),
                None => {
                    let assembly = node
                        .attribute(attr::ASSEMBLY_NAME)
                        .or_else(|| node.attribute(attr::NAME))
                        .unwrap_or_default();
                    PathBuf::from(library_file_name(assembly))
                }
            },
        };
        Some(path)
    }

    fn resolve(&self, raw: &str) -> PathBuf {
        normalize(&resolve_stored(&self.base_dir, raw)).unwrap_or_else(|| PathBuf::from(raw))
    }

    /// Handle for a canonical name, or [`ItemId::NIL`].
    /// 以正規名稱查詢代號；找不到時回傳 `ItemId::NIL`。
    pub fn parse_canonical_name(&self, name: &str) -> ItemId {
        self.find_by_path(ItemId::ROOT, Path::new(name))
            .unwrap_or(ItemId::NIL)
    }

    pub fn get_canonical_name(&self, id: ItemId) -> Option<String> {
        self.full_path(id)
            .map(|path| path.to_string_lossy().into_owned())
    }

    /// Renames a node, rewriting stored paths below it and re-sorting it
    /// among its siblings.
    /// 重新命名節點，同步更新其下的儲存路徑並重新排序。
    pub fn rename(&mut self, id: ItemId, caption: &str) -> Result<(), HierarchyError> {
        let caption = caption.trim();
        if caption.is_empty() || caption.contains(['/', '\\']) {
            return Err(HierarchyError::InvalidName(caption.to_string()));
        }
        let node = self.node(id).ok_or(HierarchyError::NotFound(id))?;
        match node.kind() {
            NodeKind::ReferenceFolder => return Err(HierarchyError::CannotRename(id)),
            NodeKind::Root => {
                self.root.set_virtual_name(caption);
                self.notify_property(id, PropertyId::Caption);
                return Ok(());
            }
            _ => {}
        }
        if node.caption() == caption {
            return Ok(());
        }
        let kind = node.kind();
        let parent = node.parent;
        let clash = self.children(parent).any(|sibling| {
            sibling != id
                && self.node(sibling).is_some_and(|other| {
                    other.kind() == kind && other.caption().eq_ignore_ascii_case(caption)
                })
        });
        if clash {
            return Err(HierarchyError::DuplicateName(caption.to_string()));
        }

        match kind {
            NodeKind::Reference => {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.set_attribute(attr::NAME, caption);
                }
            }
            _ => {
                let linked = self
                    .nodes
                    .get(id)
                    .and_then(|node| node.attribute(attr::LINKED_INTO_PROJECT_AT))
                    .is_some();
                if linked {
                    if let Some(node) = self.nodes.get_mut(id) {
                        node.set_attribute(attr::LINKED_INTO_PROJECT_AT, caption);
                    }
                } else {
                    let old = self.rel_segments(id);
                    let mut new = old.clone();
                    new.pop();
                    new.push(caption.to_string());
                    self.rewrite_prefix(id, &old, &new);
                }
            }
        }

        let before = self.children(parent).collect::<Vec<_>>();
        self.unlink(parent, id)?;
        self.link(parent, id)?;
        let moved = self.children(parent).collect::<Vec<_>>() != before;
        tracing::debug!(item = %id, caption, "item renamed");
        self.notify_property(id, PropertyId::Caption);
        if moved {
            self.invalidate(parent);
        }
        Ok(())
    }

    /// Moves `id` under `new_parent`, keeping the same handle.
    /// 將節點移到 `new_parent` 之下，並沿用原本的代號。
    pub fn reparent(&mut self, id: ItemId, new_parent: ItemId) -> Result<(), HierarchyError> {
        if id.is_sentinel() || !self.nodes.contains(id) {
            return Err(HierarchyError::NotFound(id));
        }
        let parent_kind = self
            .kind(new_parent)
            .ok_or(HierarchyError::NotFound(new_parent))?;
        if !parent_kind.is_container() {
            return Err(HierarchyError::InvalidParent(new_parent));
        }
        if self.subtree(id).contains(&new_parent) {
            return Err(HierarchyError::Cycle {
                item: id,
                parent: new_parent,
            });
        }
        let old_parent = self.nodes.get(id).map_or(ItemId::NIL, Node::parent);
        if old_parent == new_parent {
            return Ok(());
        }

        self.unlink(old_parent, id)?;
        self.sinks
            .notify("item_deleted", |sink| sink.on_item_deleted(id));

        let old = self.rel_segments(id);
        if let Some(last) = old.last().cloned() {
            let mut new = self.rel_segments(new_parent);
            new.push(last);
            self.rewrite_prefix(id, &old, &new);
        }

        let node = self.nodes.remove(id).ok_or(HierarchyError::NotFound(id))?;
        self.nodes.replace(id, node)?;
        let previous = self.link(new_parent, id)?;
        tracing::debug!(item = %id, from = %old_parent, to = %new_parent, "item moved");
        self.sinks.notify("item_added", |sink| {
            sink.on_item_added(new_parent, previous, id)
        });
        Ok(())
    }

    /// Stored path segments of a folder or file; empty for other kinds and
    /// for rooted paths.
    fn rel_segments(&self, id: ItemId) -> Vec<String> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        if !matches!(node.kind(), NodeKind::Folder | NodeKind::File) {
            return Vec::new();
        }
        match node.attribute(attr::REL_PATH) {
            Some(raw) if !is_rooted(raw) => split_stored(raw).map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    fn rewrite_prefix(&mut self, start: ItemId, old: &[String], new: &[String]) {
        if old.is_empty() {
            return;
        }
        for id in self.subtree(start) {
            let segments = self.rel_segments(id);
            let matches = segments.len() >= old.len()
                && segments
                    .iter()
                    .zip(old)
                    .all(|(a, b)| a.eq_ignore_ascii_case(b));
            if !matches {
                continue;
            }
            let rewritten = new
                .iter()
                .chain(&segments[old.len()..])
                .cloned()
                .collect::<Vec<_>>()
                .join("/");
            if let Some(node) = self.nodes.get_mut(id) {
                node.set_attribute(attr::REL_PATH, rewritten);
            }
        }
    }

    pub fn set_expanded(&mut self, id: ItemId, expanded: bool) -> Result<(), HierarchyError> {
        let node = self.node_mut(id).ok_or(HierarchyError::NotFound(id))?;
        if node.expanded != expanded {
            node.expanded = expanded;
            self.notify_property(id, PropertyId::Expanded);
        }
        Ok(())
    }

    /// Records (or clears) the editor that has the node open.
    /// 記錄或清除開啟此節點的編輯器。
    pub fn set_doc_cookie(
        &mut self,
        id: ItemId,
        cookie: Option<DocCookie>,
    ) -> Result<(), HierarchyError> {
        let node = self.node_mut(id).ok_or(HierarchyError::NotFound(id))?;
        node.doc_cookie = cookie;
        self.notify_property(id, PropertyId::ItemDocCookie);
        Ok(())
    }

    /// Tells observers that children were appended in bulk under `parent`.
    /// 通知觀察者 `parent` 下已批次加入子節點。
    pub fn notify_items_appended(&mut self, parent: ItemId) {
        self.sinks
            .notify("items_appended", |sink| sink.on_items_appended(parent));
    }

    /// Tells observers the children of `parent` must be re-read.
    /// 通知觀察者需重新讀取 `parent` 的子節點。
    pub fn invalidate(&mut self, parent: ItemId) {
        self.sinks
            .notify("invalidate_items", |sink| sink.on_invalidate_items(parent));
    }

    pub(crate) fn notify_property(&mut self, id: ItemId, property: PropertyId) {
        self.sinks.notify("property_changed", |sink| {
            sink.on_property_changed(id, property, 0)
        });
    }
}

/// Iterator over the children of one node.
/// 單一節點子節點的迭代器。
pub struct Children<'a> {
    tree: &'a Hierarchy,
    next: ItemId,
}

impl Iterator for Children<'_> {
    type Item = ItemId;

    fn next(&mut self) -> Option<ItemId> {
        if self.next.is_nil() {
            return None;
        }
        let current = self.next;
        self.next = self
            .tree
            .node(current)
            .map_or(ItemId::NIL, Node::next_sibling);
        Some(current)
    }
}

fn base_dir_of(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_rooted(raw: &str) -> bool {
    raw.starts_with(['/', '\\']) || raw.get(1..2) == Some(":")
}

/// Appends `.dll` unless the name already carries it.
/// 若名稱尚未以 `.dll` 結尾則補上。
pub fn library_file_name(assembly: &str) -> String {
    if assembly.to_ascii_lowercase().ends_with(".dll") {
        assembly.to_string()
    } else {
        format!("{assembly}.dll")
    }
}
