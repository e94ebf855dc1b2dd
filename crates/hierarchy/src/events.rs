//! Observer registration and isolated fan-out.
//! 觀察者註冊與彼此隔離的事件派送。

use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::handle_table::{HandleTable, ItemId};
use crate::node::DocCookie;
use crate::property::PropertyId;

/// Result an observer hands back from a notification.
/// 觀察者處理通知後回傳的結果。
pub type ObserverResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Cookie returned by `advise`; pass it to `unadvise` to detach.
/// `advise` 回傳的憑證，交給 `unadvise` 以解除註冊。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkCookie(u32);

impl SinkCookie {
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Cookie for the handle a sink occupies in its table.
    /// 觀察者在表中所佔 handle 對應的憑證。
    pub fn from_item(id: ItemId) -> Self {
        Self(id.as_u32() + 1)
    }

    pub fn item(self) -> Option<ItemId> {
        self.0.checked_sub(1).map(ItemId::from_raw)
    }
}

impl fmt::Display for SinkCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receives structural changes of a hierarchy.
/// 接收專案樹結構變動的觀察者。
pub trait HierarchyEvents {
    fn on_item_added(&mut self, _parent: ItemId, _previous: ItemId, _added: ItemId) -> ObserverResult {
        Ok(())
    }

    fn on_item_deleted(&mut self, _item: ItemId) -> ObserverResult {
        Ok(())
    }

    fn on_items_appended(&mut self, _parent: ItemId) -> ObserverResult {
        Ok(())
    }

    fn on_property_changed(&mut self, _item: ItemId, _property: PropertyId, _flags: u32) -> ObserverResult {
        Ok(())
    }

    fn on_invalidate_items(&mut self, _parent: ItemId) -> ObserverResult {
        Ok(())
    }
}

/// Closes editors for nodes that leave the tree.
/// 節點離開專案樹時負責關閉對應的編輯器。
pub trait DocumentCloser {
    fn close_document(&mut self, item: ItemId, cookie: DocCookie);
}

/// Set of registered observers of one trait object type.
/// 同一種觀察者介面的註冊集合。
pub struct SinkSet<S: ?Sized> {
    sinks: HandleTable<Box<S>>,
}

impl<S: ?Sized> Default for SinkSet<S> {
    fn default() -> Self {
        Self {
            sinks: HandleTable::new(),
        }
    }
}

impl<S: ?Sized> fmt::Debug for SinkSet<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkSet")
            .field("len", &self.sinks.len())
            .finish()
    }
}

impl<S: ?Sized> SinkSet<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advise(&mut self, sink: Box<S>) -> SinkCookie {
        SinkCookie::from_item(self.sinks.add(sink))
    }

    pub fn unadvise(&mut self, cookie: SinkCookie) -> bool {
        cookie
            .item()
            .and_then(|id| self.sinks.remove(id))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Delivers one notification to every sink. A sink that fails or panics
    /// is logged and skipped; the others still receive the event.
    /// 將通知送給每個觀察者；失敗或 panic 的觀察者只記錄並略過，不影響其他人。
    pub fn notify<F>(&mut self, event: &'static str, mut deliver: F)
    where
        F: FnMut(&mut S) -> ObserverResult,
    {
        for (id, sink) in self.sinks.iter_mut() {
            let cookie = SinkCookie::from_item(id);
            match panic::catch_unwind(AssertUnwindSafe(|| deliver(sink.as_mut()))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(%cookie, event, error = %err, "observer rejected notification");
                }
                Err(payload) => {
                    tracing::error!(
                        %cookie,
                        event,
                        panic = %panic_message(payload.as_ref()),
                        "observer panicked during notification"
                    );
                }
            }
        }
    }
}

/// Text carried by a panic payload.
/// panic 內容中的文字。
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
