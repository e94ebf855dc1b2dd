use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use trellis_hierarchy::{panic_message, HandleTable, SinkCookie};

/// Observer of a build session's progress. Called from the build worker.
/// 建置工作階段進度的觀察者；由背景工作者呼叫。
///
/// Returning `false` from `build_begin` or `tick` asks the build to stop.
/// `build_begin` 或 `tick` 回傳 `false` 表示要求停止建置。
pub trait BuildStatusCallback: Send + Sync {
    fn build_begin(&self) -> bool {
        true
    }

    fn tick(&self) -> bool {
        true
    }

    fn build_end(&self, _success: bool) {}
}

type Slots = HandleTable<Arc<dyn BuildStatusCallback>>;

/// Registered status observers, shared with the worker thread.
/// 已註冊的狀態觀察者，與背景工作者共用。
#[derive(Clone, Default)]
pub(crate) struct CallbackSet {
    slots: Arc<Mutex<Slots>>,
}

impl std::fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSet")
            .field("live", &self.snapshot().len())
            .finish()
    }
}

impl CallbackSet {
    pub(crate) fn advise(&self, callback: Arc<dyn BuildStatusCallback>) -> SinkCookie {
        SinkCookie::from_item(self.slots().add(callback))
    }

    pub(crate) fn unadvise(&self, cookie: SinkCookie) -> bool {
        cookie
            .item()
            .and_then(|id| self.slots().remove(id))
            .is_some()
    }

    /// Delivers `build_begin`; every observer is asked, any refusal wins.
    /// 傳送 `build_begin`；每個觀察者都會被詢問，任一拒絕即停止。
    pub(crate) fn begin(&self) -> bool {
        self.ask("build_begin", |callback| callback.build_begin())
    }

    pub(crate) fn tick(&self) -> bool {
        self.ask("tick", |callback| callback.tick())
    }

    pub(crate) fn end(&self, success: bool) {
        for callback in self.snapshot() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback.build_end(success))) {
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    "build_end observer panicked"
                );
            }
        }
    }

    fn ask(&self, event: &'static str, call: impl Fn(&dyn BuildStatusCallback) -> bool) -> bool {
        let mut proceed = true;
        for callback in self.snapshot() {
            match catch_unwind(AssertUnwindSafe(|| call(callback.as_ref()))) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(event, "build observer asked to stop");
                    proceed = false;
                }
                Err(payload) => {
                    tracing::error!(
                        event,
                        panic = %panic_message(payload.as_ref()),
                        "build observer panicked"
                    );
                }
            }
        }
        proceed
    }

    // Observers run without the table locked so they may unadvise themselves.
    fn snapshot(&self) -> Vec<Arc<dyn BuildStatusCallback>> {
        self.slots()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
