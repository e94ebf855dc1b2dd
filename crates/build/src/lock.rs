use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::cancel::CancelToken;

/// The one build lock of a workspace. Clones refer to the same lock.
/// 工作區唯一的建置鎖；複本指向同一把鎖。
#[derive(Clone, Debug, Default)]
pub struct BuildLock {
    holder: Arc<Mutex<Option<String>>>,
}

impl BuildLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock if it is free.
    /// 鎖空閒時取得之。
    pub fn try_acquire(&self, owner: &str) -> Option<BuildLockGuard> {
        let mut holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        if holder.is_some() {
            return None;
        }
        *holder = Some(owner.to_string());
        Some(BuildLockGuard {
            holder: Arc::clone(&self.holder),
        })
    }

    /// Waits for the lock, polling every `poll`, and gives up once `cancel`
    /// fires.
    /// 每隔 `poll` 嘗試取得鎖；`cancel` 觸發時放棄等待。
    pub fn acquire(
        &self,
        owner: &str,
        poll: Duration,
        cancel: &CancelToken,
    ) -> Option<BuildLockGuard> {
        let mut announced = false;
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(guard) = self.try_acquire(owner) {
                tracing::debug!(owner, "build lock acquired");
                return Some(guard);
            }
            if !announced {
                tracing::debug!(owner, holder = ?self.holder(), "waiting for build lock");
                announced = true;
            }
            thread::sleep(poll);
        }
    }

    /// Name of the session currently holding the lock.
    /// 目前持有鎖的工作階段名稱。
    pub fn holder(&self) -> Option<String> {
        self.holder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_held(&self) -> bool {
        self.holder().is_some()
    }
}

/// Releases the build lock on drop.
/// 離開作用域時釋放建置鎖。
#[derive(Debug)]
pub struct BuildLockGuard {
    holder: Arc<Mutex<Option<String>>>,
}

impl Drop for BuildLockGuard {
    fn drop(&mut self) {
        let mut holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(owner) = holder.take() {
            tracing::debug!(%owner, "build lock released");
        }
    }
}
