use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cooperative cancellation shared between a build session and its worker.
/// 建置工作階段與背景工作者共用的協作式取消旗標。
///
/// Any clone may cancel; every clone observes it. An optional deadline
/// turns into cancellation once it passes.
/// 任何複本都可以取消，所有複本都會看到；設定的期限到達後也視為取消。
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Mutex<Option<Instant>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once `cancel` was called or the deadline passed.
    /// 已呼叫 `cancel` 或已超過期限時為 true。
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst) || self.timed_out()
    }

    /// True when the deadline, if any, has passed.
    /// 期限已過時為 true。
    pub fn timed_out(&self) -> bool {
        self.deadline()
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Arms a deadline `timeout` from now; `None` disarms it.
    /// 從現在起設定 `timeout` 的期限；`None` 表示取消期限。
    pub fn arm(&self, timeout: Option<Duration>) {
        let mut deadline = self
            .inner
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *deadline = timeout.map(|timeout| Instant::now() + timeout);
    }

    fn deadline(&self) -> Option<Instant> {
        *self
            .inner
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn clones_share_cancellation() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(!token.timed_out());
    }

    #[test]
    fn deadline_turns_into_cancellation() {
        let token = CancelToken::new();
        token.arm(Some(Duration::from_millis(10)));
        assert!(!token.is_cancelled());
        thread::sleep(Duration::from_millis(30));
        assert!(token.timed_out());
        assert!(token.is_cancelled());

        token.arm(None);
        assert!(!token.timed_out());
    }
}
