//! In-process relay queue for tests and dry runs.

use super::{QueueError, RelayQueue};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    queues: HashMap<String, VecDeque<String>>,
    append_calls: usize,
    fail_appends: bool,
}

/// Named FIFO queues held in memory. Clones share the same queues.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl std::fmt::Debug for MemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryQueue")
            .field("queues", &inner.queues.len())
            .field("append_calls", &inner.append_calls)
            .finish()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `append_batch` calls made so far.
    pub fn append_calls(&self) -> usize {
        self.inner.lock().append_calls
    }

    /// Make every following append fail until reset.
    pub fn set_fail_appends(&self, fail: bool) {
        self.inner.lock().fail_appends = fail;
    }

    pub fn len(&self, queue: &str) -> usize {
        self.inner.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Current contents of `queue`, oldest first.
    pub fn snapshot(&self, queue: &str) -> Vec<String> {
        self.inner
            .lock()
            .queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn try_pop(&self, queue: &str) -> Option<String> {
        self.inner.lock().queues.get_mut(queue)?.pop_front()
    }
}

#[async_trait]
impl RelayQueue for MemoryQueue {
    async fn append_batch(&self, queue: &str, items: &[String]) -> Result<u64, QueueError> {
        let len = {
            let mut inner = self.inner.lock();
            inner.append_calls += 1;
            if inner.fail_appends {
                return Err(QueueError::Unavailable("appends disabled".into()));
            }
            let entries = inner.queues.entry(queue.to_string()).or_default();
            entries.extend(items.iter().cloned());
            entries.len() as u64
        };
        self.notify.notify_waiters();
        Ok(len)
    }

    async fn pop_blocking(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, QueueError> {
        let deadline = (!timeout.is_zero()).then(|| tokio::time::Instant::now() + timeout);

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop(queue) {
                return Ok(Some(item));
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(self.try_pop(queue));
                    }
                }
            }
        }
    }
}
