//! Task groups: a set of background tasks sharing one stop signal.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Background tasks owned by one service, stopped together.
pub struct TaskGroup {
    name: &'static str,
    shutdown: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskGroup {
    pub fn new(name: &'static str) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            name,
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Receiver fired when the group stops.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Spawn `task` on the runtime as a member of this group.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.adopt(tokio::spawn(task));
    }

    /// Track a task spawned elsewhere.
    pub fn adopt(&self, handle: JoinHandle<()>) {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signal every task and wait for them, giving up after `timeout`.
    pub async fn stop(&self, timeout: Duration) {
        let _ = self.shutdown.send(());
        let handles: Vec<JoinHandle<()>> = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        if handles.is_empty() {
            return;
        }
        let count = handles.len();
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(timeout, wait_all).await.is_err() {
            let stuck = aborts.iter().filter(|a| !a.is_finished()).count();
            for abort in &aborts {
                abort.abort();
            }
            tracing::warn!(
                group = self.name,
                ?timeout,
                stuck,
                "shutdown timeout, aborting remaining tasks"
            );
        } else {
            tracing::debug!(group = self.name, tasks = count, "task group stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn stop_signals_and_joins_tasks() {
        let group = TaskGroup::new("test");
        let finished = Arc::new(AtomicBool::new(false));
        let mut rx = group.subscribe();
        let flag = finished.clone();
        group.spawn(async move {
            let _ = rx.recv().await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(group.len(), 1);

        group.stop(Duration::from_secs(1)).await;
        assert!(finished.load(Ordering::SeqCst));
        assert!(group.is_empty());
    }

    /// Sets its flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn stop_aborts_stuck_tasks() {
        let group = TaskGroup::new("stuck");
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());
        group.spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
        group.stop(Duration::from_millis(20)).await;
        assert!(group.is_empty());

        // the aborted future is dropped on its next poll by the runtime
        for _ in 0..100 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(dropped.load(Ordering::SeqCst));
    }
}
