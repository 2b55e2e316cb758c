//! # Task Slab
//!
//! The single-threaded executor behind coroutines. Tasks live in a slab
//! keyed by id; wakers push ids onto a ready channel, and the clock drains
//! that channel after each timing-point's queue so resumed coroutines run
//! inside the phase that woke them.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::CoroutineError;

/// A spawned coroutine body.
pub(crate) type TaskFuture = Pin<Box<dyn Future<Output = Result<(), CoroutineError>> + Send>>;

/// Waker rejoining a task onto its clock's ready channel.
///
/// Sends are fine from any thread; the task itself is only ever polled on
/// the clock's owning thread.
struct TaskWaker {
    id: u64,
    ready: Sender<u64>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        let _ = self.ready.send(self.id);
    }
}

pub(crate) struct TaskSlab {
    tasks: Mutex<HashMap<u64, TaskFuture>>,
    next_id: AtomicU64,
    ready_tx: Sender<u64>,
    ready_rx: Receiver<u64>,
}

impl TaskSlab {
    pub(crate) fn new() -> Self {
        let (ready_tx, ready_rx) = unbounded();
        Self {
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            ready_tx,
            ready_rx,
        }
    }

    /// Stores a task without polling it.
    pub(crate) fn insert(&self, task: TaskFuture) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.lock().insert(id, task);
        id
    }

    /// Polls one task. Returns its result when it completed, `None` while
    /// it is still pending or when the id is gone (completed earlier, or a
    /// duplicate wake).
    ///
    /// The task is taken out of the slab for the duration of the poll, so a
    /// coroutine spawning further coroutines re-enters the slab safely.
    pub(crate) fn poll(&self, id: u64) -> Option<Result<(), CoroutineError>> {
        let mut task = self.tasks.lock().remove(&id)?;
        let waker = Waker::from(Arc::new(TaskWaker {
            id,
            ready: self.ready_tx.clone(),
        }));
        let mut cx = Context::from_waker(&waker);
        match task.as_mut().poll(&mut cx) {
            Poll::Pending => {
                self.tasks.lock().insert(id, task);
                None
            }
            Poll::Ready(result) => Some(result),
        }
    }

    /// Takes the next woken task id, if any.
    pub(crate) fn next_ready(&self) -> Option<u64> {
        self.ready_rx.try_recv().ok()
    }

    /// Number of tasks still in the slab.
    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Drops every task and drains the ready channel.
    pub(crate) fn clear(&self) {
        self.tasks.lock().clear();
        while self.ready_rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    /// A future that stays pending until its flag flips, re-waking itself
    /// through the stored waker.
    struct Gate {
        open: Arc<AtomicBool>,
        waker_out: Arc<Mutex<Option<Waker>>>,
    }

    impl Future for Gate {
        type Output = Result<(), CoroutineError>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            if self.open.load(Ordering::SeqCst) {
                Poll::Ready(Ok(()))
            } else {
                *self.waker_out.lock() = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    #[test]
    fn test_poll_to_completion() {
        let slab = TaskSlab::new();
        let id = slab.insert(Box::pin(async { Ok(()) }));
        assert!(matches!(slab.poll(id), Some(Ok(()))));
        assert_eq!(slab.len(), 0);
        // Completed id is gone.
        assert!(slab.poll(id).is_none());
    }

    #[test]
    fn test_wake_requeues_on_ready_channel() {
        let slab = TaskSlab::new();
        let open = Arc::new(AtomicBool::new(false));
        let waker_out = Arc::new(Mutex::new(None));
        let id = slab.insert(Box::pin(Gate {
            open: Arc::clone(&open),
            waker_out: Arc::clone(&waker_out),
        }));

        assert!(slab.poll(id).is_none());
        assert!(slab.next_ready().is_none());

        open.store(true, Ordering::SeqCst);
        waker_out.lock().take().unwrap().wake();
        assert_eq!(slab.next_ready(), Some(id));
        assert!(matches!(slab.poll(id), Some(Ok(()))));
    }

    #[test]
    fn test_clear_drops_pending_tasks() {
        let slab = TaskSlab::new();
        slab.insert(Box::pin(std::future::pending()));
        assert_eq!(slab.len(), 1);
        slab.clear();
        assert_eq!(slab.len(), 0);
    }
}
