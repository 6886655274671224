//! Deferred task scheduling.
//!
//! The manager never flushes inline with a mark. It hands one task per cycle
//! to a `Scheduler`, which runs it at the end of the current unit of work.
//! `TaskQueue` is the explicit queue used when no host event loop exists:
//! the owner of the unit of work calls `run_until_idle` when it is done.
//!
//! Schedulers also drive background futures, such as a refresh nobody awaits,
//! so their bookkeeping completes without a handle holder.

use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use std::cell::RefCell;
use std::collections::VecDeque;
use tracing::warn;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Runs tasks at the end of the current unit of work.
pub trait Scheduler {
    /// Enqueues a task. Must not run it synchronously.
    fn schedule(&self, task: Task);

    /// Drives `future` to completion in the background.
    fn spawn(&self, future: LocalBoxFuture<'static, ()>);
}

/// A FIFO task queue drained explicitly by its owner, with a local pool for
/// background futures.
pub struct TaskQueue {
    tasks: RefCell<VecDeque<Task>>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl Default for TaskQueue {
    fn default() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            tasks: RefCell::new(VecDeque::new()),
            pool: RefCell::new(pool),
            spawner,
        }
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Runs the oldest queued task. Returns false if the queue was empty.
    pub fn run_next(&self) -> bool {
        // Release the borrow before running: tasks may enqueue more tasks
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Polls background futures until none can make progress.
    ///
    /// Must not be called from inside a background future.
    pub fn run_futures(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Runs tasks and background futures, including work either of them
    /// enqueues, until both are idle. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut count = 0;
        loop {
            while self.run_next() {
                count += 1;
            }
            self.run_futures();
            if self.is_empty() {
                return count;
            }
        }
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }

    fn spawn(&self, future: LocalBoxFuture<'static, ()>) {
        if let Err(err) = self.spawner.spawn_local(future) {
            warn!(error = %err, "background future dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_task_queue_defers() {
        let queue = TaskQueue::new();
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();

        queue.schedule(Box::new(move || ran_clone.set(true)));
        assert!(!ran.get());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.run_until_idle(), 1);
        assert!(ran.get());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_task_queue_runs_nested_tasks() {
        let queue = Rc::new(TaskQueue::new());
        let order = Rc::new(RefCell::new(Vec::new()));

        let queue_clone = queue.clone();
        let order_clone = order.clone();
        queue.schedule(Box::new(move || {
            order_clone.borrow_mut().push(1);
            let order_inner = order_clone.clone();
            queue_clone.schedule(Box::new(move || order_inner.borrow_mut().push(2)));
        }));

        assert_eq!(queue.run_until_idle(), 2);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_spawned_future_runs_on_idle() {
        let queue = Rc::new(TaskQueue::new());
        let (sender, receiver) = futures::channel::oneshot::channel::<u32>();
        let seen = Rc::new(Cell::new(0));

        let seen_clone = seen.clone();
        let queue_clone = queue.clone();
        queue.spawn(Box::pin(async move {
            if let Ok(value) = receiver.await {
                seen_clone.set(value);
                let seen_inner = seen_clone.clone();
                queue_clone.schedule(Box::new(move || seen_inner.set(seen_inner.get() + 1)));
            }
        }));

        assert_eq!(queue.run_until_idle(), 0);
        assert_eq!(seen.get(), 0);

        sender.send(41).unwrap();
        // The future wakes, then schedules a task that runs in the same drain
        assert_eq!(queue.run_until_idle(), 1);
        assert_eq!(seen.get(), 42);
    }

    #[test]
    fn test_run_next_empty() {
        let queue = TaskQueue::new();
        assert!(!queue.run_next());
    }
}
