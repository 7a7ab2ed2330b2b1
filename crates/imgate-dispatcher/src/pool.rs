//! A small free-list of [`Task`] allocations, to reduce churn under
//! sustained load.

use std::sync::Mutex;
use std::time::Instant;

use imgate_session::Session;
use std::sync::Arc;

/// One unit of dispatcher work: a frame received on a session, queued for
/// a worker to parse and route.
pub struct Task {
    /// The session the frame arrived on.
    pub session: Option<Arc<Session>>,
    /// The raw frame bytes.
    pub bytes: Vec<u8>,
    /// When the frame was accepted, for staleness checks at dequeue.
    pub received_at: Option<Instant>,
}

impl Task {
    fn empty() -> Self {
        Self { session: None, bytes: Vec::new(), received_at: None }
    }

    fn fill(&mut self, session: Arc<Session>, bytes: Vec<u8>) {
        self.session = Some(session);
        self.bytes = bytes;
        self.received_at = Some(Instant::now());
    }

    fn reset(&mut self) {
        self.session = None;
        self.bytes.clear();
        self.received_at = None;
    }
}

/// Bounded free-list of [`Task`] records.
///
/// `acquire` pops a recycled record if one is available, otherwise
/// allocates a fresh one; `release` clears and returns a record to the
/// pool, up to `capacity`. This is a plain allocation-pressure
/// optimization, not a correctness requirement — a full pool just drops
/// the returned task.
pub struct TaskPool {
    free: Mutex<Vec<Box<Task>>>,
    capacity: usize,
}

impl TaskPool {
    /// Build a pool that retains at most `capacity` recycled tasks.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { free: Mutex::new(Vec::with_capacity(capacity.min(256))), capacity }
    }

    /// Acquire a task record, populated with `session`/`bytes`.
    pub fn acquire(&self, session: Arc<Session>, bytes: Vec<u8>) -> Box<Task> {
        let mut task = {
            let mut free = self.free.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            free.pop().unwrap_or_else(|| Box::new(Task::empty()))
        };
        task.fill(session, bytes);
        task
    }

    /// Return `task` to the pool for reuse, if there is room.
    pub fn release(&self, mut task: Box<Task>) {
        task.reset();
        let mut free = self.free.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if free.len() < self.capacity {
            free.push(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgate_session::{Session, SessionTransport};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeTransport {
        closed: AtomicBool,
    }

    #[async_trait::async_trait]
    impl SessionTransport for FakeTransport {
        async fn send(&self, _frame: Vec<u8>) -> Result<(), String> {
            Ok(())
        }
        async fn ping(&self) -> Result<(), String> {
            Ok(())
        }
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn fake_session() -> Arc<Session> {
        Arc::new(Session::new(
            "s1".to_string(),
            "u1".to_string(),
            "127.0.0.1:1".to_string(),
            Arc::new(FakeTransport { closed: AtomicBool::new(false) }),
        ))
    }

    #[test]
    fn acquire_then_release_reuses_the_allocation() {
        let pool = TaskPool::new(4);
        let task = pool.acquire(fake_session(), vec![1, 2, 3]);
        let ptr = std::ptr::addr_of!(*task) as usize;
        pool.release(task);

        let task2 = pool.acquire(fake_session(), vec![4]);
        assert_eq!(std::ptr::addr_of!(*task2) as usize, ptr);
        assert_eq!(task2.bytes, vec![4]);
    }

    #[test]
    fn release_beyond_capacity_is_dropped_silently() {
        let pool = TaskPool::new(1);
        pool.release(Box::new(Task::empty()));
        pool.release(Box::new(Task::empty()));
        assert_eq!(pool.free.lock().unwrap().len(), 1);
    }
}
