use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors returned by [`AdmissionGate::acquire`]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    /// The pending request was discarded by [`AdmissionGate::cancel_all`]
    #[error("admission request cancelled")]
    Cancelled,
}

#[derive(Debug)]
struct GateState {
    running: usize,
    max_concurrent: usize,
    waiters: VecDeque<oneshot::Sender<GatePermit>>,
}

#[derive(Debug)]
struct GateInner {
    state: Mutex<GateState>,
}

impl GateState {
    /// Take a slot; callers have checked there is room
    fn admit(&mut self) {
        self.running += 1;
        debug_assert!(
            self.running <= self.max_concurrent,
            "admitted {} over a ceiling of {}",
            self.running,
            self.max_concurrent
        );
    }
}

impl GateInner {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(self: &Arc<Self>) {
        let mut state = self.lock();
        state.running = state.running.saturating_sub(1);
        Self::promote(self, &mut state);
    }

    /// Hand permits to queued waiters, oldest first, while there is room.
    fn promote(this: &Arc<Self>, state: &mut GateState) {
        while state.running < state.max_concurrent {
            let Some(waiter) = state.waiters.pop_front() else {
                break;
            };

            state.admit();
            if let Err(mut permit) = waiter.send(GatePermit::new(Arc::clone(this))) {
                // Waiter went away before admission; undo without re-entering the lock
                permit.disarm();
                state.running -= 1;
            }
        }
    }
}

/// Counting admission gate with a reconfigurable ceiling and a FIFO wait queue.
///
/// Unlike a plain semaphore the ceiling can move at any time:
/// - lowering it never preempts holders, the gate just stops admitting until
///   `running` falls below the new ceiling;
/// - raising it admits queued waiters immediately, in arrival order.
///
/// A ceiling of zero admits nothing. Mapping "0 threads" to the CPU count is the
/// caller's job.
///
/// Each admission is represented by a [`GatePermit`]; dropping the permit releases
/// the slot exactly once, on every exit path.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

impl AdmissionGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(GateInner {
                state: Mutex::new(GateState {
                    running: 0,
                    max_concurrent,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// Set the ceiling for future admissions
    pub fn configure(&self, max_concurrent: usize) {
        let mut state = self.inner.lock();
        if state.max_concurrent != max_concurrent {
            tracing::debug!(
                "Admission ceiling {} -> {} (running: {}, waiting: {})",
                state.max_concurrent,
                max_concurrent,
                state.running,
                state.waiters.len()
            );
        }
        state.max_concurrent = max_concurrent;
        GateInner::promote(&self.inner, &mut state);
    }

    /// Wait for a slot
    ///
    /// Returns immediately when below the ceiling, otherwise queues behind earlier
    /// callers. Dropping the returned future before admission forfeits the place in
    /// the queue without leaking a slot.
    ///
    /// # Errors
    /// [`GateError::Cancelled`] if the request was discarded by [`cancel_all`](Self::cancel_all)
    pub async fn acquire(&self) -> Result<GatePermit, GateError> {
        let rx = {
            let mut state = self.inner.lock();
            if state.running < state.max_concurrent && state.waiters.is_empty() {
                state.admit();
                return Ok(GatePermit::new(Arc::clone(&self.inner)));
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        rx.await.map_err(|_| GateError::Cancelled)
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<GatePermit> {
        let mut state = self.inner.lock();
        if state.running < state.max_concurrent && state.waiters.is_empty() {
            state.admit();
            Some(GatePermit::new(Arc::clone(&self.inner)))
        } else {
            None
        }
    }

    /// Discard every queued request; their `acquire` calls resolve to `Cancelled`
    ///
    /// # Returns
    /// The number of requests discarded
    pub fn cancel_all(&self) -> usize {
        let dropped: Vec<_> = self.inner.lock().waiters.drain(..).collect();
        let count = dropped.len();
        // Senders are dropped outside the lock
        drop(dropped);

        if count > 0 {
            tracing::info!("Cancelled {} queued admission request(s)", count);
        }
        count
    }

    pub fn running(&self) -> usize {
        self.inner.lock().running
    }

    pub fn waiting(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.lock().max_concurrent
    }
}

/// A held admission slot; released on drop
#[derive(Debug)]
#[must_use = "dropping a permit releases its slot immediately"]
pub struct GatePermit {
    gate: Option<Arc<GateInner>>,
}

impl GatePermit {
    fn new(gate: Arc<GateInner>) -> Self {
        Self { gate: Some(gate) }
    }

    fn disarm(&mut self) {
        self.gate = None;
    }

    /// Release the slot now rather than at end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.release();
        }
    }
}
