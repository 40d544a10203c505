//! Promises and the job queue
//!
//! A [`Promise`] is a single-assignment deferred result. Reactions never
//! run synchronously: settling a promise enqueues one job per reaction on
//! the host's [`JobQueue`], and the host drains the queue with
//! [`Interp::run_jobs`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::error::{EngineResult, Exception};
use crate::interp::Interp;
use crate::value::Value;

// ============================================================================
// Jobs
// ============================================================================

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce(&mut Interp<'_>)>;

/// FIFO of pending jobs.
#[derive(Default)]
pub struct JobQueue {
    jobs: VecDeque<Job>,
}

impl JobQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job.
    pub fn push(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    /// Take the oldest job.
    pub fn pop(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobQueue({} pending)", self.jobs.len())
    }
}

// ============================================================================
// Promise
// ============================================================================

/// Observable state of a promise.
#[derive(Clone, Debug)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Exception),
}

type Reaction = Box<dyn FnOnce(&mut Interp<'_>, EngineResult<Value>)>;

struct PromiseInner {
    state: PromiseState,
    /// Set once the promise has adopted another promise's outcome.
    locked: bool,
    reactions: Vec<Reaction>,
}

/// Shared handle to a deferred result.
#[derive(Clone)]
pub struct Promise(Rc<RefCell<PromiseInner>>);

impl Promise {
    fn with_state(state: PromiseState) -> Self {
        Promise(Rc::new(RefCell::new(PromiseInner {
            state,
            locked: false,
            reactions: Vec::new(),
        })))
    }

    /// A pending promise.
    pub fn new() -> Self {
        Self::with_state(PromiseState::Pending)
    }

    /// A promise already fulfilled with `value`.
    pub fn resolved(value: Value) -> Self {
        Self::with_state(PromiseState::Fulfilled(value))
    }

    /// A promise already rejected with `reason`.
    pub fn rejected(reason: Exception) -> Self {
        Self::with_state(PromiseState::Rejected(reason))
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PromiseState {
        self.0.borrow().state.clone()
    }

    /// Still waiting for an outcome?
    pub fn is_pending(&self) -> bool {
        matches!(self.0.borrow().state, PromiseState::Pending)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Fulfil.
    pub fn resolve(&self, interp: &mut Interp<'_>, value: Value) {
        self.settle(interp, Ok(value));
    }

    /// Reject.
    pub fn reject(&self, interp: &mut Interp<'_>, reason: Exception) {
        self.settle(interp, Err(reason));
    }

    /// Settle with an outcome. Fulfilling with another promise adopts its
    /// eventual outcome. Settling twice is a no-op.
    pub fn settle(&self, interp: &mut Interp<'_>, outcome: EngineResult<Value>) {
        {
            let inner = self.0.borrow();
            if inner.locked || !matches!(inner.state, PromiseState::Pending) {
                return;
            }
        }

        if let Ok(value) = &outcome {
            if let Some(other) = value.as_promise() {
                if other.ptr_eq(self) {
                    self.settle(
                        interp,
                        Err(Exception::type_error("chaining cycle detected for promise")),
                    );
                    return;
                }
                self.0.borrow_mut().locked = true;
                let target = self.clone();
                other.subscribe(
                    interp,
                    Box::new(move |interp, outcome| target.finish(interp, outcome)),
                );
                return;
            }
        }

        self.finish(interp, outcome);
    }

    fn finish(&self, interp: &mut Interp<'_>, outcome: EngineResult<Value>) {
        let reactions = {
            let mut inner = self.0.borrow_mut();
            if !matches!(inner.state, PromiseState::Pending) {
                return;
            }
            inner.state = match &outcome {
                Ok(value) => PromiseState::Fulfilled(value.clone()),
                Err(reason) => PromiseState::Rejected(reason.clone()),
            };
            std::mem::take(&mut inner.reactions)
        };
        for reaction in reactions {
            let outcome = outcome.clone();
            interp.enqueue(Box::new(move |interp| reaction(interp, outcome)));
        }
    }

    fn subscribe(&self, interp: &mut Interp<'_>, reaction: Reaction) {
        let outcome = match self.state() {
            PromiseState::Pending => {
                self.0.borrow_mut().reactions.push(reaction);
                return;
            }
            PromiseState::Fulfilled(value) => Ok(value),
            PromiseState::Rejected(reason) => Err(reason),
        };
        interp.enqueue(Box::new(move |interp| reaction(interp, outcome)));
    }

    /// Chain handlers for both outcomes, returning the derived promise.
    pub fn then<F, R>(&self, interp: &mut Interp<'_>, on_fulfilled: F, on_rejected: R) -> Promise
    where
        F: FnOnce(&mut Interp<'_>, Value) -> EngineResult<Value> + 'static,
        R: FnOnce(&mut Interp<'_>, Exception) -> EngineResult<Value> + 'static,
    {
        let derived = Promise::new();
        let next = derived.clone();
        self.subscribe(
            interp,
            Box::new(move |interp, outcome| {
                let result = match outcome {
                    Ok(value) => on_fulfilled(interp, value),
                    Err(reason) => on_rejected(interp, reason),
                };
                next.settle(interp, result);
            }),
        );
        derived
    }

    /// Chain a fulfilment handler; rejections pass through.
    pub fn map<F>(&self, interp: &mut Interp<'_>, on_fulfilled: F) -> Promise
    where
        F: FnOnce(&mut Interp<'_>, Value) -> EngineResult<Value> + 'static,
    {
        self.then(interp, on_fulfilled, |_, reason| Err(reason))
    }
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Promise").field(&self.0.borrow().state).finish()
    }
}
