//! Async coordinator (component G): tracks in-progress nodes, and carries
//! the resume/cancel/wait handles a [`crate::reconcile::Status`] hands back
//! to the caller.
//!
//! A configurator never hands the engine a future to poll. Instead it calls
//! [`OpContext::continue_in_background`], gets back a [`BackgroundHandle`],
//! spawns its own `tokio::spawn`'d task, and calls [`BackgroundHandle::done`]
//! from inside that task when the real work finishes. The coordinator only
//! ever sees the resulting [`Completion`] messages; it never owns a
//! `JoinHandle` for work it did not spawn.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::OperationKind;
use crate::item::NodeId;

/// The outcome of one background operation, sent back to the coordinator
/// from whatever task the configurator spawned.
pub struct Completion {
    pub node: NodeId,
    pub operation: OperationKind,
    pub result: Result<(), Box<dyn std::error::Error + Send + Sync>>,
}

/// Passed to every `Configurator::create`/`modify`/`delete` call.
pub struct OpContext {
    pub(crate) node: NodeId,
    pub(crate) operation: OperationKind,
    pub(crate) subgraph: String,
    pub(crate) cancellation: CancellationToken,
    pub(crate) completions: mpsc::UnboundedSender<Completion>,
    pub(crate) resume_tx: mpsc::Sender<String>,
    went_async: Rc<Cell<bool>>,
}

impl OpContext {
    /// The ambient cancellation token for the pass this call belongs to.
    /// Background tasks should `select!` on [`CancellationToken::cancelled`]
    /// and treat it the same as an operation error.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Moves this call off the synchronous path. The driver marks the node
    /// in-progress and moves on to schedule independent work; the returned
    /// handle must eventually be resolved with [`BackgroundHandle::done`]
    /// from whatever task the configurator spawns.
    pub fn continue_in_background(&self) -> BackgroundHandle {
        self.went_async.set(true);
        BackgroundHandle {
            node: self.node.clone(),
            operation: self.operation,
            subgraph: self.subgraph.clone(),
            completions: self.completions.clone(),
            resume_tx: self.resume_tx.clone(),
        }
    }

    pub(crate) fn went_async(&self) -> bool {
        self.went_async.get()
    }
}

/// Returned by [`OpContext::continue_in_background`]. `Send` so it can be
/// moved into a spawned task.
pub struct BackgroundHandle {
    node: NodeId,
    operation: OperationKind,
    subgraph: String,
    completions: mpsc::UnboundedSender<Completion>,
    resume_tx: mpsc::Sender<String>,
}

impl BackgroundHandle {
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Reports that the background operation finished, and immediately
    /// announces the owning subgraph on the resume channel so a caller
    /// parked on `readyToResume` wakes without waiting for another
    /// `reconcile` call to drain this completion. If the receiving
    /// coordinator has already been dropped both sends are a no-op: there is
    /// no one left to resume.
    pub fn done(self, result: Result<(), Box<dyn std::error::Error + Send + Sync>>) {
        let _ = self.resume_tx.try_send(self.subgraph);
        let _ = self.completions.send(Completion {
            node: self.node,
            operation: self.operation,
            result,
        });
    }
}

pub(crate) struct CoordinatorInner {
    pub(crate) in_progress: HashSet<NodeId>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    resume_tx: mpsc::Sender<String>,
}

/// Owns the bookkeeping a reconcile pass needs for background operations:
/// which nodes are in flight, the completions channel their handles report
/// to, and the resume channel the caller polls.
pub(crate) struct AsyncCoordinator {
    inner: Rc<RefCell<CoordinatorInner>>,
    cancellation: CancellationToken,
    resume_channel_capacity: usize,
}

impl AsyncCoordinator {
    pub(crate) fn new(resume_channel_capacity: usize, cancellation: CancellationToken) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (resume_tx, _resume_rx) = mpsc::channel(resume_channel_capacity.max(1));
        Self {
            inner: Rc::new(RefCell::new(CoordinatorInner {
                in_progress: HashSet::new(),
                completions_tx,
                completions_rx,
                resume_tx,
            })),
            cancellation,
            resume_channel_capacity,
        }
    }

    pub(crate) fn op_context(&self, node: NodeId, operation: OperationKind, subgraph: String) -> OpContext {
        let inner = self.inner.borrow();
        OpContext {
            node,
            operation,
            subgraph,
            cancellation: self.cancellation.clone(),
            completions: inner.completions_tx.clone(),
            resume_tx: inner.resume_tx.clone(),
            went_async: Rc::new(Cell::new(false)),
        }
    }

    pub(crate) fn mark_in_progress(&self, node: NodeId) {
        self.inner.borrow_mut().in_progress.insert(node);
    }

    pub(crate) fn is_in_progress(&self, node: &NodeId) -> bool {
        self.inner.borrow().in_progress.contains(node)
    }

    /// Drains every completion already delivered without blocking, applying
    /// `apply` to each and clearing the node's in-progress flag. Called at
    /// the start of every pass so a prior pass's background results are
    /// absorbed before scheduling new work.
    pub(crate) fn drain_ready(&self, mut apply: impl FnMut(Completion)) {
        loop {
            let next = self.inner.borrow_mut().completions_rx.try_recv().ok();
            let Some(completion) = next else {
                break;
            };
            self.inner.borrow_mut().in_progress.remove(&completion.node);
            apply(completion);
        }
    }

    pub(crate) fn has_in_progress(&self) -> bool {
        !self.inner.borrow().in_progress.is_empty()
    }

    /// Replaces the resume channel with a fresh pair and returns the new
    /// receiving end. Any previously-returned [`ResumeReceiver`] is
    /// invalidated (its sender is dropped), matching the "valid until the
    /// next reconcile" contract on the resume channel.
    pub(crate) fn next_resume_receiver(&self) -> ResumeReceiver {
        let (tx, rx) = mpsc::channel(self.resume_channel_capacity.max(1));
        self.inner.borrow_mut().resume_tx = tx;
        ResumeReceiver { rx }
    }

    pub(crate) fn wait_for_async_ops(&self) -> WaitForAsyncOps {
        WaitForAsyncOps {
            inner: Rc::clone(&self.inner),
        }
    }

    pub(crate) fn cancel_async_ops(&self) -> CancelAsyncOps {
        CancelAsyncOps {
            cancellation: self.cancellation.clone(),
        }
    }
}

/// Single-consumer handle delivering the name of a subgraph whose async
/// operation finished. Valid until the next `reconcile` call replaces it.
pub struct ResumeReceiver {
    rx: mpsc::Receiver<String>,
}

impl ResumeReceiver {
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

/// Idempotent cancellation of every outstanding background task registered
/// against the pass that produced this handle.
#[derive(Clone)]
pub struct CancelAsyncOps {
    cancellation: CancellationToken,
}

impl CancelAsyncOps {
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}

/// Completion barrier: blocks until every currently in-progress node's
/// background operation has reported back.
pub struct WaitForAsyncOps {
    inner: Rc<RefCell<CoordinatorInner>>,
}

impl WaitForAsyncOps {
    pub async fn wait(self) {
        loop {
            if self.inner.borrow().in_progress.is_empty() {
                return;
            }
            let completion = {
                let mut inner = self.inner.borrow_mut();
                inner.completions_rx.recv().await
            };
            let Some(completion) = completion else {
                return;
            };
            self.inner.borrow_mut().in_progress.remove(&completion.node);
        }
    }
}
