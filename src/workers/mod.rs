//! Optional worker pool (spec §4.K, component K).
//!
//! Fans byte-level prediction requests across a fixed set of workers, each
//! handling at most one in-flight request. A worker that just finished
//! immediately claims the next queued request itself rather than handing
//! off to a background executor — no `tokio::spawn` needed, keeping this
//! module as executor-agnostic as the rest of the crate.

use crate::{Error, Result};
use async_trait::async_trait;
use futures::channel::oneshot;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One backend capable of running a request to completion. Typically a
/// thin wrapper around a [`crate::model::ByteModel`] call.
#[async_trait]
pub trait Worker<Req: Send, Resp: Send>: Send + Sync {
    async fn run(&self, req: Req) -> Resp;
}

struct Pending<Req, Resp> {
    req: Req,
    respond: oneshot::Sender<Result<Resp>>,
}

struct Inner<Req, Resp> {
    idle: Vec<usize>,
    pending: VecDeque<Pending<Req, Resp>>,
    disposed: bool,
}

/// FIFO queue of pending requests over `workers.len()` slots (spec §4.K).
pub struct WorkerPool<W, Req, Resp> {
    workers: Vec<W>,
    inner: Mutex<Inner<Req, Resp>>,
}

impl<W, Req, Resp> WorkerPool<W, Req, Resp>
where
    W: Worker<Req, Resp>,
    Req: Send,
    Resp: Send,
{
    pub fn new(workers: Vec<W>) -> Self {
        let idle = (0..workers.len()).collect();
        WorkerPool {
            workers,
            inner: Mutex::new(Inner { idle, pending: VecDeque::new(), disposed: false }),
        }
    }

    fn is_disposed(&self) -> bool {
        self.inner.lock().unwrap().disposed
    }

    /// Submits `req`. Resolves once some worker has run it, or with
    /// `Cancelled` if the pool is (or becomes) disposed first.
    pub async fn submit(&self, req: Req) -> Result<Resp> {
        let claimed = {
            let mut inner = self.inner.lock().unwrap();
            if inner.disposed {
                return Err(Error::Cancelled);
            }
            inner.idle.pop()
        };
        match claimed {
            Some(worker_idx) => self.run_worker_loop(worker_idx, req).await,
            None => {
                let (tx, rx) = oneshot::channel();
                {
                    let mut inner = self.inner.lock().unwrap();
                    if inner.disposed {
                        return Err(Error::Cancelled);
                    }
                    inner.pending.push_back(Pending { req, respond: tx });
                }
                rx.await.map_err(|_| Error::Cancelled)?
            }
        }
    }

    /// Runs `req` on `worker_idx`, then keeps draining the pending queue on
    /// that same worker until it is empty, at which point the worker
    /// returns to the idle list. This is what makes a completion
    /// immediately dispatch the next pending request (spec §4.K) without a
    /// background task.
    async fn run_worker_loop(&self, worker_idx: usize, req: Req) -> Result<Resp> {
        let resp = self.workers[worker_idx].run(req).await;
        let result = if self.is_disposed() { Err(Error::Cancelled) } else { Ok(resp) };

        loop {
            let next = {
                let mut inner = self.inner.lock().unwrap();
                if inner.disposed {
                    inner.idle.push(worker_idx);
                    break;
                }
                inner.pending.pop_front()
            };
            match next {
                Some(Pending { req, respond }) => {
                    let resp = self.workers[worker_idx].run(req).await;
                    let outcome = if self.is_disposed() { Err(Error::Cancelled) } else { Ok(resp) };
                    let _ = respond.send(outcome);
                }
                None => {
                    let mut inner = self.inner.lock().unwrap();
                    inner.idle.push(worker_idx);
                    break;
                }
            }
        }
        result
    }

    /// Rejects every pending request with `Cancelled` immediately, and
    /// marks the pool so in-flight requests are rejected the moment their
    /// worker finishes (the underlying work still runs to completion —
    /// there is no way to preempt an arbitrary in-flight future — but its
    /// result is discarded in favour of the terminal error).
    pub fn dispose(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.disposed = true;
        while let Some(Pending { respond, .. }) = inner.pending.pop_front() {
            let _ = respond.send(Err(Error::Cancelled));
        }
    }
}
