use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use crate::graph::path::DependencyPath;
use crate::graph::value::Value;
use crate::worker::thread::WorkerMsg;

/// A fan-out branch offered to another worker.
///
/// Whoever flips `claimed` first evaluates the branch: either the sibling that received it, or
/// the delegating worker when it joins before the sibling got to it.
pub struct SiblingJob {
    path: DependencyPath,
    claimed: Arc<AtomicBool>,
    reply: mpsc::Sender<Value>,
}

impl SiblingJob {
    pub fn path(&self) -> DependencyPath {
        self.path
    }

    /// Take ownership of the branch. Only one caller ever gets `true`.
    pub fn claim(&self) -> bool {
        try_claim(&self.claimed)
    }

    pub fn reply(self, value: Value) {
        // The delegating worker may have given up on the branch; nothing to do then.
        let _ = self.reply.send(value);
    }
}

fn try_claim(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// A branch handed out by [`Siblings::dispatch`], awaiting [`Siblings::join`].
pub(crate) struct Branch {
    path: DependencyPath,
    claimed: Arc<AtomicBool>,
    reply: Option<mpsc::Receiver<Value>>,
}

/// Inboxes of the other workers of a pool, used round-robin.
#[derive(Default)]
pub struct Siblings {
    peers: Vec<mpsc::Sender<WorkerMsg>>,
    next: Cell<usize>,
}

impl Siblings {
    pub fn new(peers: Vec<mpsc::Sender<WorkerMsg>>) -> Self {
        Self {
            peers,
            next: Cell::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Offer every path to a sibling. With no siblings, branches are left for the join.
    pub(crate) fn dispatch(&self, paths: &[DependencyPath]) -> Vec<Branch> {
        paths
            .iter()
            .map(|&path| {
                let claimed = Arc::new(AtomicBool::new(false));
                if self.peers.is_empty() {
                    return Branch {
                        path,
                        claimed,
                        reply: None,
                    };
                }
                let i = self.next.get() % self.peers.len();
                self.next.set(i + 1);

                let (tx, rx) = mpsc::channel();
                let job = SiblingJob {
                    path,
                    claimed: Arc::clone(&claimed),
                    reply: tx,
                };
                let reply = match self.peers[i].send(WorkerMsg::Sibling(job)) {
                    Ok(()) => Some(rx),
                    Err(_) => {
                        tracing::debug!(sibling = i, "sibling inbox closed; branch stays local");
                        None
                    }
                };
                Branch {
                    path,
                    claimed,
                    reply,
                }
            })
            .collect()
    }

    /// Wait for every branch, in dispatch order.
    ///
    /// Branches nobody picked up yet are evaluated through `inline` first; only then does the
    /// join block on siblings, so it never waits on a branch that is not being worked on.
    pub(crate) fn join(
        &self,
        branches: Vec<Branch>,
        mut inline: impl FnMut(DependencyPath) -> Value,
    ) -> Vec<Value> {
        let mut out: Vec<Option<Value>> = branches
            .iter()
            .map(|b| try_claim(&b.claimed).then(|| inline(b.path)))
            .collect();

        for (slot, branch) in out.iter_mut().zip(branches) {
            if slot.is_some() {
                continue;
            }
            let value = match branch.reply {
                Some(rx) => rx.recv().unwrap_or_else(|_| {
                    tracing::debug!(node = %branch.path.source(), "sibling dropped a branch");
                    Value::None
                }),
                None => Value::None,
            };
            *slot = Some(value);
        }
        out.into_iter().map(Option::unwrap_or_default).collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/worker/sibling.rs"]
mod tests;
