// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-key ordered execution of async work.
//!
//! Work submitted for the same key runs strictly in submission order, each
//! piece starting only after the previous one finished (or panicked). Work
//! for different keys runs concurrently.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::Shared;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

struct Tail {
    ticket: u64,
    done: Shared<oneshot::Receiver<()>>,
}

/// Chains async work per key onto a tokio runtime.
pub struct KeyedSequencer<K> {
    tails: Arc<DashMap<K, Tail>>,
    next_ticket: AtomicU64,
}

impl<K> Default for KeyedSequencer<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            tails: Arc::new(DashMap::new()),
            next_ticket: AtomicU64::new(0),
        }
    }
}

impl<K> KeyedSequencer<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `work` on `runtime` behind everything already queued for `key`.
    ///
    /// Never blocks; safe to call from synchronous callbacks.
    pub fn submit<Fut>(&self, runtime: &Handle, key: K, work: Fut) -> JoinHandle<()>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel::<()>();
        let previous = self
            .tails
            .insert(
                key.clone(),
                Tail {
                    ticket,
                    done: rx.shared(),
                },
            )
            .map(|tail| tail.done);

        let tails = Arc::clone(&self.tails);
        runtime.spawn(async move {
            // A cancelled predecessor (panicked task) resolves too.
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            work.await;
            let _ = tx.send(());
            tails.remove_if(&key, |_, tail| tail.ticket == ticket);
        })
    }

    /// Number of keys with queued or running work.
    pub fn pending_keys(&self) -> usize {
        self.tails.len()
    }

    /// Resolves once no work is queued or running for any key.
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<Shared<oneshot::Receiver<()>>> =
                self.tails.iter().map(|tail| tail.done.clone()).collect();
            if pending.is_empty() {
                return;
            }
            futures::future::join_all(pending).await;
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_key_runs_in_submission_order() {
        let sequencer = KeyedSequencer::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = Handle::current();

        for (i, delay) in [30u64, 10, 0].into_iter().enumerate() {
            let log = Arc::clone(&log);
            sequencer.submit(&handle, "p1", async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                log.lock().unwrap().push(i);
            });
        }
        sequencer.wait_idle().await;

        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(sequencer.pending_keys(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn different_keys_run_concurrently() {
        let sequencer = KeyedSequencer::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = Handle::current();

        let slow = Arc::clone(&log);
        sequencer.submit(&handle, "slow", async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            slow.lock().unwrap().push("slow");
        });
        let fast = Arc::clone(&log);
        sequencer.submit(&handle, "fast", async move {
            fast.lock().unwrap().push("fast");
        });
        sequencer.wait_idle().await;

        assert_eq!(*log.lock().unwrap(), vec!["fast", "slow"]);
    }

    #[tokio::test]
    async fn panicking_work_does_not_stall_the_key() {
        let sequencer = KeyedSequencer::new();
        let handle = Handle::current();
        let ran = Arc::new(Mutex::new(false));

        let first = sequencer.submit(&handle, 7u32, async { panic!("boom") });
        let flag = Arc::clone(&ran);
        let second = sequencer.submit(&handle, 7u32, async move {
            *flag.lock().unwrap() = true;
        });

        assert!(first.await.is_err());
        second.await.unwrap();
        assert!(*ran.lock().unwrap());
    }
}
