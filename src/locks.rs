use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OwnedMutexGuard;

/// One mutex per evidence tree. Every operation that changes the shape of a tree, its folder aggregates,
/// or the approval states its evidence status is derived from runs while holding that tree's mutex.
///
/// An operation only ever holds a single tree's lock, so there is no lock ordering to get wrong.
/// The guards are std mutexes and must never be held across an `.await`
#[derive(Default, Debug)]
pub struct TreeLocks {
    locks: Mutex<HashMap<u32, Arc<Mutex<()>>>>,
}

impl TreeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// returns the mutex guarding the tree of `evidence_id`, creating it the first time it's asked for
    pub fn for_tree(&self, evidence_id: u32) -> Arc<Mutex<()>> {
        let mut locks = hold(&self.locks);
        locks
            .entry(evidence_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// One async mutex per blob handle. Blobs are shared by every file with the same content, across evidences,
/// so a handle is locked from the moment an upload commits its bytes until its row is inserted, and from the moment
/// a delete counts the remaining references until the blob is gone.
///
/// Entries only live while someone holds or waits on them
#[derive(Default, Debug)]
pub struct BlobLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// releases its handle's lock when dropped
#[derive(Debug)]
pub struct BlobGuard<'a> {
    locks: &'a BlobLocks,
    handle: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl BlobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, handle: &str) -> BlobGuard<'_> {
        let lock = hold(&self.locks)
            .entry(handle.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        BlobGuard {
            locks: self,
            handle: handle.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        hold(&self.locks).len()
    }
}

impl Drop for BlobGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = hold(&self.locks.locks);
        // nobody else can clone the entry while the map is locked
        let unused = locks
            .get(&self.handle)
            .map(|lock| Arc::strong_count(lock) == 1)
            .unwrap_or(false);
        if unused {
            locks.remove(&self.handle);
        }
    }
}

/// locks `mutex`, recovering it if a previous holder panicked. The data behind every tree lock is `()`,
/// and the tables are the real state, so there is nothing a panic could have left half-written
pub fn hold<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("A tree lock was poisoned! Recovering...");
            mutex.clear_poison();
            poisoned.into_inner()
        }
    }
}
