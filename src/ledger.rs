//! Persistent count of unopened boxes per player.
//!
//! Every mutating call writes through [`LedgerStorage`] before it returns and
//! before the in-memory view changes, so a failed write leaves the ledger
//! exactly as it was.
//!
//! A wipe starts a new generation. Units are consumed within a generation and
//! can only be refunded into that same generation.

use crate::{
    Result,
    host::UserId,
};
use anyhow::Context;
use std::sync::{
    Mutex,
    MutexGuard,
    PoisonError,
};
use tracing::{
    info,
    warn,
};

pub mod in_memory_storage;
pub mod json_file_storage;
pub mod sled_storage;
pub mod storage;

pub use storage::{
    Counts,
    LedgerStorage,
};

pub struct UnlockLedger<S> {
    inner: Mutex<LedgerInner<S>>,
}

struct LedgerInner<S> {
    storage: S,
    counts: Counts,
    generation: u64,
}

impl<S: LedgerStorage> LedgerInner<S> {
    fn commit(&mut self, user: UserId, count: u32) -> Result<()> {
        let previous = self.counts.insert(user, count);
        if let Err(e) = self.storage.store(user, &self.counts) {
            match previous {
                Some(previous) => self.counts.insert(user, previous),
                None => self.counts.remove(&user),
            };
            return Err(e.context(format!("persist unopened count for {user}")));
        }
        Ok(())
    }

    fn add(&mut self, user: UserId, delta: i64) -> Result<u32> {
        let next = match self.counts.get(&user) {
            Some(current) => i64::from(*current).saturating_add(delta),
            None => delta,
        };
        let next = if next < 0 {
            warn!(user, delta, "ledger underflow clamped to zero");
            0
        } else {
            u32::try_from(next).unwrap_or(u32::MAX)
        };
        self.commit(user, next)?;
        Ok(next)
    }
}

impl<S: LedgerStorage> UnlockLedger<S> {
    /// Load every persisted count from `storage`.
    pub fn open(storage: S) -> Result<Self> {
        let counts = storage.load().context("load unopened counts")?;
        info!(players = counts.len(), "ledger loaded");
        Ok(Self {
            inner: Mutex::new(LedgerInner {
                storage,
                counts,
                generation: 0,
            }),
        })
    }

    fn inner(&self) -> MutexGuard<'_, LedgerInner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current count. The first lookup for a player persists a zero entry.
    pub fn count(&self, user: UserId) -> Result<u32> {
        let mut inner = self.inner();
        if let Some(count) = inner.counts.get(&user) {
            return Ok(*count);
        }
        inner.commit(user, 0)?;
        Ok(0)
    }

    /// Read without initialising a missing entry.
    pub fn peek(&self, user: UserId) -> Option<u32> {
        self.inner().counts.get(&user).copied()
    }

    /// Initialise an unseen player to `delta`, otherwise add `delta`.
    ///
    /// A result below zero is never persisted: it is clamped to 0.
    pub fn set_or_add(&self, user: UserId, delta: i64) -> Result<u32> {
        self.inner().add(user, delta)
    }

    /// Take one unit if the player has any. Returns the generation the unit
    /// was taken from, or `None` when the player had nothing.
    pub fn try_consume(&self, user: UserId) -> Result<Option<u64>> {
        let mut inner = self.inner();
        let current = inner.counts.get(&user).copied().unwrap_or(0);
        if current == 0 {
            return Ok(None);
        }
        inner.commit(user, current - 1)?;
        Ok(Some(inner.generation))
    }

    /// Give back one unit taken by [`Self::try_consume`] in `generation`.
    ///
    /// Returns the new count, or `None` when the ledger was wiped since the
    /// unit was taken and nothing was written.
    pub fn refund(&self, user: UserId, generation: u64) -> Result<Option<u32>> {
        let mut inner = self.inner();
        if inner.generation != generation {
            info!(user, generation, "refund skipped, ledger wiped since consume");
            return Ok(None);
        }
        inner.add(user, 1).map(Some)
    }

    pub fn generation(&self) -> u64 {
        self.inner().generation
    }

    pub fn clear_all(&self) -> Result<()> {
        let mut inner = self.inner();
        inner.storage.clear().context("clear unopened counts")?;
        let cleared = inner.counts.len();
        inner.counts.clear();
        inner.generation += 1;
        info!(cleared, generation = inner.generation, "ledger wiped");
        Ok(())
    }

    pub fn snapshot(&self) -> Counts {
        self.inner().counts.clone()
    }
}
