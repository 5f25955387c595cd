use crate::{
    host::UserId,
    ledger::storage::{
        Counts,
        LedgerStorage,
    },
};
use anyhow::anyhow;
use std::sync::{
    Arc,
    Mutex,
    PoisonError,
    atomic::{
        AtomicBool,
        AtomicUsize,
        Ordering,
    },
};

#[derive(Clone, Default)]
pub struct InMemoryLedgerStorage {
    counts: Arc<Mutex<Counts>>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryLedgerStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_counts(counts: Counts) -> Self {
        Self {
            counts: Arc::new(Mutex::new(counts)),
            ..Self::default()
        }
    }

    /// Shared view of what has been persisted so far.
    pub fn counts(&self) -> Arc<Mutex<Counts>> {
        self.counts.clone()
    }

    pub fn persisted(&self, user: UserId) -> Option<u32> {
        let guard = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        guard.get(&user).copied()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `store`/`clear` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> crate::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("in-memory ledger storage rejected write"));
        }
        Ok(())
    }
}

impl LedgerStorage for InMemoryLedgerStorage {
    fn load(&self) -> crate::Result<Counts> {
        let guard = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.clone())
    }

    fn store(&mut self, changed: UserId, counts: &Counts) -> crate::Result<()> {
        self.check_writable()?;
        let mut guard = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        match counts.get(&changed) {
            Some(count) => guard.insert(changed, *count),
            None => guard.remove(&changed),
        };
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&mut self) -> crate::Result<()> {
        self.check_writable()?;
        let mut guard = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        guard.clear();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
