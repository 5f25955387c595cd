// Sled-backed ledger persistence: one key per user, flushed on every write.
use crate::{
    host::UserId,
    ledger::storage::{
        Counts,
        LedgerStorage,
    },
};
use anyhow::Context;
use sled::{
    Config,
    Db,
    Tree,
};
use std::{
    convert::TryInto,
    path::Path,
};

const COUNTS_TREE: &str = "unopened_counts";

#[derive(Clone)]
pub struct SledLedgerStorage {
    tree: Tree,
}

impl SledLedgerStorage {
    pub fn new(db: &Db) -> crate::Result<Self> {
        let tree = db
            .open_tree(COUNTS_TREE)
            .context("open unopened_counts tree")?;
        Ok(Self { tree })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let db = Config::default()
            .path(path)
            .open()
            .context("open sled database")?;
        Self::new(&db)
    }

    fn decode_entry(key: &[u8], value: &[u8]) -> crate::Result<(UserId, u32)> {
        let user = u64::from_be_bytes(
            key.try_into().context("ledger key must be 8 bytes")?,
        );
        let count = u32::from_be_bytes(
            value.try_into().context("ledger value must be 4 bytes")?,
        );
        Ok((user, count))
    }
}

impl LedgerStorage for SledLedgerStorage {
    fn load(&self) -> crate::Result<Counts> {
        let mut counts = Counts::new();
        for entry in self.tree.iter() {
            let (key, value) = entry.context("iterate ledger entries")?;
            let (user, count) = Self::decode_entry(key.as_ref(), value.as_ref())?;
            counts.insert(user, count);
        }
        Ok(counts)
    }

    fn store(&mut self, changed: UserId, counts: &Counts) -> crate::Result<()> {
        let key = changed.to_be_bytes();
        match counts.get(&changed) {
            Some(count) => {
                self.tree
                    .insert(key, count.to_be_bytes().as_slice())
                    .context("persist ledger count")?;
            }
            None => {
                self.tree.remove(key).context("remove ledger count")?;
            }
        }
        self.tree.flush().context("flush ledger tree")?;
        Ok(())
    }

    fn clear(&mut self) -> crate::Result<()> {
        self.tree.clear().context("clear ledger tree")?;
        self.tree.flush().context("flush ledger tree after clear")?;
        Ok(())
    }
}
