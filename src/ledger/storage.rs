use crate::host::UserId;
use std::collections::BTreeMap;

pub type Counts = BTreeMap<UserId, u32>;

pub trait LedgerStorage: Send {
    /// read every persisted count, used once at startup
    fn load(&self) -> crate::Result<Counts>;

    /// durably record `counts[changed]`; `counts` is the full post-mutation
    /// state for backends that rewrite wholesale
    fn store(&mut self, changed: UserId, counts: &Counts) -> crate::Result<()>;

    /// durably remove every record
    fn clear(&mut self) -> crate::Result<()>;
}
