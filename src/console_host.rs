use mystery_box::host::{
    Cue,
    Cues,
    Inventory,
    ItemHandle,
    Presence,
    SlotId,
    UserId,
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
};
use tracing::info;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stand-in host for the command line. Every call is logged.
#[derive(Default)]
pub struct ConsoleHost {
    next_slot: AtomicU64,
    next_item: AtomicU64,
    online: Mutex<HashSet<UserId>>,
    items: Mutex<HashMap<ItemHandle, (String, u32)>>,
    inventory_full: bool,
}

impl ConsoleHost {
    pub fn new(inventory_full: bool) -> Self {
        Self {
            inventory_full,
            ..Self::default()
        }
    }

    pub fn connect(&self, user: UserId) {
        lock(&self.online).insert(user);
        info!(user, "host: player connected");
    }

    fn describe(&self, item: ItemHandle) -> String {
        match lock(&self.items).get(&item) {
            Some((shortname, amount)) => format!("{amount}x {shortname}"),
            None => format!("unknown item {}", item.0),
        }
    }
}

impl Presence for ConsoleHost {
    fn can_interact(&self, user: UserId) -> bool {
        lock(&self.online).contains(&user)
    }
}

impl Inventory for ConsoleHost {
    fn allocate_slot(&self, user: UserId) -> SlotId {
        let slot = SlotId(self.next_slot.fetch_add(1, Ordering::SeqCst) + 1);
        info!(user, %slot, "host: slot allocated");
        slot
    }

    fn release_slot(&self, slot: SlotId) {
        info!(%slot, "host: slot released");
    }

    fn set_slot_locked(&self, slot: SlotId, locked: bool) {
        info!(%slot, locked, "host: slot lock changed");
    }

    fn create_item(&self, shortname: &str, amount: u32) -> Option<ItemHandle> {
        let handle = ItemHandle(self.next_item.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.items).insert(handle, (shortname.to_string(), amount));
        Some(handle)
    }

    fn place_in_slot(&self, slot: SlotId, item: ItemHandle) -> bool {
        info!(%slot, item = %self.describe(item), "host: slot shows");
        true
    }

    fn give_to_inventory(&self, user: UserId, item: ItemHandle) -> bool {
        if self.inventory_full {
            info!(user, "host: inventory full");
            return false;
        }
        info!(user, item = %self.describe(item), "host: given to inventory");
        true
    }

    fn drop_at_user(&self, user: UserId, item: ItemHandle) {
        info!(user, item = %self.describe(item), "host: dropped at player");
    }

    fn destroy_item(&self, item: ItemHandle) {
        lock(&self.items).remove(&item);
    }
}

impl Cues for ConsoleHost {
    fn play_cue(&self, user: UserId, cue: Cue) {
        info!(user, ?cue, "host: cue played");
    }
}
