use crate::{
    app::App,
    catalog::{
        RewardCatalog,
        RewardDefinition,
    },
    config::{
        Config,
        SpinConfig,
    },
    host::{
        Cue,
        Cues,
        Inventory,
        ItemHandle,
        Presence,
        SlotId,
        UserId,
    },
    ledger::{
        Counts,
        UnlockLedger,
        in_memory_storage::InMemoryLedgerStorage,
    },
};
use std::{
    collections::{
        BTreeMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ItemLocation {
    Loose,
    Slot(SlotId),
    Inventory(UserId),
    World(UserId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeItem {
    pub shortname: String,
    pub amount: u32,
    pub location: ItemLocation,
}

#[derive(Clone, Debug, Default)]
pub struct FakeSlot {
    pub owner: UserId,
    pub locked: bool,
    pub released: bool,
    pub contents: Option<ItemHandle>,
}

#[derive(Debug, Default)]
struct FakeHostState {
    next_slot: u64,
    next_item: u64,
    interactive: HashSet<UserId>,
    loading: HashSet<UserId>,
    inventory_full: HashSet<UserId>,
    reject_items: bool,
    items: BTreeMap<ItemHandle, FakeItem>,
    slots: BTreeMap<SlotId, FakeSlot>,
    destroyed: Vec<ItemHandle>,
    cues: Vec<(UserId, Cue)>,
}

impl FakeHostState {
    fn detach(&mut self, item: ItemHandle) {
        if let Some(FakeItem {
            location: ItemLocation::Slot(slot),
            ..
        }) = self.items.get(&item)
        {
            if let Some(slot) = self.slots.get_mut(slot) {
                slot.contents = None;
            }
        }
    }

    fn relocate(&mut self, item: ItemHandle, location: ItemLocation) -> bool {
        self.detach(item);
        match self.items.get_mut(&item) {
            Some(entry) => {
                entry.location = location;
                true
            }
            None => false,
        }
    }
}

/// In-process host that records every call the core makes.
#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<FakeHostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interactive(users: impl IntoIterator<Item = UserId>) -> Self {
        let host = Self::new();
        for user in users {
            host.set_interactive(user, true);
        }
        host
    }

    fn state(&self) -> MutexGuard<'_, FakeHostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_interactive(&self, user: UserId, interactive: bool) {
        let mut state = self.state();
        if interactive {
            state.interactive.insert(user);
        } else {
            state.interactive.remove(&user);
        }
    }

    pub fn set_receiving_snapshot(&self, user: UserId, loading: bool) {
        let mut state = self.state();
        if loading {
            state.loading.insert(user);
        } else {
            state.loading.remove(&user);
        }
    }

    pub fn set_inventory_full(&self, user: UserId, full: bool) {
        let mut state = self.state();
        if full {
            state.inventory_full.insert(user);
        } else {
            state.inventory_full.remove(&user);
        }
    }

    /// Make every `create_item` call fail.
    pub fn set_reject_items(&self, reject: bool) {
        self.state().reject_items = reject;
    }

    pub fn slot(&self, slot: SlotId) -> Option<FakeSlot> {
        self.state().slots.get(&slot).cloned()
    }

    pub fn slots_of(&self, user: UserId) -> Vec<SlotId> {
        self.state()
            .slots
            .iter()
            .filter(|(_, slot)| slot.owner == user && !slot.released)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn item(&self, item: ItemHandle) -> Option<FakeItem> {
        self.state().items.get(&item).cloned()
    }

    pub fn slot_contents(&self, slot: SlotId) -> Option<(String, u32)> {
        let state = self.state();
        let handle = state.slots.get(&slot)?.contents?;
        state
            .items
            .get(&handle)
            .map(|item| (item.shortname.clone(), item.amount))
    }

    fn items_at(&self, location: ItemLocation) -> Vec<(String, u32)> {
        self.state()
            .items
            .values()
            .filter(|item| item.location == location)
            .map(|item| (item.shortname.clone(), item.amount))
            .collect()
    }

    pub fn inventory(&self, user: UserId) -> Vec<(String, u32)> {
        self.items_at(ItemLocation::Inventory(user))
    }

    pub fn dropped(&self, user: UserId) -> Vec<(String, u32)> {
        self.items_at(ItemLocation::World(user))
    }

    /// Items that exist but are neither with a player nor in the world.
    pub fn stray_items(&self) -> usize {
        self.state()
            .items
            .values()
            .filter(|item| matches!(item.location, ItemLocation::Loose | ItemLocation::Slot(_)))
            .count()
    }

    pub fn created_count(&self) -> u64 {
        self.state().next_item
    }

    pub fn destroyed_count(&self) -> usize {
        self.state().destroyed.len()
    }

    pub fn cues(&self, user: UserId) -> Vec<Cue> {
        self.state()
            .cues
            .iter()
            .filter(|(owner, _)| *owner == user)
            .map(|(_, cue)| *cue)
            .collect()
    }

    /// The player drags the slot item into their inventory. Returns the
    /// handle so the test can report the removal.
    pub fn take_from_slot(&self, slot: SlotId, user: UserId) -> Option<ItemHandle> {
        let mut state = self.state();
        let handle = state.slots.get(&slot)?.contents?;
        state.relocate(handle, ItemLocation::Inventory(user));
        Some(handle)
    }

    /// An item that lives outside any slot, e.g. in the player's hands.
    pub fn spawn_loose(&self, shortname: &str, amount: u32) -> ItemHandle {
        let mut state = self.state();
        state.next_item += 1;
        let handle = ItemHandle(state.next_item);
        state.items.insert(
            handle,
            FakeItem {
                shortname: shortname.to_string(),
                amount,
                location: ItemLocation::Loose,
            },
        );
        handle
    }
}

impl Presence for FakeHost {
    fn can_interact(&self, user: UserId) -> bool {
        self.state().interactive.contains(&user)
    }

    fn is_receiving_snapshot(&self, user: UserId) -> bool {
        self.state().loading.contains(&user)
    }
}

impl Inventory for FakeHost {
    fn allocate_slot(&self, user: UserId) -> SlotId {
        let mut state = self.state();
        state.next_slot += 1;
        let slot = SlotId(state.next_slot);
        state.slots.insert(
            slot,
            FakeSlot {
                owner: user,
                ..FakeSlot::default()
            },
        );
        slot
    }

    fn release_slot(&self, slot: SlotId) {
        if let Some(slot) = self.state().slots.get_mut(&slot) {
            slot.released = true;
            slot.locked = false;
        }
    }

    fn set_slot_locked(&self, slot: SlotId, locked: bool) {
        if let Some(slot) = self.state().slots.get_mut(&slot) {
            slot.locked = locked;
        }
    }

    fn create_item(&self, shortname: &str, amount: u32) -> Option<ItemHandle> {
        if self.state().reject_items {
            return None;
        }
        Some(self.spawn_loose(shortname, amount))
    }

    fn place_in_slot(&self, slot: SlotId, item: ItemHandle) -> bool {
        let mut state = self.state();
        let free = state
            .slots
            .get(&slot)
            .is_some_and(|slot| !slot.released && slot.contents.is_none());
        if !free || !state.relocate(item, ItemLocation::Slot(slot)) {
            return false;
        }
        if let Some(slot) = state.slots.get_mut(&slot) {
            slot.contents = Some(item);
        }
        true
    }

    fn give_to_inventory(&self, user: UserId, item: ItemHandle) -> bool {
        let mut state = self.state();
        if state.inventory_full.contains(&user) {
            return false;
        }
        state.relocate(item, ItemLocation::Inventory(user))
    }

    fn drop_at_user(&self, user: UserId, item: ItemHandle) {
        self.state().relocate(item, ItemLocation::World(user));
    }

    fn destroy_item(&self, item: ItemHandle) {
        let mut state = self.state();
        state.detach(item);
        if state.items.remove(&item).is_some() {
            state.destroyed.push(item);
        }
    }
}

impl Cues for FakeHost {
    fn play_cue(&self, user: UserId, cue: Cue) {
        self.state().cues.push((user, cue));
    }
}

pub fn sample_rewards() -> Vec<RewardDefinition> {
    vec![
        RewardDefinition::new("scrap", 10, 20),
        RewardDefinition::new("wood", 100, 500),
        RewardDefinition::new("rifle.ak", 1, 1),
        RewardDefinition::new("explosive.timed", 1, 3).hidden(),
    ]
}

pub fn sample_catalog() -> Arc<RewardCatalog> {
    Arc::new(RewardCatalog::new(sample_rewards()).expect("sample catalog is valid"))
}

/// Ledger over shared in-memory storage; the storage handle observes writes.
pub fn test_ledger(
    counts: Counts,
) -> (Arc<UnlockLedger<InMemoryLedgerStorage>>, InMemoryLedgerStorage) {
    let storage = InMemoryLedgerStorage::new_with_counts(counts);
    let ledger = UnlockLedger::open(storage.clone()).expect("in-memory ledger opens");
    (Arc::new(ledger), storage)
}

/// Short constant cadence: 5 ticks of 100ms.
pub fn quick_spin() -> SpinConfig {
    SpinConfig::steady(5, 100)
}

pub fn test_config() -> Config {
    Config {
        spin: quick_spin(),
        seed: Some(7),
        rewards: sample_rewards(),
        ..Config::default()
    }
}

pub struct TestContext {
    host: Arc<FakeHost>,
    storage: InMemoryLedgerStorage,
    app: App<FakeHost, InMemoryLedgerStorage>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::new_with_counts(Counts::new())
    }

    pub fn new_with_counts(counts: Counts) -> Self {
        Self::new_with_config(test_config(), counts)
    }

    pub fn new_with_config(config: Config, counts: Counts) -> Self {
        let host = Arc::new(FakeHost::new());
        let storage = InMemoryLedgerStorage::new_with_counts(counts);
        let app = App::new(config, Arc::clone(&host), storage.clone())
            .expect("test app builds");
        Self { host, storage, app }
    }

    pub fn host(&self) -> &FakeHost {
        &self.host
    }

    pub fn storage(&self) -> &InMemoryLedgerStorage {
        &self.storage
    }

    pub fn app(&mut self) -> &mut App<FakeHost, InMemoryLedgerStorage> {
        &mut self.app
    }

    /// Make `user` interactive and run the connect hook.
    pub fn connect(&mut self, user: UserId) -> SlotId {
        self.host.set_interactive(user, true);
        self.app.user_connected(user);
        self.app
            .slot_of(user)
            .expect("connected user has a controller")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
