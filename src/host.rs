//! Narrow contracts the core uses to reach the host environment.
//!
//! The host owns rendering, item storage and player presence. The core never
//! touches those directly; it only calls through these traits, which keeps the
//! state machine testable against [`crate::test_helpers::FakeHost`].

use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

/// Stable numeric identity of a player.
pub type UserId = u64;

/// Identifier of an exclusive single-slot container handed out by the host.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// Opaque reference to a live item instance inside the host.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemHandle(pub u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cue {
    Start,
    Success,
}

pub trait Presence {
    /// Whether the player is connected, alive and able to interact.
    fn can_interact(&self, user: UserId) -> bool;

    /// Whether the player is still loading the world after connecting.
    fn is_receiving_snapshot(&self, _user: UserId) -> bool {
        false
    }
}

pub trait Inventory {
    /// Allocate a fresh exclusive single-slot container owned by `user`.
    fn allocate_slot(&self, user: UserId) -> SlotId;

    /// Permanently release a slot container. The slot is empty when called.
    fn release_slot(&self, slot: SlotId);

    fn set_slot_locked(&self, slot: SlotId, locked: bool);

    /// Create a new item instance, or `None` if the host rejects the key.
    fn create_item(&self, shortname: &str, amount: u32) -> Option<ItemHandle>;

    /// Move an item into the slot. On `false` the item is left unplaced.
    fn place_in_slot(&self, slot: SlotId, item: ItemHandle) -> bool;

    /// Move an item into the player's main inventory. On `false` nothing moved.
    fn give_to_inventory(&self, user: UserId, item: ItemHandle) -> bool;

    /// Drop an item into the world at the player's position.
    fn drop_at_user(&self, user: UserId, item: ItemHandle);

    /// Destroy an item wherever it currently lives.
    fn destroy_item(&self, item: ItemHandle);
}

pub trait Cues {
    /// Fire-and-forget audio/visual effect at the player's position.
    fn play_cue(&self, user: UserId, cue: Cue);
}

/// Everything a controller needs from the host.
pub trait Host: Presence + Inventory + Cues + Send + Sync + 'static {}

impl<T> Host for T where T: Presence + Inventory + Cues + Send + Sync + 'static {}
