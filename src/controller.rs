//! Per-player unlock sequence.
//!
//! [`UnlockMachine`] holds the state machine and is driven synchronously.
//! [`UnlockController`] wraps it with the timer that feeds it ticks. The timer
//! is always cancelled before the machine is closed, and every tick checks the
//! sequence number it was started for, so no tick can land on a closed or
//! reopened machine.

use crate::{
    Result,
    catalog::RewardCatalog,
    config::SpinConfig,
    host::{
        Host,
        ItemHandle,
        SlotId,
        UserId,
    },
    ledger::{
        LedgerStorage,
        UnlockLedger,
    },
};
use rand::rngs::StdRng;
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
};

pub mod machine;
pub mod spin_task;


pub use machine::{
    SlotItem,
    TickOutcome,
    UnlockMachine,
};
pub use spin_task::SpinTask;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Closed,
    Spinning,
    Settled,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpenRejection {
    AlreadyOpen,
    NotInteractive,
    NoUnits,
    Destroyed,
    NoController,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    Started,
    Rejected(OpenRejection),
}

impl OpenOutcome {
    pub fn started(&self) -> bool {
        matches!(self, OpenOutcome::Started)
    }
}

/// Where a settled reward ended up.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    Inventory,
    Dropped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Nothing was open.
    AlreadyClosed,
    /// The spin was cut short; the unit was refunded unless the ledger was
    /// wiped since the open.
    Interrupted { ticks: u32 },
    /// The committed reward was handed to the player.
    Delivered { item: SlotItem, placement: Placement },
    /// The player already took the reward out of the slot.
    Collected,
    /// The sequence settled on an empty slot; refunded like `Interrupted`.
    NothingWon,
}

/// An item move between containers initiated outside the controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MoveAttempt {
    pub item: ItemHandle,
    pub from: Option<SlotId>,
    pub to: Option<SlotId>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MoveVerdict {
    /// Neither end is an exclusive slot; the host applies its default rules.
    NotHandled,
    Allow,
    Reject,
}

/// Host notifications routed to the controller that owns the slot.
pub trait SlotEvents {
    fn on_item_removed(&mut self, item: ItemHandle);
    fn on_loot_session_ended(&mut self) -> Result<CloseOutcome>;
    fn on_external_move(&mut self, attempt: &MoveAttempt) -> MoveVerdict;
}

pub struct UnlockController<H, S> {
    user: UserId,
    slot: SlotId,
    spin: SpinConfig,
    machine: Arc<Mutex<UnlockMachine<H, S>>>,
    task: SpinTask,
}

impl<H: Host, S: LedgerStorage + 'static> UnlockController<H, S> {
    pub fn new(
        user: UserId,
        host: Arc<H>,
        ledger: Arc<UnlockLedger<S>>,
        catalog: Arc<RewardCatalog>,
        spin: SpinConfig,
        rng: StdRng,
    ) -> Self {
        let slot = host.allocate_slot(user);
        let machine =
            UnlockMachine::new(user, slot, host, ledger, catalog, spin.max_ticks, rng);
        Self {
            user,
            slot,
            spin,
            machine: Arc::new(Mutex::new(machine)),
            task: SpinTask::default(),
        }
    }

    fn machine(&self) -> MutexGuard<'_, UnlockMachine<H, S>> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn phase(&self) -> Phase {
        self.machine().phase()
    }

    pub fn is_open(&self) -> bool {
        self.machine().is_open()
    }

    pub fn is_ready(&self) -> bool {
        self.machine().is_ready()
    }

    pub fn ticks(&self) -> u32 {
        self.machine().ticks()
    }

    pub fn can_open(&self) -> bool {
        self.machine().can_open()
    }

    pub fn held_item(&self) -> Option<SlotItem> {
        self.machine().held().cloned()
    }

    pub fn is_spinning(&self) -> bool {
        self.task.is_running()
    }

    /// Start a sequence and its tick timer. Must run inside a tokio runtime.
    pub fn open(&mut self) -> Result<OpenOutcome> {
        let (outcome, sequence) = {
            let mut machine = self.machine();
            let outcome = machine.open()?;
            (outcome, machine.sequence())
        };
        if outcome.started() {
            let handle =
                spin_task::spawn_spin(Arc::clone(&self.machine), self.spin.clone(), sequence);
            self.task.start(handle);
        }
        Ok(outcome)
    }

    pub fn close(&mut self) -> Result<CloseOutcome> {
        self.task.cancel();
        self.machine().close()
    }

    /// Close, then give the slot back to the host. Idempotent.
    pub fn destroy(&mut self) -> Result<CloseOutcome> {
        self.task.cancel();
        self.machine().destroy()
    }
}

impl<H: Host, S: LedgerStorage + 'static> SlotEvents for UnlockController<H, S> {
    fn on_item_removed(&mut self, item: ItemHandle) {
        self.machine().on_item_removed(item);
    }

    fn on_loot_session_ended(&mut self) -> Result<CloseOutcome> {
        self.close()
    }

    fn on_external_move(&mut self, attempt: &MoveAttempt) -> MoveVerdict {
        self.machine().on_external_move(attempt)
    }
}
