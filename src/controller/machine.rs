use crate::{
    Result,
    catalog::RewardCatalog,
    controller::{
        CloseOutcome,
        MoveAttempt,
        MoveVerdict,
        OpenOutcome,
        OpenRejection,
        Phase,
        Placement,
    },
    host::{
        Cue,
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
use std::sync::Arc;
use tracing::{
    debug,
    info,
    warn,
};

/// The item currently sitting in the slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotItem {
    pub handle: ItemHandle,
    pub shortname: String,
    pub amount: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Spinning,
    Settled,
    Idle,
}

pub struct UnlockMachine<H, S> {
    user: UserId,
    slot: SlotId,
    host: Arc<H>,
    ledger: Arc<UnlockLedger<S>>,
    catalog: Arc<RewardCatalog>,
    rng: StdRng,
    max_ticks: u32,
    phase: Phase,
    ticks: u32,
    sequence: u64,
    held: Option<SlotItem>,
    collected: bool,
    /// Ledger generation of the unit taken for the current sequence, until it
    /// is spent or refunded.
    consumed: Option<u64>,
    released: bool,
}

impl<H: Host, S: LedgerStorage> UnlockMachine<H, S> {
    pub fn new(
        user: UserId,
        slot: SlotId,
        host: Arc<H>,
        ledger: Arc<UnlockLedger<S>>,
        catalog: Arc<RewardCatalog>,
        max_ticks: u32,
        rng: StdRng,
    ) -> Self {
        Self {
            user,
            slot,
            host,
            ledger,
            catalog,
            rng,
            max_ticks: max_ticks.max(1),
            phase: Phase::Closed,
            ticks: 0,
            sequence: 0,
            held: None,
            collected: false,
            consumed: None,
            released: false,
        }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase != Phase::Closed
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Settled
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Bumped on every open and close; a tick timer only acts on the sequence
    /// it was started for.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn held(&self) -> Option<&SlotItem> {
        self.held.as_ref()
    }

    pub fn can_open(&self) -> bool {
        !self.released && self.host.can_interact(self.user)
    }

    /// Consume one unit and start spinning.
    pub fn open(&mut self) -> Result<OpenOutcome> {
        if self.released {
            return Ok(OpenOutcome::Rejected(OpenRejection::Destroyed));
        }
        if self.phase != Phase::Closed {
            return Ok(OpenOutcome::Rejected(OpenRejection::AlreadyOpen));
        }
        if !self.can_open() {
            return Ok(OpenOutcome::Rejected(OpenRejection::NotInteractive));
        }
        let Some(generation) = self.ledger.try_consume(self.user)? else {
            return Ok(OpenOutcome::Rejected(OpenRejection::NoUnits));
        };

        self.consumed = Some(generation);
        self.sequence += 1;
        self.ticks = 0;
        self.collected = false;
        self.clear_slot();
        self.host.set_slot_locked(self.slot, true);
        self.phase = Phase::Spinning;
        self.host.play_cue(self.user, Cue::Start);
        info!(user = self.user, slot = %self.slot, "spin started");
        Ok(OpenOutcome::Started)
    }

    /// Swap a fresh candidate into the slot; settles on the last tick.
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != Phase::Spinning {
            return TickOutcome::Idle;
        }
        self.ticks += 1;
        self.clear_slot();
        self.place_candidate();
        debug!(
            user = self.user,
            tick = self.ticks,
            candidate = ?self.held.as_ref().map(|item| item.shortname.as_str()),
            "spin tick"
        );
        if self.ticks >= self.max_ticks {
            self.settle();
            return TickOutcome::Settled;
        }
        TickOutcome::Spinning
    }

    fn place_candidate(&mut self) {
        let Some(reward) = self.catalog.draw(&mut self.rng) else {
            warn!(user = self.user, "no visible rewards to draw");
            return;
        };
        let amount = reward.roll_amount(&mut self.rng);
        let Some(handle) = self.host.create_item(&reward.shortname, amount) else {
            warn!(shortname = %reward.shortname, amount, "host rejected reward item");
            return;
        };
        if !self.host.place_in_slot(self.slot, handle) {
            warn!(shortname = %reward.shortname, slot = %self.slot, "could not place candidate");
            self.host.destroy_item(handle);
            return;
        }
        self.held = Some(SlotItem {
            handle,
            shortname: reward.shortname.clone(),
            amount,
        });
    }

    fn settle(&mut self) {
        self.phase = Phase::Settled;
        self.host.set_slot_locked(self.slot, false);
        self.host.play_cue(self.user, Cue::Success);
        info!(
            user = self.user,
            reward = ?self.held.as_ref().map(|item| (item.shortname.as_str(), item.amount)),
            "spin settled"
        );
    }

    /// End the sequence. A refund that fails to persist leaves the phase
    /// untouched so the next close retries it.
    pub fn close(&mut self) -> Result<CloseOutcome> {
        self.sequence += 1;
        match self.phase {
            Phase::Closed => Ok(CloseOutcome::AlreadyClosed),
            Phase::Spinning => {
                let ticks = self.ticks;
                let count = self.refund_unit()?;
                self.clear_slot();
                self.host.set_slot_locked(self.slot, false);
                self.reset();
                info!(user = self.user, ticks, ?count, "spin interrupted, unit refunded");
                Ok(CloseOutcome::Interrupted { ticks })
            }
            Phase::Settled if self.held.is_none() && !self.collected => {
                let count = self.refund_unit()?;
                self.reset();
                info!(user = self.user, ?count, "empty settle, unit refunded");
                Ok(CloseOutcome::NothingWon)
            }
            Phase::Settled => {
                let outcome = match self.held.take() {
                    Some(item) => {
                        let placement = self.deliver(&item);
                        CloseOutcome::Delivered { item, placement }
                    }
                    None => CloseOutcome::Collected,
                };
                self.reset();
                Ok(outcome)
            }
        }
    }

    /// Close, then release the slot for good. The slot is kept when the
    /// close fails.
    pub fn destroy(&mut self) -> Result<CloseOutcome> {
        if self.released {
            return Ok(CloseOutcome::AlreadyClosed);
        }
        let outcome = self.close()?;
        self.host.release_slot(self.slot);
        self.released = true;
        debug!(user = self.user, slot = %self.slot, "slot released");
        Ok(outcome)
    }

    pub fn on_item_removed(&mut self, item: ItemHandle) {
        let matches = self.held.as_ref().is_some_and(|held| held.handle == item);
        if !matches {
            return;
        }
        self.held = None;
        if self.phase == Phase::Settled {
            self.collected = true;
            info!(user = self.user, "reward collected from slot");
        } else {
            debug!(user = self.user, phase = ?self.phase, "slot item removed externally");
        }
    }

    pub fn on_external_move(&mut self, attempt: &MoveAttempt) -> MoveVerdict {
        let from_slot = attempt.from == Some(self.slot);
        let to_slot = attempt.to == Some(self.slot);
        match (from_slot, to_slot) {
            (false, false) => MoveVerdict::NotHandled,
            (true, true) => MoveVerdict::Reject,
            (false, true) => {
                // nothing may be put into the slot; a committed reward in the
                // way goes to the player instead
                if self.phase == Phase::Settled {
                    if let Some(item) = self.held.take() {
                        let placement = self.deliver(&item);
                        self.collected = true;
                        info!(user = self.user, ?placement, "reward pushed out by incoming move");
                    }
                }
                MoveVerdict::Reject
            }
            (true, false) => match self.phase {
                Phase::Spinning => MoveVerdict::Reject,
                Phase::Settled | Phase::Closed => MoveVerdict::Allow,
            },
        }
    }

    fn deliver(&self, item: &SlotItem) -> Placement {
        if self.host.give_to_inventory(self.user, item.handle) {
            info!(
                user = self.user,
                shortname = %item.shortname,
                amount = item.amount,
                "reward delivered to inventory"
            );
            return Placement::Inventory;
        }
        warn!(
            user = self.user,
            shortname = %item.shortname,
            amount = item.amount,
            "inventory full, dropping reward"
        );
        self.host.drop_at_user(self.user, item.handle);
        Placement::Dropped
    }

    fn clear_slot(&mut self) {
        if let Some(item) = self.held.take() {
            self.host.destroy_item(item.handle);
        }
    }

    /// `None` when the ledger was wiped after the unit was taken.
    fn refund_unit(&mut self) -> Result<Option<u32>> {
        let Some(generation) = self.consumed else {
            return Ok(None);
        };
        let count = self.ledger.refund(self.user, generation)?;
        self.consumed = None;
        Ok(count)
    }

    fn reset(&mut self) {
        self.phase = Phase::Closed;
        self.ticks = 0;
        self.held = None;
        self.collected = false;
        self.consumed = None;
    }
}
