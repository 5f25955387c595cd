//! Owner of every live controller, keyed by player.
//!
//! Membership is exactly the set of active players: one controller per
//! player, created on activation and destroyed on deactivation. A reverse
//! index from slot to player routes host events to the right controller.

use crate::{
    Result,
    catalog::RewardCatalog,
    config::SpinConfig,
    controller::{
        CloseOutcome,
        MoveAttempt,
        MoveVerdict,
        SlotEvents,
        UnlockController,
    },
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
use rand::{
    SeedableRng,
    rngs::StdRng,
};
use std::{
    collections::BTreeMap,
    sync::Arc,
};
use tracing::{
    error,
    info,
};

pub struct ControllerRegistry<H, S> {
    host: Arc<H>,
    ledger: Arc<UnlockLedger<S>>,
    catalog: Arc<RewardCatalog>,
    spin: SpinConfig,
    rng: StdRng,
    controllers: BTreeMap<UserId, UnlockController<H, S>>,
    slots: BTreeMap<SlotId, UserId>,
}

impl<H: Host, S: LedgerStorage + 'static> ControllerRegistry<H, S> {
    /// Each controller gets its own generator seeded from `rng`.
    pub fn new(
        host: Arc<H>,
        ledger: Arc<UnlockLedger<S>>,
        catalog: Arc<RewardCatalog>,
        spin: SpinConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            host,
            ledger,
            catalog,
            spin,
            rng,
            controllers: BTreeMap::new(),
            slots: BTreeMap::new(),
        }
    }

    /// Create a controller for `user` unless one exists. Returns whether one
    /// was created.
    pub fn on_user_active(&mut self, user: UserId) -> bool {
        if self.controllers.contains_key(&user) {
            return false;
        }
        let controller = UnlockController::new(
            user,
            Arc::clone(&self.host),
            Arc::clone(&self.ledger),
            Arc::clone(&self.catalog),
            self.spin.clone(),
            StdRng::from_rng(&mut self.rng),
        );
        let slot = controller.slot();
        self.slots.insert(slot, user);
        self.controllers.insert(user, controller);
        info!(user, %slot, "controller created");
        true
    }

    /// Destroy and forget the controller of `user`, if any.
    ///
    /// A controller whose teardown fails stays registered so a later call can
    /// retry it.
    pub fn on_user_inactive(&mut self, user: UserId) -> Result<Option<CloseOutcome>> {
        let Some(controller) = self.controllers.get_mut(&user) else {
            return Ok(None);
        };
        let outcome = controller.destroy()?;
        let slot = controller.slot();
        self.controllers.remove(&user);
        self.slots.remove(&slot);
        info!(user, ?outcome, "controller destroyed");
        Ok(Some(outcome))
    }

    pub fn find(&self, user: UserId) -> Option<&UnlockController<H, S>> {
        self.controllers.get(&user)
    }

    pub fn find_mut(&mut self, user: UserId) -> Option<&mut UnlockController<H, S>> {
        self.controllers.get_mut(&user)
    }

    pub fn find_by_slot(&self, slot: SlotId) -> Option<&UnlockController<H, S>> {
        self.slots.get(&slot).and_then(|user| self.controllers.get(user))
    }

    pub fn find_by_slot_mut(&mut self, slot: SlotId) -> Option<&mut UnlockController<H, S>> {
        let user = *self.slots.get(&slot)?;
        self.controllers.get_mut(&user)
    }

    pub fn find_by_slot_id(&self, id: u64) -> Option<&UnlockController<H, S>> {
        self.find_by_slot(SlotId(id))
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.controllers.contains_key(&user)
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.controllers.keys().copied()
    }

    /// Returns whether `slot` belongs to a live controller.
    pub fn dispatch_item_removed(&mut self, slot: SlotId, item: ItemHandle) -> bool {
        match self.find_by_slot_mut(slot) {
            Some(controller) => {
                controller.on_item_removed(item);
                true
            }
            None => false,
        }
    }

    pub fn dispatch_loot_session_ended(&mut self, user: UserId) -> Result<Option<CloseOutcome>> {
        match self.find_mut(user) {
            Some(controller) => controller.on_loot_session_ended().map(Some),
            None => Ok(None),
        }
    }

    /// Ask the controllers at both ends of a move. Any rejection wins.
    pub fn dispatch_external_move(&mut self, attempt: &MoveAttempt) -> MoveVerdict {
        let ends = [attempt.from, attempt.to];
        let mut verdict = MoveVerdict::NotHandled;
        for slot in ends.into_iter().flatten() {
            let Some(controller) = self.find_by_slot_mut(slot) else {
                continue;
            };
            match controller.on_external_move(attempt) {
                MoveVerdict::Reject => return MoveVerdict::Reject,
                MoveVerdict::Allow => verdict = MoveVerdict::Allow,
                MoveVerdict::NotHandled => {}
            }
        }
        verdict
    }

    /// Destroy every controller. Returns the first teardown error after every
    /// controller has been tried; failed ones stay registered.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut first_error = None;
        let users: Vec<UserId> = self.users().collect();
        for user in users {
            if let Err(e) = self.on_user_inactive(user) {
                error!(user, "failed to tear down controller: {e:#}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        controller::{
            OpenOutcome,
            Phase,
        },
        ledger::{
            Counts,
            in_memory_storage::InMemoryLedgerStorage,
        },
        test_helpers::{
            FakeHost,
            quick_spin,
            sample_catalog,
            test_ledger,
        },
    };
    use std::time::Duration;
    use tokio::time::sleep;

    type TestRegistry = ControllerRegistry<FakeHost, InMemoryLedgerStorage>;

    fn registry(
        counts: Counts,
    ) -> (TestRegistry, Arc<FakeHost>, Arc<UnlockLedger<InMemoryLedgerStorage>>) {
        let host = Arc::new(FakeHost::with_interactive([1, 2, 3]));
        let (ledger, _) = test_ledger(counts);
        let registry = ControllerRegistry::new(
            Arc::clone(&host),
            Arc::clone(&ledger),
            sample_catalog(),
            quick_spin(),
            StdRng::seed_from_u64(3),
        );
        (registry, host, ledger)
    }

    #[test]
    fn on_user_active__twice__keeps_single_controller() {
        // given
        let (mut registry, host, _) = registry(Counts::new());

        // when
        let first = registry.on_user_active(1);
        let second = registry.on_user_active(1);

        // then
        assert!(first);
        assert!(!second);
        assert_eq!(registry.len(), 1);
        assert_eq!(host.slots_of(1).len(), 1);
    }

    #[test]
    fn find_by_slot__routes_to_owner() {
        // given
        let (mut registry, _, _) = registry(Counts::new());
        registry.on_user_active(1);
        registry.on_user_active(2);
        let slot = registry.find(2).unwrap().slot();

        // when
        let owner = registry.find_by_slot(slot).map(UnlockController::user);

        // then
        assert_eq!(owner, Some(2));
        assert_eq!(registry.find_by_slot_id(slot.0).map(UnlockController::user), Some(2));
        assert!(registry.find_by_slot(SlotId(404)).is_none());
    }

    #[test]
    fn on_user_inactive__absent_user__is_noop() {
        let (mut registry, _, _) = registry(Counts::new());
        assert_eq!(registry.on_user_inactive(9).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn on_user_inactive__while_spinning__refunds_and_unregisters() {
        // given
        let (mut registry, host, ledger) = registry(Counts::from([(1, 1)]));
        registry.on_user_active(1);
        let slot = registry.find(1).unwrap().slot();
        assert_eq!(
            registry.find_mut(1).unwrap().open().unwrap(),
            OpenOutcome::Started
        );
        sleep(Duration::from_millis(350)).await;

        // when
        let outcome = registry.on_user_inactive(1).unwrap();

        // then
        assert_eq!(outcome, Some(CloseOutcome::Interrupted { ticks: 3 }));
        assert!(!registry.contains(1));
        assert!(registry.find_by_slot(slot).is_none());
        assert!(host.slot(slot).unwrap().released);
        assert_eq!(ledger.peek(1), Some(1));
        assert!(host.inventory(1).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn on_user_inactive__teardown_fails__stays_registered_for_retry() {
        // given
        let host = Arc::new(FakeHost::with_interactive([1]));
        let (ledger, storage) = test_ledger(Counts::from([(1, 1)]));
        let mut registry = ControllerRegistry::new(
            Arc::clone(&host),
            Arc::clone(&ledger),
            sample_catalog(),
            quick_spin(),
            StdRng::seed_from_u64(3),
        );
        registry.on_user_active(1);
        let slot = registry.find(1).unwrap().slot();
        registry.find_mut(1).unwrap().open().unwrap();
        sleep(Duration::from_millis(250)).await;
        storage.set_fail_writes(true);

        // when
        let failed = registry.on_user_inactive(1);
        let still_registered = registry.find_by_slot(slot).is_some();
        storage.set_fail_writes(false);
        let retried = registry.on_user_inactive(1).unwrap();

        // then
        assert!(failed.is_err());
        assert!(still_registered);
        assert_eq!(retried, Some(CloseOutcome::Interrupted { ticks: 2 }));
        assert!(registry.is_empty());
        assert!(host.slot(slot).unwrap().released);
        assert_eq!(ledger.peek(1), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_loot_session_ended__settled__delivers() {
        // given
        let (mut registry, host, _) = registry(Counts::from([(2, 1)]));
        registry.on_user_active(2);
        registry.find_mut(2).unwrap().open().unwrap();
        sleep(Duration::from_millis(600)).await;
        assert_eq!(registry.find(2).unwrap().phase(), Phase::Settled);

        // when
        let outcome = registry.dispatch_loot_session_ended(2).unwrap();

        // then
        assert!(matches!(outcome, Some(CloseOutcome::Delivered { .. })));
        assert_eq!(host.inventory(2).len(), 1);
        assert_eq!(registry.dispatch_loot_session_ended(7).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_external_move__between_two_slots__any_reject_wins() {
        // given
        let (mut registry, _, _) = registry(Counts::from([(1, 1)]));
        registry.on_user_active(1);
        registry.on_user_active(2);
        let spinning = registry.find(1).unwrap().slot();
        let idle = registry.find(2).unwrap().slot();
        registry.find_mut(1).unwrap().open().unwrap();
        sleep(Duration::from_millis(150)).await;
        let candidate = registry.find(1).unwrap().held_item().unwrap().handle;

        // when
        let verdict = registry.dispatch_external_move(&MoveAttempt {
            item: candidate,
            from: Some(spinning),
            to: Some(idle),
        });

        // then
        assert_eq!(verdict, MoveVerdict::Reject);
        assert_eq!(
            registry.dispatch_external_move(&MoveAttempt {
                item: candidate,
                from: None,
                to: None,
            }),
            MoveVerdict::NotHandled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown__destroys_every_controller() {
        // given
        let (mut registry, host, ledger) = registry(Counts::from([(1, 1), (3, 2)]));
        for user in [1, 2, 3] {
            registry.on_user_active(user);
        }
        registry.find_mut(1).unwrap().open().unwrap();
        registry.find_mut(3).unwrap().open().unwrap();
        sleep(Duration::from_millis(120)).await;

        // when
        registry.shutdown().unwrap();

        // then
        assert!(registry.is_empty());
        assert_eq!(ledger.peek(1), Some(1));
        assert_eq!(ledger.peek(3), Some(2));
        for user in [1, 2, 3] {
            assert!(host.slots_of(user).is_empty());
        }
        assert_eq!(host.stray_items(), 0);
    }
}
