//! Operations offered to the command and UI layers, plus the entry points the
//! host calls on session and inventory events.

use crate::{
    Result,
    catalog::RewardCatalog,
    config::Config,
    controller::{
        CloseOutcome,
        MoveAttempt,
        MoveVerdict,
        OpenOutcome,
        OpenRejection,
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
    registry::ControllerRegistry,
};
use anyhow::Context;
use rand::{
    SeedableRng,
    rngs::StdRng,
};
use std::{
    collections::BTreeSet,
    sync::Arc,
    time::Duration,
};
use tracing::{
    debug,
    info,
    warn,
};

/// How long the host waits before retrying a deferred activation.
pub const RECONNECT_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Activation {
    Created,
    AlreadyActive,
    /// The player is still loading the world; retry after
    /// [`RECONNECT_RETRY_DELAY`].
    Deferred,
}

pub struct App<H, S> {
    config: Config,
    host: Arc<H>,
    ledger: Arc<UnlockLedger<S>>,
    registry: ControllerRegistry<H, S>,
    deferred: BTreeSet<UserId>,
}

impl<H: Host, S: LedgerStorage + 'static> App<H, S> {
    pub fn new(config: Config, host: Arc<H>, storage: S) -> Result<Self> {
        config.validate().context("invalid config")?;
        let catalog = RewardCatalog::new(config.rewards.clone())?;
        if catalog.drawable_len() == 0 {
            warn!("no visible rewards configured, every spin will settle empty");
        }
        let ledger = Arc::new(UnlockLedger::open(storage)?);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let registry = ControllerRegistry::new(
            Arc::clone(&host),
            Arc::clone(&ledger),
            Arc::new(catalog),
            config.spin.clone(),
            rng,
        );
        Ok(Self {
            config,
            host,
            ledger,
            registry,
            deferred: BTreeSet::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &UnlockLedger<S> {
        &self.ledger
    }

    pub fn registry(&self) -> &ControllerRegistry<H, S> {
        &self.registry
    }

    pub fn request_open(&mut self, user: UserId) -> Result<OpenOutcome> {
        let Some(controller) = self.registry.find_mut(user) else {
            warn!(user, "open requested for inactive player");
            return Ok(OpenOutcome::Rejected(OpenRejection::NoController));
        };
        let outcome = controller.open()?;
        if let OpenOutcome::Rejected(reason) = outcome {
            debug!(user, ?reason, "open rejected");
        }
        Ok(outcome)
    }

    pub fn request_close(&mut self, user: UserId) -> Result<CloseOutcome> {
        match self.registry.find_mut(user) {
            Some(controller) => controller.close(),
            None => Ok(CloseOutcome::AlreadyClosed),
        }
    }

    pub fn query_unopened_count(&self, user: UserId) -> Result<u32> {
        self.ledger.count(user)
    }

    /// Add `amount` units (negative removes, clamped at zero).
    pub fn grant_units(&self, user: UserId, amount: i64) -> Result<u32> {
        let count = self.ledger.set_or_add(user, amount)?;
        info!(user, amount, count, "units granted");
        Ok(count)
    }

    pub fn wipe_all_units(&self) -> Result<()> {
        self.ledger.clear_all()
    }

    /// World reset signal. Returns whether the ledger was wiped.
    pub fn on_new_save(&self) -> Result<bool> {
        if !self.config.wipe_on_new_save {
            info!("new save detected, wipe disabled by config");
            return Ok(false);
        }
        self.wipe_all_units()?;
        Ok(true)
    }

    pub fn user_connected(&mut self, user: UserId) -> Activation {
        if self.host.is_receiving_snapshot(user) {
            self.deferred.insert(user);
            debug!(user, "player still loading, activation deferred");
            return Activation::Deferred;
        }
        self.deferred.remove(&user);
        if self.registry.on_user_active(user) {
            Activation::Created
        } else {
            Activation::AlreadyActive
        }
    }

    /// Retry every deferred activation. Returns the players activated.
    pub fn retry_deferred(&mut self) -> Vec<UserId> {
        let pending: Vec<UserId> = self.deferred.iter().copied().collect();
        pending
            .into_iter()
            .filter(|user| self.user_connected(*user) == Activation::Created)
            .collect()
    }

    pub fn deferred_users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.deferred.iter().copied()
    }

    pub fn user_disconnected(&mut self, user: UserId) -> Result<Option<CloseOutcome>> {
        self.deferred.remove(&user);
        self.registry.on_user_inactive(user)
    }

    /// Register players that were already online at startup. Returns how many
    /// controllers were created.
    pub fn activate_all(&mut self, users: impl IntoIterator<Item = UserId>) -> usize {
        let created = users
            .into_iter()
            .filter(|user| self.user_connected(*user) == Activation::Created)
            .count();
        info!(created, "active players registered");
        created
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.deferred.clear();
        self.registry.shutdown()
    }

    /// Whether the player has the reward view open.
    pub fn is_viewing(&self, user: UserId) -> bool {
        self.registry
            .find(user)
            .is_some_and(|controller| controller.is_open())
    }

    pub fn slot_of(&self, user: UserId) -> Option<SlotId> {
        self.registry.find(user).map(|controller| controller.slot())
    }

    pub fn item_removed(&mut self, slot: SlotId, item: ItemHandle) -> bool {
        self.registry.dispatch_item_removed(slot, item)
    }

    pub fn loot_session_ended(&mut self, user: UserId) -> Result<Option<CloseOutcome>> {
        self.registry.dispatch_loot_session_ended(user)
    }

    pub fn external_move(&mut self, attempt: &MoveAttempt) -> MoveVerdict {
        self.registry.dispatch_external_move(attempt)
    }
}
