use crate::{
    config::SpinConfig,
    controller::machine::{
        TickOutcome,
        UnlockMachine,
    },
    host::Host,
    ledger::LedgerStorage,
};
use std::sync::{
    Arc,
    Mutex,
    PoisonError,
};
use tokio::{
    task::JoinHandle,
    time,
};
use tracing::debug;

/// Handle to the running tick timer, aborted on cancel or drop.
#[derive(Default)]
pub struct SpinTask {
    handle: Option<JoinHandle<()>>,
}

impl SpinTask {
    pub fn start(&mut self, handle: JoinHandle<()>) {
        self.cancel();
        self.handle = Some(handle);
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for SpinTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub(crate) fn spawn_spin<H: Host, S: LedgerStorage + 'static>(
    machine: Arc<Mutex<UnlockMachine<H, S>>>,
    spin: SpinConfig,
    sequence: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut completed = 0u32;
        loop {
            time::sleep(spin.delay_before(completed)).await;
            match advance(&machine, sequence) {
                Some(TickOutcome::Spinning) => completed += 1,
                outcome => {
                    debug!(sequence, ?outcome, "spin timer finished");
                    return;
                }
            }
        }
    })
}

// The lock is only held for the tick itself, never across an await.
fn advance<H: Host, S: LedgerStorage>(
    machine: &Mutex<UnlockMachine<H, S>>,
    sequence: u64,
) -> Option<TickOutcome> {
    let mut machine = machine.lock().unwrap_or_else(PoisonError::into_inner);
    if machine.sequence() != sequence {
        return None;
    }
    Some(machine.tick())
}
