pub mod app;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod host;
pub mod ledger;
pub mod registry;

pub mod test_helpers;

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;

pub use app::{
    Activation,
    App,
};
pub use catalog::{
    RewardCatalog,
    RewardDefinition,
};
pub use config::{
    Config,
    SpinConfig,
};
pub use controller::{
    CloseOutcome,
    MoveAttempt,
    MoveVerdict,
    OpenOutcome,
    OpenRejection,
    Phase,
    Placement,
    SlotEvents,
    UnlockController,
};
pub use host::{
    Cue,
    Host,
    ItemHandle,
    SlotId,
    UserId,
};
pub use ledger::UnlockLedger;
pub use registry::ControllerRegistry;
