//! Application use cases / business logic

pub mod credentials;
pub mod dedup;
pub mod normalize;
pub mod poll_loop;
pub mod render;
pub mod setup;

pub use credentials::StoredCredentials;
pub use dedup::{DedupGate, GateGuard, PollState};
pub use normalize::{NormalizationError, NormalizerConfig, PostNormalizer};
pub use poll_loop::{
    HIDDEN_ONLY_NOTICE, ManualFetch, PollLoop, PollLoopConfig, RelayError, RelaySettings,
};
pub use render::{CardField, PostCard, RenderConfig, Renderer};
pub use setup::{
    SetupDriver, SetupError, SetupOutcome, SetupWizard, WizardEffect, WizardInput, WizardMode,
    WizardState, WizardStep,
};
