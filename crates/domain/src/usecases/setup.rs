//! Setup wizard - interactive collection of destination and account settings
//!
//! [`SetupWizard`] is a pure state machine: it consumes [`WizardInput`]s and
//! returns replies plus [`WizardEffect`]s. [`SetupDriver`] runs it over a
//! [`Conversation`], enforces the per-state timeouts and applies the effects.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::{Duration, Instant, timeout_at};

use crate::{
    model::{Destination, FeedIdentity},
    ports::{
        CipherError, ConfigListener, ConfigStore, ConfigStoreError, Conversation,
        ConversationError, CredentialCipher, DestinationValidator, config_keys,
    },
};

const DESTINATION_TIMEOUT: Duration = Duration::from_secs(60);
const CHOICE_TIMEOUT: Duration = Duration::from_secs(30);
const USERNAME_TIMEOUT: Duration = Duration::from_secs(60);
const PASSWORD_TIMEOUT: Duration = Duration::from_secs(60);

/// What the account step collects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WizardMode {
    /// Only the handle to follow (public feed)
    #[default]
    HandleOnly,
    /// Login identifier and password (authenticated feed)
    Credentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardState {
    AwaitingDestination,
    CheckingDestination { destination: Destination },
    AwaitingIdentityOrCredentialChoice,
    AwaitingUsername,
    AwaitingPassword { username: String },
    Done,
    Aborted,
}

impl WizardState {
    /// How long the wizard waits for the next message in this state
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            WizardState::AwaitingDestination => Some(DESTINATION_TIMEOUT),
            WizardState::AwaitingIdentityOrCredentialChoice => Some(CHOICE_TIMEOUT),
            WizardState::AwaitingUsername => Some(USERNAME_TIMEOUT),
            WizardState::AwaitingPassword { .. } => Some(PASSWORD_TIMEOUT),
            WizardState::CheckingDestination { .. } | WizardState::Done | WizardState::Aborted => {
                None
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WizardState::Done | WizardState::Aborted)
    }

    /// True while the wizard waits on the person rather than on the driver
    pub fn awaits_message(&self) -> bool {
        self.timeout().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardInput {
    Message(String),
    /// Result of checking the destination held by `CheckingDestination`
    DestinationChecked(bool),
    TimedOut,
}

#[derive(Clone, PartialEq, Eq)]
pub enum WizardEffect {
    SetDestination(Destination),
    SetIdentity(FeedIdentity),
    SetCredentials { identifier: String, password: String },
}

impl std::fmt::Debug for WizardEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WizardEffect::SetDestination(d) => f.debug_tuple("SetDestination").field(d).finish(),
            WizardEffect::SetIdentity(i) => f.debug_tuple("SetIdentity").field(i).finish(),
            WizardEffect::SetCredentials { identifier, .. } => f
                .debug_struct("SetCredentials")
                .field("identifier", identifier)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Output of one transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WizardStep {
    pub replies: Vec<String>,
    pub effects: Vec<WizardEffect>,
}

impl WizardStep {
    fn reply(text: impl Into<String>) -> Self {
        Self {
            replies: vec![text.into()],
            effects: Vec::new(),
        }
    }

    fn silent() -> Self {
        Self::default()
    }
}

/// Setup conversation state machine
#[derive(Debug, Clone)]
pub struct SetupWizard {
    mode: WizardMode,
    state: WizardState,
}

impl SetupWizard {
    pub fn new(mode: WizardMode) -> Self {
        Self {
            mode,
            state: WizardState::AwaitingDestination,
        }
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn mode(&self) -> WizardMode {
        self.mode
    }

    /// Opening prompt
    pub fn start(&self) -> WizardStep {
        WizardStep::reply("Please enter the channel ID where you'd like to post Bluesky updates.")
    }

    /// Abort from any state
    pub fn abort(&mut self, reason: &str) -> WizardStep {
        self.state = WizardState::Aborted;
        WizardStep::reply(reason)
    }

    pub fn handle(&mut self, input: WizardInput) -> WizardStep {
        if self.state.is_terminal() {
            return WizardStep::silent();
        }

        if input == WizardInput::TimedOut {
            if !self.state.awaits_message() {
                return WizardStep::silent();
            }
            return self.abort("Setup timed out. Please run setup again.");
        }

        let state = std::mem::replace(&mut self.state, WizardState::Aborted);
        let (next, step) = match (state, input) {
            (WizardState::AwaitingDestination, WizardInput::Message(text)) => {
                match Destination::parse(&text) {
                    Some(destination) => (
                        WizardState::CheckingDestination { destination },
                        WizardStep::silent(),
                    ),
                    None => (
                        WizardState::Aborted,
                        WizardStep::reply(
                            "Invalid channel ID. Please restart the setup command.",
                        ),
                    ),
                }
            }

            (WizardState::CheckingDestination { destination }, WizardInput::DestinationChecked(true)) => {
                let step = WizardStep {
                    replies: vec![
                        format!("Channel set to: {}.", destination),
                        self.choice_prompt().to_string(),
                    ],
                    effects: vec![WizardEffect::SetDestination(destination)],
                };
                (WizardState::AwaitingIdentityOrCredentialChoice, step)
            }

            (WizardState::CheckingDestination { .. }, WizardInput::DestinationChecked(false)) => (
                WizardState::Aborted,
                WizardStep::reply(
                    "Invalid channel ID. Please make sure the bot has access to this channel.",
                ),
            ),

            (WizardState::AwaitingIdentityOrCredentialChoice, WizardInput::Message(text)) => {
                match text.trim().to_lowercase().as_str() {
                    "yes" => (
                        WizardState::AwaitingUsername,
                        WizardStep::reply(self.username_prompt()),
                    ),
                    "no" => (
                        WizardState::Done,
                        WizardStep::reply("Setup complete. The Bluesky account was not updated."),
                    ),
                    // Anything else is not an answer
                    _ => (
                        WizardState::AwaitingIdentityOrCredentialChoice,
                        WizardStep::silent(),
                    ),
                }
            }

            (WizardState::AwaitingUsername, WizardInput::Message(text)) => {
                // The account is stored as the feed actor, so an email login is refused
                match FeedIdentity::parse_actor(&text) {
                    None => (
                        WizardState::AwaitingUsername,
                        WizardStep::reply("That does not look like a Bluesky handle. Please try again."),
                    ),
                    Some(identity) => match self.mode {
                        WizardMode::HandleOnly => (
                            WizardState::Done,
                            WizardStep {
                                replies: vec![format!(
                                    "Now following @{}. Configuration complete.",
                                    identity
                                )],
                                effects: vec![WizardEffect::SetIdentity(identity)],
                            },
                        ),
                        WizardMode::Credentials => (
                            WizardState::AwaitingPassword {
                                username: identity.as_str().to_string(),
                            },
                            WizardStep::reply(
                                "Please enter your Bluesky password (no one else can see this).",
                            ),
                        ),
                    },
                }
            }

            (WizardState::AwaitingPassword { username }, WizardInput::Message(password)) => {
                let mut effects = vec![WizardEffect::SetCredentials {
                    identifier: username.clone(),
                    password,
                }];
                if let Some(identity) = FeedIdentity::parse(&username) {
                    effects.push(WizardEffect::SetIdentity(identity));
                }
                (
                    WizardState::Done,
                    WizardStep {
                        replies: vec![
                            "Bluesky login credentials have been set. Configuration complete. \
                             You should delete the messages containing your credentials."
                                .to_string(),
                        ],
                        effects,
                    },
                )
            }

            // Input that does not belong to the current state is dropped
            (state, _) => (state, WizardStep::silent()),
        };

        self.state = next;
        step
    }

    fn choice_prompt(&self) -> &'static str {
        match self.mode {
            WizardMode::HandleOnly => {
                "Do you want to update the Bluesky account to follow? Reply with 'yes' or 'no'."
            }
            WizardMode::Credentials => {
                "Do you want to update the Bluesky account credentials? Reply with 'yes' or 'no'."
            }
        }
    }

    fn username_prompt(&self) -> &'static str {
        match self.mode {
            WizardMode::HandleOnly => "Please enter the Bluesky handle to follow.",
            WizardMode::Credentials => {
                "Please enter your Bluesky handle (no one else can see this)."
            }
        }
    }
}

/// Errors that stop the setup driver
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),
    #[error("Config store error: {0}")]
    Store(#[from] ConfigStoreError),
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("Credentials cannot be stored without an encryption key")]
    MissingCipher,
}

/// Summary of a finished setup run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupOutcome {
    pub completed: bool,
    pub destination: Option<Destination>,
    pub identity: Option<FeedIdentity>,
    pub credentials_updated: bool,
}

/// Runs a [`SetupWizard`] over a conversation and applies its effects
pub struct SetupDriver {
    conversation: Arc<dyn Conversation>,
    store: Arc<dyn ConfigStore>,
    validator: Arc<dyn DestinationValidator>,
    cipher: Option<Arc<dyn CredentialCipher>>,
    listener: Option<Arc<dyn ConfigListener>>,
}

impl SetupDriver {
    pub fn new(
        conversation: Arc<dyn Conversation>,
        store: Arc<dyn ConfigStore>,
        validator: Arc<dyn DestinationValidator>,
    ) -> Self {
        Self {
            conversation,
            store,
            validator,
            cipher: None,
            listener: None,
        }
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn CredentialCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ConfigListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub async fn run(&self, mut wizard: SetupWizard) -> Result<SetupOutcome, SetupError> {
        if wizard.mode() == WizardMode::Credentials && self.cipher.is_none() {
            return Err(SetupError::MissingCipher);
        }

        let mut outcome = SetupOutcome::default();
        self.send_all(&wizard.start().replies).await?;

        let mut deadline = deadline_for(wizard.state());
        while !wizard.state().is_terminal() {
            let before = wizard.state().clone();

            let input = match deadline {
                Some(deadline) => match timeout_at(deadline, self.conversation.receive()).await {
                    Ok(Ok(Some(text))) => WizardInput::Message(text),
                    Ok(Ok(None)) => {
                        tracing::info!("Setup conversation closed");
                        wizard.abort("Setup cancelled.");
                        break;
                    }
                    Ok(Err(error)) => return Err(error.into()),
                    Err(_) => WizardInput::TimedOut,
                },
                None => {
                    // Only reachable in states that wait on the driver
                    let step = wizard.abort("Setup failed. Please try again.");
                    self.send_all(&step.replies).await?;
                    break;
                }
            };

            let mut step = wizard.handle(input);
            if let WizardState::CheckingDestination { destination } = wizard.state().clone() {
                let exists = self.check_destination(&destination).await;
                let follow_up = wizard.handle(WizardInput::DestinationChecked(exists));
                step.replies.extend(follow_up.replies);
                step.effects.extend(follow_up.effects);
            }

            self.apply(&step.effects, &mut outcome).await?;
            self.send_all(&step.replies).await?;

            if *wizard.state() != before {
                tracing::debug!(state = ?wizard.state(), "Setup wizard advanced");
                deadline = deadline_for(wizard.state());
            }
        }

        outcome.completed = *wizard.state() == WizardState::Done;
        tracing::info!(
            completed = outcome.completed,
            destination = ?outcome.destination.as_ref().map(Destination::channel_id),
            identity = ?outcome.identity.as_ref().map(FeedIdentity::as_str),
            credentials_updated = outcome.credentials_updated,
            "Setup finished"
        );
        Ok(outcome)
    }

    async fn check_destination(&self, destination: &Destination) -> bool {
        match self.validator.check(destination).await {
            Ok(exists) => exists,
            Err(error) => {
                tracing::warn!(destination = %destination.channel_id(), error = %error, "Destination check failed");
                false
            }
        }
    }

    async fn apply(
        &self,
        effects: &[WizardEffect],
        outcome: &mut SetupOutcome,
    ) -> Result<(), SetupError> {
        let mut changed = false;

        for effect in effects {
            match effect {
                WizardEffect::SetDestination(destination) => {
                    let value = match destination.channel_id().parse::<u64>() {
                        Ok(id) => serde_json::Value::from(id),
                        Err(_) => serde_json::Value::from(destination.channel_id()),
                    };
                    self.store.set(config_keys::CHANNEL_ID, value).await?;
                    outcome.destination = Some(destination.clone());
                }
                WizardEffect::SetIdentity(identity) => {
                    self.store
                        .set(config_keys::USER_HANDLE, identity.as_str().into())
                        .await?;
                    outcome.identity = Some(identity.clone());
                }
                WizardEffect::SetCredentials {
                    identifier,
                    password,
                } => {
                    let cipher = self.cipher.as_ref().ok_or(SetupError::MissingCipher)?;
                    let user = cipher.encrypt(identifier)?;
                    let pass = cipher.encrypt(password)?;
                    self.store
                        .set(config_keys::ENCRYPTED_USER, user.into())
                        .await?;
                    self.store
                        .set(config_keys::ENCRYPTED_PASSWORD, pass.into())
                        .await?;
                    outcome.credentials_updated = true;
                }
            }
            changed = true;
        }

        if changed {
            if let Some(listener) = &self.listener {
                listener.on_config_changed().await;
            }
        }
        Ok(())
    }

    async fn send_all(&self, replies: &[String]) -> Result<(), SetupError> {
        for reply in replies {
            self.conversation.send(reply).await?;
        }
        Ok(())
    }
}

fn deadline_for(state: &WizardState) -> Option<Instant> {
    state.timeout().map(|timeout| Instant::now() + timeout)
}
