//! Setup command - interactive configuration over the terminal

use anyhow::{Result, bail};
use skyrelay_adapters::{cipher::KEY_ENV_VAR, conversation::StdioConversation};
use skyrelay_domain::usecases::{SetupDriver, SetupWizard, WizardMode};
use std::path::PathBuf;
use std::sync::Arc;

use super::{build_discord, load_cipher, open_config_store};
use crate::args::{SetupArgs, SetupMode};
use crate::config::{AppConfig, FeedSourceKind};

pub async fn execute(args: SetupArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let mode = wizard_mode(args.mode, config.feed.source);

    let store = open_config_store(&config).await?;
    let validator = Arc::new(build_discord(&config)?);

    let mut driver = SetupDriver::new(Arc::new(StdioConversation::stdio()), store, validator);
    if mode == WizardMode::Credentials {
        let Some(cipher) = load_cipher()? else {
            bail!(
                "{} must be set to store credentials; generate one with `skyrelay keygen`",
                KEY_ENV_VAR
            );
        };
        driver = driver.with_cipher(Arc::new(cipher));
        eprintln!("Note: the password is echoed as you type it.");
    }

    let outcome = driver.run(SetupWizard::new(mode)).await?;
    if !outcome.completed {
        bail!("Setup did not complete");
    }

    Ok(())
}

fn wizard_mode(requested: Option<SetupMode>, source: FeedSourceKind) -> WizardMode {
    match (requested, source) {
        (Some(SetupMode::Credentials), _) | (None, FeedSourceKind::Authenticated) => {
            WizardMode::Credentials
        }
        _ => WizardMode::HandleOnly,
    }
}
