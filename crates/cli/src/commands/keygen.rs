//! Keygen command - print a fresh credential encryption key

use anyhow::Result;
use secrecy::ExposeSecret;
use skyrelay_adapters::cipher::{AesGcmCipher, KEY_ENV_VAR};

pub fn execute() -> Result<()> {
    let key = AesGcmCipher::generate_key();

    println!("{}", key.expose_secret());
    eprintln!(
        "Export it as {} before running setup. Keep it out of config.json.",
        KEY_ENV_VAR
    );

    Ok(())
}
