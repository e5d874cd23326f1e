//! Doctor command - validate configuration and show status

use anyhow::Result;
use serde::Serialize;
use skyrelay_adapters::{
    cipher::{AesGcmCipher, KEY_ENV_VAR},
    config::JsonFileConfigStore,
};
use std::path::PathBuf;

use super::describe_store;
use crate::args::DoctorArgs;
use crate::config::{AppConfig, FeedSourceKind};

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    settings: CheckResult,
    feed: CheckResult,
    discord: CheckResult,
    encryption_key: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        settings: CheckResult::error("Not checked"),
        feed: CheckResult::error("Not checked"),
        discord: CheckResult::error("Not checked"),
        encryption_key: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    // Check config
    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {:#}", e));
            None
        }
    };

    if let Some(ref config) = config {
        report.encryption_key = check_encryption_key(config);
        report.settings = check_settings(config).await;
        report.feed = check_feed(config);
        report.discord = check_discord(config);
    }

    // Determine overall status
    let checks = [
        &report.config,
        &report.settings,
        &report.feed,
        &report.discord,
        &report.encryption_key,
    ];

    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok());

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    // Output report
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

/// Channel and account written by setup; never creates the file
async fn check_settings(config: &AppConfig) -> CheckResult {
    let path = &config.general.config_json_path;
    if !path.exists() {
        return CheckResult::warn(format!(
            "{} not found; run 'skyrelay setup'",
            path.display()
        ));
    }

    let store = match JsonFileConfigStore::open(path.clone()).await {
        Ok(store) => store,
        Err(e) => return CheckResult::error(format!("Failed to open {}: {}", path.display(), e)),
    };

    let details = match describe_store(&store).await {
        Ok(details) => details,
        Err(e) => return CheckResult::error(format!("Failed to read {}: {}", path.display(), e)),
    };

    let missing: Vec<&str> = [("channel_id", "channel"), ("identity", "account")]
        .into_iter()
        .filter(|(key, _)| details[*key].is_null())
        .map(|(_, label)| label)
        .collect();

    if missing.is_empty() {
        CheckResult::ok(format!(
            "Channel {} relays {}",
            details["channel_id"].as_str().unwrap_or_default(),
            details["identity"].as_str().unwrap_or_default()
        ))
        .with_details(details)
    } else {
        CheckResult::warn(format!(
            "Not configured: {}; run 'skyrelay setup'",
            missing.join(", ")
        ))
        .with_details(details)
    }
}

fn check_feed(config: &AppConfig) -> CheckResult {
    let base_url = match config.feed.source {
        FeedSourceKind::Public => &config.feed.public_base_url,
        FeedSourceKind::Authenticated => &config.feed.pds_base_url,
        FeedSourceKind::Stub => {
            return match &config.feed.stub_feed_path {
                Some(path) if path.exists() => {
                    CheckResult::warn(format!("Source: stub (offline), file: {}", path.display()))
                }
                Some(path) => CheckResult::error(format!(
                    "Stub feed file does not exist: {}",
                    path.display()
                )),
                None => CheckResult::warn("Source: stub (offline), no posts"),
            };
        }
    };

    if base_url.trim().is_empty() {
        return CheckResult::error(format!(
            "No base URL configured for the {} feed",
            config.feed.source.as_str()
        ));
    }

    CheckResult::ok(format!(
        "Source: {}, base_url: {}, timeout: {}s",
        config.feed.source.as_str(),
        base_url,
        config.poll.fetch_timeout_secs
    ))
}

fn check_discord(config: &AppConfig) -> CheckResult {
    let env_var = &config.discord.bot_token_env;

    if env_var.is_empty() {
        return CheckResult::error("No bot token env var configured");
    }

    match std::env::var(env_var) {
        Ok(val) if !val.is_empty() => CheckResult::ok(format!(
            "Bot token: {} (set), Admins: {}",
            env_var,
            config.discord.admin_user_ids.len()
        )),
        _ => CheckResult::warn(format!("Bot token: {} (not set)", env_var)),
    }
}

fn check_encryption_key(config: &AppConfig) -> CheckResult {
    let required = config.feed.source == FeedSourceKind::Authenticated;

    match AesGcmCipher::from_env() {
        Ok(Some(_)) => CheckResult::ok(format!("{} (set)", KEY_ENV_VAR)),
        Ok(None) if required => CheckResult::error(format!(
            "{} (not set) is required by the authenticated feed",
            KEY_ENV_VAR
        )),
        Ok(None) => CheckResult::ok(format!("{} (not set, not needed)", KEY_ENV_VAR)),
        Err(e) => CheckResult::error(format!("{}: {}", KEY_ENV_VAR, e)),
    }
}

fn print_report(report: &DoctorReport) {
    println!("skyrelay Doctor Report");
    println!("======================");
    println!();

    print_check("Config", &report.config);
    print_check("Settings", &report.settings);
    print_check("Feed", &report.feed);
    print_check("Discord", &report.discord);
    print_check("Encryption Key", &report.encryption_key);

    println!();
    let symbol = match report.overall.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} Overall: {}", symbol, report.overall.to_uppercase());

    if report.overall == "ok" {
        println!();
        println!("Ready to run! Try: skyrelay run --dry-run --once");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    let symbol = match result.status.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} {}: {}", symbol, name, result.message);
}
