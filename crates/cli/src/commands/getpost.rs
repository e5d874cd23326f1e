//! Getpost command - relay the latest post now, bypassing the dedup gate

use anyhow::Result;
use skyrelay_domain::{Requester, TickOutcome, Visibility};
use std::path::PathBuf;

use super::{Output, build_relay};
use crate::args::GetpostArgs;
use crate::config::{AppConfig, DiscordConfig};

pub async fn execute(args: GetpostArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let output = if args.dry_run {
        Output::Console
    } else {
        Output::Discord
    };
    let relay = build_relay(&config, &output).await?;

    let requester = requester_for(&config.discord, args.user);
    let requested = if args.public {
        Visibility::Everyone
    } else {
        Visibility::RequesterOnly
    };

    let manual = relay.force_fetch(&requester, requested).await?;

    if let Some(notice) = manual.notice {
        eprintln!("{}", notice);
    }

    match manual.outcome {
        TickOutcome::Emitted {
            post_id,
            delivery_id,
            ..
        } => println!(
            "Sent {} ({}, delivery {})",
            post_id,
            visibility_label(manual.visibility),
            delivery_id
        ),
        TickOutcome::NotFound => println!("No posts found for this account"),
        TickOutcome::Unchanged { post_id } => println!("Already sent: {}", post_id),
        TickOutcome::Skipped { reason } => println!("Skipped: {}", reason),
    }

    Ok(())
}

/// The local operator is trusted; a named user only if listed as admin
fn requester_for(discord: &DiscordConfig, user: Option<String>) -> Requester {
    match user {
        None => Requester::elevated(None),
        Some(id) if discord.is_admin(&id) => Requester::elevated(Some(id)),
        Some(id) => Requester::member(Some(id)),
    }
}

fn visibility_label(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Everyone => "public",
        Visibility::RequesterOnly => "hidden",
    }
}
