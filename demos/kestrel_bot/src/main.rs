//! Kestrel Bot
//!
//! A OneBot v11 group bot with three responders:
//!
//! - `oi` → `io` trigger reply
//! - `帮助` command menu
//! - language-model chat for @mentions and private messages, sharing one
//!   rate limit and answering from the background task queue
//!
//! # Usage
//!
//! ```bash
//! AI_API_KEY=... AI_ACCOUNT_ID=... cargo run --package kestrel-bot -- --config kestrel.toml
//! ```
//!
//! Send `SIGHUP` to reload the ban list without restarting.

mod backend;
mod chat;
mod help;
mod trigger;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kestrel::prelude::*;
use tracing::{info, warn};

use crate::backend::{DEFAULT_API_BASE, DEFAULT_MODEL, WorkersAi, WorkersAiSettings};
use crate::chat::ChatResponder;
use crate::help::HelpMenu;
use crate::trigger::TriggerReply;

#[derive(Parser, Debug)]
#[command(name = "kestrel-bot", about = "OneBot group bot built on Kestrel")]
struct Cli {
    /// Configuration file (default: search for kestrel.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile
    #[arg(short, long)]
    profile: Option<String>,

    /// Trigger text for the fixed reply
    #[arg(long, default_value = "oi")]
    trigger: String,

    /// Fixed reply text
    #[arg(long, default_value = "io")]
    reply: String,

    /// Language-model API key
    #[arg(long, env = "AI_API_KEY", hide_env_values = true)]
    ai_api_key: Option<String>,

    /// Language-model account id
    #[arg(long, env = "AI_ACCOUNT_ID")]
    ai_account_id: Option<String>,

    /// Language-model API root
    #[arg(long, default_value = DEFAULT_API_BASE)]
    ai_api_base: String,

    /// Language model
    #[arg(long, default_value = DEFAULT_MODEL)]
    ai_model: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = KestrelRuntime::builder();
    if let Some(path) = &cli.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &cli.profile {
        builder = builder.profile(profile);
    }
    let runtime = builder.build().context("failed to start runtime")?;

    let backend = WorkersAi::new(WorkersAiSettings {
        api_base: cli.ai_api_base,
        account_id: cli.ai_account_id,
        api_key: cli.ai_api_key,
        model: cli.ai_model,
        ..Default::default()
    })
    .context("failed to build chat backend")?;
    if !backend.is_configured() {
        warn!("AI_API_KEY or AI_ACCOUNT_ID not set; chat requests will get a fallback reply");
    }

    let help = HelpMenu::new("kestrel帮助菜单")
        .entry(cli.trigger.clone(), format!("基础回复（回复{}）", cli.reply))
        .entry("@机器人 （问题）", "和机器人聊天")
        .entry("私聊 （问题）", "私聊和机器人聊天");

    runtime.route(Route::new(TriggerReply::new(cli.trigger, cli.reply)));
    runtime.route(Route::new(help));
    let chat = ChatResponder::new(Arc::new(backend), runtime.task_queue());
    runtime.route(chat.into_route(runtime.rate_limiter()));

    info!(routes = runtime.route_count(), "Responders registered");
    runtime.run().await?;

    Ok(())
}
