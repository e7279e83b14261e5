//! emobot-rs: Telegram bot that rewrites messages in a chosen emotional tone.

mod config;
mod flow;
mod quota;
mod rewriter;
mod synthesizer;
mod telegram;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "emobot-rs", about = "Emotion-rewriting Telegram bot")]
struct Args {
    /// Path to config YAML
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (suppress noisy transport internals)
    let filter = if args.verbose {
        EnvFilter::new("debug,teloxide=info,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,teloxide=warn,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("emobot-rs starting");

    let config = config::Config::load(args.config.as_deref());
    if config.telegram.token.is_empty() {
        return Err("No Telegram bot token configured (set TG_BOT_TOKEN or telegram.token)".into());
    }

    // A quota store failure here is fatal: the bot must not run unmetered
    let quota = quota::QuotaStore::open(Path::new(&config.quota.db_path), config.quota.daily_limit)?;
    info!(
        "Quota store ready at {} (limit {}/day)",
        config.quota.db_path, config.quota.daily_limit
    );

    let rewriter = Arc::new(rewriter::ToneRewriter::new(config.openai.clone()));
    let synthesizer = Arc::new(synthesizer::VoiceSynthesizer::new(config.voice.clone()));
    let flow = Arc::new(flow::ConversationFlow::new(
        quota,
        rewriter,
        synthesizer,
        config.quota.charge_without_text,
    ));

    let bot = Bot::new(config.telegram.token.clone());
    telegram::run(bot, flow).await;

    Ok(())
}
