//! # Nucleo
//!
//! Inbox-driven work scheduler: watches a mailbox for mail from a trusted
//! sender, turns it into tasks, reports progress by mail and chat.
//!
//! Usage:
//!   nucleo                              # Run the work scheduler (default)
//!   nucleo periodic                     # Run the simpler periodic job runner
//!   nucleo post "text" [--live]         # One guarded social post
//!   nucleo --config ./nucleo.toml -v    # Custom config, debug logging

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nucleo_channels::{EmailChannel, GuardedPoster, HttpSocialClient, PostOutcome, TelegramNotifier};
use nucleo_core::NucleoConfig;
use nucleo_core::traits::{InboxClient, NotificationClient};
use nucleo_scheduler::{
    JobName, PeriodicTaskRunner, SharedClock, SimulatedWork, WorkScheduler, WorkSchedulerConfig, system_clock,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "nucleo",
    version,
    about = "📬 Nucleo — inbox-driven work scheduler"
)]
struct Cli {
    /// Config file (default: ~/.nucleo/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the work inbox and process tasks until Ctrl-C
    Work,
    /// Run the interval/daily job runner until Ctrl-C
    Periodic,
    /// Publish one post (dry-run unless --live)
    Post {
        text: String,
        /// Actually publish
        #[arg(long)]
        live: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "nucleo=debug,nucleo_core=debug,nucleo_scheduler=debug,nucleo_channels=debug"
    } else {
        "nucleo=info,nucleo_core=info,nucleo_scheduler=info,nucleo_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = NucleoConfig::load_optional(cli.config.as_deref()).context("loading config")?;
    config.apply_env();

    match cli.command.unwrap_or(Command::Work) {
        Command::Work => run_work(config).await,
        Command::Periodic => run_periodic(config).await,
        Command::Post { text, live } => run_post(config, &text, live).await,
    }
}

/// Watch channel flipped to `true` on Ctrl-C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("🛑 Ctrl-C received, shutting down...");
        }
        tx.send(true).ok();
    });
    rx
}

fn email_channel(config: &NucleoConfig, clock: SharedClock) -> EmailChannel {
    EmailChannel::new(config.email.clone(), clock)
        .with_imap_timeout(Duration::from_secs(config.work.call_timeout_secs.max(1)))
}

async fn run_work(config: NucleoConfig) -> Result<()> {
    config.validate().context("invalid configuration")?;
    let clock = system_clock();

    let inbox: Arc<dyn InboxClient> = Arc::new(email_channel(&config, clock.clone()));
    let notifier: Arc<dyn NotificationClient> = Arc::new(TelegramNotifier::new(config.telegram.clone())?);
    let executor = Arc::new(SimulatedWork::new(Duration::from_millis(config.work.simulated_work_millis)));

    let mut scheduler = WorkScheduler::new(WorkSchedulerConfig::from_config(&config), inbox, notifier, clock)
        .with_executor(executor);

    tracing::info!("📬 Work inbox: {}", config.email.address);
    tracing::info!("👤 Trusted sender: {}", config.operator.trusted_sender);
    scheduler.run(shutdown_on_ctrl_c()).await;
    Ok(())
}

async fn run_periodic(config: NucleoConfig) -> Result<()> {
    config.validate().context("invalid configuration")?;
    let clock = system_clock();

    let inbox: Arc<dyn InboxClient> = Arc::new(email_channel(&config, clock.clone()));
    let notifier: Arc<dyn NotificationClient> = Arc::new(TelegramNotifier::new(config.telegram.clone())?);
    let max_results = config.work.max_results;

    let mut runner = PeriodicTaskRunner::from_config(&config.periodic, clock)?;

    let check_inbox = inbox.clone();
    runner.register(JobName::CheckEmail, move || {
        let inbox = check_inbox.clone();
        async move {
            let unread = inbox.fetch_unread(max_results).await?;
            tracing::info!("📧 {} unread email(s)", unread.len());
            Ok(())
        }
    });

    runner.register(JobName::DailyDigest, move || {
        let inbox = inbox.clone();
        let notifier = notifier.clone();
        async move {
            let unread = inbox.fetch_unread(max_results).await?;
            let mut digest = format!("🗞 Daily digest\n\nUnread emails: {}\n", unread.len());
            for msg in &unread {
                digest.push_str(&format!("\u{2022} {} ({})\n", msg.subject, msg.from));
            }
            notifier.send_notification(&digest).await
        }
    });

    runner.run(shutdown_on_ctrl_c()).await;
    Ok(())
}

async fn run_post(config: NucleoConfig, text: &str, live: bool) -> Result<()> {
    if live && config.social.bearer_token.is_empty() {
        anyhow::bail!("social.bearer_token (SOCIAL_BEARER_TOKEN) is required for --live");
    }

    let client = HttpSocialClient::new(&config.social)?;
    let poster = GuardedPoster::new(client, &config.social, system_clock());

    match poster.post(text, !live).await {
        PostOutcome::Posted { id } => println!("✅ Posted: {id}"),
        PostOutcome::DryRun { text } => println!("📝 Dry run, would post:\n{text}"),
        PostOutcome::TooLong { chars, max } => println!("❌ Too long: {chars} chars (max {max})"),
        PostOutcome::DailyLimit => println!("🚦 Daily post limit reached"),
        PostOutcome::TooSoon { wait } => println!("⏳ Too soon, retry in {}s", wait.as_secs()),
        PostOutcome::Failed { error } => println!("❌ Post failed: {error}"),
    }
    Ok(())
}
