use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use tgn_core::{config::RawConfig, hook::NotifierHook, Availability, Notifier, Unit};
use tgn_telegram::TelegramConnector;

/// Forward notifications to Telegram.
///
/// Sends `--message` once, or every non-empty line read from stdin until EOF
/// or Ctrl-C. Waits for all deliveries before exiting.
#[derive(Parser, Debug)]
#[command(name = "tgn", version)]
struct Args {
    /// Notifier config file (.toml or .json).
    #[arg(short, long, env = "TGN_CONFIG")]
    config: PathBuf,

    /// Unit name used in logs.
    #[arg(long, default_value = "telegram_notifier")]
    name: String,

    /// Title of the forwarded messages.
    #[arg(short, long, default_value = "Notification")]
    title: String,

    /// Send this text and exit instead of reading stdin.
    #[arg(short, long)]
    message: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let raw = RawConfig::load(&args.config)?;
    let notifier = Notifier::new(&args.name, Some(&raw), Arc::new(TelegramConnector::new()))?;

    let hook = NotifierHook::new(notifier.clone())
        .ignore_target("tgn_telegram")
        .ignore_target("teloxide")
        .ignore_target("reqwest")
        .ignore_target("hyper");
    tgn_core::logging::init("tgn", Some(hook))?;

    let started = notifier.start().await;
    if !started.ok {
        anyhow::bail!(
            "failed to start {}: {}",
            notifier.name(),
            started.error.unwrap_or_default()
        );
    }

    match &args.message {
        Some(text) => notifier.submit(&args.title, text).await?,
        None => forward_stdin(&notifier, &args.title).await?,
    }

    let quit = notifier.quit().await;
    if !quit.ok {
        anyhow::bail!(
            "failed to quit {}: {}",
            notifier.name(),
            quit.error.unwrap_or_default()
        );
    }
    Ok(())
}

async fn forward_stdin(notifier: &Notifier, title: &str) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut forwarded = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match notifier.submit(title, &line).await {
                    Ok(()) => forwarded += 1,
                    Err(e) => {
                        warn!(error = %e, "dropping line");
                        if notifier.availability() == Availability::Unavailable {
                            break;
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    info!(forwarded, "stdin closed, waiting for deliveries");
    Ok(())
}
