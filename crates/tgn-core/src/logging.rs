use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::{errors::Error, hook::NotifierHook, Result};

/// Default: info for our crates, warn for everything else.
pub fn default_filter(service_name: &str) -> EnvFilter {
    EnvFilter::new(format!(
        "warn,tgn=info,tgn_core=info,tgn_telegram=info,{service_name}=info"
    ))
}

/// Build the subscriber without installing it.
///
/// `filter` applies to console output only. The hook sees every event and
/// applies its own level set, so a notification can be configured for a level
/// the console does not print.
pub fn subscriber(
    filter: EnvFilter,
    hook: Option<NotifierHook>,
) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(true)
                .with_filter(filter),
        )
        .with(hook)
}

/// Initialize logging/tracing for a service, optionally forwarding selected
/// events to a notifier through `hook`.
pub fn init(service_name: &str, hook: Option<NotifierHook>) -> Result<()> {
    // Can be overridden with `RUST_LOG`.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(service_name));

    subscriber(filter, hook)
        .try_init()
        .map_err(|e| Error::External(format!("failed to install tracing subscriber: {e}")))
}
