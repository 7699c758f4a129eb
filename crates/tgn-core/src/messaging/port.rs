use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{config::ValidatedConfig, Result};

/// Delivery backend port.
///
/// One call delivers one notification to every configured recipient. The
/// caller enforces `deadline` as well; implementations should give up by then.
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    async fn deliver(&self, title: &str, text: &str, deadline: Instant) -> Result<()>;
}

/// Builds a [`DeliveryPort`] when the dispatch loop starts.
///
/// This is where credentials get checked; an error here makes the unit
/// unavailable until it is restarted.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, cfg: &ValidatedConfig) -> Result<Arc<dyn DeliveryPort>>;
}
