//! `tracing` layer forwarding selected log events to the notifier.
//!
//! An event is forwarded when its level is in the configured level set, its
//! message starts with one of the configured prefixes (if any) and it carries
//! one of the configured fields (if any). Events logged by the notifier itself
//! are never forwarded, and admission failures go to stderr rather than back
//! through `tracing`.

use tracing::{field::Field, Event, Subscriber};
use tracing_subscriber::{layer::Context, Layer};

use crate::{
    config::ValidatedConfig,
    domain::LogLevel,
    errors::Error,
    formatting::format_title,
    messaging::types::Message,
    notifier::{Notifier, LOG_TARGET_PREFIX},
    ports::Unit,
    utils::append_timestamp,
};

/// Layer forwarding matching events to a [`Notifier`].
///
/// Runs synchronously inside whatever thread emitted the event, so it admits
/// through `try_submit` and never waits for queue space: when the queue is full
/// the notification is dropped (`QueueFull`, reported on stderr) rather than
/// applying backpressure to the logging caller.
pub struct NotifierHook {
    notifier: Notifier,
    ignored_targets: Vec<String>,
}

impl NotifierHook {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            notifier,
            ignored_targets: vec![LOG_TARGET_PREFIX.to_string()],
        }
    }

    /// Never forward events whose target starts with `prefix`.
    ///
    /// The delivery backend and its HTTP stack belong here: a failed delivery
    /// they log must not trigger another delivery.
    pub fn ignore_target(mut self, prefix: impl Into<String>) -> Self {
        self.ignored_targets.push(prefix.into());
        self
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.ignored_targets.iter().any(|p| target.starts_with(p.as_str()))
    }
}

/// What the hook needs to know about one log event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFields {
    pub message: String,
    /// Value of a `title` or `caption` field.
    pub caption: Option<String>,
    pub names: Vec<String>,
}

/// Apply the level, prefix and key filters and build the notification.
pub fn filter_event(
    cfg: &ValidatedConfig,
    level: LogLevel,
    fields: &EventFields,
) -> Option<Message> {
    if !cfg.level_filter.contains(&level) {
        return None;
    }
    if !cfg.prefix_filter.is_empty()
        && !cfg
            .prefix_filter
            .iter()
            .any(|p| fields.message.starts_with(p.as_str()))
    {
        return None;
    }
    if !cfg.with_keys.is_empty() && !cfg.with_keys.iter().any(|k| fields.names.contains(k)) {
        return None;
    }

    let caption = fields
        .caption
        .as_deref()
        .unwrap_or(cfg.message_caption.as_str());
    let title = format_title(level, caption, cfg.app_tag.as_deref());
    let text = append_timestamp(&fields.message, cfg.timestamp);
    Some(Message::new(title, text))
}

impl<S> Layer<S> for NotifierHook
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if self.is_ignored(metadata.target()) {
            return;
        }

        let level = LogLevel::from(metadata.level());
        // Cheap reject before visiting fields.
        if !self.notifier.config().level_filter.contains(&level) {
            return;
        }

        let mut fields = EventFields::default();
        event.record(&mut FieldVisitor(&mut fields));

        let Some(msg) = filter_event(self.notifier.config(), level, &fields) else {
            return;
        };

        match self.notifier.try_submit(&msg.title, &msg.text) {
            Ok(()) | Err(Error::NotAvailable) => {}
            Err(e) => eprintln!(
                "[{}] failed to forward log message: {e}",
                self.notifier.name()
            ),
        }
    }
}

struct FieldVisitor<'a>(&'a mut EventFields);

impl FieldVisitor<'_> {
    fn record(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.0.message = value,
            "title" | "caption" => self.0.caption = Some(value),
            _ => {}
        }
        self.0.names.push(field.name().to_string());
    }
}

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record(field, format!("{value:?}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::TimestampMode, domain::ChatId};

    fn cfg() -> ValidatedConfig {
        let mut c = ValidatedConfig::new("token", vec![ChatId(1)]);
        c.level_filter = vec![LogLevel::Error, LogLevel::Warn];
        c
    }

    fn fields(message: &str) -> EventFields {
        EventFields {
            message: message.to_string(),
            caption: None,
            names: vec!["message".to_string()],
        }
    }

    #[test]
    fn forwards_matching_level_only() {
        let c = cfg();
        let msg = filter_event(&c, LogLevel::Error, &fields("disk full")).unwrap();
        assert_eq!(msg.title, "ERROR: Log Message");
        assert_eq!(msg.text, "disk full");
        assert!(filter_event(&c, LogLevel::Info, &fields("disk full")).is_none());
    }

    #[test]
    fn empty_level_set_forwards_nothing() {
        let mut c = cfg();
        c.level_filter.clear();
        assert!(filter_event(&c, LogLevel::Error, &fields("x")).is_none());
    }

    #[test]
    fn requires_one_of_the_prefixes() {
        let mut c = cfg();
        c.prefix_filter = vec!["[db]".to_string(), "[net]".to_string()];
        assert!(filter_event(&c, LogLevel::Error, &fields("[net] timeout")).is_some());
        assert!(filter_event(&c, LogLevel::Error, &fields("timeout [net]")).is_none());
    }

    #[test]
    fn requires_one_of_the_keys() {
        let mut c = cfg();
        c.with_keys = vec!["notify".to_string()];
        assert!(filter_event(&c, LogLevel::Error, &fields("x")).is_none());

        let mut f = fields("x");
        f.names.push("notify".to_string());
        assert!(filter_event(&c, LogLevel::Error, &f).is_some());
    }

    #[test]
    fn caption_field_and_app_tag_shape_the_title() {
        let mut c = cfg();
        c.app_tag = Some("billing".to_string());
        let mut f = fields("x");
        f.caption = Some("Payment failed".to_string());
        let msg = filter_event(&c, LogLevel::Warn, &f).unwrap();
        assert_eq!(msg.title, "WARN: Payment failed [billing]");
    }

    #[test]
    fn appends_timestamp_when_configured() {
        let mut c = cfg();
        c.timestamp = TimestampMode::Utc;
        let msg = filter_event(&c, LogLevel::Error, &fields("x")).unwrap();
        assert!(msg.text.starts_with("x\n\n"));
        assert!(msg.text.ends_with("UTC"));
    }

    #[test]
    fn ignores_notifier_targets() {
        use crate::messaging::port::{Connector, DeliveryPort};
        use std::sync::Arc;

        struct NoConnector;

        #[async_trait::async_trait]
        impl Connector for NoConnector {
            async fn connect(
                &self,
                _cfg: &ValidatedConfig,
            ) -> crate::Result<Arc<dyn DeliveryPort>> {
                Err(Error::External("unused".to_string()))
            }
        }

        let n = Notifier::with_config("n", cfg(), Arc::new(NoConnector));
        let hook = NotifierHook::new(n).ignore_target("tgn_telegram");
        assert!(hook.is_ignored("tgn_core::notifier::dispatch"));
        assert!(hook.is_ignored("tgn_telegram"));
        assert!(!hook.is_ignored("my_app::jobs"));
    }

    #[tokio::test]
    async fn full_queue_drops_notifications_without_blocking() {
        use crate::messaging::port::{Connector, DeliveryPort};
        use std::{sync::Arc, time::Duration};
        use tracing_subscriber::layer::SubscriberExt;

        // Never hands out a backend, so nothing drains the queue.
        struct StalledConnector;

        #[async_trait::async_trait]
        impl Connector for StalledConnector {
            async fn connect(
                &self,
                _cfg: &ValidatedConfig,
            ) -> crate::Result<Arc<dyn DeliveryPort>> {
                std::future::pending().await
            }
        }

        let mut c = cfg();
        c.queue_capacity = 1;
        c.connect_timeout = Duration::from_millis(100);
        let n = Notifier::with_config("n", c, Arc::new(StalledConnector));
        n.start().await;

        let subscriber = tracing_subscriber::registry().with(NotifierHook::new(n.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("first");
            tracing::error!("second");
            tracing::error!("third");
        });
        assert_eq!(n.outstanding(), 1);

        let res = tokio::time::timeout(Duration::from_secs(3), n.quit())
            .await
            .unwrap();
        assert!(res.ok);
        assert_eq!(n.outstanding(), 0);
    }

    #[tokio::test]
    async fn forwards_events_through_the_layer() {
        use crate::messaging::port::{Connector, DeliveryPort};
        use std::sync::{Arc, Mutex};
        use tokio::time::Instant;
        use tracing_subscriber::layer::SubscriberExt;

        #[derive(Default)]
        struct Recorder(Mutex<Vec<(String, String)>>);

        #[async_trait::async_trait]
        impl DeliveryPort for Recorder {
            async fn deliver(
                &self,
                title: &str,
                text: &str,
                _deadline: Instant,
            ) -> crate::Result<()> {
                self.0
                    .lock()
                    .unwrap()
                    .push((title.to_string(), text.to_string()));
                Ok(())
            }
        }

        struct RecorderConnector(Arc<Recorder>);

        #[async_trait::async_trait]
        impl Connector for RecorderConnector {
            async fn connect(
                &self,
                _cfg: &ValidatedConfig,
            ) -> crate::Result<Arc<dyn DeliveryPort>> {
                Ok(self.0.clone())
            }
        }

        let recorder = Arc::new(Recorder::default());
        let connector = Arc::new(RecorderConnector(recorder.clone()));
        let n = Notifier::with_config("n", cfg(), connector);
        n.start().await;

        let subscriber = tracing_subscriber::registry().with(NotifierHook::new(n.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("replica lag too high");
            tracing::info!("routine");
            tracing::error!(target: "tgn_core::notifier::dispatch", "failed to send message");
        });

        n.quit().await;
        let sent = recorder.0.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![(
                "ERROR: Log Message".to_string(),
                "replica lag too high".to_string()
            )]
        );
    }
}
