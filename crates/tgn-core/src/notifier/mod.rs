//! The notifier unit: intake gate, dispatch loop and lifecycle controller.
//!
//! Lifecycle:
//! - `start` admits work and launches the dispatch loop (no-op when running)
//! - `pause` stops admitting work; queued and in-flight messages still go out
//! - `quit` stops admitting work, waits until every admitted message is done,
//!   then stops the dispatch loop and waits for it to exit

mod dispatch;
mod gate;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    config::{self, RawConfig, ValidatedConfig},
    messaging::{port::Connector, types::Message},
    ports::{Availability, Unit, UnitOperationResult},
    Result,
};

use dispatch::DispatchContext;
use gate::Gate;

/// Target prefix of everything the notifier logs. The logging hook never
/// forwards events under it.
pub const LOG_TARGET_PREFIX: &str = module_path!();

/// Handle to a notifier unit. Cheap to clone; all clones drive the same unit.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

struct NotifierInner {
    name: Arc<str>,
    cfg: Arc<ValidatedConfig>,
    connector: Arc<dyn Connector>,
    gate: Arc<Gate>,
    running: AtomicBool,
    dispatcher: Mutex<Option<DispatchHandle>>,
}

struct DispatchHandle {
    quit: CancellationToken,
    done: JoinHandle<()>,
}

impl Notifier {
    /// Validate `raw` (against the process environment) and build a stopped unit.
    pub fn new(
        name: impl Into<String>,
        raw: Option<&RawConfig>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let cfg = config::validate(raw)?;
        Ok(Self::with_config(name, cfg, connector))
    }

    pub fn with_config(
        name: impl Into<String>,
        cfg: ValidatedConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let name: String = name.into();
        Self {
            inner: Arc::new(NotifierInner {
                name: Arc::from(name),
                cfg: Arc::new(cfg),
                connector,
                gate: Arc::new(Gate::default()),
                running: AtomicBool::new(false),
                dispatcher: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.inner.cfg
    }

    /// Queue a notification.
    ///
    /// Returns `NotAvailable` right away unless the unit is available. When the
    /// queue is full this waits for room; once `Ok` is returned the message will
    /// be handed to the backend unless the dispatch loop dies first.
    pub async fn submit(&self, title: &str, text: &str) -> Result<()> {
        self.inner.gate.submit(Message::new(title, text)).await
    }

    /// Like [`Notifier::submit`] but never waits: a full queue yields `QueueFull`.
    pub fn try_submit(&self, title: &str, text: &str) -> Result<()> {
        self.inner.gate.try_submit(Message::new(title, text))
    }

    /// Messages admitted but not yet delivered, failed or discarded.
    pub fn outstanding(&self) -> usize {
        self.inner.gate.outstanding()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    fn dispatcher(&self) -> std::sync::MutexGuard<'_, Option<DispatchHandle>> {
        self.inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Unit for Notifier {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn availability(&self) -> Availability {
        self.inner.gate.availability()
    }

    async fn start(&self) -> UnitOperationResult {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(unit = %self.inner.name, "start ignored: already running");
            return UnitOperationResult::ok();
        }

        let (tx, rx) = mpsc::channel(self.inner.cfg.queue_capacity);
        let quit = CancellationToken::new();
        self.inner.gate.open(tx);

        let ctx = DispatchContext {
            unit: self.inner.name.clone(),
            cfg: self.inner.cfg.clone(),
            connector: self.inner.connector.clone(),
            gate: self.inner.gate.clone(),
        };
        let done = tokio::spawn(dispatch::run(ctx, rx, quit.clone()));
        *self.dispatcher() = Some(DispatchHandle { quit, done });

        info!(unit = %self.inner.name, "started");
        UnitOperationResult::ok()
    }

    async fn pause(&self) -> UnitOperationResult {
        self.inner
            .gate
            .set_availability(Availability::TemporarilyUnavailable);
        info!(unit = %self.inner.name, "paused");
        UnitOperationResult::ok()
    }

    async fn quit(&self) -> UnitOperationResult {
        self.inner.gate.set_availability(Availability::Unavailable);

        self.inner.gate.wait_drained().await;

        if self
            .inner
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return UnitOperationResult::ok();
        }

        let handle = self.dispatcher().take();
        if let Some(DispatchHandle { quit, done }) = handle {
            quit.cancel();
            if let Err(e) = done.await {
                error!(unit = %self.inner.name, error = %e, "dispatch loop panicked");
                return UnitOperationResult::failed(format!("dispatch loop panicked: {e}"));
            }
        }

        info!(unit = %self.inner.name, "quit");
        UnitOperationResult::ok()
    }
}
