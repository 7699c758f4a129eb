use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::ValidatedConfig,
    errors::Error,
    messaging::{
        port::{Connector, DeliveryPort},
        types::Message,
    },
    ports::Availability,
};

use super::gate::{Gate, InFlight};

pub(crate) struct DispatchContext {
    pub(crate) unit: Arc<str>,
    pub(crate) cfg: Arc<ValidatedConfig>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) gate: Arc<Gate>,
}

/// The dispatch loop: one per running unit.
///
/// Connects the delivery backend (bounded by `connect_timeout`), then hands
/// every dequeued message to its own delivery task until `quit` fires.
/// Whatever is left in the queue on exit is discarded and its outstanding
/// count released.
pub(crate) async fn run(
    ctx: DispatchContext,
    mut rx: mpsc::Receiver<Message>,
    quit: CancellationToken,
) {
    let connect_timeout = ctx.cfg.connect_timeout;
    let connect = tokio::time::timeout(connect_timeout, ctx.connector.connect(&ctx.cfg));
    let backend = tokio::select! {
        _ = quit.cancelled() => {
            discard_pending(&ctx, rx);
            return;
        }
        res = connect => res.unwrap_or(Err(Error::Timeout(connect_timeout))),
    };

    let backend = match backend {
        Ok(b) => b,
        Err(e) => {
            error!(unit = %ctx.unit, error = %e, "failed to initialize delivery backend");
            ctx.gate.set_availability(Availability::Unavailable);
            discard_pending(&ctx, rx);
            return;
        }
    };

    info!(
        unit = %ctx.unit,
        recipients = ctx.cfg.recipients.len(),
        "dispatch loop started"
    );

    loop {
        tokio::select! {
            biased;
            _ = quit.cancelled() => break,
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                let in_flight = InFlight::adopt(ctx.gate.clone());
                spawn_delivery(
                    ctx.unit.clone(),
                    backend.clone(),
                    ctx.cfg.send_timeout,
                    msg,
                    in_flight,
                );
            }
        }
    }

    discard_pending(&ctx, rx);
    info!(unit = %ctx.unit, "dispatch loop stopped");
}

/// Deliver one message on its own task. The loop never joins it; completion is
/// only visible through the outstanding count.
fn spawn_delivery(
    unit: Arc<str>,
    backend: Arc<dyn DeliveryPort>,
    timeout: Duration,
    msg: Message,
    in_flight: InFlight,
) {
    tokio::spawn(async move {
        let _in_flight = in_flight;
        let deadline = Instant::now() + timeout;

        let res = tokio::time::timeout_at(
            deadline,
            backend.deliver(&msg.title, &msg.text, deadline),
        )
        .await
        .unwrap_or(Err(Error::Timeout(timeout)));

        match res {
            Ok(()) => debug!(unit = %unit, title = %msg.title, "message sent"),
            Err(e) => {
                error!(unit = %unit, title = %msg.title, error = %e, "failed to send message")
            }
        }
    });
}

fn discard_pending(ctx: &DispatchContext, mut rx: mpsc::Receiver<Message>) {
    rx.close();
    let mut discarded = 0usize;
    while let Ok(msg) = rx.try_recv() {
        drop(InFlight::adopt(ctx.gate.clone()));
        debug!(unit = %ctx.unit, title = %msg.title, "discarding undelivered message");
        discarded += 1;
    }
    if discarded > 0 {
        warn!(unit = %ctx.unit, discarded, "dispatch loop exited with messages still queued");
    }
}
