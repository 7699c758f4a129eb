use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, Notify};

use crate::{errors::Error, messaging::types::Message, ports::Availability, Result};

/// Intake gate: availability flag, outstanding-request count and the queue sender.
///
/// Admission (check + increment + push) happens under one lock, the same lock
/// lifecycle transitions take to flip availability. The lock is never held
/// across an `.await`.
#[derive(Default)]
pub(crate) struct Gate {
    state: Mutex<GateState>,
    drained: Notify,
}

#[derive(Default)]
struct GateState {
    availability: Availability,
    outstanding: usize,
    /// Bumped on every start so a submitter holding a permit on a previous
    /// run's queue cannot push into it.
    generation: u64,
    tx: Option<mpsc::Sender<Message>>,
}

impl Gate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn availability(&self) -> Availability {
        self.lock().availability
    }

    pub(crate) fn set_availability(&self, availability: Availability) {
        self.lock().availability = availability;
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Install a fresh queue and admit work.
    pub(crate) fn open(&self, tx: mpsc::Sender<Message>) {
        let mut st = self.lock();
        st.generation += 1;
        st.tx = Some(tx);
        st.availability = Availability::Available;
    }

    /// Admit a message, waiting for queue capacity if the queue is full.
    ///
    /// Fails fast with `NotAvailable` when the unit does not accept work; the
    /// wait for capacity happens outside the lock and admission is re-checked
    /// once a slot is reserved.
    pub(crate) async fn submit(&self, msg: Message) -> Result<()> {
        let (tx, generation) = {
            let st = self.lock();
            if st.availability != Availability::Available {
                return Err(Error::NotAvailable);
            }
            let Some(tx) = st.tx.clone() else {
                return Err(Error::NotAvailable);
            };
            (tx, st.generation)
        };

        let permit = tx.reserve().await.map_err(|_| Error::NotAvailable)?;

        let mut st = self.lock();
        if st.availability != Availability::Available || st.generation != generation {
            return Err(Error::NotAvailable);
        }
        st.outstanding += 1;
        permit.send(msg);
        Ok(())
    }

    /// Admit a message without waiting. A full queue is reported as `QueueFull`.
    pub(crate) fn try_submit(&self, msg: Message) -> Result<()> {
        let mut guard = self.lock();
        let st = &mut *guard;
        if st.availability != Availability::Available {
            return Err(Error::NotAvailable);
        }
        let Some(tx) = st.tx.as_ref() else {
            return Err(Error::NotAvailable);
        };
        let permit = tx.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => Error::QueueFull,
            mpsc::error::TrySendError::Closed(()) => Error::NotAvailable,
        })?;
        st.outstanding += 1;
        permit.send(msg);
        Ok(())
    }

    /// Release one admitted message (delivered, failed or discarded).
    fn release(&self) {
        let mut st = self.lock();
        st.outstanding = st.outstanding.saturating_sub(1);
        if st.outstanding == 0 {
            self.drained.notify_waiters();
        }
    }

    /// Wait until no admitted message is outstanding.
    pub(crate) async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let drained = self.lock().outstanding == 0;
            if drained {
                return;
            }
            notified.await;
        }
    }
}

/// Ownership of one unit of the outstanding-request count.
///
/// Released exactly once, on drop, whatever happened to the message.
pub(crate) struct InFlight {
    gate: Arc<Gate>,
}

impl InFlight {
    /// Take over the count incremented when the message was admitted.
    pub(crate) fn adopt(gate: Arc<Gate>) -> Self {
        Self { gate }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn rejects_before_open() {
        let gate = Gate::default();
        let err = gate.submit(Message::new("t", "x")).await.unwrap_err();
        assert!(matches!(err, Error::NotAvailable));
        assert_eq!(gate.outstanding(), 0);
    }

    #[tokio::test]
    async fn admission_counts_and_enqueues() {
        let gate = Gate::default();
        let (tx, mut rx) = mpsc::channel(4);
        gate.open(tx);

        gate.submit(Message::new("a", "1")).await.unwrap();
        gate.try_submit(Message::new("b", "2")).unwrap();
        assert_eq!(gate.outstanding(), 2);
        assert_eq!(rx.recv().await.unwrap().title, "a");
        assert_eq!(rx.recv().await.unwrap().title, "b");
    }

    #[tokio::test]
    async fn try_submit_reports_full_queue() {
        let gate = Gate::default();
        let (tx, _rx) = mpsc::channel(1);
        gate.open(tx);

        gate.try_submit(Message::new("a", "1")).unwrap();
        let err = gate.try_submit(Message::new("b", "2")).unwrap_err();
        assert!(matches!(err, Error::QueueFull));
        assert_eq!(gate.outstanding(), 1);
    }

    #[tokio::test]
    async fn submit_waits_for_capacity() {
        let gate = Arc::new(Gate::default());
        let (tx, mut rx) = mpsc::channel(1);
        gate.open(tx);
        gate.submit(Message::new("a", "1")).await.unwrap();

        let g = gate.clone();
        let blocked = tokio::spawn(async move { g.submit(Message::new("b", "2")).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        assert_eq!(rx.recv().await.unwrap().title, "a");
        blocked.await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap().title, "b");
        assert_eq!(gate.outstanding(), 2);
    }

    #[tokio::test]
    async fn waiting_submitter_is_rejected_after_close() {
        let gate = Arc::new(Gate::default());
        let (tx, mut rx) = mpsc::channel(1);
        gate.open(tx);
        gate.submit(Message::new("a", "1")).await.unwrap();

        let g = gate.clone();
        let blocked = tokio::spawn(async move { g.submit(Message::new("b", "2")).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.set_availability(Availability::Unavailable);
        rx.recv().await.unwrap();

        assert!(matches!(
            blocked.await.unwrap().unwrap_err(),
            Error::NotAvailable
        ));
        assert_eq!(gate.outstanding(), 1);
    }

    #[tokio::test]
    async fn wait_drained_returns_after_last_release() {
        let gate = Arc::new(Gate::default());
        let (tx, _rx) = mpsc::channel(4);
        gate.open(tx);
        gate.try_submit(Message::new("a", "1")).unwrap();
        gate.try_submit(Message::new("b", "2")).unwrap();

        let first = InFlight::adopt(gate.clone());
        let second = InFlight::adopt(gate.clone());
        let g = gate.clone();
        let waiter = tokio::spawn(async move { g.wait_drained().await });

        drop(first);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(gate.outstanding(), 0);
    }
}
