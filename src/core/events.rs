//! Post-commit ledger events and their asynchronous dispatch
//!
//! The engine publishes one [`LedgerEvent`] after each committed state change.
//! Publishing never blocks and never fails the ledger operation: sinks hand the
//! event off (for example to a tokio channel) and a separate [`dispatch`] loop
//! delivers it to a [`Notifier`] such as an email sender. A failed
//! notification is logged and dropped; it cannot reach back into the ledger.

use crate::types::{Journal, JournalStatus};
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;

/// Who moved a transfer to `Cancelled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelledBy {
    /// The proposing party withdrew it
    Initiator,
    /// The other party rejected it
    Counterparty,
    /// The ledger cancelled it at accept time because a limit would be breached
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    TransferProposed { journal: Journal },
    TransferAccepted { journal: Journal },
    TransferCancelled { journal: Journal, by: CancelledBy },
}

impl LedgerEvent {
    pub fn journal(&self) -> &Journal {
        match self {
            LedgerEvent::TransferProposed { journal }
            | LedgerEvent::TransferAccepted { journal }
            | LedgerEvent::TransferCancelled { journal, .. } => journal,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::TransferProposed { .. } => "transfer_proposed",
            LedgerEvent::TransferAccepted { .. } => "transfer_accepted",
            LedgerEvent::TransferCancelled { .. } => "transfer_cancelled",
        }
    }

    pub fn status(&self) -> JournalStatus {
        self.journal().status
    }
}

/// Receiver of post-commit events
pub trait EventSink: Send + Sync {
    /// Hand off `event`; must not block on delivery
    fn publish(&self, event: LedgerEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn publish(&self, event: LedgerEvent) {
        (**self).publish(event)
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: LedgerEvent) {}
}

/// Forwards events to a tokio channel consumed by [`dispatch`]
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<LedgerEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: mpsc::UnboundedSender<LedgerEvent>) -> Self {
        ChannelEventSink { sender }
    }

    /// Create a sink together with the receiver to pass to [`dispatch`]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LedgerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ChannelEventSink::new(sender), receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: LedgerEvent) {
        if let Err(unsent) = self.sender.send(event) {
            tracing::debug!(
                event = unsent.0.name(),
                "no dispatcher listening, dropping ledger event"
            );
        }
    }
}

/// Keeps every published event in memory
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<LedgerEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events published so far, oldest first
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: LedgerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers events to the outside world (email, webhooks, ...)
pub trait Notifier: Send + Sync {
    fn notify<'a>(&'a self, event: &'a LedgerEvent) -> BoxFuture<'a, Result<(), NotifyError>>;
}

/// Writes every event to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify<'a>(&'a self, event: &'a LedgerEvent) -> BoxFuture<'a, Result<(), NotifyError>> {
        let journal = event.journal();
        tracing::info!(
            event = event.name(),
            status = %event.status(),
            transfer = %journal.transfer_id,
            initiated_by = %journal.initiated_by,
            counterparty = %journal.counterparty_of(&journal.initiated_by),
            amount = %journal.amount,
            reason = journal.cancellation_reason.as_deref().unwrap_or(""),
            "ledger event"
        );
        future::ready(Ok(())).boxed()
    }
}

/// Outcome counters of a [`dispatch`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: usize,
    pub failed: usize,
}

/// Deliver events until every sender is dropped
pub async fn dispatch<N: Notifier>(
    mut events: mpsc::UnboundedReceiver<LedgerEvent>,
    notifier: N,
) -> DispatchStats {
    let mut stats = DispatchStats::default();
    while let Some(event) = events.recv().await {
        match notifier.notify(&event).await {
            Ok(()) => stats.delivered += 1,
            Err(e) => {
                stats.failed += 1;
                tracing::warn!(
                    event = event.name(),
                    transfer = %event.journal().transfer_id,
                    error = %e,
                    "ledger event notification failed"
                );
            }
        }
    }
    stats
}
