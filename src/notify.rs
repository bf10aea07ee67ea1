//! Outbound lifecycle events.
//!
//! The lifecycle code only ever calls [`Notifier::emit`], which never blocks and never
//! fails from the caller's point of view. A background task drains the queue into a
//! [`NotificationSink`]; whatever the sink does with an event (and whether it works)
//! has no bearing on the state change that produced it.

use std::future::Future;

use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    DonationPosted,
    RequestCreated,
    RequestAccepted,
}

/// Who the notification is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    pub donation_id: Uuid,
    pub request_id: Option<Uuid>,
    pub food_type: String,
    pub quantity: String,
    /// The other party: the receiver for `RequestCreated`, the donor for `RequestAccepted`.
    pub counterpart: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub to: Recipient,
    pub kind: EventKind,
    pub context: EventContext,
}

pub trait NotificationSink: Send + Sync + 'static {
    fn deliver(&self, event: &LifecycleEvent) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Writes every event to the log. Used when no real delivery channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    async fn deliver(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        tracing::info!(
            kind = ?event.kind,
            to = %event.to.email,
            donation_id = %event.context.donation_id,
            request_id = ?event.context.request_id,
            "notification"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<LifecycleEvent>,
}

impl Notifier {
    pub fn channel(capacity: usize) -> (Notifier, mpsc::Receiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Notifier { tx }, rx)
    }

    /// Starts the delivery task. It stops once every `Notifier` clone is dropped.
    pub fn spawn<S: NotificationSink>(sink: S, capacity: usize) -> (Notifier, JoinHandle<()>) {
        let (notifier, rx) = Self::channel(capacity);
        (notifier, tokio::spawn(run(sink, rx)))
    }

    pub fn emit(&self, event: LifecycleEvent) {
        let kind = event.kind;
        if let Err(e) = self.tx.try_send(event) {
            tracing::warn!(?kind, "notification dropped: {e}");
        }
    }
}

pub async fn run<S: NotificationSink>(sink: S, mut rx: mpsc::Receiver<LifecycleEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = sink.deliver(&event).await {
            tracing::warn!(kind = ?event.kind, to = %event.to.email, "notification failed: {e:#}");
        }
    }
    tracing::debug!("notification queue closed");
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn event(kind: EventKind) -> LifecycleEvent {
        LifecycleEvent {
            to: Recipient {
                user_id: Uuid::now_v7(),
                name: "Asha".into(),
                email: "asha@example.org".into(),
            },
            kind,
            context: EventContext {
                donation_id: Uuid::now_v7(),
                request_id: None,
                food_type: "Rice".into(),
                quantity: "5kg".into(),
                counterpart: None,
            },
        }
    }

    #[derive(Clone, Default)]
    struct Flaky {
        seen: Arc<Mutex<Vec<EventKind>>>,
    }

    impl NotificationSink for Flaky {
        async fn deliver(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(event.kind);
            anyhow::ensure!(event.kind != EventKind::RequestCreated, "smtp down");
            Ok(())
        }
    }

    #[tokio::test]
    async fn sink_failures_do_not_stop_the_worker() {
        let sink = Flaky::default();
        let (notifier, worker) = Notifier::spawn(sink.clone(), 8);

        notifier.emit(event(EventKind::DonationPosted));
        notifier.emit(event(EventKind::RequestCreated));
        notifier.emit(event(EventKind::RequestAccepted));
        drop(notifier);
        worker.await.unwrap();

        assert_eq!(
            *sink.seen.lock().unwrap(),
            [EventKind::DonationPosted, EventKind::RequestCreated, EventKind::RequestAccepted]
        );
    }

    #[tokio::test]
    async fn a_full_queue_drops_instead_of_blocking() {
        let (notifier, mut rx) = Notifier::channel(1);
        notifier.emit(event(EventKind::DonationPosted));
        notifier.emit(event(EventKind::RequestAccepted));

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::DonationPosted);
        assert!(rx.try_recv().is_err());
    }
}
