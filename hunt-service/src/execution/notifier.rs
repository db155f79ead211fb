// Progress Notifier
// Per-execution publish/subscribe fan-out of hunt events

use super::events::{progress_channel, HuntEvent, ProgressReceiver, ProgressSender};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

struct Subscriber {
    id: u64,
    tx: ProgressSender,
}

/// Fan-out of events to the subscribers of each execution
///
/// Delivery is best-effort: publishing never blocks or fails, and a subscriber
/// whose channel is closed is dropped. A terminal event clears every
/// subscription of its execution.
#[derive(Default)]
pub struct ProgressNotifier {
    subscribers: Mutex<HashMap<Uuid, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl ProgressNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the events of one execution
    pub fn subscribe(&self, execution_id: Uuid) -> Subscription {
        let (tx, rx) = progress_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.lock()
            .entry(execution_id)
            .or_default()
            .push(Subscriber { id, tx });

        tracing::debug!(%execution_id, subscription = id, "subscriber added");
        Subscription {
            id,
            execution_id,
            rx,
        }
    }

    /// Remove one subscription; unknown ids are ignored
    pub fn unsubscribe(&self, execution_id: Uuid, subscription_id: u64) {
        let mut subscribers = self.lock();
        if let Some(list) = subscribers.get_mut(&execution_id) {
            list.retain(|s| s.id != subscription_id);
            if list.is_empty() {
                subscribers.remove(&execution_id);
            }
        }
    }

    /// Deliver an event to every subscriber of its execution
    pub fn publish(&self, event: HuntEvent) {
        let execution_id = event.execution_id;
        let terminal = event.is_terminal();
        let mut subscribers = self.lock();

        if let Some(list) = subscribers.get_mut(&execution_id) {
            list.retain(|s| {
                let delivered = s.tx.send(event.clone()).is_ok();
                if !delivered {
                    tracing::debug!(%execution_id, subscription = s.id, "dropping closed subscriber");
                }
                delivered
            });
            if terminal || list.is_empty() {
                subscribers.remove(&execution_id);
            }
        }
    }

    /// Number of live subscriptions for an execution
    pub fn subscriber_count(&self, execution_id: Uuid) -> usize {
        self.lock().get(&execution_id).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Vec<Subscriber>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving side of one subscription
pub struct Subscription {
    id: u64,
    execution_id: Uuid,
    rx: ProgressReceiver,
}

impl Subscription {
    /// A subscription that yields the given events and then ends
    ///
    /// Used for executions that have already finished.
    pub fn closed(execution_id: Uuid, events: Vec<HuntEvent>) -> Self {
        let (tx, rx) = progress_channel();
        for event in events {
            let _ = tx.send(event);
        }
        Self {
            id: u64::MAX,
            execution_id,
            rx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Next event, or `None` once the execution has ended
    pub async fn recv(&mut self) -> Option<HuntEvent> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<HuntEvent> {
        UnboundedReceiverStream::new(self.rx)
    }
}
