use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use crate::event_log::EventRecord;
use crate::TournamentId;

pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1000;

pub type EventSender = mpsc::Sender<EventRecord>;
pub type EventReceiver = mpsc::Receiver<EventRecord>;

/// Live event stream of one tournament. Dropping it unsubscribes.
pub struct EventSubscription {
    bus: EventBus,
    tournament_id: TournamentId,
    subscriber_id: usize,
    pub receiver: EventReceiver,
}

impl EventSubscription {
    pub fn receiver(&mut self) -> &mut EventReceiver {
        &mut self.receiver
    }

    pub async fn recv(&mut self) -> Option<EventRecord> {
        self.receiver.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.tournament_id, self.subscriber_id);
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Debug)]
struct EventBusInner {
    subscribers: RwLock<HashMap<TournamentId, Vec<(usize, EventSender)>>>,
    next_id: AtomicUsize,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus whose subscribers each buffer up to `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicUsize::new(0),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn subscribe(&self, tournament_id: TournamentId) -> EventSubscription {
        let (subscriber_id, receiver) = self.subscribe_raw(tournament_id.clone());
        EventSubscription {
            bus: self.clone(),
            tournament_id,
            subscriber_id,
            receiver,
        }
    }

    fn subscribe_raw(&self, tournament_id: TournamentId) -> (usize, EventReceiver) {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
        let mut guard = match self.inner.subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.entry(tournament_id.clone()).or_default().push((id, tx));

        tracing::info!(
            tournament_id = %tournament_id,
            subscriber_id = id,
            "subscribed to tournament events"
        );

        (id, rx)
    }

    pub fn broadcast(&self, record: &EventRecord) {
        let tournament_id = &record.tournament_id;
        tracing::debug!(
            tournament_id = %tournament_id,
            sequence = record.sequence,
            event_type = record.event.kind(),
            "broadcasting event"
        );

        let subscribers = match self.inner.subscribers.read() {
            Ok(guard) => guard.get(tournament_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(tournament_id).cloned(),
        };
        let Some(list) = subscribers else {
            return;
        };

        let mut failed = Vec::new();
        for (id, sender) in list {
            // a slow or gone subscriber is dropped rather than blocking the tournament
            if let Err(e) = sender.try_send(record.clone()) {
                tracing::warn!(
                    tournament_id = %tournament_id,
                    subscriber_id = id,
                    error = %e,
                    "dropping subscriber"
                );
                failed.push(id);
            }
        }
        if !failed.is_empty() {
            self.remove_subscribers(tournament_id, &failed);
        }
    }

    pub fn unsubscribe(&self, tournament_id: &str, subscriber_id: usize) {
        self.remove_subscribers(tournament_id, &[subscriber_id]);
    }

    pub fn drop_tournament(&self, tournament_id: &str) {
        let mut guard = match self.inner.subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.remove(tournament_id);
    }

    pub fn subscriber_count(&self) -> usize {
        match self.inner.subscribers.read() {
            Ok(guard) => guard.values().map(|list| list.len()).sum(),
            Err(poisoned) => poisoned.into_inner().values().map(|list| list.len()).sum(),
        }
    }

    fn remove_subscribers(&self, tournament_id: &str, ids: &[usize]) {
        let mut guard = match self.inner.subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(list) = guard.get_mut(tournament_id) {
            list.retain(|(id, _)| !ids.contains(id));
            if list.is_empty() {
                guard.remove(tournament_id);
            }
        }
    }
}
