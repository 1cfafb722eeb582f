//! Broker registry and per-event-id publishers.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{EventBusError, EventId};

/// Payload bound for anything published on the bus.
pub trait EventPayload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> EventPayload for T {}

/// A broker for a single event id. Owns a bounded input queue and the set of
/// subscriber queues; its pump task copies each input event to every
/// subscriber in registration order.
pub struct Publisher<T: EventPayload> {
    id: EventId,
    capacity: usize,
    input_tx: mpsc::Sender<T>,
    /// Taken by `start`; present only before the pump is running.
    input_rx: Option<mpsc::Receiver<T>>,
    subscribers: Arc<Mutex<Vec<mpsc::Sender<T>>>>,
}

impl<T: EventPayload> Publisher<T> {
    /// A publisher whose input and subscriber queues hold `capacity` events.
    pub fn new(id: EventId, capacity: usize) -> Self {
        let (input_tx, input_rx) = mpsc::channel(capacity);
        Self {
            id,
            capacity,
            input_tx,
            input_rx: Some(input_rx),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn subscribe(&self) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.lock().expect("subscriber lock poisoned").push(tx);
        rx
    }

    /// Pump loop: drain the input queue, fan out to subscribers. A full
    /// subscriber queue blocks here (backpressure) until space frees up.
    ///
    /// Cancellation stops *intake*, never delivery: once the signal fires the
    /// input queue is closed against new publishes and every event already
    /// accepted is still fanned out before the task returns. An event that
    /// entered the queue is never dropped.
    fn start(&mut self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let mut input_rx = self.input_rx.take()?;
        let subscribers = Arc::clone(&self.subscribers);
        let id = self.id;

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_event = input_rx.recv() => match maybe_event {
                        Some(event) => fan_out(id, &subscribers, event).await,
                        None => {
                            debug!(?id, "event input channel closed, pump exiting");
                            return;
                        }
                    },
                    () = cancel.cancelled() => {
                        // Refuse new input, then deliver everything already
                        // accepted. `close` lets buffered events drain while
                        // further publishes fail fast at the sender.
                        input_rx.close();
                        while let Some(event) = input_rx.recv().await {
                            fan_out(id, &subscribers, event).await;
                        }
                        debug!(?id, "event pump drained and stopped");
                        return;
                    }
                }
            }
        }))
    }
}

/// Copy one event to every subscriber, blocking on full queues. Delivery is
/// unconditional; only a subscriber that dropped its receiver is skipped.
async fn fan_out<T: EventPayload>(
    id: EventId,
    subscribers: &Mutex<Vec<mpsc::Sender<T>>>,
    event: T,
) {
    // Snapshot the senders so the lock is not held across awaits.
    let senders: Vec<mpsc::Sender<T>> =
        subscribers.lock().expect("subscriber lock poisoned").clone();

    for sender in senders {
        if sender.send(event.clone()).await.is_err() {
            // Subscriber dropped its receiver; skip it from now on.
            trace!(?id, "dropping closed subscriber queue");
            subscribers
                .lock()
                .expect("subscriber lock poisoned")
                .retain(|s| !s.is_closed());
        }
    }
}

/// Type-erased publisher handle held by the registry.
trait ErasedPublisher: Send {
    fn event_id(&self) -> EventId;
    fn as_any(&self) -> &dyn Any;
    fn start(&mut self, cancel: CancellationToken) -> Option<JoinHandle<()>>;
}

impl<T: EventPayload> ErasedPublisher for Publisher<T> {
    fn event_id(&self) -> EventId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn start(&mut self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        Publisher::start(self, cancel)
    }
}

/// The process-wide broker registry. Cheap to clone; components receive it by
/// value at construction.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<HashMap<EventId, Box<dyn ErasedPublisher>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Bind `publisher` to its event id.
    pub fn register<T: EventPayload>(&self, publisher: Publisher<T>) -> Result<(), EventBusError> {
        let mut publishers = self.inner.lock().expect("bus lock poisoned");
        let id = publisher.id;
        if publishers.contains_key(&id) {
            return Err(EventBusError::DuplicateEventId(id));
        }
        publishers.insert(id, Box::new(publisher));
        Ok(())
    }

    /// Publish `event` on `id`. Blocks when the publisher's input queue is
    /// full. Fails when the runtime payload type does not match the
    /// publisher's declared type.
    pub async fn publish<T: EventPayload>(
        &self,
        id: EventId,
        event: T,
    ) -> Result<(), EventBusError> {
        let input_tx = {
            let publishers = self.inner.lock().expect("bus lock poisoned");
            let publisher = publishers.get(&id).ok_or(EventBusError::PublisherNotFound(id))?;
            let typed = publisher
                .as_any()
                .downcast_ref::<Publisher<T>>()
                .ok_or(EventBusError::WrongEventType(id))?;
            typed.input_tx.clone()
        };

        input_tx.send(event).await.map_err(|_| EventBusError::PublisherClosed(id))
    }

    /// Open a new subscriber queue on `id`.
    pub fn subscribe<T: EventPayload>(
        &self,
        id: EventId,
    ) -> Result<mpsc::Receiver<T>, EventBusError> {
        let publishers = self.inner.lock().expect("bus lock poisoned");
        let publisher = publishers.get(&id).ok_or(EventBusError::PublisherNotFound(id))?;
        let typed = publisher
            .as_any()
            .downcast_ref::<Publisher<T>>()
            .ok_or(EventBusError::WrongEventType(id))?;
        Ok(typed.subscribe())
    }

    /// Spawn one pump task per registered publisher. Tasks exit once `cancel`
    /// fires and in-flight events are drained.
    pub fn start(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut publishers = self.inner.lock().expect("bus lock poisoned");
        publishers.values_mut().filter_map(|p| p.start(cancel.clone())).collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
