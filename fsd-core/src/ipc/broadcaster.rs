use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError};
use tokio::sync::{RwLock, mpsc};
use tracing::{trace, warn};

use crate::error::{FsdError, Result};
use crate::ipc::message::Message;

/// Longest time a single subscriber may hold up a broadcast.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-call delivery tally returned by [`Broadcaster::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    /// Subscribers whose queue stayed full for the whole bounded wait.
    pub dropped: usize,
    /// Subscribers whose receiving half was already gone.
    pub closed: usize,
}

/// Fan-out of [`Message`]s to named subscribers, each owning one bounded
/// queue.
///
/// The registry sits behind a readers-writer lock: every broadcast holds a
/// read guard for its whole delivery pass, so an unsubscribe (write guard)
/// can never close a queue that a publisher is still writing to.
pub struct Broadcaster {
    depth: usize,
    send_timeout: Duration,
    subscribers: RwLock<HashMap<String, mpsc::Sender<Message>>>,
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Broadcaster");
        debug
            .field("depth", &self.depth)
            .field("send_timeout", &self.send_timeout);
        match self.subscribers.try_read() {
            Ok(guard) => {
                debug.field("subscriber_count", &guard.len());
            }
            Err(_) => {
                debug.field("subscribers", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl Broadcaster {
    pub fn new(depth: usize) -> Self {
        Self::with_send_timeout(depth, DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_send_timeout(depth: usize, send_timeout: Duration) -> Self {
        Self {
            depth: depth.max(1),
            send_timeout,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Register a new subscriber queue under `name`.
    ///
    /// Names are unique; registering the same name twice is rejected.
    pub async fn subscribe(&self, name: impl Into<String>) -> Result<Subscription> {
        let name = name.into();
        let mut guard = self.subscribers.write().await;
        if guard.contains_key(&name) {
            return Err(FsdError::DuplicateSubscriber(name));
        }

        let (tx, rx) = mpsc::channel(self.depth);
        guard.insert(name.clone(), tx);
        trace!(subscriber = %name, depth = self.depth, "subscribed");

        Ok(Subscription { name, rx })
    }

    /// Remove `name` and close its queue. Missing names are ignored.
    pub async fn unsubscribe(&self, name: &str) -> bool {
        let removed = self.subscribers.write().await.remove(name);
        if removed.is_some() {
            trace!(subscriber = %name, "unsubscribed");
        }
        removed.is_some()
    }

    pub async fn subscriber_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.subscribers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Offer `msg` to every registered subscriber.
    ///
    /// Deliveries run concurrently and each waits at most the configured
    /// send timeout, so the whole call is bounded by that timeout no matter
    /// how many subscribers lag. A lagging subscriber loses this message and
    /// a warning naming it is logged.
    pub async fn broadcast(&self, msg: Message) -> BroadcastOutcome {
        let guard = self.subscribers.read().await;
        let send_timeout = self.send_timeout;

        let deliveries = guard.iter().map(|(name, tx)| {
            let msg = msg.clone();
            async move {
                let result = tx.send_timeout(msg, send_timeout).await;
                (name.as_str(), result)
            }
        });

        let mut outcome = BroadcastOutcome::default();
        for (name, result) in join_all(deliveries).await {
            match result {
                Ok(()) => outcome.delivered += 1,
                Err(SendTimeoutError::Timeout(dropped)) => {
                    outcome.dropped += 1;
                    warn!(
                        subscriber = %name,
                        message = %dropped,
                        "subscriber queue full, message dropped"
                    );
                }
                Err(SendTimeoutError::Closed(_)) => {
                    outcome.closed += 1;
                    trace!(subscriber = %name, "subscriber queue already closed");
                }
            }
        }

        outcome
    }
}

/// Receiving half of a subscriber queue.
pub struct Subscription {
    name: String,
    rx: mpsc::Receiver<Message>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("queued", &self.rx.len())
            .finish()
    }
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next message, or `None` once the subscriber has been unsubscribed and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> std::result::Result<Message, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
