//! Message fan-out and the timeout/cancel race.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

type Filter<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

struct Subscriber<T> {
    filter: Filter<T>,
    sender: mpsc::UnboundedSender<T>,
}

struct Inner<T> {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Subscriber<T>>>,
}

/// How a wait for input ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOutcome<T> {
    /// A message passed the filter.
    Received(T),
    /// Nothing arrived in time.
    TimedOut,
    /// The cancellation token fired.
    Cancelled,
}

/// Fans published messages out to filtered subscribers.
///
/// Cloning yields another handle to the same set of subscribers.
pub struct InputBroker<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for InputBroker<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for InputBroker<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(0),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl<T> fmt::Debug for InputBroker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputBroker")
            .field("subscribers", &self.inner.subscribers.lock().len())
            .finish()
    }
}

impl<T: Clone + Send + 'static> InputBroker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `message` to every subscriber whose filter accepts it.
    ///
    /// Returns how many subscribers received it. Filters run under the
    /// broker's lock and must not publish or subscribe themselves.
    pub fn publish(&self, message: &T) -> usize {
        let subscribers = self.inner.subscribers.lock();
        let delivered = subscribers
            .values()
            .filter(|subscriber| (subscriber.filter)(message))
            .filter(|subscriber| subscriber.sender.send(message.clone()).is_ok())
            .count();
        trace!("Delivered input to {} of {} subscribers", delivered, subscribers.len());
        delivered
    }

    /// Receive every future message accepted by `filter` until the returned
    /// guard is dropped.
    pub fn subscribe<F>(&self, filter: F) -> Subscription<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().insert(
            id,
            Subscriber {
                filter: Box::new(filter),
                sender,
            },
        );
        Subscription {
            id,
            receiver,
            broker: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Wait for the first message accepted by `filter`.
    ///
    /// Cancellation wins over a message that is already waiting, and a
    /// message wins over an expired timeout.
    pub async fn next_input<F>(
        &self,
        filter: F,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> InputOutcome<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let mut subscription = self.subscribe(filter);

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Input wait cancelled");
                InputOutcome::Cancelled
            }

            message = subscription.recv() => match message {
                Some(message) => InputOutcome::Received(message),
                // Only reachable if the subscriber entry vanished underneath us.
                None => InputOutcome::Cancelled,
            },

            _ = tokio::time::sleep(timeout) => {
                debug!("Input wait timed out after {:?}", timeout);
                InputOutcome::TimedOut
            }
        }
    }
}

/// Live subscription. Unsubscribes on drop.
pub struct Subscription<T> {
    id: u64,
    receiver: mpsc::UnboundedReceiver<T>,
    broker: Weak<Inner<T>>,
}

impl<T> Subscription<T> {
    /// Next accepted message, or `None` once the broker is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Accepted message already waiting, if any.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(broker) = self.broker.upgrade() {
            broker.subscribers.lock().remove(&self.id);
        }
    }
}
