//! In-process publish/subscribe over a tokio broadcast channel

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// A message type carried on its own named topic
pub trait Topic: Clone + fmt::Debug + Send + Sync + 'static {
    const NAME: &'static str;
}

/// Typed notification bus.
///
/// Delivery is at-most-once and best-effort: a subscriber that falls more
/// than the channel capacity behind loses the overflowed messages.
pub struct NotificationBus<M: Topic> {
    tx: broadcast::Sender<M>,
}

impl<M: Topic> Clone for NotificationBus<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M: Topic> NotificationBus<M> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fire and forget. Never blocks and never fails the caller.
    pub fn publish(&self, message: M) {
        match self.tx.send(message) {
            Ok(receivers) => debug!(topic = M::NAME, receivers, "Notification published"),
            Err(broadcast::error::SendError(message)) => {
                debug!(topic = M::NAME, ?message, "No subscribers, notification dropped")
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Register a handler run for every message published from now on.
    ///
    /// Messages reach the handler in publish order, one at a time. Each call
    /// runs on its own task so a panic is contained and logged; errors are
    /// logged too. The worker stops once every bus handle is dropped.
    pub fn subscribe_async<F, Fut, E>(&self, name: &'static str, handler: F) -> JoinHandle<()>
    where
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            loop {
                let message = match rx.recv().await {
                    Ok(message) => message,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            topic = M::NAME,
                            subscriber = name,
                            skipped,
                            "Subscriber lagged, notifications dropped"
                        );
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let handler = handler.clone();
                let run = tokio::spawn(async move { (*handler)(message).await });
                match run.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(
                        topic = M::NAME,
                        subscriber = name,
                        error = %e,
                        "Notification handler failed"
                    ),
                    Err(e) if e.is_panic() => error!(
                        topic = M::NAME,
                        subscriber = name,
                        "Notification handler panicked"
                    ),
                    Err(e) => error!(
                        topic = M::NAME,
                        subscriber = name,
                        error = %e,
                        "Notification handler cancelled"
                    ),
                }
            }

            debug!(topic = M::NAME, subscriber = name, "Subscriber stopped");
        })
    }
}
