//! Bounded hand-off queues between pipeline stages
//!
//! Each queue pairs a bounded tokio channel with a "producer finished" flag. Producers
//! never drop items: a full queue is retried after a short sleep. Consumers treat a queue
//! as finished once the flag is set and nothing is buffered, or once every sender is gone.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{sleep, timeout};
use tracing::trace;

use crate::error::{MigrationError, Result};

/// Push `value`, sleeping `retry_delay` between attempts while the queue is full.
///
/// Returns the number of retries it took. Fails only if the receiving side is gone.
pub async fn push_with_backpressure<T>(
    sender: &mpsc::Sender<T>,
    mut value: T,
    retry_delay: Duration,
    queue: &str,
) -> Result<usize> {
    let mut retries = 0;
    loop {
        match sender.try_send(value) {
            Ok(()) => return Ok(retries),
            Err(TrySendError::Full(rejected)) => {
                value = rejected;
                retries += 1;
                trace!(queue, retries, "Queue full, backing off");
                sleep(retry_delay).await;
            }
            Err(TrySendError::Closed(_)) => {
                return Err(MigrationError::QueueClosed {
                    queue: queue.to_string(),
                });
            }
        }
    }
}

/// Create a named bounded queue
pub fn bounded_queue<T>(
    name: &'static str,
    capacity: usize,
    retry_delay: Duration,
) -> (QueueProducer<T>, QueueConsumer<T>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let done = Arc::new(AtomicBool::new(false));
    (
        QueueProducer {
            name,
            sender,
            done: Arc::clone(&done),
            retry_delay,
        },
        QueueConsumer {
            name,
            receiver,
            done,
        },
    )
}

/// Sending half of a stage queue
#[derive(Debug)]
pub struct QueueProducer<T> {
    name: &'static str,
    sender: mpsc::Sender<T>,
    done: Arc<AtomicBool>,
    retry_delay: Duration,
}

impl<T> QueueProducer<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn push(&self, value: T) -> Result<usize> {
        push_with_backpressure(&self.sender, value, self.retry_delay, self.name).await
    }

    /// Mark the producer finished and release this sender
    pub fn finish(self) {
        self.done.store(true, Ordering::Release);
    }

    pub fn done_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.done)
    }
}

/// Result of waiting on a queue for one idle interval
#[derive(Debug, PartialEq, Eq)]
pub enum Polled<T> {
    Item(T),
    Idle,
    Finished,
}

/// Receiving half of a stage queue
#[derive(Debug)]
pub struct QueueConsumer<T> {
    name: &'static str,
    receiver: mpsc::Receiver<T>,
    done: Arc<AtomicBool>,
}

impl<T> QueueConsumer<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Producer has finished and everything it sent has been taken
    pub fn is_finished(&self) -> bool {
        self.receiver.is_empty() && (self.is_done() || self.receiver.is_closed())
    }

    /// Receive the next item. `None` means every sender is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Wait at most `idle` for an item
    pub async fn poll(&mut self, idle: Duration) -> Polled<T> {
        match timeout(idle, self.receiver.recv()).await {
            Ok(Some(item)) => Polled::Item(item),
            Ok(None) => Polled::Finished,
            Err(_) if self.is_finished() => Polled::Finished,
            Err(_) => Polled::Idle,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
