//! Per-subscriber value broadcast
//!
//! Every subscriber gets its own unbounded channel, seeded with the current
//! value. Changes are delivered to each live subscriber exactly once and in
//! the order they were made, stamped with the caller's dispatch sequence.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::browser::{Dispatched, Watch};
use crate::error::{AnnotationError, Result};

pub(crate) struct Signal<T> {
    value: T,
    /// Dispatch that last changed the value
    seq: u64,
    subscribers: Vec<mpsc::UnboundedSender<Result<Dispatched<T>>>>,
}

impl<T: Clone + Send + 'static> Signal<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            value,
            seq: 0,
            subscribers: Vec::new(),
        }
    }

    pub(crate) fn get(&self) -> T {
        self.value.clone()
    }

    pub(crate) fn subscribe(&mut self) -> Watch<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is alive, cannot fail
        let _ = tx.send(Ok(Dispatched::new(self.seq, self.value.clone())));
        self.subscribers.push(tx);
        UnboundedReceiverStream::new(rx).boxed()
    }

    pub(crate) fn set(&mut self, value: T, seq: u64) {
        self.value = value.clone();
        self.seq = seq;
        self.broadcast(Ok(Dispatched::new(seq, value)));
    }

    /// Deliver an error and detach every current subscriber
    pub(crate) fn fail(&mut self, error: AnnotationError) {
        self.broadcast(Err(error));
        self.subscribers.clear();
    }

    /// Number of subscribers whose stream is still alive
    pub(crate) fn live_subscribers(&mut self) -> usize {
        self.subscribers.retain(|tx| !tx.is_closed());
        self.subscribers.len()
    }

    fn broadcast(&mut self, item: Result<Dispatched<T>>) {
        self.subscribers.retain(|tx| tx.send(item.clone()).is_ok());
    }
}
