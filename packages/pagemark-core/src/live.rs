//! Live-subscription read model shared by the store adapters.
//!
//! Adapters record a [`Change`] for every op of a batch and hand the list to
//! [`SubscriberHub::publish`] only after the batch committed, so subscribers never observe
//! speculative state.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::trace;

use crate::document::Document;
use crate::traits::Query;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub collection: String,
    /// State after the change, or the last state for `Removed`.
    pub document: Document,
}

/// Before/after pair for one document touched by a committed batch.
#[derive(Clone, Debug)]
pub struct Change {
    pub collection: String,
    pub before: Option<Document>,
    pub after: Option<Document>,
}

impl Change {
    /// Event a subscriber to `query` should see for this change, if any.
    pub fn classify(&self, query: &Query) -> Option<ChangeEvent> {
        let was = self
            .before
            .as_ref()
            .filter(|doc| query.matches(&self.collection, doc));
        let is = self
            .after
            .as_ref()
            .filter(|doc| query.matches(&self.collection, doc));
        let (kind, document) = match (was, is) {
            (None, Some(after)) => (ChangeKind::Added, after),
            (Some(before), Some(after)) => {
                if before == after {
                    return None;
                }
                (ChangeKind::Modified, after)
            }
            (Some(before), None) => (ChangeKind::Removed, before),
            (None, None) => return None,
        };
        Some(ChangeEvent {
            kind,
            collection: self.collection.clone(),
            document: document.clone(),
        })
    }
}

/// Handle returned by `LiveQuery::subscribe`. Dropping it unsubscribes.
pub struct Subscription {
    initial: Vec<Document>,
    events: Receiver<ChangeEvent>,
}

impl Subscription {
    /// Query result at the moment of subscribing.
    pub fn initial(&self) -> &[Document] {
        &self.initial
    }

    pub fn try_next(&self) -> Option<ChangeEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Every event delivered so far.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.events.try_iter().collect()
    }
}

#[derive(Default)]
pub struct SubscriberHub {
    subscribers: Vec<(Query, Sender<ChangeEvent>)>,
}

impl SubscriberHub {
    pub fn register(&mut self, query: Query, initial: Vec<Document>) -> Subscription {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push((query, tx));
        Subscription {
            initial,
            events: rx,
        }
    }

    pub fn publish(&mut self, changes: &[Change]) {
        if self.subscribers.is_empty() || changes.is_empty() {
            return;
        }
        self.subscribers.retain(|(query, tx)| {
            for change in changes {
                if let Some(event) = change.classify(query) {
                    if tx.send(event).is_err() {
                        trace!(collection = %query.collection, "dropping closed subscription");
                        return false;
                    }
                }
            }
            true
        });
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
