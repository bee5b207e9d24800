//! In-flight deduplication of origin calls, one group per cache key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::watch;

use crate::transport::TransportError;

/// What a group resolves to: the encoded origin response, or the origin's error.
pub(crate) type Outcome = Result<Bytes, TransportError>;

type Slot = watch::Receiver<Option<Outcome>>;

/// Registry of open groups.
///
/// A group lives from the moment its leader registers it until the leader
/// publishes an outcome. The map lock is only held to look up, insert, or
/// remove a group, never while waiting.
#[derive(Debug, Default)]
pub(crate) struct Flights {
    groups: Mutex<HashMap<String, Slot>>,
}

/// The leader's handle on its group.
///
/// Dropping it without calling [`finish`](Self::finish) closes the group and
/// wakes every waiter with [`TransportError::Aborted`].
#[derive(Debug)]
pub(crate) struct Leader {
    flights: Arc<Flights>,
    key: String,
    tx: Option<watch::Sender<Option<Outcome>>>,
}

/// A caller's ticket to a group's outcome.
#[derive(Debug)]
pub(crate) struct Waiter {
    rx: Slot,
}

impl Flights {
    fn groups(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Joins the open group for `key`, or opens one.
    ///
    /// The second element is `Some` only for the caller that opened the
    /// group; that caller is responsible for producing the outcome.
    pub(crate) fn join(self: &Arc<Self>, key: &str) -> (Waiter, Option<Leader>) {
        let mut groups = self.groups();
        if let Some(rx) = groups.get(key) {
            return (Waiter { rx: rx.clone() }, None);
        }

        let (tx, rx) = watch::channel(None);
        groups.insert(key.to_owned(), rx.clone());
        let leader = Leader {
            flights: Arc::clone(self),
            key: key.to_owned(),
            tx: Some(tx),
        };
        (Waiter { rx }, Some(leader))
    }

    /// Number of open groups.
    pub(crate) fn len(&self) -> usize {
        self.groups().len()
    }
}

impl Leader {
    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Closes the group, then hands `outcome` to everyone who joined it.
    pub(crate) fn finish(mut self, outcome: Outcome) {
        self.flights.groups().remove(&self.key);
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(outcome));
        }
    }
}

impl Drop for Leader {
    fn drop(&mut self) {
        // Only an unfinished leader still owns its registry entry.
        if self.tx.is_some() {
            self.flights.groups().remove(&self.key);
        }
    }
}

impl Waiter {
    /// Waits for the group's outcome.
    pub(crate) async fn outcome(mut self) -> Outcome {
        match self.rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone().unwrap_or(Err(TransportError::Aborted)),
            Err(_) => Err(TransportError::Aborted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_caller_follows() {
        let flights = Arc::new(Flights::default());
        let (w1, leader) = flights.join("k");
        let (w2, none) = flights.join("k");
        assert!(none.is_none());
        assert_eq!(flights.len(), 1);

        let leader = leader.unwrap();
        assert_eq!(leader.key(), "k");
        leader.finish(Ok(Bytes::from_static(b"v")));
        assert_eq!(flights.len(), 0);
        assert_eq!(w1.outcome().await.unwrap(), "v");
        assert_eq!(w2.outcome().await.unwrap(), "v");
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let flights = Arc::new(Flights::default());
        let (_wa, a) = flights.join("a");
        let (_wb, b) = flights.join("b");
        assert!(a.is_some());
        assert!(b.is_some());
        assert_eq!(flights.len(), 2);
    }

    #[tokio::test]
    async fn closed_group_is_not_reused() {
        let flights = Arc::new(Flights::default());
        let (_w, leader) = flights.join("k");
        leader.unwrap().finish(Ok(Bytes::new()));
        let (_w, again) = flights.join("k");
        assert!(again.is_some());
    }

    #[tokio::test]
    async fn errors_reach_every_waiter() {
        let flights = Arc::new(Flights::default());
        let (w1, leader) = flights.join("k");
        let (w2, _) = flights.join("k");
        leader.unwrap().finish(Err(TransportError::MissingHost { url: "x".into() }));
        assert!(matches!(w1.outcome().await, Err(TransportError::MissingHost { .. })));
        assert!(matches!(w2.outcome().await, Err(TransportError::MissingHost { .. })));
    }

    #[tokio::test]
    async fn dropped_leader_aborts_waiters() {
        let flights = Arc::new(Flights::default());
        let (w, leader) = flights.join("k");
        drop(leader);
        assert_eq!(flights.len(), 0);
        assert!(matches!(w.outcome().await, Err(TransportError::Aborted)));
    }
}
