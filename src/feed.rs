//! Live notification feed.
//!
//! A subscription polls a [`NotificationSource`] and compares each snapshot
//! with the ids seen so far. New ids become [`FeedEvent::Arrived`]; the
//! unread count is re-emitted whenever it changes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::Notification;

#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// Current notifications for the user, newest first.
    async fn snapshot(&self, user_id: &str) -> anyhow::Result<Vec<Notification>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Arrived(Notification),
    Unread(usize),
}

/// Ids already reported. Never mutated; each snapshot produces a new state.
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    seen: Option<HashSet<Uuid>>,
    unread: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedUpdate {
    pub arrived: Vec<Notification>,
    pub unread: usize,
    pub unread_changed: bool,
}

impl FeedState {
    pub fn unread(&self) -> usize {
        self.unread.unwrap_or(0)
    }

    /// The first snapshot only primes the seen set; later ones report every
    /// id not seen before, in snapshot order.
    pub fn apply(&self, snapshot: &[Notification]) -> (FeedState, FeedUpdate) {
        let next_seen: HashSet<Uuid> = snapshot.iter().map(|n| n.id).collect();
        let arrived = match &self.seen {
            None => Vec::new(),
            Some(seen) => snapshot
                .iter()
                .filter(|n| !seen.contains(&n.id))
                .cloned()
                .collect(),
        };
        let unread = unread_count(snapshot);

        let update = FeedUpdate {
            arrived,
            unread,
            unread_changed: self.unread != Some(unread),
        };
        let next = FeedState {
            seen: Some(next_seen),
            unread: Some(unread),
        };
        (next, update)
    }
}

pub fn unread_count(snapshot: &[Notification]) -> usize {
    snapshot.iter().filter(|n| !n.is_read).count()
}

/// Handle to a running feed. Dropping it stops the feed too.
pub struct Subscription {
    events: mpsc::Receiver<FeedEvent>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    /// Stops the feed and waits for its task. Closing the receiver first
    /// fails any send the task is parked on, so this returns even when the
    /// consumer stopped reading and the channel is full.
    pub async fn unsubscribe(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.events.close();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "notification feed task ended abnormally");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub fn subscribe(
    source: Arc<dyn NotificationSource>,
    user_id: String,
    interval: Duration,
) -> Subscription {
    let (tx, rx) = mpsc::channel(64);
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut state = FeedState::default();

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {}
            }

            let snapshot = match source.snapshot(&user_id).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "notification snapshot failed");
                    continue;
                }
            };

            let (next, update) = state.apply(&snapshot);
            state = next;
            debug!(
                arrived = update.arrived.len(),
                unread = update.unread,
                "notification snapshot applied"
            );

            for item in update.arrived {
                if tx.send(FeedEvent::Arrived(item)).await.is_err() {
                    return;
                }
            }
            if update.unread_changed && tx.send(FeedEvent::Unread(update.unread)).await.is_err() {
                return;
            }
        }
    });

    Subscription {
        events: rx,
        stop: Some(stop_tx),
        task: Some(task),
    }
}
