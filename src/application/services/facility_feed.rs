//! Live slot-set subscriptions per facility
//!
//! Each facility has one latest-value channel holding its newest committed
//! snapshot. Publishing a snapshot whose revision is not newer than the
//! stored one is a no-op, so every subscriber sees a non-decreasing revision
//! sequence. Intermediate states may be coalesced. A channel exists only
//! while the facility has subscribers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::domain::{DomainResult, FacilitySnapshot, OccupancyStore};

type SnapshotCell = Option<Arc<FacilitySnapshot>>;
type Channels = DashMap<String, watch::Sender<SnapshotCell>>;

#[derive(Default)]
pub struct FacilityFeed {
    channels: Arc<Channels>,
    subscriber_count: Arc<AtomicUsize>,
}

impl FacilityFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a snapshot. Returns `true` when it replaced an older one.
    /// Without subscribers there is nothing to replace and it is dropped.
    pub fn publish(&self, snapshot: FacilitySnapshot) -> bool {
        let facility_id = snapshot.facility.id.clone();
        let revision = snapshot.revision();
        let Some(sender) = self.channels.get(&facility_id).map(|s| s.clone()) else {
            debug!(facility_id = %facility_id, revision, "No subscribers, snapshot dropped");
            return false;
        };

        let mut incoming = Some(Arc::new(snapshot));
        let accepted = sender.send_if_modified(|current| {
            let newer = current
                .as_ref()
                .map_or(true, |existing| revision > existing.revision());
            if newer {
                *current = incoming.take();
            }
            newer
        });

        debug!(facility_id = %facility_id, revision, accepted, "Snapshot offered");
        accepted
    }

    /// Subscribe to a facility's slot set.
    ///
    /// The handle yields the current snapshot first (read from `store`), then
    /// every newer one. Fails with `NotFound` for an unknown facility.
    pub async fn subscribe(
        &self,
        store: &dyn OccupancyStore,
        facility_id: &str,
    ) -> DomainResult<FacilitySubscription> {
        let current = store.snapshot(facility_id).await?;

        // Subscribed under the entry guard so a concurrent last-unsubscribe
        // cannot remove the channel in between.
        let mut receiver = self
            .channels
            .entry(facility_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe();
        self.publish(current);
        receiver.mark_changed();

        let count = self.subscriber_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(facility_id, total = count, "New facility subscriber");

        Ok(FacilitySubscription {
            facility_id: facility_id.to_string(),
            receiver,
            channels: Arc::clone(&self.channels),
            subscriber_count: self.subscriber_count.clone(),
        })
    }

    /// Latest published snapshot, if any.
    pub fn latest(&self, facility_id: &str) -> Option<Arc<FacilitySnapshot>> {
        self.channels
            .get(facility_id)
            .and_then(|sender| sender.borrow().clone())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }
}

/// Cancellable subscription handle. Dropping it stops delivery.
pub struct FacilitySubscription {
    facility_id: String,
    receiver: watch::Receiver<SnapshotCell>,
    channels: Arc<Channels>,
    subscriber_count: Arc<AtomicUsize>,
}

impl FacilitySubscription {
    pub fn facility_id(&self) -> &str {
        &self.facility_id
    }

    /// Wait for the next snapshot. `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<Arc<FacilitySnapshot>> {
        loop {
            self.receiver.changed().await.ok()?;
            if let Some(snapshot) = self.receiver.borrow_and_update().clone() {
                return Some(snapshot);
            }
        }
    }
}

impl Drop for FacilitySubscription {
    fn drop(&mut self) {
        // Our own receiver is still alive here, so one means last.
        self.channels
            .remove_if(&self.facility_id, |_, sender| sender.receiver_count() <= 1);
        let prev = self.subscriber_count.fetch_sub(1, Ordering::SeqCst);
        info!(
            facility_id = %self.facility_id,
            remaining = prev.saturating_sub(1),
            "Facility subscriber disconnected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Facility, Slot};
    use crate::infrastructure::storage::InMemoryOccupancyStore;
    use std::time::Duration;

    fn snapshot(revision: u64) -> FacilitySnapshot {
        let mut facility = Facility::new("lot-a", "Lot A", 2000, 1, None);
        facility.revision = revision;
        FacilitySnapshot {
            facility,
            slots: vec![Slot::vacant("lot-a", "S1", "A-01", 2000)],
        }
    }

    async fn store_with_lot() -> InMemoryOccupancyStore {
        let store = InMemoryOccupancyStore::new();
        store
            .provision_facility(
                Facility::new("lot-a", "Lot A", 2000, 1, None),
                vec![Slot::vacant("lot-a", "S1", "A-01", 2000)],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn older_revisions_are_rejected() {
        let store = store_with_lot().await;
        let feed = FacilityFeed::new();
        let _sub = feed.subscribe(&store, "lot-a").await.unwrap();
        assert!(feed.publish(snapshot(2)));
        assert!(!feed.publish(snapshot(1)));
        assert!(!feed.publish(snapshot(2)));
        assert!(feed.publish(snapshot(3)));
        assert_eq!(feed.latest("lot-a").unwrap().revision(), 3);
    }

    #[tokio::test]
    async fn subscriber_gets_current_state_then_updates() {
        let store = store_with_lot().await;
        let feed = FacilityFeed::new();
        let mut sub = feed.subscribe(&store, "lot-a").await.unwrap();

        let first = sub.next().await.unwrap();
        assert_eq!(first.revision(), 0);

        store.try_book("lot-a", "S1", "u1").await.unwrap();
        feed.publish(store.snapshot("lot-a").await.unwrap());

        let second = tokio::time::timeout(Duration::from_millis(100), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.revision(), 1);
        assert!(second.slots[0].is_booked);
        assert_eq!(second.facility.available_slots, 0);
    }

    #[tokio::test]
    async fn revisions_observed_never_decrease() {
        let store = store_with_lot().await;
        let feed = FacilityFeed::new();
        let mut sub = feed.subscribe(&store, "lot-a").await.unwrap();

        for rev in [5, 3, 6, 4, 9, 8] {
            feed.publish(snapshot(rev));
        }

        let mut last = 0;
        while let Ok(Some(snap)) =
            tokio::time::timeout(Duration::from_millis(20), sub.next()).await
        {
            assert!(snap.revision() >= last);
            last = snap.revision();
        }
        assert_eq!(last, 9);
    }

    #[tokio::test]
    async fn unknown_facility_is_not_found() {
        let store = InMemoryOccupancyStore::new();
        let feed = FacilityFeed::new();
        let err = feed.subscribe(&store, "nope").await.err().unwrap();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn dropping_handle_unsubscribes() {
        let store = store_with_lot().await;
        let feed = FacilityFeed::new();
        let sub = feed.subscribe(&store, "lot-a").await.unwrap();
        assert_eq!(feed.subscriber_count(), 1);
        drop(sub);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn last_unsubscribe_frees_the_channel() {
        let store = store_with_lot().await;
        let feed = FacilityFeed::new();
        let first = feed.subscribe(&store, "lot-a").await.unwrap();
        let mut second = feed.subscribe(&store, "lot-a").await.unwrap();

        drop(first);
        assert_eq!(feed.channels.len(), 1);
        assert!(feed.publish(snapshot(4)));
        assert_eq!(second.next().await.unwrap().revision(), 4);

        drop(second);
        assert!(feed.channels.is_empty());
        assert!(feed.latest("lot-a").is_none());

        assert!(!feed.publish(snapshot(5)));
        assert!(feed.channels.is_empty());
    }

    #[tokio::test]
    async fn resubscribe_after_release_sees_store_state() {
        let store = store_with_lot().await;
        let feed = FacilityFeed::new();
        drop(feed.subscribe(&store, "lot-a").await.unwrap());

        store.try_book("lot-a", "S1", "u1").await.unwrap();
        let mut sub = feed.subscribe(&store, "lot-a").await.unwrap();
        let snap = sub.next().await.unwrap();
        assert_eq!(snap.revision(), 1);
        assert!(snap.slots[0].is_booked);
    }
}
