//! Latest bay sensor readings
//!
//! Holds the newest reading per sensor key and fans changes out on a
//! bounded broadcast channel. Producers never wait for consumers: a slow
//! subscriber skips ahead instead of growing a queue. The feed has no
//! access to bookings or balances.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::facility::Slot;
use crate::domain::sensor::{SensorReading, SlotOverlay};

const DEFAULT_CAPACITY: usize = 256;

pub struct SensorFeed {
    latest: DashMap<String, SensorReading>,
    changes: broadcast::Sender<SensorReading>,
}

impl SensorFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            latest: DashMap::new(),
            changes,
        }
    }

    /// Store a reading. Returns `false` when it is older than the stored
    /// reading for the same key and was dropped.
    ///
    /// Subscribers are notified only when occupancy or distance changed.
    pub fn ingest(&self, reading: SensorReading) -> bool {
        match self.latest.entry(reading.key.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if reading.received_at < current.received_at {
                    debug!(key = %reading.key, "Discarding out-of-order sensor reading");
                    return false;
                }
                let changed =
                    current.occupied != reading.occupied || current.distance_cm != reading.distance_cm;
                occupied.insert(reading.clone());
                if changed {
                    // Sent under the entry lock so per-key order holds.
                    let _ = self.changes.send(reading);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(reading.clone());
                let _ = self.changes.send(reading);
            }
        }
        metrics::counter!("parking_sensor_readings_total").increment(1);
        true
    }

    pub fn latest(&self, key: &str) -> Option<SensorReading> {
        self.latest.get(key).map(|r| r.clone())
    }

    /// All readings, ordered by key.
    pub fn all(&self) -> Vec<SensorReading> {
        let mut readings: Vec<_> = self.latest.iter().map(|r| r.value().clone()).collect();
        readings.sort_by(|a, b| a.key.cmp(&b.key));
        readings
    }

    pub fn subscribe(&self) -> SensorSubscription {
        SensorSubscription {
            receiver: self.changes.subscribe(),
        }
    }

    /// Pair each slot with the latest reading of its sensor.
    pub fn overlay(&self, slots: &[Slot]) -> Vec<SlotOverlay> {
        let readings: HashMap<&str, SensorReading> = slots
            .iter()
            .filter_map(|s| s.sensor_key.as_deref())
            .filter_map(|k| self.latest(k).map(|r| (k, r)))
            .collect();

        slots
            .iter()
            .map(|slot| SlotOverlay {
                slot: slot.clone(),
                reading: slot
                    .sensor_key
                    .as_deref()
                    .and_then(|k| readings.get(k).cloned()),
            })
            .collect()
    }
}

impl Default for SensorFeed {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedSensorFeed = Arc<SensorFeed>;

pub struct SensorSubscription {
    receiver: broadcast::Receiver<SensorReading>,
}

impl SensorSubscription {
    /// Next changed reading; lagged readings are skipped.
    pub async fn recv(&mut self) -> Option<SensorReading> {
        loop {
            match self.receiver.recv().await {
                Ok(reading) => return Some(reading),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(missed = count, "Sensor subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn reading(key: &str, occupied: bool, distance: f64) -> SensorReading {
        SensorReading {
            key: key.into(),
            occupied,
            distance_cm: distance,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn keeps_latest_per_key() {
        let feed = SensorFeed::new();
        feed.ingest(reading("slot1", false, 180.0));
        feed.ingest(reading("slot1", true, 12.0));
        feed.ingest(reading("slot2", false, 200.0));

        assert!(feed.latest("slot1").unwrap().occupied);
        let keys: Vec<_> = feed.all().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["slot1", "slot2"]);
        assert!(feed.latest("slot9").is_none());
    }

    #[test]
    fn older_reading_is_discarded() {
        let feed = SensorFeed::new();
        let newer = reading("slot1", true, 10.0);
        let mut older = reading("slot1", false, 150.0);
        older.received_at = newer.received_at - Duration::seconds(5);

        assert!(feed.ingest(newer));
        assert!(!feed.ingest(older));
        assert!(feed.latest("slot1").unwrap().occupied);
    }

    #[tokio::test]
    async fn subscribers_see_changes_only() {
        let feed = SensorFeed::new();
        let mut sub = feed.subscribe();

        feed.ingest(reading("slot1", false, 100.0));
        feed.ingest(reading("slot1", false, 100.0));
        feed.ingest(reading("slot1", true, 8.0));

        assert!(!sub.recv().await.unwrap().occupied);
        assert!(sub.recv().await.unwrap().occupied);
    }

    #[tokio::test]
    async fn slow_subscriber_never_blocks_ingest() {
        let feed = SensorFeed::with_capacity(4);
        let mut sub = feed.subscribe();
        for i in 0..100 {
            assert!(feed.ingest(reading("slot1", i % 2 == 0, i as f64)));
        }
        let next = sub.recv().await.unwrap();
        assert!(next.distance_cm >= 96.0);
        assert_eq!(feed.latest("slot1").unwrap().distance_cm, 99.0);
    }

    #[test]
    fn overlay_matches_by_sensor_key() {
        let feed = SensorFeed::new();
        feed.ingest(reading("slot1", true, 9.0));

        let slots = vec![
            Slot::vacant("1", "S1", "A-01", 3000).with_sensor("slot1"),
            Slot::vacant("1", "S2", "A-02", 3000).with_sensor("slot2"),
            Slot::vacant("1", "S3", "A-03", 3000),
        ];
        let overlay = feed.overlay(&slots);
        assert_eq!(overlay.len(), 3);
        assert!(overlay[0].disagrees());
        assert!(overlay[1].reading.is_none());
        assert!(overlay[2].reading.is_none());
    }
}
