//! Delivery and engagement tracking
//!
//! Reads and clicks normally arrive from the tracking endpoint through
//! [`TrackingManager::mark_read`] and [`TrackingManager::record_click`].
//! Demo builds can fabricate them instead: the `simulate_*` methods fire the
//! same transitions after a random delay.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::{DelayRange, TrackingConfig};
use crate::services::events::{DomainEvent, EventBus};
use crate::services::tracking_links::TrackingLinks;
use crate::store::{RecordStore, Repository};
use crate::types::error::{OutboxError, Result};
use crate::types::{new_record_id, ClickEvent, EmailTracking, TrackingStats, TrackingStatus};

#[derive(Clone)]
pub struct TrackingManager {
    repo: Repository<EmailTracking>,
    clock: SharedClock,
    events: EventBus,
    links: TrackingLinks,
    config: TrackingConfig,
}

fn random_delay(range: DelayRange) -> Duration {
    let min = range.min().as_millis() as u64;
    let max = range.max().as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(min..=max))
}

impl TrackingManager {
    pub fn new(
        store: RecordStore,
        clock: SharedClock,
        events: EventBus,
        config: TrackingConfig,
    ) -> Result<Self> {
        let links = TrackingLinks::new(&config.base_url)?;
        Ok(Self {
            repo: Repository::new(store),
            clock,
            events,
            links,
            config,
        })
    }

    pub fn links(&self) -> &TrackingLinks {
        &self.links
    }

    pub fn create_tracking(
        &self,
        subject: &str,
        recipient: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<EmailTracking> {
        if recipient.trim().is_empty() {
            return Err(OutboxError::InvalidInput(
                "Tracked email needs a recipient".to_string(),
            ));
        }

        let record = EmailTracking {
            id: new_record_id(),
            subject: subject.to_string(),
            recipient: recipient.to_string(),
            sent_at,
            delivered_at: None,
            read_at: None,
            clicks: Vec::new(),
            status: TrackingStatus::Sent,
            created_at: self.clock.now(),
        };

        let record = self.repo.insert(record)?;
        debug!("Tracking email {} to {}", record.id, record.recipient);
        Ok(record)
    }

    /// Tracked emails, most recently sent first
    pub fn list(&self) -> Result<Vec<EmailTracking>> {
        let mut records = self.repo.all()?;
        records.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(records)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<EmailTracking>> {
        self.repo.get(id)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.repo.remove(id)
    }

    pub fn stats(&self) -> Result<TrackingStats> {
        Ok(TrackingStats::from_records(&self.repo.all()?))
    }

    fn publish(&self, record: &Option<EmailTracking>) {
        if let Some(record) = record {
            self.events.publish(DomainEvent::TrackingUpdated {
                record: record.clone(),
            });
        }
    }

    /// Only a `sent` email can become `delivered`
    pub fn mark_delivered(&self, id: &str) -> Result<Option<EmailTracking>> {
        let now = self.clock.now();
        let record = self.repo.update(id, |record| {
            if record.status == TrackingStatus::Sent {
                record.status = TrackingStatus::Delivered;
                record.delivered_at = Some(now);
            }
            Ok(())
        })?;
        self.publish(&record);
        Ok(record)
    }

    /// Record an open. The first read time is kept on repeated opens.
    pub fn mark_read(&self, id: &str) -> Result<Option<EmailTracking>> {
        let now = self.clock.now();
        let record = self.repo.update(id, |record| {
            record.status = TrackingStatus::Read;
            record.read_at.get_or_insert(now);
            Ok(())
        })?;
        self.publish(&record);
        Ok(record)
    }

    /// Record a click; a URL is counted once per email
    pub fn record_click(&self, id: &str, url: &str) -> Result<Option<EmailTracking>> {
        let url = url.trim();
        if url.is_empty() {
            return Err(OutboxError::InvalidInput(
                "Clicked URL must not be empty".to_string(),
            ));
        }

        let now = self.clock.now();
        let record = self.repo.update(id, |record| {
            if !record.has_click(url) {
                record.clicks.push(ClickEvent {
                    url: url.to_string(),
                    clicked_at: now,
                });
            }
            Ok(())
        })?;
        self.publish(&record);
        Ok(record)
    }

    /// A read email has evidently been delivered and cannot fail anymore
    pub fn mark_failed(&self, id: &str) -> Result<Option<EmailTracking>> {
        let record = self.repo.update(id, |record| {
            if record.status == TrackingStatus::Read {
                return Err(OutboxError::InvalidState(format!(
                    "Tracked email {} was already read",
                    record.id
                )));
            }
            record.status = TrackingStatus::Failed;
            Ok(())
        })?;
        self.publish(&record);
        Ok(record)
    }

    /// Fabricate a read receipt after a random delay.
    ///
    /// Returns `None` when simulation is switched off.
    pub fn simulate_read_receipt(&self, id: &str) -> Option<JoinHandle<()>> {
        if !self.config.simulate_events {
            debug!("Read simulation disabled, ignoring {}", id);
            return None;
        }

        let manager = self.clone();
        let id = id.to_string();
        let delay = random_delay(self.config.read_delay);

        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match manager.mark_read(&id) {
                Ok(Some(_)) => info!("Simulated read receipt for {}", id),
                Ok(None) => debug!("Tracked email {} vanished before simulated read", id),
                Err(e) => warn!("Failed to record simulated read for {}: {}", id, e),
            }
        }))
    }

    /// Fabricate a click on `url` after a random delay
    pub fn simulate_link_click(&self, id: &str, url: &str) -> Option<JoinHandle<()>> {
        if !self.config.simulate_events {
            debug!("Click simulation disabled, ignoring {}", id);
            return None;
        }

        let manager = self.clone();
        let id = id.to_string();
        let url = url.to_string();
        let delay = random_delay(self.config.click_delay);

        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match manager.record_click(&id, &url) {
                Ok(Some(_)) => info!("Simulated click on {} for {}", url, id),
                Ok(None) => debug!("Tracked email {} vanished before simulated click", id),
                Err(e) => warn!("Failed to record simulated click for {}: {}", id, e),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::testing::manual_clock;

    fn manager_with(config: TrackingConfig) -> (ManualClock, TrackingManager) {
        let (clock, shared) = manual_clock();
        let manager =
            TrackingManager::new(RecordStore::in_memory(), shared, EventBus::new(), config)
                .expect("Failed to create tracking manager");
        (clock, manager)
    }

    fn manager() -> (ManualClock, TrackingManager) {
        manager_with(TrackingConfig::default())
    }

    #[test]
    fn test_read_at_is_set_once() {
        let (clock, manager) = manager();
        let record = manager
            .create_tracking("Hello", "gus@example.com", clock.now())
            .unwrap();

        let first = manager.mark_read(&record.id).unwrap().unwrap();
        clock.advance(chrono::Duration::hours(1));
        let second = manager.mark_read(&record.id).unwrap().unwrap();

        assert_eq!(first.status, TrackingStatus::Read);
        assert_eq!(second.read_at, first.read_at);
    }

    #[test]
    fn test_clicks_are_deduplicated_by_url() {
        let (clock, manager) = manager();
        let record = manager
            .create_tracking("Hello", "gus@example.com", clock.now())
            .unwrap();

        manager.record_click(&record.id, "https://a.example.com").unwrap();
        manager.record_click(&record.id, "https://a.example.com").unwrap();
        let record = manager
            .record_click(&record.id, "https://b.example.com")
            .unwrap()
            .unwrap();

        assert_eq!(record.clicks.len(), 2);
        assert!(manager.record_click(&record.id, "  ").is_err());
    }

    #[test]
    fn test_unknown_id_is_none() {
        let (_, manager) = manager();
        assert_eq!(manager.mark_read("missing").unwrap(), None);
        assert_eq!(manager.record_click("missing", "https://x.example.com").unwrap(), None);
    }

    #[test]
    fn test_delivery_transitions() {
        let (clock, manager) = manager();
        let a = manager.create_tracking("A", "h@example.com", clock.now()).unwrap();
        let b = manager.create_tracking("B", "h@example.com", clock.now()).unwrap();

        let delivered = manager.mark_delivered(&a.id).unwrap().unwrap();
        assert_eq!(delivered.status, TrackingStatus::Delivered);
        assert_eq!(delivered.delivered_at, Some(clock.now()));

        manager.mark_read(&a.id).unwrap();
        assert!(matches!(
            manager.mark_failed(&a.id),
            Err(OutboxError::InvalidState(_))
        ));

        let failed = manager.mark_failed(&b.id).unwrap().unwrap();
        assert_eq!(failed.status, TrackingStatus::Failed);

        let stats = manager.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.read, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_read_lands_within_delay() {
        let (clock, manager) = manager();
        let record = manager
            .create_tracking("Demo", "ida@example.com", clock.now())
            .unwrap();

        let handle = manager
            .simulate_read_receipt(&record.id)
            .expect("Failed to start simulation");
        assert!(manager.get_by_id(&record.id).unwrap().unwrap().read_at.is_none());

        tokio::time::sleep(Duration::from_secs(16)).await;
        handle.await.expect("Simulation task panicked");

        let stored = manager.get_by_id(&record.id).unwrap().unwrap();
        assert_eq!(stored.status, TrackingStatus::Read);
        assert!(stored.read_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_click_is_recorded() {
        let (clock, manager) = manager();
        let record = manager
            .create_tracking("Demo", "ida@example.com", clock.now())
            .unwrap();

        let handle = manager
            .simulate_link_click(&record.id, "https://example.com/offer")
            .expect("Failed to start simulation");
        tokio::time::sleep(Duration::from_secs(31)).await;
        handle.await.expect("Simulation task panicked");

        let stored = manager.get_by_id(&record.id).unwrap().unwrap();
        assert!(stored.has_click("https://example.com/offer"));
    }

    #[test]
    fn test_simulation_can_be_switched_off() {
        let config = TrackingConfig {
            simulate_events: false,
            ..TrackingConfig::default()
        };
        let (_, manager) = manager_with(config);
        assert!(manager.simulate_read_receipt("any").is_none());
        assert!(manager.simulate_link_click("any", "https://x.example.com").is_none());
    }
}
