//! Offline send queue
//!
//! Emails composed while the client has no connectivity are kept here as
//! drafts or pending sends. When connectivity returns the host drains the
//! queue: pending emails are replayed oldest first through a
//! [`QueueDelivery`]. Delivered emails become `sent`; anything else stays
//! pending for the next drain, with the attempt counted.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::services::delivery::QueueDelivery;
use crate::services::events::{DomainEvent, EventBus};
use crate::store::{RecordStore, Repository};
use crate::types::error::{OutboxError, Result};
use crate::types::{new_record_id, EmailDraft, OfflineEmail, OfflineEmailPatch, OfflineStatus};

/// Result of draining the queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessResult {
    pub success: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct OfflineQueue {
    repo: Repository<OfflineEmail>,
    clock: SharedClock,
    events: EventBus,
    drain_lock: Arc<AsyncMutex<()>>,
}

impl OfflineQueue {
    pub fn new(store: RecordStore, clock: SharedClock, events: EventBus) -> Self {
        Self {
            repo: Repository::new(store),
            clock,
            events,
            drain_lock: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Queue an email as a draft or a pending send
    pub fn enqueue(&self, email: EmailDraft, status: OfflineStatus) -> Result<OfflineEmail> {
        if status == OfflineStatus::Sent {
            return Err(OutboxError::InvalidInput(
                "Emails cannot be queued as already sent".to_string(),
            ));
        }
        if status == OfflineStatus::Pending {
            email.validate_for_delivery()?;
        }

        let now = self.clock.now();
        let record = OfflineEmail {
            id: new_record_id(),
            email,
            status,
            created_at: now,
            updated_at: now,
            sent_at: None,
            attempts: 0,
            last_error: None,
        };

        let record = self.repo.insert(record)?;
        info!("Queued offline email {} as {}", record.id, record.status);
        Ok(record)
    }

    /// Every queued email in creation order
    pub fn list(&self) -> Result<Vec<OfflineEmail>> {
        let mut records = self.repo.all()?;
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    pub fn list_by_status(&self, status: OfflineStatus) -> Result<Vec<OfflineEmail>> {
        let mut records = self.repo.filter(|r| r.status == status)?;
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<OfflineEmail>> {
        self.repo.get(id)
    }

    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.list_by_status(OfflineStatus::Pending)?.len())
    }

    /// Edit a draft or pending email, or move it between the two
    pub fn update(&self, id: &str, patch: OfflineEmailPatch) -> Result<Option<OfflineEmail>> {
        if patch.status == Some(OfflineStatus::Sent) {
            return Err(OutboxError::InvalidInput(
                "Emails are only marked sent by delivery".to_string(),
            ));
        }

        let now = self.clock.now();
        self.repo.update(id, |record| {
            if !record.status.is_mutable() {
                return Err(OutboxError::InvalidState(format!(
                    "Offline email {} was already sent",
                    record.id
                )));
            }
            patch.apply(record);
            record.updated_at = now;
            if record.status == OfflineStatus::Pending {
                record.email.validate_for_delivery()?;
            }
            Ok(())
        })
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.repo.remove(id)
    }

    /// Drop delivered emails; returns how many were removed
    pub fn purge_sent(&self) -> Result<usize> {
        let removed = self.repo.retain(|r| r.status != OfflineStatus::Sent)?;
        if removed > 0 {
            info!("Purged {} sent offline emails", removed);
        }
        Ok(removed)
    }

    /// Replay every pending email through `delivery`, oldest first.
    ///
    /// Drafts are never sent. A failure on one email does not stop the rest.
    /// Drains are serialized: a drain started while another is running waits
    /// for it and then only sees what is still pending.
    pub async fn process_pending(&self, delivery: &dyn QueueDelivery) -> Result<ProcessResult> {
        let _drain = self.drain_lock.lock().await;
        let pending = self.list_by_status(OfflineStatus::Pending)?;
        let mut result = ProcessResult::default();

        if pending.is_empty() {
            return Ok(result);
        }

        info!("Replaying {} pending offline emails", pending.len());

        for record in pending {
            let outcome = match delivery.deliver(&record).await {
                Ok(true) => Ok(()),
                Ok(false) => {
                    warn!("Delivery of offline email {} reported failure", record.id);
                    Err("delivery reported failure".to_string())
                }
                Err(e) => {
                    error!("Failed to deliver offline email {}: {}", record.id, e);
                    Err(e.to_string())
                }
            };

            let delivered = outcome.is_ok();
            match self.settle(&record.id, outcome) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    // Still pending, so the next drain retries it.
                    error!(
                        "Failed to record outcome of offline email {}: {}",
                        record.id, e
                    );
                    result.failed.push(record.id);
                    continue;
                }
            }

            if delivered {
                info!("Delivered offline email {}", record.id);
                result.success.push(record.id);
            } else {
                result.failed.push(record.id);
            }
        }

        info!(
            "Offline replay complete: {} sent, {} still pending",
            result.success.len(),
            result.failed.len()
        );
        self.events.publish(DomainEvent::OfflineDrained {
            success: result.success.clone(),
            failed: result.failed.clone(),
        });

        Ok(result)
    }

    /// Record a delivery outcome; `false` when the record is gone or no
    /// longer pending, in which case the outcome is dropped.
    fn settle(&self, id: &str, outcome: std::result::Result<(), String>) -> Result<bool> {
        let now = self.clock.now();
        let mut applied = false;

        self.repo.update(id, |record| {
            if record.status != OfflineStatus::Pending {
                return Ok(());
            }
            match outcome {
                Ok(()) => {
                    record.status = OfflineStatus::Sent;
                    record.sent_at = Some(now);
                    record.last_error = None;
                }
                Err(reason) => {
                    record.attempts += 1;
                    record.last_error = Some(reason);
                }
            }
            record.updated_at = now;
            applied = true;
            Ok(())
        })?;

        if !applied {
            debug!("Offline email {} changed during delivery, outcome dropped", id);
        }
        Ok(applied)
    }
}
