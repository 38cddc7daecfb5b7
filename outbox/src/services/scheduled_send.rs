//! Scheduled sends
//!
//! A scheduled email waits as `pending` until its time has passed, then a
//! pass hands it to the host's [`DeliveryExecutor`] exactly once. The outcome
//! is terminal: `sent` or `failed`. A failed email can be rescheduled, which
//! creates a fresh record and leaves the failed one as history.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::services::delivery::{DeliveryExecutor, FailedDelivery};
use crate::services::events::{DomainEvent, EventBus};
use crate::store::{RecordStore, Repository};
use crate::types::error::{OutboxError, Result};
use crate::types::{
    new_record_id, EmailDraft, ScheduledEmail, ScheduledEmailPatch, ScheduledStatus,
};

/// Outcome of one due-send pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduledPassReport {
    pub sent: Vec<String>,
    pub failed: Vec<FailedDelivery>,
}

impl ScheduledPassReport {
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty() && self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct ScheduledSendManager {
    repo: Repository<ScheduledEmail>,
    clock: SharedClock,
    events: EventBus,
}

impl ScheduledSendManager {
    pub fn new(store: RecordStore, clock: SharedClock, events: EventBus) -> Self {
        Self {
            repo: Repository::new(store),
            clock,
            events,
        }
    }

    fn ensure_future(&self, at: DateTime<Utc>) -> Result<()> {
        let now = self.clock.now();
        if at <= now {
            return Err(OutboxError::InvalidInput(format!(
                "Scheduled time {} is not in the future (now {})",
                at.to_rfc3339(),
                now.to_rfc3339()
            )));
        }
        Ok(())
    }

    pub fn schedule(
        &self,
        email: EmailDraft,
        scheduled_time: DateTime<Utc>,
    ) -> Result<ScheduledEmail> {
        self.ensure_future(scheduled_time)?;
        email.validate_for_delivery()?;

        let record = ScheduledEmail {
            id: new_record_id(),
            email,
            scheduled_time,
            status: ScheduledStatus::Pending,
            created_at: self.clock.now(),
            sent_at: None,
            last_error: None,
        };

        let record = self.repo.insert(record)?;
        info!(
            "Scheduled email {} for {}",
            record.id,
            record.scheduled_time.to_rfc3339()
        );
        Ok(record)
    }

    /// All scheduled emails, soonest first
    pub fn list(&self) -> Result<Vec<ScheduledEmail>> {
        let mut records = self.repo.all()?;
        records.sort_by_key(|r| r.scheduled_time);
        Ok(records)
    }

    pub fn list_by_status(&self, status: ScheduledStatus) -> Result<Vec<ScheduledEmail>> {
        let mut records = self.repo.filter(|r| r.status == status)?;
        records.sort_by_key(|r| r.scheduled_time);
        Ok(records)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<ScheduledEmail>> {
        self.repo.get(id)
    }

    /// Remove a scheduled email in any state; `false` if it did not exist
    pub fn cancel(&self, id: &str) -> Result<bool> {
        let removed = self.repo.remove(id)?;
        if removed {
            info!("Cancelled scheduled email {}", id);
        }
        Ok(removed)
    }

    /// Edit a pending email.
    ///
    /// Sent and failed records are immutable. A new time must still be in
    /// the future; the edited draft must still be deliverable.
    pub fn update(&self, id: &str, patch: ScheduledEmailPatch) -> Result<Option<ScheduledEmail>> {
        if let Some(at) = patch.scheduled_time {
            self.ensure_future(at)?;
        }

        self.repo.update(id, |record| {
            if record.status != ScheduledStatus::Pending {
                return Err(OutboxError::InvalidState(format!(
                    "Scheduled email {} is {} and can no longer be edited",
                    record.id, record.status
                )));
            }
            patch.apply(record);
            record.email.validate_for_delivery()
        })
    }

    /// Schedule the payload of a failed email again, as a new record
    pub fn reschedule(
        &self,
        id: &str,
        scheduled_time: DateTime<Utc>,
    ) -> Result<Option<ScheduledEmail>> {
        let Some(failed) = self.repo.get(id)? else {
            return Ok(None);
        };

        if failed.status != ScheduledStatus::Failed {
            return Err(OutboxError::InvalidState(format!(
                "Only failed emails can be rescheduled; {} is {}",
                id, failed.status
            )));
        }

        let record = self.schedule(failed.email, scheduled_time)?;
        info!("Rescheduled failed email {} as {}", id, record.id);
        Ok(Some(record))
    }

    /// Pending emails whose time has passed, oldest first
    pub fn due(&self) -> Result<Vec<ScheduledEmail>> {
        let now = self.clock.now();
        let mut records = self.repo.filter(|r| r.is_due(now))?;
        records.sort_by_key(|r| r.scheduled_time);
        Ok(records)
    }

    /// Deliver every due email once.
    ///
    /// Each delivery is awaited before the next one starts. The outcome is
    /// written back only if the record is still pending, so an email cancelled
    /// or already settled while its delivery was in flight is left alone. A
    /// failure to write an outcome is reported for that email and the pass
    /// moves on.
    pub async fn process_due(
        &self,
        executor: &dyn DeliveryExecutor,
    ) -> Result<ScheduledPassReport> {
        let due = self.due()?;
        let mut report = ScheduledPassReport::default();

        if due.is_empty() {
            debug!("No scheduled emails due");
            return Ok(report);
        }

        info!("Processing {} due scheduled emails", due.len());

        for record in due {
            let outcome = executor
                .send(&record.email)
                .await
                .map_err(|e| e.to_string());

            match self.settle(&record.id, outcome.clone()) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    // The status stays pending; keep going with the rest.
                    error!(
                        "Failed to record outcome of scheduled email {}: {}",
                        record.id, e
                    );
                    report.failed.push(FailedDelivery {
                        id: record.id,
                        error: format!("Failed to record delivery outcome: {}", e),
                    });
                    continue;
                }
            }

            match outcome {
                Ok(()) => {
                    info!("Sent scheduled email {}", record.id);
                    self.events.publish(DomainEvent::ScheduledSent {
                        id: record.id.clone(),
                    });
                    report.sent.push(record.id);
                }
                Err(error) => {
                    warn!("Scheduled email {} failed: {}", record.id, error);
                    self.events.publish(DomainEvent::ScheduledFailed {
                        id: record.id.clone(),
                        error: error.clone(),
                    });
                    report.failed.push(FailedDelivery {
                        id: record.id,
                        error,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Record a delivery outcome; `false` when the record left `pending`.
    fn settle(&self, id: &str, outcome: std::result::Result<(), String>) -> Result<bool> {
        let now = self.clock.now();
        let mut applied = false;

        self.repo.update(id, |record| {
            if record.status != ScheduledStatus::Pending {
                return Ok(());
            }
            match &outcome {
                Ok(()) => {
                    record.status = ScheduledStatus::Sent;
                    record.sent_at = Some(now);
                    record.last_error = None;
                }
                Err(error) => {
                    record.status = ScheduledStatus::Failed;
                    record.last_error = Some(error.clone());
                }
            }
            applied = true;
            Ok(())
        })?;

        if !applied {
            debug!("Scheduled email {} changed during delivery, outcome dropped", id);
        }
        Ok(applied)
    }
}
