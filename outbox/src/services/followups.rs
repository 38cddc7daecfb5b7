//! Follow-up reminders
//!
//! A reminder is `pending` until completed. Snoozing moves its due date and
//! marks it `snoozed`; once the new date passes it is due again and the next
//! check returns it to `pending`. Completion is final.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::FollowUpConfig;
use crate::services::delivery::{DeliveryExecutor, FailedDelivery};
use crate::services::events::{DomainEvent, EventBus};
use crate::services::notifier::Notifier;
use crate::store::{RecordStore, Repository};
use crate::types::error::{OutboxError, Result};
use crate::types::{new_record_id, EmailDraft, FollowUp, FollowUpStatus, NewFollowUp, Priority};

pub const SUBJECT_PREFIX: &str = "Follow-up: ";
pub const URGENT_PHRASE: &str = "requires your urgent attention";
pub const CIRCLING_BACK_PHRASE: &str = "circling back";
pub const GENTLE_PHRASE: &str = "following up";

/// Tone of an automated follow-up email
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpTone {
    Urgent,
    CirclingBack,
    Gentle,
}

impl FollowUpTone {
    /// High priority always reads urgent; otherwise the tone firms up once
    /// the reminder is overdue by more than `circling_back_after`.
    pub fn for_reminder(
        record: &FollowUp,
        overdue: Duration,
        circling_back_after: Duration,
    ) -> Self {
        if record.priority == Priority::High {
            Self::Urgent
        } else if overdue > circling_back_after {
            Self::CirclingBack
        } else {
            Self::Gentle
        }
    }

    pub fn phrase(&self) -> &'static str {
        match self {
            Self::Urgent => URGENT_PHRASE,
            Self::CirclingBack => CIRCLING_BACK_PHRASE,
            Self::Gentle => GENTLE_PHRASE,
        }
    }
}

/// Build the automated email for an overdue reminder
pub fn compose_follow_up(record: &FollowUp, tone: FollowUpTone) -> EmailDraft {
    let subject = if record.subject.starts_with(SUBJECT_PREFIX) {
        record.subject.clone()
    } else {
        format!("{}{}", SUBJECT_PREFIX, record.subject)
    };

    let opening = match tone {
        FollowUpTone::Urgent => format!(
            "I'm writing about \"{}\", which {}. Could you get back to me as soon as possible?",
            record.subject, URGENT_PHRASE
        ),
        FollowUpTone::CirclingBack => format!(
            "I'm {} on my earlier message about \"{}\". An update would be much appreciated.",
            CIRCLING_BACK_PHRASE, record.subject
        ),
        FollowUpTone::Gentle => format!(
            "I'm just {} on my previous message about \"{}\". Let me know if you have any questions.",
            GENTLE_PHRASE, record.subject
        ),
    };

    let mut body = format!("Hi,\n\n{}\n", opening);
    if let Some(notes) = record.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        body.push_str(&format!("\n{}\n", notes.trim()));
    }
    body.push_str("\nBest regards");

    EmailDraft::new([record.recipient.clone()], subject, body)
}

/// Outcome of an automated follow-up pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutomatedFollowUpReport {
    pub sent: Vec<String>,
    pub failed: Vec<FailedDelivery>,
}

#[derive(Clone)]
pub struct FollowUpManager {
    repo: Repository<FollowUp>,
    clock: SharedClock,
    events: EventBus,
    notifier: Arc<Notifier>,
    config: FollowUpConfig,
}

impl FollowUpManager {
    pub fn new(
        store: RecordStore,
        clock: SharedClock,
        events: EventBus,
        notifier: Arc<Notifier>,
        config: FollowUpConfig,
    ) -> Self {
        Self {
            repo: Repository::new(store),
            clock,
            events,
            notifier,
            config,
        }
    }

    pub fn create(&self, input: NewFollowUp) -> Result<FollowUp> {
        if input.subject.trim().is_empty() {
            return Err(OutboxError::InvalidInput(
                "Follow-up subject is required".to_string(),
            ));
        }
        if input.recipient.trim().is_empty() {
            return Err(OutboxError::InvalidInput(
                "Follow-up recipient is required".to_string(),
            ));
        }

        let record = FollowUp {
            id: new_record_id(),
            subject: input.subject,
            recipient: input.recipient,
            due_date: input.due_date,
            notes: input.notes,
            priority: input.priority,
            status: FollowUpStatus::Pending,
            email_id: input.email_id,
            created_at: self.clock.now(),
            completed_at: None,
        };

        let record = self.repo.insert(record)?;
        info!(
            "Created {} priority follow-up {} due {}",
            record.priority,
            record.id,
            record.due_date.to_rfc3339()
        );
        Ok(record)
    }

    /// All reminders, earliest due first
    pub fn list(&self) -> Result<Vec<FollowUp>> {
        let mut records = self.repo.all()?;
        records.sort_by_key(|r| r.due_date);
        Ok(records)
    }

    pub fn list_by_status(&self, status: FollowUpStatus) -> Result<Vec<FollowUp>> {
        let mut records = self.repo.filter(|r| r.status == status)?;
        records.sort_by_key(|r| r.due_date);
        Ok(records)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<FollowUp>> {
        self.repo.get(id)
    }

    pub fn update_status(&self, id: &str, status: FollowUpStatus) -> Result<Option<FollowUp>> {
        let now = self.clock.now();
        self.repo.update(id, |record| {
            if record.status == FollowUpStatus::Completed {
                if status == FollowUpStatus::Completed {
                    return Ok(());
                }
                return Err(OutboxError::InvalidState(format!(
                    "Follow-up {} is already completed",
                    record.id
                )));
            }

            record.status = status;
            if status == FollowUpStatus::Completed {
                record.completed_at = Some(now);
            }
            Ok(())
        })
    }

    pub fn complete(&self, id: &str) -> Result<Option<FollowUp>> {
        self.update_status(id, FollowUpStatus::Completed)
    }

    /// Move the due date; the status is left as it is
    pub fn update_due_date(&self, id: &str, due_date: DateTime<Utc>) -> Result<Option<FollowUp>> {
        self.repo.update(id, |record| {
            Self::ensure_open(record)?;
            record.due_date = due_date;
            Ok(())
        })
    }

    /// Push a reminder to a later date and mark it snoozed
    pub fn snooze(&self, id: &str, until: DateTime<Utc>) -> Result<Option<FollowUp>> {
        let now = self.clock.now();
        if until <= now {
            return Err(OutboxError::InvalidInput(format!(
                "Snooze target {} is not in the future",
                until.to_rfc3339()
            )));
        }

        self.repo.update(id, |record| {
            Self::ensure_open(record)?;
            record.due_date = until;
            record.status = FollowUpStatus::Snoozed;
            Ok(())
        })
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.repo.remove(id)
    }

    fn ensure_open(record: &FollowUp) -> Result<()> {
        if record.status == FollowUpStatus::Completed {
            return Err(OutboxError::InvalidState(format!(
                "Follow-up {} is already completed",
                record.id
            )));
        }
        Ok(())
    }

    /// Reminders due right now, earliest first
    pub fn due_now(&self) -> Result<Vec<FollowUp>> {
        let now = self.clock.now();
        let mut records = self.repo.filter(|r| r.is_due(now))?;
        records.sort_by_key(|r| r.due_date);
        Ok(records)
    }

    /// One reminder check.
    ///
    /// Snoozes that have run out go back to `pending`. If anything is due,
    /// the user gets a single notification and a [`DomainEvent::FollowUpsDue`]
    /// is published with the due set.
    pub fn check_due(&self) -> Result<Vec<FollowUp>> {
        let now = self.clock.now();

        let woken = self.repo.update_many(|record| {
            if record.status == FollowUpStatus::Snoozed && record.due_date <= now {
                record.status = FollowUpStatus::Pending;
                true
            } else {
                false
            }
        })?;
        if !woken.is_empty() {
            debug!("{} snoozed follow-ups are due again", woken.len());
        }

        let due = self.due_now()?;
        if due.is_empty() {
            return Ok(due);
        }

        info!("{} follow-ups due", due.len());
        self.notifier.notify_due_followups(&due);
        self.events.publish(DomainEvent::FollowUpsDue {
            records: due.clone(),
        });

        Ok(due)
    }

    /// Email the recipient of every reminder overdue past the automation
    /// threshold. Reminder state is not changed; completing them is up to
    /// the caller.
    pub async fn send_automated_followups(
        &self,
        records: &[FollowUp],
        executor: &dyn DeliveryExecutor,
    ) -> AutomatedFollowUpReport {
        let now = self.clock.now();
        let threshold = now - self.config.automated_after();
        let mut report = AutomatedFollowUpReport::default();

        let mut eligible: Vec<&FollowUp> = records
            .iter()
            .filter(|r| r.status != FollowUpStatus::Completed && r.due_date < threshold)
            .collect();
        eligible.sort_by_key(|r| r.due_date);

        for record in eligible {
            let tone = FollowUpTone::for_reminder(
                record,
                now - record.due_date,
                self.config.circling_back_after(),
            );
            let email = compose_follow_up(record, tone);

            match executor.send(&email).await {
                Ok(()) => {
                    info!("Sent automated follow-up for {} ({:?})", record.id, tone);
                    report.sent.push(record.id.clone());
                }
                Err(e) => {
                    warn!("Automated follow-up for {} failed: {}", record.id, e);
                    report.failed.push(FailedDelivery {
                        id: record.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::testing::{manual_clock, RecordingExecutor, RecordingPort};

    fn manager_with(port: Arc<RecordingPort>) -> (ManualClock, FollowUpManager) {
        let (clock, shared) = manual_clock();
        let manager = FollowUpManager::new(
            RecordStore::in_memory(),
            shared,
            EventBus::new(),
            Arc::new(Notifier::new(port)),
            FollowUpConfig::default(),
        );
        (clock, manager)
    }

    fn manager() -> (ManualClock, FollowUpManager) {
        manager_with(Arc::new(RecordingPort::granted()))
    }

    #[test]
    fn test_create_requires_subject_and_recipient() {
        let (clock, manager) = manager();
        assert!(manager
            .create(NewFollowUp::new("", "a@example.com", clock.now()))
            .is_err());
        assert!(manager
            .create(NewFollowUp::new("Subject", " ", clock.now()))
            .is_err());
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_create_links_originating_email() {
        let (clock, manager) = manager();
        let record = manager
            .create(
                NewFollowUp::new("Contract", "ivy@example.com", clock.now())
                    .with_priority(Priority::Low)
                    .with_email_id("msg-42"),
            )
            .unwrap();

        let stored = manager.get_by_id(&record.id).unwrap().unwrap();
        assert_eq!(stored.email_id.as_deref(), Some("msg-42"));
        assert_eq!(stored.priority.to_string(), "low");
        assert_eq!(stored.status, FollowUpStatus::Pending);
    }

    #[test]
    fn test_completed_is_terminal() {
        let (clock, manager) = manager();
        let record = manager
            .create(NewFollowUp::new("Offer", "carol@example.com", clock.now()))
            .unwrap();

        let done = manager.complete(&record.id).unwrap().unwrap();
        assert_eq!(done.status, FollowUpStatus::Completed);
        assert_eq!(done.completed_at, Some(clock.now()));

        assert!(matches!(
            manager.update_status(&record.id, FollowUpStatus::Pending),
            Err(OutboxError::InvalidState(_))
        ));
        assert!(manager
            .snooze(&record.id, clock.now() + Duration::days(1))
            .is_err());
        assert!(manager.due_now().unwrap().is_empty());
    }

    #[test]
    fn test_snooze_requires_future_date() {
        let (clock, manager) = manager();
        let record = manager
            .create(NewFollowUp::new("Offer", "carol@example.com", clock.now()))
            .unwrap();

        assert!(matches!(
            manager.snooze(&record.id, clock.now() - Duration::hours(1)),
            Err(OutboxError::InvalidInput(_))
        ));

        let snoozed = manager
            .snooze(&record.id, clock.now() + Duration::hours(3))
            .unwrap()
            .unwrap();
        assert_eq!(snoozed.status, FollowUpStatus::Snoozed);
        assert!(manager.due_now().unwrap().is_empty());
    }

    #[test]
    fn test_snoozed_reminder_wakes_up_when_due() {
        let (clock, manager) = manager();
        let record = manager
            .create(NewFollowUp::new("Offer", "carol@example.com", clock.now()))
            .unwrap();
        manager
            .snooze(&record.id, clock.now() + Duration::hours(3))
            .unwrap();

        clock.advance(Duration::hours(4));
        let due = manager.check_due().unwrap();

        assert_eq!(due.len(), 1);
        assert_eq!(due[0].status, FollowUpStatus::Pending);
        assert_eq!(
            manager.get_by_id(&record.id).unwrap().unwrap().status,
            FollowUpStatus::Pending
        );
    }

    #[test]
    fn test_update_due_date_keeps_status() {
        let (clock, manager) = manager();
        let record = manager
            .create(NewFollowUp::new("Offer", "carol@example.com", clock.now()))
            .unwrap();

        let moved = manager
            .update_due_date(&record.id, clock.now() + Duration::days(2))
            .unwrap()
            .unwrap();
        assert_eq!(moved.status, FollowUpStatus::Pending);
        assert_eq!(moved.due_date, clock.now() + Duration::days(2));
    }

    #[test]
    fn test_check_due_sends_one_grouped_notification() {
        let port = Arc::new(RecordingPort::granted());
        let (clock, manager) = manager_with(port.clone());

        for subject in ["One", "Two", "Three"] {
            manager
                .create(NewFollowUp::new(subject, "dan@example.com", clock.now()))
                .unwrap();
        }
        manager
            .create(NewFollowUp::new("Later", "dan@example.com", clock.now() + Duration::days(1)))
            .unwrap();

        let due = manager.check_due().unwrap();
        assert_eq!(due.len(), 3);
        assert_eq!(port.shown().len(), 1);
        assert!(port.shown()[0].1.contains('3'));
    }

    #[test]
    fn test_check_due_with_nothing_due_is_silent() {
        let port = Arc::new(RecordingPort::granted());
        let (clock, manager) = manager_with(port.clone());
        manager
            .create(NewFollowUp::new("Later", "dan@example.com", clock.now() + Duration::days(1)))
            .unwrap();

        assert!(manager.check_due().unwrap().is_empty());
        assert!(port.shown().is_empty());
    }

    #[tokio::test]
    async fn test_automated_followup_tone() {
        let (clock, manager) = manager();
        let now = clock.now();

        let urgent = manager
            .create(
                NewFollowUp::new("Contract", "erin@example.com", now - Duration::hours(25))
                    .with_priority(Priority::High),
            )
            .unwrap();
        let gentle = manager
            .create(NewFollowUp::new("Invoice", "erin@example.com", now - Duration::hours(25)))
            .unwrap();
        let stale = manager
            .create(NewFollowUp::new("Proposal", "erin@example.com", now - Duration::days(8)))
            .unwrap();
        let fresh = manager
            .create(NewFollowUp::new("Recent", "erin@example.com", now - Duration::hours(2)))
            .unwrap();

        let executor = RecordingExecutor::new();
        let report = manager
            .send_automated_followups(&manager.list().unwrap(), &executor)
            .await;

        assert_eq!(report.sent.len(), 3);
        assert!(!report.sent.contains(&fresh.id));
        assert_eq!(report.sent[0], stale.id);

        let sent = executor.sent();
        let body_for = |subject: &str| {
            sent.iter()
                .find(|d| d.subject == format!("Follow-up: {}", subject))
                .map(|d| d.body.clone())
                .expect("Failed to find follow-up email")
        };

        assert!(body_for("Contract").contains(URGENT_PHRASE));
        assert!(body_for("Invoice").contains(GENTLE_PHRASE));
        assert!(!body_for("Invoice").contains(URGENT_PHRASE));
        assert!(body_for("Proposal").contains(CIRCLING_BACK_PHRASE));

        // Sending does not complete the reminders.
        for id in [&urgent.id, &gentle.id, &stale.id] {
            assert_eq!(
                manager.get_by_id(id).unwrap().unwrap().status,
                FollowUpStatus::Pending
            );
        }
    }

    #[tokio::test]
    async fn test_automated_followup_failures_are_reported() {
        let (clock, manager) = manager();
        let record = manager
            .create(NewFollowUp::new("Broken", "erin@example.com", clock.now() - Duration::days(2)))
            .unwrap();

        let executor = RecordingExecutor::failing_on("Follow-up: Broken");
        let report = manager
            .send_automated_followups(&[record.clone()], &executor)
            .await;

        assert!(report.sent.is_empty());
        assert_eq!(report.failed[0].id, record.id);
    }

    #[test]
    fn test_compose_keeps_existing_prefix_and_notes() {
        let (clock, manager) = manager();
        let record = manager
            .create(
                NewFollowUp::new("Follow-up: Budget", "fay@example.com", clock.now())
                    .with_notes("Numbers for Q3 attached last week."),
            )
            .unwrap();

        let email = compose_follow_up(&record, FollowUpTone::Gentle);
        assert_eq!(email.subject, "Follow-up: Budget");
        assert_eq!(email.to, vec!["fay@example.com".to_string()]);
        assert!(email.body.contains("Numbers for Q3"));
    }
}
