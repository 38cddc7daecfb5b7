use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EmailDraft;
use crate::store::{Domain, Record};

/// Status of a scheduled send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduledStatus {
    Pending,
    Sent,
    Failed,
}

impl ScheduledStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ScheduledStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An email waiting for its send time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEmail {
    pub id: String,
    #[serde(flatten)]
    pub email: EmailDraft,
    pub scheduled_time: DateTime<Utc>,
    pub status: ScheduledStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl ScheduledEmail {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduledStatus::Pending && self.scheduled_time <= now
    }
}

impl Record for ScheduledEmail {
    const DOMAIN: Domain = Domain::ScheduledEmails;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Partial update for a pending scheduled email
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEmailPatch {
    pub to: Option<Vec<String>>,
    pub cc: Option<Vec<String>>,
    pub bcc: Option<Vec<String>>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl ScheduledEmailPatch {
    pub fn is_empty(&self) -> bool {
        self.to.is_none()
            && self.cc.is_none()
            && self.bcc.is_none()
            && self.subject.is_none()
            && self.body.is_none()
            && self.scheduled_time.is_none()
    }

    pub(crate) fn apply(self, record: &mut ScheduledEmail) {
        if let Some(to) = self.to {
            record.email.to = to;
        }
        if let Some(cc) = self.cc {
            record.email.cc = cc;
        }
        if let Some(bcc) = self.bcc {
            record.email.bcc = bcc;
        }
        if let Some(subject) = self.subject {
            record.email.subject = subject;
        }
        if let Some(body) = self.body {
            record.email.body = body;
        }
        if let Some(time) = self.scheduled_time {
            record.scheduled_time = time;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_persisted_shape_uses_iso_strings() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let record = ScheduledEmail {
            id: "s-1".to_string(),
            email: EmailDraft::new(["bob@example.com"], "Report", "Attached"),
            scheduled_time: at,
            status: ScheduledStatus::Pending,
            created_at: at,
            sent_at: None,
            last_error: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["scheduledTime"], "2026-03-01T09:30:00Z");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["to"][0], "bob@example.com");
        assert_eq!(json["subject"], "Report");
    }

    #[test]
    fn test_is_due_only_when_pending_and_elapsed() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let mut record = ScheduledEmail {
            id: "s-1".to_string(),
            email: EmailDraft::new(["bob@example.com"], "Report", "Attached"),
            scheduled_time: at,
            status: ScheduledStatus::Pending,
            created_at: at,
            sent_at: None,
            last_error: None,
        };

        assert!(!record.is_due(at - chrono::Duration::seconds(1)));
        assert!(record.is_due(at));

        record.status = ScheduledStatus::Failed;
        assert!(!record.is_due(at));
    }
}
