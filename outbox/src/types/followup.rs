use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Domain, Record};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowUpStatus {
    Pending,
    Completed,
    Snoozed,
}

impl FollowUpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Snoozed => "snoozed",
        }
    }
}

impl std::fmt::Display for FollowUpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reminder to follow up on a sent email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    pub id: String,
    pub subject: String,
    pub recipient: String,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub status: FollowUpStatus,
    /// Message this reminder was created from, if any
    #[serde(default)]
    pub email_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl FollowUp {
    /// Snoozed reminders whose new due date has passed count as due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status != FollowUpStatus::Completed && self.due_date <= now
    }
}

impl Record for FollowUp {
    const DOMAIN: Domain = Domain::FollowUps;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Input for creating a follow-up reminder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFollowUp {
    pub subject: String,
    pub recipient: String,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub email_id: Option<String>,
}

impl NewFollowUp {
    pub fn new(
        subject: impl Into<String>,
        recipient: impl Into<String>,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            subject: subject.into(),
            recipient: recipient.into(),
            due_date,
            notes: None,
            priority: Priority::default(),
            email_id: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_email_id(mut self, email_id: impl Into<String>) -> Self {
        self.email_id = Some(email_id.into());
        self
    }
}
