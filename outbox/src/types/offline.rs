use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EmailDraft;
use crate::store::{Domain, Record};

/// Status of an email held in the offline queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfflineStatus {
    /// Saved locally, not yet meant to be sent
    Draft,
    /// Waiting for the next drain of the queue
    Pending,
    Sent,
}

impl OfflineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Sent => "sent",
        }
    }

    pub fn is_mutable(&self) -> bool {
        !matches!(self, Self::Sent)
    }
}

impl std::fmt::Display for OfflineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An email composed while offline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineEmail {
    pub id: String,
    #[serde(flatten)]
    pub email: EmailDraft,
    pub status: OfflineStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    /// Failed delivery attempts so far
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Record for OfflineEmail {
    const DOMAIN: Domain = Domain::OfflineEmails;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Partial update for a draft or pending offline email
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineEmailPatch {
    pub to: Option<Vec<String>>,
    pub cc: Option<Vec<String>>,
    pub bcc: Option<Vec<String>>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub status: Option<OfflineStatus>,
}

impl OfflineEmailPatch {
    pub(crate) fn apply(self, record: &mut OfflineEmail) {
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
        if let Some(status) = self.status {
            record.status = status;
        }
    }
}
