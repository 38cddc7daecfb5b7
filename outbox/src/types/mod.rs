pub mod error;
pub mod followup;
pub mod offline;
pub mod scheduled;
pub mod tracking;

use serde::{Deserialize, Serialize};

use self::error::{OutboxError, Result};

pub use followup::{FollowUp, FollowUpStatus, NewFollowUp, Priority};
pub use offline::{OfflineEmail, OfflineEmailPatch, OfflineStatus};
pub use scheduled::{ScheduledEmail, ScheduledEmailPatch, ScheduledStatus};
pub use tracking::{ClickEvent, EmailTracking, TrackingStats, TrackingStatus};

/// Message payload shared by scheduled sends, queued sends and automated follow-ups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDraft {
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl EmailDraft {
    pub fn new<I, S>(to: I, subject: impl Into<String>, body: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            to: to.into_iter().map(Into::into).collect(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn with_cc<I, S>(mut self, cc: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cc = cc.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_bcc<I, S>(mut self, bcc: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bcc = bcc.into_iter().map(Into::into).collect();
        self
    }

    /// All recipients across to/cc/bcc
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .map(String::as_str)
    }

    /// Check that the draft can be handed to a delivery executor
    pub fn validate_for_delivery(&self) -> Result<()> {
        if self.recipients().next().is_none() {
            return Err(OutboxError::InvalidInput(
                "at least one recipient is required".to_string(),
            ));
        }

        if let Some(blank) = self.recipients().find(|r| r.trim().is_empty()) {
            return Err(OutboxError::InvalidInput(format!(
                "recipient address is blank: {:?}",
                blank
            )));
        }

        Ok(())
    }
}

/// Generate a new record identifier
pub(crate) fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
