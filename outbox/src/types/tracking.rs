use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Domain, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    pub url: String,
    pub clicked_at: DateTime<Utc>,
}

/// Delivery and engagement state of one sent email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTracking {
    pub id: String,
    pub subject: String,
    pub recipient: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clicks: Vec<ClickEvent>,
    pub status: TrackingStatus,
    pub created_at: DateTime<Utc>,
}

impl EmailTracking {
    pub fn has_click(&self, url: &str) -> bool {
        self.clicks.iter().any(|c| c.url == url)
    }
}

impl Record for EmailTracking {
    const DOMAIN: Domain = Domain::Tracking;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Aggregate engagement numbers across all tracked emails
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStats {
    pub total: usize,
    pub delivered: usize,
    pub read: usize,
    /// Emails with at least one recorded click
    pub clicked: usize,
    pub failed: usize,
    pub open_rate: f64,
    pub click_rate: f64,
}

impl TrackingStats {
    pub fn from_records(records: &[EmailTracking]) -> Self {
        let total = records.len();
        let read = records.iter().filter(|r| r.read_at.is_some()).count();
        let clicked = records.iter().filter(|r| !r.clicks.is_empty()).count();
        let failed = records
            .iter()
            .filter(|r| r.status == TrackingStatus::Failed)
            .count();
        // A read email was necessarily delivered.
        let delivered = records
            .iter()
            .filter(|r| r.delivered_at.is_some() || r.read_at.is_some())
            .count();

        let rate = |n: usize| {
            if total == 0 {
                0.0
            } else {
                n as f64 / total as f64
            }
        };

        Self {
            total,
            delivered,
            read,
            clicked,
            failed,
            open_rate: rate(read),
            click_rate: rate(clicked),
        }
    }
}
