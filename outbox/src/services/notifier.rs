//! User-facing notifications for due follow-ups
//!
//! The host supplies a [`NotificationPort`]. Permission is requested once,
//! lazily, and a denied permission turns every later notification into a
//! no-op instead of an error.

use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::types::error::Result;
use crate::types::FollowUp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Host notification facility
pub trait NotificationPort: Send + Sync {
    fn request_permission(&self) -> Permission;
    fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Port for hosts without a notification surface: writes to the log
#[derive(Debug, Default)]
pub struct LogNotificationPort;

impl NotificationPort for LogNotificationPort {
    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn notify(&self, title: &str, body: &str) -> Result<()> {
        info!("[notification] {}: {}", title, body);
        Ok(())
    }
}

pub struct Notifier {
    port: Option<Arc<dyn NotificationPort>>,
    permission: Mutex<Option<Permission>>,
}

impl Notifier {
    pub fn new(port: Arc<dyn NotificationPort>) -> Self {
        Self {
            port: Some(port),
            permission: Mutex::new(None),
        }
    }

    pub fn disabled() -> Self {
        Self {
            port: None,
            permission: Mutex::new(None),
        }
    }

    fn permission(&self, port: &dyn NotificationPort) -> Permission {
        let mut cached = self.permission.lock().unwrap_or_else(|e| e.into_inner());
        *cached.get_or_insert_with(|| {
            let granted = port.request_permission();
            debug!("Notification permission: {:?}", granted);
            granted
        })
    }

    /// Show one notification; returns whether it reached the host.
    pub fn notify(&self, title: &str, body: &str) -> bool {
        let Some(port) = self.port.as_deref() else {
            return false;
        };

        if self.permission(port) == Permission::Denied {
            debug!("Notification suppressed, permission denied: {}", title);
            return false;
        }

        match port.notify(title, body) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to show notification '{}': {}", title, e);
                false
            }
        }
    }

    /// One notification per check: grouped when several reminders are due.
    pub fn notify_due_followups(&self, due: &[FollowUp]) -> bool {
        match due {
            [] => false,
            [single] => self.notify(
                "Follow-up reminder",
                &format!("Follow up with {}: {}", single.recipient, single.subject),
            ),
            many => self.notify(
                "Follow-up reminders",
                &format!("You have {} follow-ups due", many.len()),
            ),
        }
    }
}
