//! Test doubles shared by the unit tests

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::{ManualClock, SharedClock};
use crate::services::delivery::DeliveryExecutor;
use crate::services::notifier::{NotificationPort, Permission};
use crate::store::{MemoryBackend, StorageBackend};
use crate::types::error::{OutboxError, Result};
use crate::types::EmailDraft;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn manual_clock() -> (ManualClock, SharedClock) {
    let clock = ManualClock::new(start_time());
    let shared: SharedClock = Arc::new(clock.clone());
    (clock, shared)
}

/// Executor that records every draft and fails the subjects it is told to
#[derive(Default)]
pub struct RecordingExecutor {
    sent: Mutex<Vec<EmailDraft>>,
    fail_subjects: Vec<String>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(subject: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_subjects: vec![subject.to_string()],
        }
    }

    pub fn sent(&self) -> Vec<EmailDraft> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryExecutor for RecordingExecutor {
    async fn send(&self, email: &EmailDraft) -> Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        if self.fail_subjects.contains(&email.subject) {
            return Err(OutboxError::Delivery("SMTP 554 rejected".to_string()));
        }
        Ok(())
    }
}

pub struct RecordingPort {
    permission: Permission,
    requests: Mutex<usize>,
    shown: Mutex<Vec<(String, String)>>,
}

impl RecordingPort {
    pub fn granted() -> Self {
        Self::with_permission(Permission::Granted)
    }

    pub fn denied() -> Self {
        Self::with_permission(Permission::Denied)
    }

    fn with_permission(permission: Permission) -> Self {
        Self {
            permission,
            requests: Mutex::new(0),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().unwrap().clone()
    }

    pub fn permission_requests(&self) -> usize {
        *self.requests.lock().unwrap()
    }
}

impl NotificationPort for RecordingPort {
    fn request_permission(&self) -> Permission {
        *self.requests.lock().unwrap() += 1;
        self.permission
    }

    fn notify(&self, title: &str, body: &str) -> Result<()> {
        self.shown
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

/// Memory backend whose writes can be switched to fail
#[derive(Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    fail_writes: AtomicBool,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }
}

impl StorageBackend for FlakyBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        self.inner.read(key)
    }

    fn write(&self, key: &str, payload: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OutboxError::Storage("disk I/O error".to_string()));
        }
        self.inner.write(key, payload)
    }
}
