//! Deferred delivery engine for an email client
//!
//! Everything an email client does *later* lives here: scheduled sends, the
//! offline send queue, follow-up reminders and delivery/engagement tracking.
//! Records persist in a local SQLite database (or memory) and two background
//! loops move scheduled emails and reminders forward in time.
//!
//! Actual delivery is the host's job: it plugs in a
//! [`services::DeliveryExecutor`] and, optionally, a
//! [`services::NotificationPort`].

pub mod adapters;
pub mod clock;
pub mod config;
pub mod engine;
pub mod services;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::OutboxConfig;
pub use engine::Outbox;
pub use types::error::{OutboxError, Result};
pub use types::EmailDraft;
