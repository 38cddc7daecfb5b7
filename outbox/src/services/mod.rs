//! Business logic services
//!
//! One manager per record domain, plus the collaborator contracts the host
//! implements (delivery, notifications) and the event bus they report to.
//!
//! Managers should:
//! - Take their clock and store by injection
//! - Use OutboxError for error handling
//! - Never hold a store lock across an `.await`

pub mod delivery;
pub mod events;
pub mod followups;
pub mod logger;
pub mod notifier;
pub mod offline_queue;
pub mod scheduled_send;
pub mod tracking;
pub mod tracking_links;

pub use delivery::{
    executor_fn, queue_delivery_fn, DeliveryExecutor, ExecutorQueueDelivery, FailedDelivery,
    QueueDelivery,
};
pub use events::{DomainEvent, EventBus};
pub use followups::{
    compose_follow_up, AutomatedFollowUpReport, FollowUpManager, FollowUpTone,
};
pub use notifier::{LogNotificationPort, NotificationPort, Notifier, Permission};
pub use offline_queue::{OfflineQueue, ProcessResult};
pub use scheduled_send::{ScheduledPassReport, ScheduledSendManager};
pub use tracking::TrackingManager;
pub use tracking_links::TrackingLinks;
