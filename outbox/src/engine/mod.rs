//! Engine facade
//!
//! [`Outbox`] wires the record store, the four managers and the two
//! background schedulers together. Hosts open it once, call
//! [`Outbox::start`] with their delivery executor and use the manager
//! accessors for everything else.

mod passes;
pub mod scheduler;

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::clock::{system_clock, SharedClock};
use crate::config::OutboxConfig;
use crate::services::{
    AutomatedFollowUpReport, DeliveryExecutor, DomainEvent, EventBus, FollowUpManager,
    LogNotificationPort, NotificationPort, Notifier, OfflineQueue, ProcessResult, QueueDelivery,
    ScheduledSendManager, TrackingManager,
};
use crate::store::RecordStore;
use crate::types::error::Result;

pub use passes::{FollowUpCheckPass, ScheduledSendPass};
pub use scheduler::{PassSummary, Reconcile, ReconciliationScheduler};

pub struct Outbox {
    config: OutboxConfig,
    events: EventBus,
    scheduled: ScheduledSendManager,
    offline: OfflineQueue,
    followups: FollowUpManager,
    tracking: TrackingManager,
    scheduled_poller: ReconciliationScheduler,
    followup_poller: ReconciliationScheduler,
}

impl Outbox {
    /// Open with the configured store, the system clock and log notifications
    pub fn open(config: OutboxConfig) -> Result<Self> {
        config.validate()?;

        let store = if config.storage.in_memory {
            RecordStore::in_memory()
        } else {
            RecordStore::sqlite(&config.storage.resolve_path()?)?
        };
        let port: Arc<dyn NotificationPort> = Arc::new(LogNotificationPort);

        Self::with_parts(config, store, system_clock(), Some(port))
    }

    pub fn with_parts(
        config: OutboxConfig,
        store: RecordStore,
        clock: SharedClock,
        notifications: Option<Arc<dyn NotificationPort>>,
    ) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new();
        let notifier = match notifications {
            Some(port) if config.notifications.enabled => Notifier::new(port),
            _ => Notifier::disabled(),
        };

        let scheduled = ScheduledSendManager::new(store.clone(), clock.clone(), events.clone());
        let offline = OfflineQueue::new(store.clone(), clock.clone(), events.clone());
        let followups = FollowUpManager::new(
            store.clone(),
            clock.clone(),
            events.clone(),
            Arc::new(notifier),
            config.follow_up.clone(),
        );
        let tracking = TrackingManager::new(store, clock, events.clone(), config.tracking.clone())?;

        Ok(Self {
            scheduled_poller: ReconciliationScheduler::new(
                "scheduled-send",
                config.scheduled_send.poll_interval(),
            ),
            followup_poller: ReconciliationScheduler::new(
                "follow-up",
                config.follow_up.poll_interval(),
            ),
            config,
            events,
            scheduled,
            offline,
            followups,
            tracking,
        })
    }

    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    pub fn scheduled(&self) -> &ScheduledSendManager {
        &self.scheduled
    }

    pub fn offline(&self) -> &OfflineQueue {
        &self.offline
    }

    pub fn followups(&self) -> &FollowUpManager {
        &self.followups
    }

    pub fn tracking(&self) -> &TrackingManager {
        &self.tracking
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Start both background loops; `false` if they were already running
    pub fn start(&self, executor: Arc<dyn DeliveryExecutor>) -> bool {
        let scheduled = self.scheduled_poller.start(Arc::new(ScheduledSendPass::new(
            self.scheduled.clone(),
            executor,
        )));
        let followups = self
            .followup_poller
            .start(Arc::new(FollowUpCheckPass::new(self.followups.clone())));

        if scheduled || followups {
            info!("Outbox engine started");
        }
        scheduled || followups
    }

    pub fn stop(&self) {
        self.scheduled_poller.stop();
        self.followup_poller.stop();
    }

    /// Stop both loops and wait for passes in flight
    pub async fn shutdown(&self) {
        self.scheduled_poller.shutdown().await;
        self.followup_poller.shutdown().await;
        info!("Outbox engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.scheduled_poller.is_running() || self.followup_poller.is_running()
    }

    /// Run a scheduled-send pass without waiting for the next tick
    pub fn poll_now(&self) -> bool {
        self.scheduled_poller.poll_now()
    }

    pub fn check_followups_now(&self) -> bool {
        self.followup_poller.poll_now()
    }

    /// Replay the offline queue, typically on a connectivity change
    pub async fn drain_offline_queue(&self, delivery: &dyn QueueDelivery) -> Result<ProcessResult> {
        self.offline.process_pending(delivery).await
    }

    /// Send automated follow-ups for every stored reminder that qualifies
    pub async fn send_overdue_followups(
        &self,
        executor: &dyn DeliveryExecutor,
    ) -> Result<AutomatedFollowUpReport> {
        let records = self.followups.list()?;
        Ok(self
            .followups
            .send_automated_followups(&records, executor)
            .await)
    }
}
