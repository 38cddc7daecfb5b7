use async_trait::async_trait;
use std::sync::Arc;

use super::scheduler::{PassSummary, Reconcile};
use crate::services::{DeliveryExecutor, FollowUpManager, ScheduledSendManager};
use crate::types::error::Result;

/// Deliver due scheduled emails
pub struct ScheduledSendPass {
    manager: ScheduledSendManager,
    executor: Arc<dyn DeliveryExecutor>,
}

impl ScheduledSendPass {
    pub fn new(manager: ScheduledSendManager, executor: Arc<dyn DeliveryExecutor>) -> Self {
        Self { manager, executor }
    }
}

#[async_trait]
impl Reconcile for ScheduledSendPass {
    async fn reconcile(&self) -> Result<PassSummary> {
        let report = self.manager.process_due(self.executor.as_ref()).await?;
        Ok(PassSummary {
            processed: report.sent.len() + report.failed.len(),
            failed: report.failed.len(),
        })
    }
}

/// Surface due follow-up reminders
pub struct FollowUpCheckPass {
    manager: FollowUpManager,
}

impl FollowUpCheckPass {
    pub fn new(manager: FollowUpManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Reconcile for FollowUpCheckPass {
    async fn reconcile(&self) -> Result<PassSummary> {
        let due = self.manager.check_due()?;
        Ok(PassSummary {
            processed: due.len(),
            failed: 0,
        })
    }
}
