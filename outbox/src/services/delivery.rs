//! Delivery contracts supplied by the host
//!
//! The engine never talks to a mail server itself. Scheduled sends and
//! automated follow-ups go through a [`DeliveryExecutor`]; the offline queue
//! drains through a [`QueueDelivery`], which may report failure without an
//! error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::types::error::Result;
use crate::types::{EmailDraft, OfflineEmail};

#[async_trait]
pub trait DeliveryExecutor: Send + Sync {
    async fn send(&self, email: &EmailDraft) -> Result<()>;
}

#[async_trait]
pub trait QueueDelivery: Send + Sync {
    /// `Ok(false)` is a failed delivery, same as an error.
    async fn deliver(&self, email: &OfflineEmail) -> Result<bool>;
}

/// A record the delivery collaborator rejected during a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDelivery {
    pub id: String,
    pub error: String,
}

#[async_trait]
impl<E: DeliveryExecutor + ?Sized> DeliveryExecutor for Arc<E> {
    async fn send(&self, email: &EmailDraft) -> Result<()> {
        (**self).send(email).await
    }
}

pub struct FnExecutor<F>(F);

/// Wrap an async closure as a [`DeliveryExecutor`]
pub fn executor_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn(EmailDraft) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnExecutor(f)
}

#[async_trait]
impl<F, Fut> DeliveryExecutor for FnExecutor<F>
where
    F: Fn(EmailDraft) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn send(&self, email: &EmailDraft) -> Result<()> {
        (self.0)(email.clone()).await
    }
}

pub struct FnQueueDelivery<F>(F);

/// Wrap an async closure as a [`QueueDelivery`]
pub fn queue_delivery_fn<F, Fut>(f: F) -> FnQueueDelivery<F>
where
    F: Fn(OfflineEmail) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    FnQueueDelivery(f)
}

#[async_trait]
impl<F, Fut> QueueDelivery for FnQueueDelivery<F>
where
    F: Fn(OfflineEmail) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    async fn deliver(&self, email: &OfflineEmail) -> Result<bool> {
        (self.0)(email.clone()).await
    }
}

/// Drain the offline queue through a regular executor
pub struct ExecutorQueueDelivery<E> {
    executor: E,
}

impl<E: DeliveryExecutor> ExecutorQueueDelivery<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl<E: DeliveryExecutor> QueueDelivery for ExecutorQueueDelivery<E> {
    async fn deliver(&self, email: &OfflineEmail) -> Result<bool> {
        self.executor.send(&email.email).await.map(|()| true)
    }
}
