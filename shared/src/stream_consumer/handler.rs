//! Business handler boundary
//!
//! The consumer hands each batch to a `BatchHandler` and only looks at
//! success or failure. Handlers must tolerate seeing the same batch again:
//! delivery is at-least-once and retries are batch-wide.

use super::message::Message;
use async_trait::async_trait;
use std::future::Future;

#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(&self, batch: &[Message]) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a `BatchHandler`
pub struct FnHandler<F>(F);

/// Wrap `f` as a handler; the closure receives an owned copy of the batch
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Vec<Message>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> BatchHandler for FnHandler<F>
where
    F: Fn(Vec<Message>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, batch: &[Message]) -> anyhow::Result<()> {
        (self.0)(batch.to_vec()).await
    }
}
