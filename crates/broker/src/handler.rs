use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

/// Processes one decoded job message.
///
/// The consumer calls `handle` once per delivery whose body parsed as JSON.
/// `Ok(())` acknowledges the delivery; an error (or a panic) rejects it
/// without requeue. The error itself is logged and then dropped.
///
/// ## Concurrency
///
/// Up to `prefetch` invocations run at the same time and may complete in any
/// order. Implementations must not rely on delivery order and must be safe to
/// run concurrently with themselves.
///
/// Any `Fn(Value) -> impl Future<Output = anyhow::Result<()>>` is a handler:
///
/// ```
/// use jobwire_broker::JobHandler;
///
/// fn assert_handler<H: JobHandler>(_: H) {}
///
/// assert_handler(|data: serde_json::Value| async move {
///     anyhow::ensure!(data.get("userId").is_some(), "missing userId");
///     Ok(())
/// });
/// ```
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, data: Value) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, data: Value) -> anyhow::Result<()> {
        (self)(data).await
    }
}
