//! Command handling infrastructure.
//!
//! Handlers implement `CommandHandler<C>`; cross-cutting behavior is added by
//! wrapping them in decorators instead of repeating it in every handler:
//!
//! ```ignore
//! let handler = decorate(UsePointsAsDiscountHandler::new(tx), metrics);
//! handler.execute(UsePointsAsDiscount { user_id, points: 25 }).await?;
//! ```
//!
//! `decorate` produces `Logging(Metrics(handler))`, so the logged outcome
//! includes time spent recording metrics.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::domain::foundation::DomainError;
use crate::ports::MetricsClient;

/// Executes one kind of command.
#[async_trait]
pub trait CommandHandler<C: Send + 'static>: Send + Sync {
    async fn execute(&self, cmd: C) -> Result<(), DomainError>;

    /// Stable snake_case name used in spans and metric keys.
    fn command_name(&self) -> &'static str;
}

/// Wraps a handler in the standard decorator chain.
pub fn decorate<H>(
    handler: H,
    metrics: Arc<dyn MetricsClient>,
) -> LoggingDecorator<MetricsDecorator<H>> {
    LoggingDecorator::new(MetricsDecorator::new(handler, metrics))
}

/// Runs the inner handler inside an `info_span` and logs the outcome.
///
/// Domain violations are logged at `warn`, everything else that fails at
/// `error`.
pub struct LoggingDecorator<H> {
    inner: H,
}

impl<H> LoggingDecorator<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C, H> CommandHandler<C> for LoggingDecorator<H>
where
    C: Debug + Send + 'static,
    H: CommandHandler<C>,
{
    async fn execute(&self, cmd: C) -> Result<(), DomainError> {
        let span = info_span!("command", name = self.inner.command_name());

        async move {
            debug!(command = ?cmd, "Executing command");

            let result = self.inner.execute(cmd).await;

            match &result {
                Ok(()) => info!("Command executed"),
                Err(err) if err.is_domain_violation() => {
                    warn!(error = %err, "Command rejected")
                }
                Err(err) => error!(error = %err, "Command failed"),
            }

            result
        }
        .instrument(span)
        .await
    }

    fn command_name(&self) -> &'static str {
        self.inner.command_name()
    }
}

/// Records `commands.<name>.success|failure` and `commands.<name>.duration_ms`.
pub struct MetricsDecorator<H> {
    inner: H,
    metrics: Arc<dyn MetricsClient>,
}

impl<H> MetricsDecorator<H> {
    pub fn new(inner: H, metrics: Arc<dyn MetricsClient>) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl<C, H> CommandHandler<C> for MetricsDecorator<H>
where
    C: Send + 'static,
    H: CommandHandler<C>,
{
    async fn execute(&self, cmd: C) -> Result<(), DomainError> {
        let name = self.inner.command_name();
        let started = Instant::now();

        let result = self.inner.execute(cmd).await;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics
            .inc(&format!("commands.{}.duration_ms", name), elapsed_ms);

        let outcome = if result.is_ok() { "success" } else { "failure" };
        self.metrics.inc(&format!("commands.{}.{}", name, outcome), 1);

        result
    }

    fn command_name(&self) -> &'static str {
        self.inner.command_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryMetrics;
    use crate::domain::foundation::ErrorCode;

    #[derive(Debug)]
    struct Ping {
        fail: bool,
    }

    struct PingHandler;

    #[async_trait]
    impl CommandHandler<Ping> for PingHandler {
        async fn execute(&self, cmd: Ping) -> Result<(), DomainError> {
            if cmd.fail {
                return Err(DomainError::new(ErrorCode::InsufficientPoints, "not enough points"));
            }
            Ok(())
        }

        fn command_name(&self) -> &'static str {
            "ping"
        }
    }

    #[tokio::test]
    async fn metrics_decorator_counts_success() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let handler = MetricsDecorator::new(PingHandler, metrics.clone());

        handler.execute(Ping { fail: false }).await.unwrap();

        assert_eq!(metrics.get("commands.ping.success"), 1);
        assert_eq!(metrics.get("commands.ping.failure"), 0);
    }

    #[tokio::test]
    async fn metrics_decorator_counts_failure_and_passes_error_through() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let handler = MetricsDecorator::new(PingHandler, metrics.clone());

        let err = handler.execute(Ping { fail: true }).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::InsufficientPoints);
        assert_eq!(metrics.get("commands.ping.failure"), 1);
        assert!(metrics.keys().contains(&"commands.ping.duration_ms".to_string()));
    }

    #[tokio::test]
    async fn decorated_handler_keeps_name_and_result() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let handler = decorate(PingHandler, metrics.clone());

        assert_eq!(CommandHandler::<Ping>::command_name(&handler), "ping");
        assert!(handler.execute(Ping { fail: true }).await.is_err());
        assert!(handler.execute(Ping { fail: false }).await.is_ok());
        assert_eq!(metrics.get("commands.ping.success"), 1);
        assert_eq!(metrics.get("commands.ping.failure"), 1);
    }
}
