//! points-outbox
//!
//! Runs the outbox forwarder (users database -> Redis Streams) and the
//! discount consumer (Redis Streams -> orders tables) until Ctrl-C.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use points_outbox::adapters::events::Forwarder;
use points_outbox::adapters::postgres::{PostgresDiscountRepository, PostgresOutboxLog};
use points_outbox::adapters::redis::{
    self as redis_adapter, RedisStreamSubscriber, RedisStreamTransport,
};
use points_outbox::application::handlers::ApplyDiscountHandler;
use points_outbox::config::AppConfig;
use points_outbox::domain::user::POINTS_USED_FOR_DISCOUNT;
use points_outbox::ports::{EventSubscriber, MessageTransport};
use points_outbox::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    telemetry::init_tracing(&config.logging)?;

    let pool = config.database.connect().await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Migrations applied");
    }

    let conn = redis_adapter::connect(&config.redis.url).await?;
    let transport = Arc::new(RedisStreamTransport::new(conn.clone()));

    let forwarder = Arc::new(Forwarder::with_config(
        Arc::new(PostgresOutboxLog::new(pool.clone())),
        transport.clone(),
        config.forwarder.forwarder_config()?,
    ));

    let subscriber = Arc::new(RedisStreamSubscriber::new(
        conn,
        config.redis.subscriber_config(),
    ));
    subscriber.subscribe(
        POINTS_USED_FOR_DISCOUNT,
        Arc::new(ApplyDiscountHandler::new(Arc::new(
            PostgresDiscountRepository::new(pool.clone()),
        ))),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let forwarder_task = {
        let forwarder = forwarder.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { forwarder.run(shutdown).await })
    };
    let subscriber_task = {
        let subscriber = subscriber.clone();
        tokio::spawn(async move { subscriber.run(shutdown_rx).await })
    };

    info!("points-outbox running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C, shutting down");
    }

    info!("Shutting down");
    // Receivers may already be gone if both tasks exited on their own.
    let _ = shutdown_tx.send(true);

    match forwarder_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Forwarder stopped with error"),
        Err(e) => error!(error = %e, "Forwarder task panicked"),
    }
    match subscriber_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Subscriber stopped with error"),
        Err(e) => error!(error = %e, "Subscriber task panicked"),
    }

    let stats = forwarder.stats();
    info!(
        published = stats.published,
        retries = stats.retries,
        last_forwarded = stats.last_forwarded.as_i64(),
        "Forwarder stopped"
    );

    transport.close().await?;
    pool.close().await;
    Ok(())
}
