//! Notification Worker
//!
//! Delivers queued notification emails and exposes the operator controls for
//! the notification queue and the template store.
//!
//! ## Architecture
//!
//! ```text
//! Redis (notifications:*)
//!   ↓ (atomic claim, up to QUEUE_CONCURRENCY in flight)
//! QueueWorker<NotificationJob, NotificationProcessor>
//!   ↓ (already-rendered message, per-send timeout)
//! Transport (SMTP)
//!   ↓ failure
//! Backoff 2s, 4s, then parked as failed
//! ```
//!
//! ## Commands
//!
//! - `run`: worker loop plus health/admin server
//! - `backfill-templates`: upsert the bundled templates
//! - `status`, `failed`, `job`: queue introspection
//! - `retry-failed`, `drain`, `pause`, `resume`: queue controls
//! - `send-test`: render and send the welcome email

mod admin;
mod cli;
mod config;
mod connect;

pub use admin::{TemplateAdmin, admin_app};
pub use cli::{Cli, Command};
pub use config::TemplateSettings;

use std::sync::Arc;

use core_config::database::DatabaseConfig;
use core_config::redis::RedisConfig;
use core_config::server::AdminServerConfig;
use core_config::{Environment, FromEnv, app_info};
use domain_notifications::events::WelcomeEmail;
use domain_notifications::templates::AssetSource;
use domain_notifications::{
    Delivery, DeliveryMode, MailConfig, NotificationProcessor, NotificationQueue,
    NotificationService, NotificationServiceConfig, PgTemplateStore, QueueConfig, TemplateRenderer,
    TemplateSeeder, TemplateStore, Transport,
};
use eyre::{Result, WrapErr, eyre};
use job_queue::{AdminState, QueueWorker, RedisQueueStore};
use serde::Serialize;
use serde_json::json;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Template store plus the seeder and renderer on top of it.
struct Templates {
    seeder: Arc<TemplateSeeder>,
    renderer: Arc<TemplateRenderer>,
}

async fn open_queue() -> Result<(NotificationQueue, QueueConfig)> {
    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    let queue_config = QueueConfig::from_env().wrap_err("Failed to load queue configuration")?;

    let redis = connect::connect_redis(&redis_config.uri).await?;
    let store = RedisQueueStore::with_retention(redis, queue_config.name.clone(), queue_config.retention);

    let queue = NotificationQueue::new(Arc::new(store)).with_lease_ms(queue_config.lease_ms);

    Ok((queue, queue_config))
}

async fn open_templates(environment: Environment) -> Result<Templates> {
    let settings = TemplateSettings::from_env().wrap_err("Failed to load template settings")?;
    let db_config = DatabaseConfig::from_env().wrap_err("Failed to load database configuration")?;

    let db = connect::connect_postgres(&db_config).await?;
    let store: Arc<dyn TemplateStore> = Arc::new(PgTemplateStore::new(db));

    let assets = settings.asset_source();
    let partials = assets
        .load()
        .wrap_err_with(|| format!("Failed to load template assets from {}", assets.describe()))?
        .partials;
    info!(source = %assets.describe(), cache = ?settings.cache_policy, "Template assets loaded");

    let seeder = Arc::new(TemplateSeeder::new(store.clone(), assets, environment));
    let renderer = TemplateRenderer::new(store, &partials, settings.cache_policy)
        .wrap_err("Failed to register template partials")?
        .with_seeder(seeder.clone());

    Ok(Templates {
        seeder,
        renderer: Arc::new(renderer),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run the worker loop until SIGINT/SIGTERM.
///
/// Startup order: metrics, Redis, Postgres, template seeding, mail transport,
/// then the admin server and the worker itself. Seeding failures are logged
/// and left to the renderer's self-heal.
async fn run_worker(environment: Environment) -> Result<()> {
    job_queue::init_metrics().map_err(|e| eyre!("Failed to install Prometheus recorder: {}", e))?;

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting notification worker");
    info!("Environment: {:?}", environment);

    let admin_config =
        AdminServerConfig::from_env().wrap_err("Failed to load admin server configuration")?;
    let (queue, queue_config) = open_queue().await?;
    let templates = open_templates(environment).await?;

    match templates.seeder.ensure_seeded().await {
        Ok(true) => info!("Backfilled missing templates at startup"),
        Ok(false) => debug!("Template store already seeded"),
        Err(e) => warn!(error = %e, "Startup template seeding failed"),
    }

    let mail_config = MailConfig::from_env().wrap_err("Failed to load mail configuration")?;
    let transport = Transport::from_config(&mail_config, environment)
        .wrap_err("Failed to configure mail transport")?;
    info!(provider = transport.provider_name(), host = %mail_config.host, "Mail transport ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let app = admin_app(
        AdminState::new(queue.control().clone(), app_info.name, app_info.version),
        TemplateAdmin {
            seeder: templates.seeder.clone(),
            renderer: templates.renderer.clone(),
        },
    );
    let admin_shutdown = shutdown_rx.clone();
    let admin_server = tokio::spawn(async move {
        if let Err(e) = admin::serve(app, &admin_config, admin_shutdown).await {
            error!(error = %e, "Admin server failed");
        }
    });

    info!(
        queue = %queue_config.name,
        concurrency = queue_config.worker.concurrency,
        poll_interval_ms = queue_config.worker.poll_interval_ms,
        "Worker configuration loaded"
    );
    let worker = QueueWorker::new(
        queue.jobs().clone(),
        NotificationProcessor::new(transport),
        queue_config.worker.clone(),
    );
    worker.run(shutdown_rx).await.wrap_err("Queue worker failed")?;

    if let Err(e) = admin_server.await {
        error!(error = %e, "Admin server task panicked");
    }
    info!("Notification worker stopped");
    Ok(())
}

async fn send_test(environment: Environment, to: String, name: String, queued: bool) -> Result<()> {
    let (queue, _) = open_queue().await?;
    let templates = open_templates(environment).await?;
    let mail_config = MailConfig::from_env().wrap_err("Failed to load mail configuration")?;
    let transport = Transport::from_config(&mail_config, environment)
        .wrap_err("Failed to configure mail transport")?;
    let service_config = NotificationServiceConfig::from_env()
        .wrap_err("Failed to load notification service configuration")?;

    let service = NotificationService::new(templates.renderer, transport, queue, service_config);
    let mode = if queued {
        DeliveryMode::Queued
    } else {
        DeliveryMode::Immediate
    };

    let email = WelcomeEmail {
        to: to.into(),
        name,
    };
    match service.send_welcome_email(&email, mode).await? {
        Delivery::Sent(sent) => print_json(&json!({ "sent": true, "messageId": sent.message_id })),
        Delivery::Queued(id) => print_json(&json!({ "queued": true, "jobId": id })),
    }
}

/// Entry point for every subcommand.
pub async fn run(cli: Cli) -> Result<()> {
    // Initialize tracing (env-aware: JSON for prod, pretty for dev)
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    match cli.command {
        Command::Run => run_worker(environment).await,
        Command::BackfillTemplates => {
            let templates = open_templates(environment).await?;
            let upserted = templates.seeder.backfill_all().await?;
            print_json(&json!({ "upserted": upserted }))
        }
        Command::Status => {
            let (queue, _) = open_queue().await?;
            let counts = queue.status().await?;
            let paused = queue.control().is_paused().await?;
            print_json(&json!({ "queue": queue.name(), "paused": paused, "counts": counts }))
        }
        Command::Failed { limit } => {
            let (queue, _) = open_queue().await?;
            print_json(&queue.failed_jobs(limit).await?)
        }
        Command::Job { id } => {
            let (queue, _) = open_queue().await?;
            match queue.get(id).await? {
                Some(job) => print_json(&job),
                None => Err(eyre!("Job {} not found in queue {}", id, queue.name())),
            }
        }
        Command::RetryFailed => {
            let (queue, _) = open_queue().await?;
            let retried = queue.retry_failed_jobs().await?;
            print_json(&json!({ "retried": retried }))
        }
        Command::Drain => {
            let (queue, _) = open_queue().await?;
            let drained = queue.drain().await?;
            print_json(&json!({ "drained": drained }))
        }
        Command::Pause => {
            let (queue, _) = open_queue().await?;
            queue.pause().await?;
            print_json(&json!({ "paused": true }))
        }
        Command::Resume => {
            let (queue, _) = open_queue().await?;
            queue.resume().await?;
            print_json(&json!({ "paused": false }))
        }
        Command::SendTest { to, name, queued } => send_test(environment, to, name, queued).await,
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("Failed to install Ctrl+C handler")?;
                info!("Received Ctrl+C, initiating shutdown...");
            },
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown...");
            },
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.wrap_err("Failed to install Ctrl+C handler")?;
        info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}
