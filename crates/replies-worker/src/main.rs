use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::info;

mod factories;
mod worker;

use factories::{HttpSenderFactory, OpenAiDriverFactory};
use replies_conversations::ConversationStore;
use replies_core::config::ReplyEngineConfig;
use replies_core::secrets::{EnvSecretResolver, SecretResolver};
use replies_core::types::Channel;
use replies_process::ProcessingCoordinator;
use replies_queue::{SqliteQueue, TriggerScheduler};
use replies_stage::{db as stage_db, LockStore, StageStore};

/// Reply engine worker — drains trigger queues and drives reply turns.
#[derive(Parser)]
#[command(name = "replies-worker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file. Falls back to REPLIES_CONFIG, then
    /// ~/.replies-engine/replies.toml.
    #[arg(short, long)]
    config: Option<String>,

    /// Poll each channel queue a single time, then exit, instead of
    /// running the long-poll loop. Useful for cron-driven deployment or
    /// exercising the pipeline by hand.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "replies_worker=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let once = cli.once;

    let config_path = cli.config.or_else(|| std::env::var("REPLIES_CONFIG").ok());
    let config = ReplyEngineConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        ReplyEngineConfig::default()
    });

    let stage_conn = Connection::open(&config.database.path)?;
    stage_db::init_db(&stage_conn)?;
    let stage = Arc::new(StageStore::new(stage_conn));

    let lock_conn = Connection::open(&config.database.path)?;
    stage_db::init_db(&lock_conn)?;
    let locks = Arc::new(LockStore::new(lock_conn));

    let conversations = Arc::new(ConversationStore::new(Connection::open(
        &config.database.path,
    )?)?);

    let queue = Arc::new(SqliteQueue::new(Connection::open(&config.database.path)?)?);
    let trigger_scheduler = Arc::new(TriggerScheduler::new(
        queue.clone(),
        config.queues.whatsapp_queue.clone(),
        config.queues.sms_queue.clone(),
        config.queues.email_queue.clone(),
        config.queues.handoff_queue.clone(),
    ));

    let secrets: Arc<dyn SecretResolver> = Arc::new(EnvSecretResolver);

    let http_client = reqwest::Client::new();
    let assistant_factory = Arc::new(OpenAiDriverFactory::new(
        http_client.clone(),
        Duration::from_secs(config.batching.ai_poll_budget_secs),
    ));
    let sender_factory = Arc::new(HttpSenderFactory::new(http_client, config.outbound.clone()));

    let heartbeat_interval = Duration::from_secs(config.batching.heartbeat_interval_secs);
    let visibility_extension = Duration::from_secs(config.batching.heartbeat_extension_secs);

    let coordinator = Arc::new(ProcessingCoordinator::new(
        stage,
        locks,
        conversations,
        trigger_scheduler,
        secrets,
        assistant_factory,
        sender_factory,
        config.batching.lease_steal_after_secs(),
        heartbeat_interval,
        visibility_extension,
    ));

    let channels = [
        (Channel::WhatsApp, config.queues.whatsapp_queue.clone()),
        (Channel::Sms, config.queues.sms_queue.clone()),
        (Channel::Email, config.queues.email_queue.clone()),
    ];

    if once {
        info!("running in --once mode, polling each channel queue a single time");
        for (channel, queue_name) in channels {
            worker::poll_once(
                &coordinator,
                &queue,
                channel,
                &queue_name,
                visibility_extension.as_secs(),
                config.queues.max_receive_count,
            )
            .await;
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();
    for (channel, queue_name) in channels {
        handles.push(tokio::spawn(worker::run_queue_loop(
            coordinator.clone(),
            queue.clone(),
            channel,
            queue_name,
            Duration::from_secs(1),
            visibility_extension.as_secs(),
            config.queues.max_receive_count,
            shutdown_rx.clone(),
        )));
    }

    info!("reply engine worker started, polling whatsapp/sms/email trigger queues");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}
