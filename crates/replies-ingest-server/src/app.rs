use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use rusqlite::Connection;

use replies_channels::{EmailAdapter, PayloadAdapter, SmsAdapter, WhatsAppAdapter};
use replies_conversations::{ConversationResolver, ConversationStore};
use replies_core::config::ReplyEngineConfig;
use replies_core::secrets::{SecretResolver, StaticSecretResolver};
use replies_ingest::IngestCoordinator;
use replies_queue::{SqliteQueue, TriggerScheduler};
use replies_stage::{db as stage_db, LockStore, StageStore};

/// Central shared state for the ingest server: the `IngestCoordinator` plus
/// the store handles `/healthz` reports on.
pub struct AppState {
    pub config: ReplyEngineConfig,
    pub ingest: IngestCoordinator,
    pub stage: Arc<StageStore>,
    pub locks: Arc<LockStore>,
    pub queue: Arc<SqliteQueue>,
}

impl AppState {
    pub fn new(config: ReplyEngineConfig) -> anyhow::Result<Self> {
        let stage_conn = Connection::open(&config.database.path)?;
        stage_db::init_db(&stage_conn)?;
        let stage = Arc::new(StageStore::new(stage_conn));

        let lock_conn = Connection::open(&config.database.path)?;
        stage_db::init_db(&lock_conn)?;
        let locks = Arc::new(LockStore::new(lock_conn));

        let conversations = Arc::new(ConversationStore::new(Connection::open(
            &config.database.path,
        )?)?);
        let resolver = Arc::new(ConversationResolver::new(conversations));

        let queue = Arc::new(SqliteQueue::new(Connection::open(&config.database.path)?)?);
        let trigger_scheduler = Arc::new(TriggerScheduler::new(
            queue.clone(),
            config.queues.whatsapp_queue.clone(),
            config.queues.sms_queue.clone(),
            config.queues.email_queue.clone(),
            config.queues.handoff_queue.clone(),
        ));

        let secret_ids = [
            config.webhooks.whatsapp_secret_id.as_str(),
            config.webhooks.sms_secret_id.as_str(),
            config.webhooks.email_secret_id.as_str(),
        ];
        let secrets: Arc<dyn SecretResolver> = Arc::new(StaticSecretResolver::from_env(&secret_ids));

        let adapters: Vec<Arc<dyn PayloadAdapter>> = vec![
            Arc::new(WhatsAppAdapter),
            Arc::new(SmsAdapter),
            Arc::new(EmailAdapter),
        ];

        let ingest = IngestCoordinator::new(
            stage.clone(),
            locks.clone(),
            resolver,
            secrets,
            trigger_scheduler,
            adapters,
            config.webhooks.clone(),
            config.batching.lock_ttl_seconds(),
            config.batching.batch_window_seconds,
        );

        Ok(Self {
            config,
            ingest,
            stage,
            locks,
            queue,
        })
    }
}

/// Assemble the full Axum router: the per-channel webhook endpoint and a
/// readiness probe.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/{channel}", post(crate::handlers::webhook_handler))
        .route("/healthz", get(crate::handlers::health_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
