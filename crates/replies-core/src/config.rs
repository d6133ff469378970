use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Protocol-level defaults for batching, heartbeat, and queue behavior.
pub const DEFAULT_BATCH_WINDOW_SECONDS: u64 = 10;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 300; // H = 5 min
pub const DEFAULT_HEARTBEAT_EXTENSION_SECS: u64 = 600; // E = 10 min
pub const DEFAULT_AI_POLL_BUDGET_SECS: u64 = 120;
pub const DEFAULT_LOCK_TTL_BUFFER_SECS: u64 = 30;
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 5;

/// Top-level config: `replies.toml` + `REPLIES_*` env overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyEngineConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub tables: TableConfig,
    #[serde(default)]
    pub queues: QueueConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub outbound: OutboundConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ReplyEngineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            batching: BatchingConfig::default(),
            tables: TableConfig::default(),
            queues: QueueConfig::default(),
            ai: AiConfig::default(),
            webhooks: WebhookConfig::default(),
            outbound: OutboundConfig::default(),
            server: ServerConfig::default(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Batch window (W) and the lease-steal / lock TTL parameters derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    #[serde(default = "default_batch_window_seconds")]
    pub batch_window_seconds: u64,
    #[serde(default = "default_lock_ttl_buffer_seconds")]
    pub lock_ttl_buffer_seconds: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_heartbeat_extension_secs")]
    pub heartbeat_extension_secs: u64,
    #[serde(default = "default_ai_poll_budget_secs")]
    pub ai_poll_budget_secs: u64,
}

impl BatchingConfig {
    /// TTL for a `TriggerLock`: the batch window plus a buffer wide enough
    /// to absorb scheduling jitter on the delayed trigger.
    pub fn lock_ttl_seconds(&self) -> u64 {
        self.batch_window_seconds + self.lock_ttl_buffer_seconds
    }

    /// Duration after which a processor holding `processing_reply` with a
    /// stale `updated_at` is presumed crashed and its lease may be stolen.
    pub fn lease_steal_after_secs(&self) -> u64 {
        2 * self.heartbeat_extension_secs
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_window_seconds: default_batch_window_seconds(),
            lock_ttl_buffer_seconds: default_lock_ttl_buffer_seconds(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            heartbeat_extension_secs: default_heartbeat_extension_secs(),
            ai_poll_budget_secs: default_ai_poll_budget_secs(),
        }
    }
}

/// Logical table/store names — kept as config rather than constants so a
/// deployment can namespace them (e.g. per-environment prefixes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_stage_table")]
    pub stage_table: String,
    #[serde(default = "default_lock_table")]
    pub lock_table: String,
    #[serde(default = "default_conversations_table")]
    pub conversations_table: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            stage_table: default_stage_table(),
            lock_table: default_lock_table(),
            conversations_table: default_conversations_table(),
        }
    }
}

/// Per-channel delayed-trigger queue names, plus the handoff notification queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_whatsapp_queue")]
    pub whatsapp_queue: String,
    #[serde(default = "default_sms_queue")]
    pub sms_queue: String,
    #[serde(default = "default_email_queue")]
    pub email_queue: String,
    #[serde(default = "default_handoff_queue")]
    pub handoff_queue: String,
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            whatsapp_queue: default_whatsapp_queue(),
            sms_queue: default_sms_queue(),
            email_queue: default_email_queue(),
            handoff_queue: default_handoff_queue(),
            max_receive_count: default_max_receive_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AiConfig {
    /// Default assistant identifier used when a `ConversationRecord`'s
    /// `ai_config` doesn't override it.
    pub default_assistant_id: Option<String>,
}

/// Per-channel shared-secret references for inbound webhook signature
/// verification. Never the secret value itself — resolved through a
/// `SecretResolver` at request time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_whatsapp_secret_id")]
    pub whatsapp_secret_id: String,
    #[serde(default = "default_sms_secret_id")]
    pub sms_secret_id: String,
    #[serde(default = "default_email_secret_id")]
    pub email_secret_id: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            whatsapp_secret_id: default_whatsapp_secret_id(),
            sms_secret_id: default_sms_secret_id(),
            email_secret_id: default_email_secret_id(),
        }
    }
}

impl WebhookConfig {
    pub fn secret_id_for(&self, channel: crate::types::Channel) -> &str {
        match channel {
            crate::types::Channel::WhatsApp => &self.whatsapp_secret_id,
            crate::types::Channel::Sms => &self.sms_secret_id,
            crate::types::Channel::Email => &self.email_secret_id,
        }
    }
}

/// Per-channel provider webhook URLs the `OutboundSender` posts replies to.
/// Not secret — the bearer token alongside it is resolved separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundConfig {
    #[serde(default = "default_whatsapp_endpoint")]
    pub whatsapp_endpoint: String,
    #[serde(default = "default_sms_endpoint")]
    pub sms_endpoint: String,
    #[serde(default = "default_email_endpoint")]
    pub email_endpoint: String,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            whatsapp_endpoint: default_whatsapp_endpoint(),
            sms_endpoint: default_sms_endpoint(),
            email_endpoint: default_email_endpoint(),
        }
    }
}

impl OutboundConfig {
    pub fn endpoint_for(&self, channel: crate::types::Channel) -> &str {
        match channel {
            crate::types::Channel::WhatsApp => &self.whatsapp_endpoint,
            crate::types::Channel::Sms => &self.sms_endpoint,
            crate::types::Channel::Email => &self.email_endpoint,
        }
    }
}

/// `replies-ingest-server`'s bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.replies-engine/replies.db", home)
}
fn default_batch_window_seconds() -> u64 {
    DEFAULT_BATCH_WINDOW_SECONDS
}
fn default_lock_ttl_buffer_seconds() -> u64 {
    DEFAULT_LOCK_TTL_BUFFER_SECS
}
fn default_heartbeat_interval_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}
fn default_heartbeat_extension_secs() -> u64 {
    DEFAULT_HEARTBEAT_EXTENSION_SECS
}
fn default_ai_poll_budget_secs() -> u64 {
    DEFAULT_AI_POLL_BUDGET_SECS
}
fn default_stage_table() -> String {
    "staged_fragments".to_string()
}
fn default_lock_table() -> String {
    "trigger_locks".to_string()
}
fn default_conversations_table() -> String {
    "conversations".to_string()
}
fn default_whatsapp_queue() -> String {
    "whatsapp-triggers".to_string()
}
fn default_sms_queue() -> String {
    "sms-triggers".to_string()
}
fn default_email_queue() -> String {
    "email-triggers".to_string()
}
fn default_handoff_queue() -> String {
    "handoff-notifications".to_string()
}
fn default_max_receive_count() -> u32 {
    DEFAULT_MAX_RECEIVE_COUNT
}
fn default_whatsapp_secret_id() -> String {
    "whatsapp-shared-secret".to_string()
}
fn default_sms_secret_id() -> String {
    "sms-shared-secret".to_string()
}
fn default_email_secret_id() -> String {
    "email-shared-secret".to_string()
}
fn default_whatsapp_endpoint() -> String {
    "https://api.twilio.com/2010-04-01/Messages".to_string()
}
fn default_sms_endpoint() -> String {
    "https://api.twilio.com/2010-04-01/Messages".to_string()
}
fn default_email_endpoint() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl ReplyEngineConfig {
    /// Load config from a TOML file with `REPLIES_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, then
    /// `~/.replies-engine/replies.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ReplyEngineConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("REPLIES_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.replies-engine/replies.toml", home)
}
