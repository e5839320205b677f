use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_REQUEST_DEADLINE_MS: u64 = 30_000;
pub const DEFAULT_DB_POOL_SIZE: u32 = 8;
pub const DEFAULT_OUTBOUND_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_INGEST_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_AUTOMATION_MAX_CONCURRENCY_PER_TENANT: u32 = 4;
pub const DEFAULT_POLICY_CACHE_TTL_SECS: u64 = 30;
pub const DEFAULT_CHANNEL_CRED_CACHE_TTL_SECS: u64 = 60;

/// Top-level config (convo.toml + CONVO_* env overrides, figment-layered).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvoConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub brokers: BrokersConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    pub vector_store: VectorStoreConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub webhook_secrets: WebhookSecretsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    pub admin_jwt: AdminJwtConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Where the Channel Gateway forwards normalized inbound messages.
    pub orchestrator_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port(), bind: default_bind(), orchestrator_url: None }
    }
}

/// `DB_URL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// `OUTBOUND_STREAM_URL`, `INGEST_QUEUE_URL`, `EVENT_BUS_URL`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrokersConfig {
    pub outbound_stream_url: Option<String>,
    pub ingest_queue_url: Option<String>,
    pub event_bus_url: Option<String>,
}

/// `OBJECT_STORE_ENDPOINT`, `OBJECT_STORE_BUCKET`, `OBJECT_STORE_ACCESS`,
/// `OBJECT_STORE_SECRET`, `OBJECT_STORE_REGION`.
///
/// No networked object-store client is wired up anywhere in this workspace;
/// `endpoint`, when set, is read as a local filesystem root by
/// `convo_core::FsObjectStore` rather than an HTTP endpoint. A networked
/// backend can be added later behind the same `ObjectStore` trait without
/// touching callers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObjectStoreConfig {
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub access: Option<String>,
    pub secret: Option<String>,
    pub region: Option<String>,
}

impl ObjectStoreConfig {
    pub fn local_root(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| "./data/objects".to_string())
    }
}

/// `VECTOR_STORE_URL`, `VECTOR_STORE_API_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    pub url: String,
    pub api_key: Option<String>,
}

/// `LLM_PROVIDER_URL`, `LLM_API_KEY`, `LLM_MODEL`, `LLM_FALLBACK_MODEL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider_url: String,
    pub api_key: String,
    pub model: String,
    pub fallback_model: Option<String>,
}

/// `EMBEDDING_PROVIDER` ∈ {primary, fallback}, `EMBEDDING_API_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProviderChoice,
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { provider: default_embedding_provider(), api_key: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderChoice {
    Primary,
    Fallback,
}

fn default_embedding_provider() -> EmbeddingProviderChoice {
    EmbeddingProviderChoice::Primary
}

/// `WEBHOOK_SECRET_<channel>` — a rotation-aware set keyed by channel type name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookSecretsConfig {
    #[serde(flatten)]
    pub by_channel: std::collections::HashMap<String, String>,
}

/// `REQUEST_DEADLINE_MS`, `DB_POOL_SIZE`, `OUTBOUND_MAX_ATTEMPTS`,
/// `INGEST_MAX_ATTEMPTS`, `AUTOMATION_MAX_CONCURRENCY_PER_TENANT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_request_deadline_ms")]
    pub request_deadline_ms: u64,
    #[serde(default = "default_db_pool_size")]
    pub db_pool_size: u32,
    #[serde(default = "default_outbound_max_attempts")]
    pub outbound_max_attempts: u32,
    #[serde(default = "default_ingest_max_attempts")]
    pub ingest_max_attempts: u32,
    #[serde(default = "default_automation_max_concurrency_per_tenant")]
    pub automation_max_concurrency_per_tenant: u32,
    #[serde(default = "default_policy_cache_ttl_secs")]
    pub policy_cache_ttl_secs: u64,
    #[serde(default = "default_channel_cred_cache_ttl_secs")]
    pub channel_cred_cache_ttl_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            request_deadline_ms: default_request_deadline_ms(),
            db_pool_size: default_db_pool_size(),
            outbound_max_attempts: default_outbound_max_attempts(),
            ingest_max_attempts: default_ingest_max_attempts(),
            automation_max_concurrency_per_tenant: default_automation_max_concurrency_per_tenant(),
            policy_cache_ttl_secs: default_policy_cache_ttl_secs(),
            channel_cred_cache_ttl_secs: default_channel_cred_cache_ttl_secs(),
        }
    }
}

/// `EMAIL_SMTP_RELAY`, `EMAIL_USERNAME`, `EMAIL_PASSWORD`, `EMAIL_FROM`.
/// Backs the automation worker's `email` connector.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmailConfig {
    pub smtp_relay: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
}

/// `ADMIN_JWT_SECRET`, `ADMIN_JWT_ISSUER`, `ADMIN_JWT_AUDIENCE`, `ADMIN_JWT_TTL_SECONDS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminJwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    #[serde(default = "default_jwt_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_request_deadline_ms() -> u64 {
    DEFAULT_REQUEST_DEADLINE_MS
}
fn default_db_pool_size() -> u32 {
    DEFAULT_DB_POOL_SIZE
}
fn default_outbound_max_attempts() -> u32 {
    DEFAULT_OUTBOUND_MAX_ATTEMPTS
}
fn default_ingest_max_attempts() -> u32 {
    DEFAULT_INGEST_MAX_ATTEMPTS
}
fn default_automation_max_concurrency_per_tenant() -> u32 {
    DEFAULT_AUTOMATION_MAX_CONCURRENCY_PER_TENANT
}
fn default_policy_cache_ttl_secs() -> u64 {
    DEFAULT_POLICY_CACHE_TTL_SECS
}
fn default_channel_cred_cache_ttl_secs() -> u64 {
    DEFAULT_CHANNEL_CRED_CACHE_TTL_SECS
}
fn default_jwt_ttl_seconds() -> u64 {
    3600
}

impl ConvoConfig {
    /// Load config from a TOML file with CONVO_* env var overrides.
    ///
    /// Unknown or invalid fields are a fatal error at process start —
    /// figment's strict deserialization surfaces them as `ConvoError::Config`
    /// rather than silently falling back to defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.map(String::from).unwrap_or_else(default_config_path);

        let config: ConvoConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CONVO_").split("_"))
            .extract()
            .map_err(|e| crate::error::ConvoError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    "./convo.toml".to_string()
}
