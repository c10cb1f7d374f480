//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by the CLI. The
//! services are generic over repository/client traits; AppState pins them
//! to the concrete infra implementations and acts as the single
//! composition root -- there are no ambient singletons.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use confab_core::conversation::Conversation;
use confab_core::event::EventBus;
use confab_core::gateway::{GatewayConfig, ResponseCache, ResponseGateway};
use confab_core::ledger::MessageLedger;
use confab_core::registry::SessionRegistry;
use confab_core::reveal::{RevealConfig, Revealer};
use confab_core::sync::Reconciler;
use confab_infra::config::{load_engine_config, resolve_data_dir};
use confab_infra::feed::ChangeFeed;
use confab_infra::inference::HttpInferenceClient;
use confab_infra::sqlite::{DatabasePool, SqliteMessageRepository, SqliteSessionRepository};
use confab_types::config::EngineConfig;

/// Concrete type aliases for the service generics pinned to infra
/// implementations.
pub type ConcreteRegistry = SessionRegistry<SqliteSessionRepository>;
pub type ConcreteLedger = MessageLedger<SqliteMessageRepository>;
pub type ConcreteConversation = Conversation<HttpInferenceClient, SqliteMessageRepository>;
pub type ConcreteGateway = ResponseGateway<HttpInferenceClient>;

/// Shared application state holding all services.
pub struct AppState {
    pub registry: ConcreteRegistry,
    pub ledger: Arc<ConcreteLedger>,
    pub conversation: Arc<ConcreteConversation>,
    pub gateway: ConcreteGateway,
    pub reconciler: Reconciler<ChangeFeed>,
    pub events: EventBus,
    pub config: EngineConfig,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: load config, connect to the
    /// database, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_engine_config(&data_dir).await;

        let db_url = format!("sqlite://{}?mode=rwc", data_dir.join("confab.db").display());
        let db_pool = DatabasePool::new(&db_url).await?;

        let events = EventBus::default();
        let feed = Arc::new(ChangeFeed::default());

        let session_repo = Arc::new(SqliteSessionRepository::new(db_pool.clone()));
        let message_repo = Arc::new(SqliteMessageRepository::new(db_pool.clone(), feed.clone()));

        let registry = SessionRegistry::new(session_repo, events.clone());
        let ledger = Arc::new(MessageLedger::new(
            message_repo,
            events.clone(),
            config.ledger.page_size,
        ));

        let mut client = HttpInferenceClient::new(config.gateway.base_url.clone());
        if let Some(key) = &config.gateway.api_key {
            client = client.with_api_key(SecretString::from(key.clone()));
        }
        let gateway = ResponseGateway::new(
            client,
            GatewayConfig::from(&config.gateway),
            ResponseCache::new(
                Duration::from_secs(config.cache.ttl_secs),
                config.cache.capacity,
            ),
            events.clone(),
        );

        let revealer = Revealer::new(RevealConfig::from(&config.reveal));
        let conversation = Arc::new(Conversation::new(
            gateway.clone(),
            ledger.clone(),
            revealer,
        ));
        let reconciler = Reconciler::new(feed);

        Ok(Self {
            registry,
            ledger,
            conversation,
            gateway,
            reconciler,
            events,
            config,
            data_dir,
            db_pool,
        })
    }

    /// The owning user id, supplied by the external identity provider.
    ///
    /// Treated as an opaque string; the CLI takes it from `CONFAB_USER`
    /// and falls back to a single local identity.
    pub fn owner_id(&self) -> String {
        std::env::var("CONFAB_USER").unwrap_or_else(|_| "local".to_string())
    }
}
