//! Wires the components together from a [`Config`].

use crate::auth::AuthClient;
use crate::config::Config;
use crate::events::EventBus;
use crate::fallback::FallbackCoordinator;
use crate::health::{HealthMonitor, HttpProbe};
use crate::service::SessionService;
use crate::sources::{RemoteSource, SessionSource, SyntheticSource};
use crate::store::{FileStore, KeyValueStore};
use crate::transport::TransportClient;
use anyhow::{Context, Result};
use std::sync::Arc;

pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn KeyValueStore>,
    pub transport: Arc<TransportClient>,
    pub health: Arc<HealthMonitor>,
    pub events: Arc<EventBus>,
    pub auth: AuthClient,
    pub service: SessionService,
}

impl AppContext {
    /// Build with the file-backed credential store next to the config.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = FileStore::open(config.store_path())
            .with_context(|| format!("Failed to open store {}", config.store_path().display()))?;
        Self::with_store(config, Arc::new(store))
    }

    pub fn with_store(config: Config, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let transport = Arc::new(
            TransportClient::new(
                &config.api.base_url,
                config.request_timeout(),
                config.retry_policy(),
            )
            .context("Failed to create HTTP transport")?,
        );

        let probe = HttpProbe::new(
            Arc::clone(&transport),
            &config.api.health_path,
            config.health_timeout(),
        );
        let health = Arc::new(HealthMonitor::new(Arc::new(probe), config.health_ttl()));
        let events = Arc::new(EventBus::new());

        let remote: Arc<dyn SessionSource> =
            Arc::new(RemoteSource::new(Arc::clone(&transport), Arc::clone(&store)));
        let synthetic: Arc<dyn SessionSource> = if config.synthetic.seed_history {
            Arc::new(SyntheticSource::seeded(config.synthetic_latency()))
        } else {
            Arc::new(SyntheticSource::new(config.synthetic_latency()))
        };

        let coordinator = FallbackCoordinator::new(
            remote,
            synthetic,
            Arc::clone(&health),
            Arc::clone(&events),
            config.fallback.environment,
            config.fallback.force_synthetic,
        );

        tracing::debug!(
            base_url = %transport.base_url(),
            environment = ?config.fallback.environment,
            force_synthetic = config.fallback.force_synthetic,
            "Session service ready"
        );

        let auth = AuthClient::new(Arc::clone(&transport), Arc::clone(&store));

        Ok(Self {
            config,
            store,
            transport,
            health,
            events,
            auth,
            service: SessionService::new(Arc::new(coordinator)),
        })
    }
}
