//! Application state

use crate::anchor::{AnchorHandle, AnchorWorker, http::HttpLedgerClient};
use crate::bus::{EventBus, InMemoryBus, LOG_UPDATES_TOPIC};
use crate::chain::ChainSigner;
use crate::config::Config;
use crate::hub::LogHub;
use crate::store::session::SessionStore;
use crate::store::{self, LogStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Log entry storage (publishes to `bus` on append)
    pub store: LogStore,
    /// Session token storage (shares the database)
    pub sessions: SessionStore,
    /// Live WebSocket distribution hub
    pub hub: Arc<LogHub>,
    /// Store-to-hub event bus
    pub bus: Arc<dyn EventBus>,
    /// Digest engine
    pub chain: Arc<ChainSigner>,
    /// Ledger anchoring handle; `None` when no ledger is configured
    pub anchor: Option<AnchorHandle>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, BoxError> {
        if let Some(parent) = Path::new(&config.data_path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let db = store::open_database(&config.data_path)?;

        let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
        let store = LogStore::new(db.clone(), config.retention_limit, bus.clone())?;
        let sessions = SessionStore::new(db, config.session_ttl_minutes)?;
        let chain = Arc::new(ChainSigner::new(&config.chain_secret));

        let anchor = match &config.ledger_endpoint {
            Some(endpoint) => {
                tracing::info!(endpoint, "Ledger anchoring enabled");
                let client = Arc::new(HttpLedgerClient::new(endpoint)?);
                Some(AnchorWorker::spawn(client))
            }
            None => {
                tracing::info!("LEDGER_ENDPOINT not set, anchoring disabled");
                None
            }
        };

        Ok(Self {
            config,
            store,
            sessions,
            hub: Arc::new(LogHub::new()),
            bus,
            chain,
            anchor,
        })
    }

    /// Spawn the bus-to-hub forwarder and the heartbeat task
    pub fn start_background_tasks(&self) {
        let mut rx = self.bus.subscribe(LOG_UPDATES_TOPIC);
        let hub = self.hub.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        let subject = serde_json::from_str::<serde_json::Value>(&message)
                            .ok()
                            .and_then(|v| {
                                v.get("subject_id").and_then(|s| s.as_str().map(String::from))
                            });
                        match subject {
                            Some(subject) => hub.broadcast(&subject, &message),
                            None => {
                                tracing::warn!("bus message without subject_id, not forwarded")
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "hub forwarder lagged behind the bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        tokio::spawn(
            self.hub
                .clone()
                .heartbeat_loop(Duration::from_secs(self.config.heartbeat_interval_secs)),
        );
    }

    /// In-memory state for tests: no anchoring, development secrets
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        let config = Config {
            http_port: 0,
            data_path: String::new(),
            chain_secret: "test-chain-secret".into(),
            session_ttl_minutes: 30,
            retention_limit: 1000,
            heartbeat_interval_secs: 30,
            ledger_endpoint: None,
            environment: "development".into(),
        };

        let db = store::open_in_memory().unwrap();
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
        let store = LogStore::new(db.clone(), config.retention_limit, bus.clone()).unwrap();
        let sessions = SessionStore::new(db, config.session_ttl_minutes).unwrap();
        let chain = Arc::new(ChainSigner::new(&config.chain_secret));

        Self {
            config,
            store,
            sessions,
            hub: Arc::new(LogHub::new()),
            bus,
            chain,
            anchor: None,
        }
    }
}
