//! Service container
//!
//! Builds the component graph (audit, control, ledger, catalog, engine,
//! integrity monitor) from one `RgsConfig` so the server binary and the
//! integration tests wire things identically.

use crate::{
    audit::{AuditLog, StoreAuditSink},
    config::RgsConfig,
    control::GamingControl,
    engine::GameEngine,
    errors::{ConfigurationError, RgsResult},
    games::GameCatalog,
    integrity::HealthMonitor,
    ledger::Ledger,
    metrics::EngineMetrics,
    rng::RngEngine,
    storage::KvStore,
};
use std::sync::Arc;

/// Shared handles to every core component
pub struct ServiceContainer {
    config: RgsConfig,
    store: Arc<dyn KvStore>,
    rng: Arc<RngEngine>,
    metrics: Arc<EngineMetrics>,
    audit: AuditLog,
    control: Arc<GamingControl>,
    ledger: Arc<Ledger>,
    catalog: Arc<GameCatalog>,
    engine: Arc<GameEngine>,
    monitor: Arc<HealthMonitor>,
}

impl ServiceContainer {
    pub fn new(config: RgsConfig, store: Arc<dyn KvStore>, rng: Arc<RngEngine>) -> RgsResult<Self> {
        config.validate()?;

        let metrics = Arc::new(EngineMetrics::new().map_err(|e| {
            ConfigurationError::ValidationFailed(format!("metrics registry: {}", e))
        })?);
        let audit = AuditLog::new(Arc::new(StoreAuditSink::new(store.clone())))
            .with_metrics(metrics.clone());
        let control = Arc::new(GamingControl::new(audit.clone()));

        let ledger = Arc::new(
            Ledger::new(store.clone(), audit.clone(), config.ledger.clone())
                .with_metrics(metrics.clone()),
        );
        let catalog = Arc::new(GameCatalog::with_default_games(
            &config.game.currency,
            config.game.min_rtp,
        )?);
        let engine = Arc::new(
            GameEngine::new(
                store.clone(),
                ledger.clone(),
                rng.clone(),
                catalog.clone(),
                audit.clone(),
                config.game.clone(),
            )
            .with_access_control(control.clone())
            .with_metrics(metrics.clone()),
        );
        let monitor = Arc::new(
            HealthMonitor::new(
                rng.clone(),
                control.clone(),
                audit.clone(),
                config.rng.disable_gaming_on_health_failure,
            )
            .with_metrics(metrics.clone()),
        );

        Ok(Self {
            config,
            store,
            rng,
            metrics,
            audit,
            control,
            ledger,
            catalog,
            engine,
            monitor,
        })
    }

    pub fn config(&self) -> &RgsConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn KvStore> {
        self.store.clone()
    }

    pub fn rng(&self) -> Arc<RngEngine> {
        self.rng.clone()
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    pub fn audit(&self) -> AuditLog {
        self.audit.clone()
    }

    pub fn control(&self) -> Arc<GamingControl> {
        self.control.clone()
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.clone()
    }

    pub fn catalog(&self) -> Arc<GameCatalog> {
        self.catalog.clone()
    }

    pub fn engine(&self) -> Arc<GameEngine> {
        self.engine.clone()
    }

    pub fn monitor(&self) -> Arc<HealthMonitor> {
        self.monitor.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::money::Money;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_container_wires_shared_store() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStorage::new());
        let services =
            ServiceContainer::new(RgsConfig::development(), store, Arc::new(RngEngine::seeded(3)))
                .unwrap();

        let ledger = services.ledger();
        ledger.open_account("p1", "USD").await.unwrap();
        ledger.deposit("p1", &Money::new(500, "USD"), "x").await.unwrap();

        let session = services
            .engine()
            .start_session("p1", "fortune-slots")
            .await
            .unwrap();
        assert_eq!(session.opening_balance.amount, 500);
        assert_eq!(services.catalog().list().len(), 2);
        assert!(services
            .metrics()
            .render()
            .contains("rgs_ledger_postings_total{type=\"deposit\"} 1"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = RgsConfig::development();
        config.game.unit_stake = 0;
        let store: Arc<dyn KvStore> = Arc::new(MemoryStorage::new());
        assert!(ServiceContainer::new(config, store, Arc::new(RngEngine::seeded(3))).is_err());
    }
}
