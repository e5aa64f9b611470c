//! Audit trail
//!
//! Significant events (wallet movements, session lifecycle, large wins,
//! control changes, RNG self tests) are written to an `AuditSink` and
//! mirrored to `tracing`. Logging is fire-and-forget: a sink failure is
//! reported as a system error and never undoes the operation that caused it.

use crate::common::traits::AuditSink;
use crate::errors::StorageError;
use crate::metrics::EngineMetrics;
use crate::storage::{KvStore, StoreBatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

const AUDIT_PREFIX: &[u8] = b"audit:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Deposit,
    Withdrawal,
    BonusCredit,
    GameSessionStart,
    GameSessionEnd,
    GameCycleComplete,
    GameCycleInterrupted,
    GameCycleVoided,
    GameCycleResumed,
    LargeWin,
    SystemError,
    RngHealthCheck,
    GamingDisabled,
    GamingEnabled,
    GameDisabled,
    GameEnabled,
    PlayerDisabled,
    PlayerEnabled,
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // serde names are the canonical spelling
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Who and where an event concerns. Unset fields are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub player_id: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub component: String,
}

impl Default for AuditContext {
    fn default() -> Self {
        Self {
            player_id: None,
            session_id: None,
            ip_address: None,
            component: "rgs-core".to_string(),
        }
    }
}

impl AuditContext {
    pub fn player(player_id: impl Into<String>) -> Self {
        Self {
            player_id: Some(player_id.into()),
            ..Default::default()
        }
    }

    pub fn session(player_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            player_id: Some(player_id.into()),
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn component(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub event_type: AuditEventType,
    pub severity: EventSeverity,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub description: String,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub component: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuditError {
    #[error("audit storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("audit serialization failed: {0}")]
    Serialization(String),
}

/// Persists events under newest-first keys.
pub struct StoreAuditSink {
    store: Arc<dyn KvStore>,
}

impl StoreAuditSink {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn event_key(event: &AuditEvent) -> Vec<u8> {
        let inv_millis = u64::MAX - event.timestamp.timestamp_millis().max(0) as u64;
        let mut key = Vec::with_capacity(AUDIT_PREFIX.len() + 8 + event.id.len());
        key.extend_from_slice(AUDIT_PREFIX);
        key.extend_from_slice(&inv_millis.to_be_bytes());
        key.extend_from_slice(event.id.as_bytes());
        key
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>, AuditError> {
        self.store
            .scan_prefix(AUDIT_PREFIX, limit)?
            .into_iter()
            .map(|(_, bytes)| {
                serde_json::from_slice(&bytes).map_err(|e| AuditError::Serialization(e.to_string()))
            })
            .collect()
    }
}

impl AuditSink for StoreAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let bytes =
            serde_json::to_vec(event).map_err(|e| AuditError::Serialization(e.to_string()))?;
        let mut batch = StoreBatch::new();
        batch.put(Self::event_key(event), bytes);
        self.store.write_batch(batch)?;
        Ok(())
    }
}

/// Keeps events in memory; for tests and tooling.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn of_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .map_err(|_| AuditError::Serialization("memory sink poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}

/// Front door for audit logging
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
    metrics: Option<Arc<EngineMetrics>>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn log(
        &self,
        event_type: AuditEventType,
        severity: EventSeverity,
        description: impl Into<String>,
        data: serde_json::Value,
        ctx: AuditContext,
    ) {
        let event = AuditEvent {
            id: Uuid::new_v4().to_string(),
            event_type,
            severity,
            timestamp: Utc::now(),
            player_id: ctx.player_id,
            session_id: ctx.session_id,
            description: description.into(),
            data,
            ip_address: ctx.ip_address,
            component: ctx.component,
        };

        match severity {
            EventSeverity::Info => info!(
                event_type = %event.event_type,
                player_id = event.player_id.as_deref().unwrap_or("-"),
                "audit: {}", event.description
            ),
            EventSeverity::Warning => warn!(
                event_type = %event.event_type,
                player_id = event.player_id.as_deref().unwrap_or("-"),
                "audit: {}", event.description
            ),
            EventSeverity::Error | EventSeverity::Critical => error!(
                event_type = %event.event_type,
                player_id = event.player_id.as_deref().unwrap_or("-"),
                "audit: {}", event.description
            ),
        }

        if let Err(e) = self.sink.record(&event) {
            error!(
                event_type = %event.event_type,
                "system error: failed to record audit event {}: {}", event.id, e
            );
            if let Some(metrics) = &self.metrics {
                metrics.audit_failures.inc();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn record(&self, _event: &AuditEvent) -> Result<(), AuditError> {
            Err(AuditError::Storage(StorageError::WriteFailed("disk full".to_string())))
        }
    }

    #[test]
    fn test_context_defaults() {
        let ctx = AuditContext::default();
        assert_eq!(ctx.component, "rgs-core");
        assert!(ctx.player_id.is_none());

        let ctx = AuditContext::session("p1", "s1");
        assert_eq!(ctx.player_id.as_deref(), Some("p1"));
        assert_eq!(ctx.session_id.as_deref(), Some("s1"));
        assert_eq!(ctx.component, "rgs-core");
    }

    #[test]
    fn test_memory_sink_records_events() {
        let sink = Arc::new(MemoryAuditSink::new());
        let log = AuditLog::new(sink.clone());
        log.log(
            AuditEventType::LargeWin,
            EventSeverity::Warning,
            "Large win: 25000",
            json!({"win_amount": 25_000}),
            AuditContext::player("p1"),
        );

        let events = sink.of_type(AuditEventType::LargeWin);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["win_amount"], 25_000);
        assert_eq!(events[0].player_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_store_sink_newest_first() {
        let store = Arc::new(MemoryStorage::new());
        let sink = Arc::new(StoreAuditSink::new(store));
        let log = AuditLog::new(sink.clone());

        log.log(
            AuditEventType::Deposit,
            EventSeverity::Info,
            "first",
            json!({}),
            AuditContext::default(),
        );
        std::thread::sleep(std::time::Duration::from_millis(5));
        log.log(
            AuditEventType::Withdrawal,
            EventSeverity::Info,
            "second",
            json!({}),
            AuditContext::default(),
        );

        let recent = sink.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].description, "second");
        assert_eq!(recent[1].description, "first");
    }

    #[test]
    fn test_sink_failure_is_counted_not_raised() {
        let metrics = Arc::new(EngineMetrics::new().unwrap());
        let log = AuditLog::new(Arc::new(BrokenSink)).with_metrics(metrics.clone());
        log.log(
            AuditEventType::SystemError,
            EventSeverity::Critical,
            "boom",
            json!(null),
            AuditContext::default(),
        );
        assert_eq!(metrics.audit_failures.get(), 1);
    }

    #[test]
    fn test_event_type_display() {
        assert_eq!(AuditEventType::GameSessionStart.to_string(), "game_session_start");
        assert_eq!(AuditEventType::RngHealthCheck.to_string(), "rng_health_check");
        assert!(EventSeverity::Critical > EventSeverity::Warning);
    }
}
