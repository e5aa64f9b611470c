//! RNG integrity monitor
//!
//! Re-runs the chi-square self test on an interval. A failed test is a
//! fatal integrity event: it is audited as critical and, when configured,
//! all gaming is disabled until an operator re-enables it.

use crate::audit::{AuditContext, AuditEventType, AuditLog, EventSeverity};
use crate::control::GamingControl;
use crate::metrics::EngineMetrics;
use crate::rng::{HealthReport, RngEngine};
use serde_json::json;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

pub struct HealthMonitor {
    rng: Arc<RngEngine>,
    control: Arc<GamingControl>,
    audit: AuditLog,
    metrics: Option<Arc<EngineMetrics>>,
    disable_gaming_on_failure: bool,
    last_report: RwLock<Option<HealthReport>>,
    running: AtomicBool,
}

impl HealthMonitor {
    pub fn new(
        rng: Arc<RngEngine>,
        control: Arc<GamingControl>,
        audit: AuditLog,
        disable_gaming_on_failure: bool,
    ) -> Self {
        Self {
            rng,
            control,
            audit,
            metrics: None,
            disable_gaming_on_failure,
            last_report: RwLock::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Start the periodic check. The first tick fires after one full interval.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await;
            while monitor.running.load(Ordering::SeqCst) {
                tick.tick().await;
                if !monitor.running.load(Ordering::SeqCst) {
                    break;
                }
                monitor.check_once().await;
            }
            debug!("RNG health monitor stopped");
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn last_report(&self) -> Option<HealthReport> {
        self.last_report.read().await.clone()
    }

    /// Run the self test now and escalate on failure.
    pub async fn check_once(&self) -> HealthReport {
        let rng = self.rng.clone();
        let report = match tokio::task::spawn_blocking(move || rng.health_check()).await {
            Ok(report) => report,
            Err(e) => {
                warn!("RNG health check task failed: {}", e);
                HealthReport {
                    healthy: false,
                    timestamp: chrono::Utc::now(),
                    samples_generated: self.rng.samples_generated(),
                    chi_square: 0.0,
                    critical_value: 0.0,
                    chi_square_passed: false,
                    error: Some(e.to_string()),
                }
            }
        };
        self.record(&report).await;
        report
    }

    async fn record(&self, report: &HealthReport) {
        if let Some(metrics) = &self.metrics {
            metrics.record_health_check(report.healthy);
        }
        *self.last_report.write().await = Some(report.clone());

        let data = json!({
            "chi_square": report.chi_square,
            "critical_value": report.critical_value,
            "samples_generated": report.samples_generated,
            "error": report.error,
        });
        if report.healthy {
            self.audit.log(
                AuditEventType::RngHealthCheck,
                EventSeverity::Info,
                "RNG health check passed",
                data,
                AuditContext::component("rng"),
            );
            return;
        }

        error!(
            "RNG health check failed: chi-square {:.2} vs critical {:.2}",
            report.chi_square, report.critical_value
        );
        self.audit.log(
            AuditEventType::RngHealthCheck,
            EventSeverity::Critical,
            "RNG health check failed",
            data,
            AuditContext::component("rng"),
        );
        if self.disable_gaming_on_failure {
            self.control
                .disable_all_gaming("RNG health check failed", "integrity-monitor")
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::common::traits::AccessControl;
    use crate::rng::{EntropySource, RngError};

    struct StuckEntropy;

    impl EntropySource for StuckEntropy {
        fn fill(&mut self, dest: &mut [u8]) -> Result<(), RngError> {
            // low bits pinned so every draw lands in the same bin
            dest.fill(0);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "stuck"
        }
    }

    fn monitor(rng: RngEngine, disable: bool) -> (Arc<HealthMonitor>, Arc<GamingControl>, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        let audit = AuditLog::new(sink.clone());
        let control = Arc::new(GamingControl::new(audit.clone()));
        let monitor = Arc::new(HealthMonitor::new(Arc::new(rng), control.clone(), audit, disable));
        (monitor, control, sink)
    }

    #[tokio::test]
    async fn test_healthy_rng_keeps_gaming_enabled() {
        let (monitor, control, sink) = monitor(RngEngine::seeded(42), true);
        let report = monitor.check_once().await;

        assert!(report.healthy);
        assert!(control.is_gaming_enabled().await);
        assert_eq!(monitor.last_report().await, Some(report));
        assert_eq!(sink.of_type(AuditEventType::RngHealthCheck).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_check_disables_gaming() {
        let (monitor, control, sink) = monitor(RngEngine::new(Box::new(StuckEntropy)), true);
        let report = monitor.check_once().await;

        assert!(!report.healthy);
        assert!(!control.is_gaming_enabled().await);
        assert!(control.check_access("p1", "fortune-slots").await.is_err());
        let checks = sink.of_type(AuditEventType::RngHealthCheck);
        assert_eq!(checks[0].severity, EventSeverity::Critical);
        assert_eq!(sink.of_type(AuditEventType::GamingDisabled).len(), 1);
    }

    #[tokio::test]
    async fn test_failure_without_escalation() {
        let (monitor, control, _) = monitor(RngEngine::new(Box::new(StuckEntropy)), false);
        assert!(!monitor.check_once().await.healthy);
        assert!(control.is_gaming_enabled().await);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (monitor, _, _) = monitor(RngEngine::seeded(1), true);
        monitor.start(Duration::from_millis(10));
        assert!(monitor.is_running());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(monitor.last_report().await.is_some());

        monitor.stop();
        assert!(!monitor.is_running());
    }
}
