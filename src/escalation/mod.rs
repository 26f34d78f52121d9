//! # Threat Escalation Pipeline
//!
//! The orchestrator that turns a raw agent report into side effects. A
//! report is validated into an immutable `ThreatRecord`, classified into
//! an escalation tier, and routed:
//!
//! - **critical**: alert + automated containment (active mode only)
//! - **high**: alert
//! - **medium/low**: log-level handling
//! - **info**: debug log only
//!
//! Every tier records a correlation entry against the current threat
//! intelligence. Only `InvalidArgument` (a malformed report) fails the
//! call; storage, delivery, and upstream failures are logged and the
//! pipeline keeps going.

pub mod classifier;

use chrono::Utc;
use serde_json::json;

use crate::correlation::CorrelationStore;
use crate::intel::ThreatIntelFeed;
use crate::response::alerter::AlertDispatcher;
use crate::response::containment::ContainmentExecutor;
use crate::{
    AgentReport, CorrelationRecord, EscalationConfig, EscalationTier, IntegrationMode,
    PipelineConfig, PipelineResult, ThreatRecord,
};

/// What the pipeline did with one threat.
#[derive(Debug, Clone)]
pub struct EscalationOutcome {
    pub threat_id: String,
    pub tier: EscalationTier,

    /// Response label for the tier: `immediate_response`,
    /// `prompt_investigation`, `enhanced_monitoring`, `standard_logging`,
    /// or `logged`.
    pub action: &'static str,

    pub alert_sent: bool,
    pub containment_executed: bool,

    /// Score of the correlation record written for this threat, when the
    /// store accepted it.
    pub correlation_score: Option<f64>,
}

/// Escalation pipeline over explicitly constructed collaborators.
///
/// Owns the correlation store (sole writer of threat and correlation
/// records), the alert dispatcher, the containment executor, and the
/// intel feed. No ambient global state: everything arrives through the
/// constructor.
pub struct ThreatPipeline {
    config: EscalationConfig,
    mode: IntegrationMode,
    store: CorrelationStore,
    alerts: AlertDispatcher,
    containment: ContainmentExecutor,
    intel: Box<dyn ThreatIntelFeed>,
    threat_seq: u64,
}

impl ThreatPipeline {
    pub fn new(
        config: &PipelineConfig,
        store: CorrelationStore,
        alerts: AlertDispatcher,
        containment: ContainmentExecutor,
        intel: Box<dyn ThreatIntelFeed>,
    ) -> Self {
        Self {
            config: config.escalation.clone(),
            mode: config.containment.integration_mode,
            store,
            alerts,
            containment,
            intel,
            threat_seq: 0,
        }
    }

    /// Handle a detected threat with tier-appropriate escalation.
    ///
    /// Returns `InvalidArgument` when the report's metrics are out of
    /// range; every other failure along the way is logged and absorbed.
    pub fn handle_threat(
        &mut self,
        report: &AgentReport,
        execution_id: i64,
        agent_id: &str,
    ) -> PipelineResult<EscalationOutcome> {
        let now = Utc::now();
        self.threat_seq += 1;
        let threat_id = format!("threat-{}-{}", now.timestamp_millis(), self.threat_seq);

        let record = ThreatRecord::from_report(threat_id, report, execution_id, agent_id, now)?;
        let tier = classifier::classify(record.threat_level, record.confidence)?;

        if let Err(e) = self.store.insert_threat(&record) {
            log::warn!(
                "[ESCALATE] Failed to store threat {} (continuing): {}",
                record.id,
                e
            );
        }

        log::info!(
            "[ESCALATE] Threat detected: type={} level={} confidence={:.2} execution={} tier={}",
            record.threat_type,
            record.threat_level,
            record.confidence,
            execution_id,
            tier,
        );

        // Correlation runs for every tier.
        let correlation_score = self
            .correlate(agent_id, execution_id, tier, &report.findings)
            .map(|c| c.correlation_score);

        let mut alert_sent = false;
        let mut containment_executed = false;

        let action = match tier {
            EscalationTier::Critical => {
                alert_sent = self.dispatch_alert(
                    tier,
                    "CRITICAL THREAT DETECTED - Immediate Response Required",
                    &record,
                );
                containment_executed = self.contain(&record);
                log::error!(
                    "CRITICAL THREAT: Type={} ThreatID={}",
                    record.threat_type,
                    record.id
                );
                "immediate_response"
            }
            EscalationTier::High => {
                alert_sent = self.dispatch_alert(
                    tier,
                    "HIGH PRIORITY THREAT - Prompt Investigation Required",
                    &record,
                );
                log::warn!("HIGH THREAT: Type={} ThreatID={}", record.threat_type, record.id);
                "prompt_investigation"
            }
            EscalationTier::Medium => {
                log::info!("MEDIUM THREAT: Type={} ThreatID={}", record.threat_type, record.id);
                "enhanced_monitoring"
            }
            EscalationTier::Low => {
                log::info!("LOW THREAT: Type={} ThreatID={}", record.threat_type, record.id);
                "standard_logging"
            }
            EscalationTier::Info => {
                log::debug!("INFO THREAT: Type={} ThreatID={}", record.threat_type, record.id);
                "logged"
            }
        };

        Ok(EscalationOutcome {
            threat_id: record.id,
            tier,
            action,
            alert_sent,
            containment_executed,
            correlation_score,
        })
    }

    /// Correlate one execution without running escalation side effects.
    ///
    /// Used for auto-correlation of executions below the threat
    /// threshold: the correlation trail stays complete even for reports
    /// that never reach alerting or containment.
    pub fn correlate_execution(
        &mut self,
        report: &AgentReport,
        execution_id: i64,
        agent_id: &str,
    ) -> PipelineResult<CorrelationRecord> {
        let severity = classifier::classify(report.threat_level, report.confidence)?;
        let indicators = self.fetch_indicators();
        self.store.record(
            agent_id,
            execution_id,
            severity,
            &report.findings,
            &indicators,
            Utc::now(),
        )
    }

    /// Whether auto-correlation is enabled for sub-threshold executions.
    pub fn auto_correlate(&self) -> bool {
        self.config.auto_correlate
    }

    /// Minimum threat level that triggers escalation.
    pub fn threat_threshold(&self) -> i32 {
        self.config.threat_threshold
    }

    /// Read access to the correlation store (history, statistics).
    pub fn store(&self) -> &CorrelationStore {
        &self.store
    }

    fn fetch_indicators(&self) -> Vec<String> {
        match self.intel.fetch() {
            Ok(indicators) => indicators,
            Err(e) => {
                log::warn!("[ESCALATE] Could not fetch threat intel (using empty list): {}", e);
                Vec::new()
            }
        }
    }

    fn correlate(
        &mut self,
        agent_id: &str,
        execution_id: i64,
        tier: EscalationTier,
        findings: &serde_json::Value,
    ) -> Option<CorrelationRecord> {
        let indicators = self.fetch_indicators();
        match self
            .store
            .record(agent_id, execution_id, tier, findings, &indicators, Utc::now())
        {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!(
                    "[ESCALATE] Failed to store correlation for execution {} (continuing): {}",
                    execution_id,
                    e
                );
                None
            }
        }
    }

    fn dispatch_alert(&self, tier: EscalationTier, message: &str, record: &ThreatRecord) -> bool {
        let payload = json!({
            "level": tier.as_str(),
            "type": record.threat_type,
            "threat_id": record.id,
            "execution_id": record.source_execution_id,
            "agent_id": record.agent_id,
            "threat_level": record.threat_level,
            "confidence": record.confidence,
            "analysis": record.analysis,
        });

        match self.alerts.send_alert(tier, message, &payload) {
            Ok(_receipt) => true,
            Err(e) => {
                log::warn!("[ESCALATE] Alert for {} not delivered (continuing): {}", record.id, e);
                false
            }
        }
    }

    /// Run the record's recommended containment actions, or log them when
    /// the integration mode is passive.
    ///
    /// The passive gate lives here, not in the executor: in passive mode
    /// the executor must not be invoked at all.
    fn contain(&mut self, record: &ThreatRecord) -> bool {
        if self.mode != IntegrationMode::Active {
            for rec in &record.recommendations {
                log::info!(
                    "[CONTAIN] Passive mode - recommended (not executed): {} against {}",
                    rec.action,
                    rec.target
                );
            }
            return false;
        }

        let report = self.containment.run_recommendations(&record.recommendations);
        log::info!(
            "[CONTAIN] Containment executed for threat {}: {} applied, {} failed",
            record.id,
            report.applied_count(),
            report.failed_count(),
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intel::StaticIntelFeed;
    use crate::response::containment::{ContainmentBackend, FirewallBackend};
    use crate::{
        ActionKind, AlertsConfig, ContainmentConfig, ExecutionStatus, GeneralConfig,
        IntelConfig, PipelineError, Recommendation,
    };
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("threatflow-test-pipeline").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_config(dir: &PathBuf, mode: IntegrationMode) -> PipelineConfig {
        PipelineConfig {
            general: GeneralConfig {
                data_dir: dir.clone(),
                poll_interval_secs: 60,
                http_timeout_secs: 2,
            },
            escalation: EscalationConfig {
                threat_threshold: 3,
                auto_correlate: false,
            },
            alerts: AlertsConfig {
                webhook_url: None,
                alert_email: None,
                alert_log_path: dir.join("alerts.jsonl"),
            },
            containment: ContainmentConfig {
                integration_mode: mode,
            },
            intel: IntelConfig { feed_url: None },
        }
    }

    struct SpyBackend {
        calls: Arc<Mutex<Vec<(ActionKind, String)>>>,
    }

    impl ContainmentBackend for SpyBackend {
        fn apply(&mut self, action: ActionKind, target: &str) -> PipelineResult<bool> {
            self.calls.lock().unwrap().push((action, target.to_string()));
            Ok(true)
        }
    }

    fn build_pipeline(
        dir: &PathBuf,
        mode: IntegrationMode,
        indicators: Vec<String>,
    ) -> (ThreatPipeline, Arc<Mutex<Vec<(ActionKind, String)>>>) {
        let config = test_config(dir, mode);
        let store = CorrelationStore::open(dir).unwrap();
        let alerts = AlertDispatcher::new(&config.alerts, &config.general);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let containment =
            ContainmentExecutor::new(Box::new(SpyBackend { calls: calls.clone() }));
        let intel = Box::new(StaticIntelFeed::new(indicators));
        (
            ThreatPipeline::new(&config, store, alerts, containment, intel),
            calls,
        )
    }

    fn ransomware_report() -> AgentReport {
        AgentReport {
            status: ExecutionStatus::Completed,
            threat_type: "ransomware".to_string(),
            threat_level: 5,
            confidence: 0.9,
            analysis: "encryption burst on fileserver shares".to_string(),
            findings: serde_json::json!({"matched": ["lockbit", "203.0.113.7"]}),
            recommendations: vec![
                Recommendation {
                    action: "block_ip".to_string(),
                    target: "203.0.113.7".to_string(),
                },
                Recommendation {
                    action: "isolate".to_string(),
                    target: "fileserver-2".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_critical_threat_routing() {
        let dir = test_dir("critical");
        let (mut pipeline, calls) = build_pipeline(
            &dir,
            IntegrationMode::Active,
            vec!["lockbit".to_string(), "mimikatz".to_string()],
        );

        let outcome = pipeline
            .handle_threat(&ransomware_report(), 11, "agent-edr-03")
            .unwrap();

        assert_eq!(outcome.tier, EscalationTier::Critical);
        assert_eq!(outcome.action, "immediate_response");
        assert!(outcome.alert_sent);
        assert!(outcome.containment_executed);
        assert_eq!(outcome.correlation_score, Some(50.0));
        assert_eq!(calls.lock().unwrap().len(), 2);

        let history: Vec<_> = pipeline.store().history("agent-edr-03", 10).collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].severity, EscalationTier::Critical);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_passive_mode_never_touches_executor() {
        let dir = test_dir("passive");
        let (mut pipeline, calls) = build_pipeline(&dir, IntegrationMode::Passive, vec![]);

        let outcome = pipeline
            .handle_threat(&ransomware_report(), 12, "agent-edr-03")
            .unwrap();

        assert_eq!(outcome.tier, EscalationTier::Critical);
        assert!(!outcome.containment_executed);
        // The safety invariant: zero backend invocations in passive mode.
        assert!(calls.lock().unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_lower_tiers_do_not_alert_or_contain() {
        let dir = test_dir("lower");
        let (mut pipeline, calls) = build_pipeline(&dir, IntegrationMode::Active, vec![]);

        let mut report = ransomware_report();
        report.threat_type = "port_scan".to_string();
        report.threat_level = 2;
        report.confidence = 0.65;

        let outcome = pipeline.handle_threat(&report, 13, "agent-net-01").unwrap();
        assert_eq!(outcome.tier, EscalationTier::Medium);
        assert_eq!(outcome.action, "enhanced_monitoring");
        assert!(!outcome.alert_sent);
        assert!(!outcome.containment_executed);
        assert!(calls.lock().unwrap().is_empty());

        // Correlation still ran for the medium tier.
        assert_eq!(pipeline.store().correlation_count(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_info_tier_still_correlates() {
        let dir = test_dir("info");
        let (mut pipeline, _calls) = build_pipeline(&dir, IntegrationMode::Active, vec![]);

        let mut report = ransomware_report();
        report.threat_level = 1;
        report.confidence = 0.2;

        let outcome = pipeline.handle_threat(&report, 14, "agent-net-01").unwrap();
        assert_eq!(outcome.tier, EscalationTier::Info);
        assert_eq!(outcome.action, "logged");
        assert_eq!(pipeline.store().correlation_count(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_malformed_report_is_invalid_argument() {
        let dir = test_dir("malformed");
        let (mut pipeline, _calls) = build_pipeline(&dir, IntegrationMode::Active, vec![]);

        let mut report = ransomware_report();
        report.threat_level = 9;

        let result = pipeline.handle_threat(&report, 15, "agent-x");
        assert!(matches!(result, Err(PipelineError::InvalidArgument(_))));
        // Nothing was stored for the rejected report.
        assert_eq!(pipeline.store().threats().len(), 0);
        assert_eq!(pipeline.store().correlation_count(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_correlate_execution_records_without_side_effects() {
        let dir = test_dir("auto");
        let (mut pipeline, calls) =
            build_pipeline(&dir, IntegrationMode::Active, vec!["lockbit".to_string()]);

        let mut report = ransomware_report();
        report.threat_level = 1;
        report.confidence = 0.3;

        let record = pipeline
            .correlate_execution(&report, 16, "agent-net-01")
            .unwrap();
        assert_eq!(record.severity, EscalationTier::Info);
        assert_eq!(record.correlation_score, 100.0);
        assert_eq!(pipeline.store().threats().len(), 0);
        assert!(calls.lock().unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_firewall_backend_composes() {
        // Construction-only check that the production backend satisfies
        // the executor seam.
        let _executor = ContainmentExecutor::new(Box::new(FirewallBackend));
    }
}
