//! # Schedule Poller
//!
//! Manages recurring agent execution across six frequencies and drives
//! the escalation pipeline from the results.
//!
//! Each schedule is a tiny state machine: idle until `next_execution`
//! arrives, firing once per poll pass, then idle again with
//! `next_execution` recomputed from the fire time. There is no terminal
//! state; deactivating a schedule removes it from consideration without
//! deleting its execution history.
//!
//! A pass is safe to run on every cron tick: a schedule advances its
//! `next_execution` in the same step that fires it, so rapid repeated
//! passes never double-fire. An execution failure is recorded and the
//! schedule still advances; nothing a single agent does can stall the
//! poller.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentExecutor;
use crate::correlation::{append_jsonl, load_jsonl};
use crate::escalation::ThreatPipeline;
use crate::{
    EscalationTier, ExecutionStatus, Frequency, PipelineError, PipelineResult, Schedule,
};

/// One line in the execution history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEntry {
    pub execution_id: i64,
    pub schedule_id: String,
    pub agent_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Failure or escalation detail, when there is one.
    pub detail: Option<String>,
}

/// What happened to one schedule during a poll pass.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub schedule_id: String,
    pub agent_id: String,
    pub execution_id: i64,
    pub status: ExecutionStatus,
    /// Tier the escalation pipeline assigned, when it ran.
    pub escalation: Option<EscalationTier>,
    pub detail: Option<String>,
}

/// Result of a single poll pass.
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    pub executed: usize,
    pub results: Vec<ScheduleOutcome>,
}

/// Aggregate schedule/execution counters.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleStatistics {
    pub total_schedules: usize,
    pub active_schedules: usize,
    pub total_executions: u64,
    pub completed_executions: u64,
    pub failed_executions: u64,
    pub success_rate: f64,
}

/// Schedule store and poll loop. Sole writer of schedule timestamps;
/// `is_active` and `frequency` are operator-mutable through the methods
/// here.
pub struct AgentScheduler {
    schedules: Vec<Schedule>,
    state_path: PathBuf,
    history_path: PathBuf,
    executor: Box<dyn AgentExecutor>,
    pipeline: ThreatPipeline,
    execution_seq: i64,
    schedule_seq: u64,
    completed_executions: u64,
    failed_executions: u64,
}

impl AgentScheduler {
    /// Open the scheduler under a data directory, restoring schedule
    /// state and history counters persisted by earlier runs.
    ///
    /// A schedule restored with a stale `next_execution` simply fires on
    /// the first pass; that is intended catch-up behavior.
    pub fn open(
        data_dir: &Path,
        executor: Box<dyn AgentExecutor>,
        pipeline: ThreatPipeline,
    ) -> PipelineResult<Self> {
        let state_path = data_dir.join("schedules.json");
        let history_path = data_dir.join("executions.jsonl");

        let schedules: Vec<Schedule> = if state_path.exists() {
            let content = std::fs::read_to_string(&state_path)
                .map_err(|e| PipelineError::Storage(format!("{}: {}", state_path.display(), e)))?;
            serde_json::from_str(&content)
                .map_err(|e| PipelineError::Storage(format!("{}: {}", state_path.display(), e)))?
        } else {
            Vec::new()
        };

        let history: Vec<ExecutionEntry> = load_jsonl(&history_path)?;
        let completed_executions = history
            .iter()
            .filter(|e| e.status == ExecutionStatus::Completed)
            .count() as u64;
        let failed_executions = history.len() as u64 - completed_executions;
        let execution_seq = history.iter().map(|e| e.execution_id).max().unwrap_or(0);

        Ok(Self {
            schedule_seq: schedules.len() as u64,
            schedules,
            state_path,
            history_path,
            executor,
            pipeline,
            execution_seq,
            completed_executions,
            failed_executions,
        })
    }

    /// Create a new active schedule. The first firing happens one full
    /// period after creation.
    pub fn create_schedule(
        &mut self,
        agent_id: &str,
        frequency: Frequency,
    ) -> PipelineResult<Schedule> {
        if agent_id.is_empty() || agent_id.len() > 100 {
            return Err(PipelineError::InvalidArgument(format!(
                "agent id must be 1-100 characters, got {} characters",
                agent_id.len()
            )));
        }

        let now = Utc::now();
        self.schedule_seq += 1;
        let schedule = Schedule {
            id: format!("sched-{}-{}", now.timestamp_millis(), self.schedule_seq),
            agent_id: agent_id.to_string(),
            frequency,
            is_active: true,
            last_execution: None,
            next_execution: frequency.next_from(now),
            created_at: now,
            updated_at: now,
        };

        self.schedules.push(schedule.clone());
        self.save_state()?;
        log::info!("[SCHEDULE] Schedule created: {} for agent {}", schedule.id, agent_id);
        Ok(schedule)
    }

    /// All known schedules.
    pub fn schedules(&self) -> &[Schedule] {
        &self.schedules
    }

    /// Look up one schedule by id.
    pub fn schedule(&self, id: &str) -> Option<&Schedule> {
        self.schedules.iter().find(|s| s.id == id)
    }

    /// Enable or disable a schedule. Disabling removes it from polling
    /// without deleting it or its history.
    pub fn set_active(&mut self, id: &str, active: bool) -> PipelineResult<()> {
        let schedule = self
            .schedules
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| PipelineError::InvalidArgument(format!("Unknown schedule: {}", id)))?;
        schedule.is_active = active;
        schedule.updated_at = Utc::now();
        self.save_state()?;
        log::info!("[SCHEDULE] Schedule {}: {}", if active { "enabled" } else { "disabled" }, id);
        Ok(())
    }

    /// Change a schedule's frequency. Takes effect from the next firing;
    /// the pending `next_execution` is left as scheduled.
    pub fn set_frequency(&mut self, id: &str, frequency: Frequency) -> PipelineResult<()> {
        let schedule = self
            .schedules
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| PipelineError::InvalidArgument(format!("Unknown schedule: {}", id)))?;
        schedule.frequency = frequency;
        schedule.updated_at = Utc::now();
        self.save_state()?;
        log::info!("[SCHEDULE] Schedule frequency updated: {}", id);
        Ok(())
    }

    /// Remove a schedule entirely. Execution history is retained.
    pub fn remove_schedule(&mut self, id: &str) -> PipelineResult<()> {
        let before = self.schedules.len();
        self.schedules.retain(|s| s.id != id);
        if self.schedules.len() == before {
            return Err(PipelineError::InvalidArgument(format!("Unknown schedule: {}", id)));
        }
        self.save_state()?;
        log::info!("[SCHEDULE] Schedule deleted: {}", id);
        Ok(())
    }

    /// Run one poll pass at the current wall-clock time.
    pub fn poll_once(&mut self) -> PollReport {
        self.poll_at(Utc::now())
    }

    /// Run one poll pass as of the given instant.
    ///
    /// Fires every active schedule whose `next_execution` has arrived,
    /// exactly once each. A schedule's `next_execution` is recomputed
    /// from the fire time inside the same step, so calling this again
    /// immediately cannot double-fire.
    pub fn poll_at(&mut self, now: DateTime<Utc>) -> PollReport {
        let due: Vec<String> = self
            .schedules
            .iter()
            .filter(|s| s.is_active && s.next_execution <= now)
            .map(|s| s.id.clone())
            .collect();

        let mut results = Vec::new();
        for id in due {
            if let Some(outcome) = self.fire_schedule(&id, now) {
                results.push(outcome);
            }
        }

        if !results.is_empty() {
            log::info!("[SCHEDULE] Executed {} scheduled jobs", results.len());
            if let Err(e) = self.save_state() {
                log::warn!("[SCHEDULE] Failed to persist schedule state: {}", e);
            }
        }

        PollReport {
            executed: results.len(),
            results,
        }
    }

    /// Aggregate counters over schedules and execution history.
    pub fn statistics(&self) -> ScheduleStatistics {
        let total = self.completed_executions + self.failed_executions;
        ScheduleStatistics {
            total_schedules: self.schedules.len(),
            active_schedules: self.schedules.iter().filter(|s| s.is_active).count(),
            total_executions: total,
            completed_executions: self.completed_executions,
            failed_executions: self.failed_executions,
            success_rate: if total > 0 {
                (self.completed_executions as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        }
    }

    /// Read access to the escalation pipeline (store, history,
    /// statistics).
    pub fn pipeline(&self) -> &ThreatPipeline {
        &self.pipeline
    }

    /// Execute one due schedule and advance its timestamps.
    fn fire_schedule(&mut self, id: &str, now: DateTime<Utc>) -> Option<ScheduleOutcome> {
        let (agent_id, frequency) = {
            let schedule = self.schedules.iter().find(|s| s.id == id)?;
            (schedule.agent_id.clone(), schedule.frequency)
        };

        self.execution_seq += 1;
        let execution_id = self.execution_seq;

        let mut escalation = None;
        let mut detail = None;
        let status = match self.executor.execute(&agent_id, &serde_json::Value::Null) {
            Ok(report) => {
                if report.threat_level >= self.pipeline.threat_threshold() {
                    match self.pipeline.handle_threat(&report, execution_id, &agent_id) {
                        Ok(outcome) => escalation = Some(outcome.tier),
                        Err(e) => {
                            // Escalation trouble must not fail the schedule.
                            log::warn!(
                                "[SCHEDULE] Threat handling failed for {} (continuing): {}",
                                agent_id,
                                e
                            );
                            detail = Some(e.to_string());
                        }
                    }
                } else if self.pipeline.auto_correlate() {
                    if let Err(e) = self.pipeline.correlate_execution(&report, execution_id, &agent_id)
                    {
                        log::warn!(
                            "[SCHEDULE] Auto-correlation failed for {} (continuing): {}",
                            agent_id,
                            e
                        );
                    }
                }
                ExecutionStatus::Completed
            }
            Err(e) => {
                log::error!("[SCHEDULE] Execution failed for {}: {}", agent_id, e);
                detail = Some(e.to_string());
                ExecutionStatus::Failed
            }
        };

        match status {
            ExecutionStatus::Completed => self.completed_executions += 1,
            ExecutionStatus::Failed => self.failed_executions += 1,
        }

        let entry = ExecutionEntry {
            execution_id,
            schedule_id: id.to_string(),
            agent_id: agent_id.clone(),
            status,
            started_at: now,
            completed_at: Utc::now(),
            detail: detail.clone(),
        };
        if let Err(e) = append_jsonl(&self.history_path, &entry) {
            log::warn!("[SCHEDULE] Failed to record execution {}: {}", execution_id, e);
        }

        // Advance regardless of outcome: the fire time anchors the next
        // execution, so failures never stall the schedule and repeated
        // firings never accumulate drift.
        if let Some(schedule) = self.schedules.iter_mut().find(|s| s.id == id) {
            schedule.last_execution = Some(now);
            schedule.next_execution = frequency.next_from(now);
            schedule.updated_at = entry.completed_at;
        }

        Some(ScheduleOutcome {
            schedule_id: id.to_string(),
            agent_id,
            execution_id,
            status,
            escalation,
            detail,
        })
    }

    /// Snapshot schedule state to disk.
    fn save_state(&self) -> PipelineResult<()> {
        let content = serde_json::to_string_pretty(&self.schedules)
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        std::fs::write(&self.state_path, content)
            .map_err(|e| PipelineError::Storage(format!("{}: {}", self.state_path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationStore;
    use crate::intel::StaticIntelFeed;
    use crate::response::alerter::AlertDispatcher;
    use crate::response::containment::{ContainmentExecutor, FirewallBackend};
    use crate::{
        AgentReport, AlertsConfig, ContainmentConfig, EscalationConfig, GeneralConfig,
        IntegrationMode, IntelConfig, PipelineConfig, Recommendation,
    };
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("threatflow-test-schedule").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            general: GeneralConfig {
                data_dir: dir.to_path_buf(),
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
                integration_mode: IntegrationMode::Passive,
            },
            intel: IntelConfig { feed_url: None },
        }
    }

    fn test_pipeline(dir: &Path) -> ThreatPipeline {
        let config = test_config(dir);
        let store = CorrelationStore::open(dir).unwrap();
        let alerts = AlertDispatcher::new(&config.alerts, &config.general);
        let containment = ContainmentExecutor::new(Box::new(FirewallBackend));
        ThreatPipeline::new(
            &config,
            store,
            alerts,
            containment,
            Box::new(StaticIntelFeed::empty()),
        )
    }

    /// Executor returning a fixed report, counting invocations.
    struct ScriptedExecutor {
        report: AgentReport,
        calls: Arc<AtomicUsize>,
    }

    impl AgentExecutor for ScriptedExecutor {
        fn execute(
            &mut self,
            _agent_id: &str,
            _config: &serde_json::Value,
        ) -> PipelineResult<AgentReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.report.clone())
        }
    }

    /// Executor that always fails.
    struct FailingExecutor {
        calls: Arc<AtomicUsize>,
    }

    impl AgentExecutor for FailingExecutor {
        fn execute(
            &mut self,
            _agent_id: &str,
            _config: &serde_json::Value,
        ) -> PipelineResult<AgentReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::UpstreamTimeout("scanner unreachable".to_string()))
        }
    }

    fn benign_report() -> AgentReport {
        AgentReport {
            status: ExecutionStatus::Completed,
            threat_type: "none".to_string(),
            threat_level: 1,
            confidence: 0.1,
            analysis: "nothing notable".to_string(),
            findings: serde_json::Value::Null,
            recommendations: Vec::new(),
        }
    }

    fn critical_report() -> AgentReport {
        AgentReport {
            status: ExecutionStatus::Completed,
            threat_type: "ransomware".to_string(),
            threat_level: 5,
            confidence: 0.9,
            analysis: "mass encryption observed".to_string(),
            findings: serde_json::json!({"matched": ["lockbit"]}),
            recommendations: vec![Recommendation {
                action: "block_ip".to_string(),
                target: "203.0.113.7".to_string(),
            }],
        }
    }

    fn scheduler_with(dir: &Path, executor: Box<dyn AgentExecutor>) -> AgentScheduler {
        AgentScheduler::open(dir, executor, test_pipeline(dir)).unwrap()
    }

    #[test]
    fn test_create_schedule_validates_agent_id() {
        let dir = test_dir("validate");
        let calls = Arc::new(AtomicUsize::new(0));
        let mut scheduler = scheduler_with(
            &dir,
            Box::new(ScriptedExecutor {
                report: benign_report(),
                calls,
            }),
        );

        assert!(scheduler.create_schedule("", Frequency::Daily).is_err());
        assert!(scheduler.create_schedule(&"x".repeat(101), Frequency::Daily).is_err());
        assert!(scheduler.create_schedule("agent-recon-01", Frequency::Daily).is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_due_schedule_fires_exactly_once_per_pass() {
        let dir = test_dir("once");
        let calls = Arc::new(AtomicUsize::new(0));
        let mut scheduler = scheduler_with(
            &dir,
            Box::new(ScriptedExecutor {
                report: benign_report(),
                calls: calls.clone(),
            }),
        );

        let schedule = scheduler
            .create_schedule("agent-recon-01", Frequency::Every30Minutes)
            .unwrap();
        let due_at = schedule.next_execution + Duration::seconds(1);

        let report = scheduler.poll_at(due_at);
        assert_eq!(report.executed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Tight-loop repeats at the same instant must not double-fire.
        for _ in 0..5 {
            let repeat = scheduler.poll_at(due_at);
            assert_eq!(repeat.executed, 0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_inactive_schedule_skipped() {
        let dir = test_dir("inactive");
        let calls = Arc::new(AtomicUsize::new(0));
        let mut scheduler = scheduler_with(
            &dir,
            Box::new(ScriptedExecutor {
                report: benign_report(),
                calls: calls.clone(),
            }),
        );

        let schedule = scheduler
            .create_schedule("agent-recon-01", Frequency::Hourly)
            .unwrap();
        let id = schedule.id.clone();
        scheduler.set_active(&id, false).unwrap();

        let report = scheduler.poll_at(schedule.next_execution + Duration::hours(5));
        assert_eq!(report.executed, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Re-enabled, the stale next_execution fires on the next pass.
        scheduler.set_active(&id, true).unwrap();
        let report = scheduler.poll_at(schedule.next_execution + Duration::hours(5));
        assert_eq!(report.executed, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_daily_advance_has_no_drift() {
        let dir = test_dir("drift");
        let calls = Arc::new(AtomicUsize::new(0));
        let mut scheduler = scheduler_with(
            &dir,
            Box::new(ScriptedExecutor {
                report: benign_report(),
                calls,
            }),
        );

        let schedule = scheduler.create_schedule("agent-recon-01", Frequency::Daily).unwrap();
        let id = schedule.id.clone();
        let first_fire = schedule.next_execution;

        let mut fire_time = first_fire;
        for _ in 0..30 {
            let report = scheduler.poll_at(fire_time);
            assert_eq!(report.executed, 1);
            fire_time = scheduler.schedule(&id).unwrap().next_execution;
        }

        // 30 daily firings land exactly 30 days after the first, to the
        // second.
        let expected = first_fire + Duration::days(30);
        assert_eq!(fire_time, expected);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_failed_execution_advances_schedule() {
        let dir = test_dir("failure");
        let calls = Arc::new(AtomicUsize::new(0));
        let mut scheduler = scheduler_with(&dir, Box::new(FailingExecutor { calls: calls.clone() }));

        let schedule = scheduler
            .create_schedule("agent-recon-01", Frequency::Hourly)
            .unwrap();
        let id = schedule.id.clone();
        let due_at = schedule.next_execution;

        let report = scheduler.poll_at(due_at);
        assert_eq!(report.executed, 1);
        assert_eq!(report.results[0].status, ExecutionStatus::Failed);
        assert!(report.results[0].detail.as_deref().unwrap().contains("scanner unreachable"));

        // The failure advanced the schedule instead of stalling it.
        let advanced = scheduler.schedule(&id).unwrap();
        assert_eq!(advanced.next_execution, due_at + Duration::hours(1));
        assert_eq!(advanced.last_execution, Some(due_at));

        let stats = scheduler.statistics();
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.completed_executions, 0);
        assert_eq!(stats.success_rate, 0.0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_escalation_runs_for_threshold_reports() {
        let dir = test_dir("escalate");
        let calls = Arc::new(AtomicUsize::new(0));
        let mut scheduler = scheduler_with(
            &dir,
            Box::new(ScriptedExecutor {
                report: critical_report(),
                calls,
            }),
        );

        let schedule = scheduler
            .create_schedule("agent-edr-03", Frequency::Hourly)
            .unwrap();
        let report = scheduler.poll_at(schedule.next_execution);

        assert_eq!(report.executed, 1);
        assert_eq!(report.results[0].escalation, Some(EscalationTier::Critical));
        assert_eq!(report.results[0].status, ExecutionStatus::Completed);

        // The pipeline stored the threat and its correlation record.
        assert_eq!(scheduler.pipeline().store().threats().len(), 1);
        assert_eq!(scheduler.pipeline().store().correlation_count(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_benign_report_skips_escalation() {
        let dir = test_dir("benign");
        let calls = Arc::new(AtomicUsize::new(0));
        let mut scheduler = scheduler_with(
            &dir,
            Box::new(ScriptedExecutor {
                report: benign_report(),
                calls,
            }),
        );

        let schedule = scheduler
            .create_schedule("agent-recon-01", Frequency::Hourly)
            .unwrap();
        let report = scheduler.poll_at(schedule.next_execution);

        assert_eq!(report.executed, 1);
        assert_eq!(report.results[0].escalation, None);
        assert_eq!(scheduler.pipeline().store().threats().len(), 0);
        // auto_correlate is off, so no correlation record either.
        assert_eq!(scheduler.pipeline().store().correlation_count(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = test_dir("reopen");
        {
            let calls = Arc::new(AtomicUsize::new(0));
            let mut scheduler = scheduler_with(
                &dir,
                Box::new(ScriptedExecutor {
                    report: benign_report(),
                    calls,
                }),
            );
            let schedule = scheduler
                .create_schedule("agent-recon-01", Frequency::Weekly)
                .unwrap();
            scheduler.poll_at(schedule.next_execution);
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = scheduler_with(
            &dir,
            Box::new(ScriptedExecutor {
                report: benign_report(),
                calls,
            }),
        );

        assert_eq!(scheduler.schedules().len(), 1);
        assert!(scheduler.schedules()[0].last_execution.is_some());
        let stats = scheduler.statistics();
        assert_eq!(stats.total_executions, 1);
        assert_eq!(stats.completed_executions, 1);
        assert_eq!(stats.success_rate, 100.0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_remove_schedule_keeps_history() {
        let dir = test_dir("remove");
        let calls = Arc::new(AtomicUsize::new(0));
        let mut scheduler = scheduler_with(
            &dir,
            Box::new(ScriptedExecutor {
                report: benign_report(),
                calls,
            }),
        );

        let schedule = scheduler
            .create_schedule("agent-recon-01", Frequency::Hourly)
            .unwrap();
        let id = schedule.id.clone();
        scheduler.poll_at(schedule.next_execution);
        scheduler.remove_schedule(&id).unwrap();

        assert!(scheduler.schedule(&id).is_none());
        assert_eq!(scheduler.statistics().total_executions, 1);
        assert!(scheduler.remove_schedule(&id).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_next_execution_always_after_last() {
        let dir = test_dir("invariant");
        let calls = Arc::new(AtomicUsize::new(0));
        let mut scheduler = scheduler_with(
            &dir,
            Box::new(ScriptedExecutor {
                report: benign_report(),
                calls,
            }),
        );

        let schedule = scheduler
            .create_schedule("agent-recon-01", Frequency::Every4Hours)
            .unwrap();
        let id = schedule.id.clone();

        let mut at = schedule.next_execution;
        for _ in 0..4 {
            scheduler.poll_at(at);
            let s = scheduler.schedule(&id).unwrap();
            assert!(s.next_execution > s.last_execution.unwrap());
            at = s.next_execution;
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
