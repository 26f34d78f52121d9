//! # threatflow - Core Library
//!
//! Threat escalation and correlation pipeline daemon.
//!
//! threatflow takes raw findings from recurring security-agent executions,
//! classifies each into one of five escalation tiers, persists an
//! append-only correlation trail against known threat-intelligence
//! indicators, and fires the side effects the tier calls for: alerting,
//! automated containment, and logging.
//!
//! ## Design Philosophy
//! - **Escalate, correlate, never stall.** A failed alert, a failed store
//!   write, or a hung upstream must never take the pipeline down.
//! - Containment is opt-in: in passive mode recommended actions are logged
//!   and nothing touches the firewall.
//! - Records are append-only. Updates are new records.

pub mod agents;
pub mod correlation;
pub mod escalation;
pub mod intel;
pub mod response;
pub mod schedule;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for threatflow.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Alert delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Unsupported containment action: {0}")]
    UnsupportedAction(String),

    #[error("Upstream call failed or exceeded budget: {0}")]
    UpstreamTimeout(String),

    #[error("Containment action failed: {0}")]
    Containment(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Top-level configuration for threatflow.
///
/// Loaded from `threatflow.toml` in the working directory or a path
/// supplied via CLI flag. A handful of environment variables override
/// file values after load; see [`PipelineConfig::apply_env_overrides`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// General daemon settings.
    pub general: GeneralConfig,

    /// Escalation gate settings.
    pub escalation: EscalationConfig,

    /// Alert sink settings.
    pub alerts: AlertsConfig,

    /// Containment settings.
    pub containment: ContainmentConfig,

    /// Threat intelligence feed settings.
    pub intel: IntelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Path where threatflow persists its state (record logs, schedules).
    pub data_dir: PathBuf,

    /// How often (in seconds) the daemon loop runs a schedule poll pass.
    pub poll_interval_secs: u64,

    /// Latency budget in seconds for any single outbound network call
    /// (webhook delivery including its retry, intel fetch).
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Minimum threat level (1-5) an agent report must carry before the
    /// escalation pipeline runs for it.
    pub threat_threshold: i32,

    /// Whether to record a correlation entry for every agent execution,
    /// even those below the threat threshold.
    pub auto_correlate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Optional webhook URL for real-time alerts.
    pub webhook_url: Option<String>,

    /// Optional email address for alert notifications.
    pub alert_email: Option<String>,

    /// Path to the alert audit log file (JSONL, always written).
    pub alert_log_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainmentConfig {
    /// Passive mode logs recommended actions only; active mode executes
    /// them. Containment side effects require active mode, always.
    pub integration_mode: IntegrationMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelConfig {
    /// Optional URL of a threat-intelligence feed returning an indicator
    /// list. Unset means correlation runs against an empty list.
    pub feed_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig {
                data_dir: PathBuf::from("./threatflow-data"),
                poll_interval_secs: 60,
                http_timeout_secs: 10,
            },
            escalation: EscalationConfig {
                threat_threshold: 3,
                auto_correlate: false,
            },
            alerts: AlertsConfig {
                webhook_url: None,
                alert_email: None,
                alert_log_path: PathBuf::from("./threatflow-data/alerts.jsonl"),
            },
            containment: ContainmentConfig {
                integration_mode: IntegrationMode::Passive,
            },
            intel: IntelConfig { feed_url: None },
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default configuration to a TOML file.
    pub fn write_default(path: &std::path::Path) -> PipelineResult<()> {
        let config = Self::default();
        let content =
            toml::to_string_pretty(&config).map_err(|e| PipelineError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply recognized environment-variable overrides on top of the
    /// loaded file values.
    ///
    /// Recognized: `INTEGRATION_MODE`, `AUTO_CORRELATE`, `THREAT_THRESHOLD`,
    /// `WEBHOOK_URL` (alias `SECURITY_WEBHOOK_URL`), `ALERT_EMAIL`
    /// (alias `SECURITY_ALERT_EMAIL`).
    pub fn apply_env_overrides(&mut self) -> PipelineResult<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Override application with an explicit lookup, so tests can supply
    /// values without mutating process environment.
    pub fn apply_overrides_from(
        &mut self,
        get: impl Fn(&str) -> Option<String>,
    ) -> PipelineResult<()> {
        if let Some(mode) = get("INTEGRATION_MODE") {
            self.containment.integration_mode = mode.parse()?;
        }
        if let Some(auto) = get("AUTO_CORRELATE") {
            self.escalation.auto_correlate = parse_bool(&auto)
                .ok_or_else(|| PipelineError::Config(format!("Invalid AUTO_CORRELATE: {}", auto)))?;
        }
        if let Some(threshold) = get("THREAT_THRESHOLD") {
            self.escalation.threat_threshold = threshold.parse().map_err(|_| {
                PipelineError::Config(format!("Invalid THREAT_THRESHOLD: {}", threshold))
            })?;
        }
        if let Some(url) = get("WEBHOOK_URL").or_else(|| get("SECURITY_WEBHOOK_URL")) {
            self.alerts.webhook_url = Some(url);
        }
        if let Some(email) = get("ALERT_EMAIL").or_else(|| get("SECURITY_ALERT_EMAIL")) {
            self.alerts.alert_email = Some(email);
        }
        self.validate()
    }

    /// Check cross-field invariants after load/override.
    pub fn validate(&self) -> PipelineResult<()> {
        if !(1..=5).contains(&self.escalation.threat_threshold) {
            return Err(PipelineError::Config(format!(
                "threat_threshold must be in 1..=5, got {}",
                self.escalation.threat_threshold
            )));
        }
        if self.general.http_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "http_timeout_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Passive mode logs recommended containment actions only; active mode
/// executes them against the firewall backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationMode {
    Passive,
    Active,
}

impl FromStr for IntegrationMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "passive" => Ok(IntegrationMode::Passive),
            "active" => Ok(IntegrationMode::Active),
            other => Err(PipelineError::Config(format!(
                "Integration mode must be 'passive' or 'active', got: {}",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Core Types
// ---------------------------------------------------------------------------

/// One of five escalation buckets derived from threat level and confidence.
///
/// Ordering is by severity (`Info < Low < Medium < High < Critical`), so
/// tiers compare directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationTier {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl EscalationTier {
    /// Upper-case display label for log lines and alert subjects.
    pub fn label(&self) -> &'static str {
        match self {
            EscalationTier::Critical => "CRITICAL",
            EscalationTier::High => "HIGH",
            EscalationTier::Medium => "MEDIUM",
            EscalationTier::Low => "LOW",
            EscalationTier::Info => "INFO",
        }
    }

    /// Lower-case wire name, as stored in records.
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationTier::Critical => "critical",
            EscalationTier::High => "high",
            EscalationTier::Medium => "medium",
            EscalationTier::Low => "low",
            EscalationTier::Info => "info",
        }
    }
}

impl fmt::Display for EscalationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recommended containment step attached to a threat, as reported by an
/// agent: what to do and against which target identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: String,
    pub target: String,
}

/// Automated defensive actions the containment executor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    BlockIp,
    Quarantine,
    Isolate,
    Throttle,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::BlockIp => "block_ip",
            ActionKind::Quarantine => "quarantine",
            ActionKind::Isolate => "isolate",
            ActionKind::Throttle => "throttle",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block_ip" => Ok(ActionKind::BlockIp),
            "quarantine" => Ok(ActionKind::Quarantine),
            "isolate" => Ok(ActionKind::Isolate),
            "throttle" => Ok(ActionKind::Throttle),
            other => Err(PipelineError::UnsupportedAction(other.to_string())),
        }
    }
}

/// Represents one detected/reported threat. Immutable after creation;
/// updates append new records rather than mutating existing ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatRecord {
    /// Opaque identifier, assigned at creation.
    pub id: String,

    /// The external execution that produced this threat.
    pub source_execution_id: i64,

    /// The agent whose execution reported this threat.
    pub agent_id: String,

    /// Free-form category, e.g. "sql_injection".
    pub threat_type: String,

    /// Severity reported by the agent, 1-5.
    pub threat_level: i32,

    /// Reporter confidence, 0.0-1.0.
    pub confidence: f64,

    /// Human-readable analysis text accompanying the finding.
    pub analysis: String,

    /// Recommended containment steps, in the order the agent proposed them.
    pub recommendations: Vec<Recommendation>,

    /// When this record was created. Set once.
    pub created_at: DateTime<Utc>,
}

impl ThreatRecord {
    /// Build a validated record from an agent report.
    ///
    /// Out-of-range `threat_level` or `confidence` is rejected with
    /// `InvalidArgument` rather than clamped.
    pub fn from_report(
        id: String,
        report: &AgentReport,
        execution_id: i64,
        agent_id: &str,
        created_at: DateTime<Utc>,
    ) -> PipelineResult<Self> {
        validate_threat_inputs(report.threat_level, report.confidence)?;
        Ok(Self {
            id,
            source_execution_id: execution_id,
            agent_id: agent_id.to_string(),
            threat_type: report.threat_type.clone(),
            threat_level: report.threat_level,
            confidence: report.confidence,
            analysis: report.analysis.clone(),
            recommendations: report.recommendations.clone(),
            created_at,
        })
    }
}

/// Reject threat metrics outside their documented ranges.
pub fn validate_threat_inputs(threat_level: i32, confidence: f64) -> PipelineResult<()> {
    if !(1..=5).contains(&threat_level) {
        return Err(PipelineError::InvalidArgument(format!(
            "threat_level must be in 1..=5, got {}",
            threat_level
        )));
    }
    if confidence.is_nan() || !(0.0..=1.0).contains(&confidence) {
        return Err(PipelineError::InvalidArgument(format!(
            "confidence must be in 0.0..=1.0, got {}",
            confidence
        )));
    }
    Ok(())
}

/// Links one agent execution to the threat intelligence it was correlated
/// against. Created once per correlation event and never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub agent_id: String,
    pub execution_id: i64,

    /// 0-100 heuristic score; see `correlation::correlation_score`.
    pub correlation_score: f64,

    /// Escalation tier at correlation time, preserved for historical
    /// fidelity even if classification thresholds later change.
    pub severity: EscalationTier,

    /// Snapshot of the indicator list the score was computed against.
    pub threat_intel: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

/// Result of one agent execution, as handed to the pipeline by the
/// external execution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    pub status: ExecutionStatus,
    pub threat_type: String,
    pub threat_level: i32,
    pub confidence: f64,
    pub analysis: String,

    /// Opaque findings blob; correlated against intel indicators by
    /// substring containment over its JSON encoding.
    pub findings: serde_json::Value,

    pub recommendations: Vec<Recommendation>,
}

/// Terminal status of an agent execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

/// How often a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[serde(rename = "every_30_minutes")]
    Every30Minutes,
    #[serde(rename = "every_4_hours")]
    Every4Hours,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// Compute the next execution time from a firing timestamp.
    ///
    /// This is a pure function of the frequency and the given instant, so
    /// repeated firings never accumulate drift. `Monthly` advances by one
    /// calendar month, not a fixed day count.
    pub fn next_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Frequency::Every30Minutes => now + Duration::minutes(30),
            Frequency::Every4Hours => now + Duration::hours(4),
            Frequency::Hourly => now + Duration::hours(1),
            Frequency::Daily => now + Duration::days(1),
            Frequency::Weekly => now + Duration::days(7),
            Frequency::Monthly => now
                .checked_add_months(Months::new(1))
                .unwrap_or_else(|| now + Duration::days(30)),
        }
    }
}

impl FromStr for Frequency {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "every_30_minutes" => Ok(Frequency::Every30Minutes),
            "every_4_hours" => Ok(Frequency::Every4Hours),
            "hourly" => Ok(Frequency::Hourly),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(PipelineError::InvalidArgument(format!(
                "Invalid frequency: {}",
                other
            ))),
        }
    }
}

/// A recurring directive to execute an agent.
///
/// Timestamps are mutated only by the schedule poller after a firing;
/// `is_active` and `frequency` are operator-mutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub agent_id: String,
    pub frequency: Frequency,
    pub is_active: bool,
    pub last_execution: Option<DateTime<Utc>>,
    pub next_execution: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
