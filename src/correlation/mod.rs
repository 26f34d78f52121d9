//! # Correlation Store
//!
//! Append-only persistence for threat records and agent/threat-intel
//! correlation records, plus the correlation scoring heuristic.
//!
//! Records are written as JSONL (one JSON object per line) under the data
//! directory: `threats.jsonl` and `correlations.jsonl`. The files double
//! as the durable log and the startup source for the in-memory index, and
//! are easy to inspect with standard tools (jq, grep, etc.).
//!
//! The store is the sole writer of both record types. A write failure
//! surfaces as `Storage` and is expected to be logged-and-survived by the
//! caller; it must never fail an agent execution.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    CorrelationRecord, EscalationTier, PipelineError, PipelineResult, ThreatRecord,
};
use crate::escalation::classifier;

/// Compute the 0-100 correlation score between agent findings and a
/// threat-intel indicator list.
///
/// `score = 100 * (indicators found as substrings of the JSON-encoded
/// findings) / max(1, total indicators)`, clamped to [0, 100] and rounded
/// to two decimals. An empty indicator list scores 0.
///
/// This is a deliberately simple containment heuristic, not a real
/// correlation algorithm; treat the output as approximate.
pub fn correlation_score(findings: &serde_json::Value, indicators: &[String]) -> f64 {
    if indicators.is_empty() {
        return 0.0;
    }

    let haystack = findings.to_string();
    let matches = indicators
        .iter()
        .filter(|indicator| !indicator.is_empty() && haystack.contains(indicator.as_str()))
        .count();

    let score = (matches as f64 / indicators.len().max(1) as f64) * 100.0;
    (score.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

/// Per-tier threat counts plus average confidence across all threats.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreatStatistics {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub info: u64,
    pub total_threats: u64,
    pub avg_confidence: f64,
}

/// Append-only store for threat and correlation records.
pub struct CorrelationStore {
    threats_path: PathBuf,
    correlations_path: PathBuf,
    threats: Vec<ThreatRecord>,
    correlations: Vec<CorrelationRecord>,
}

impl CorrelationStore {
    /// Open the store under the given data directory, loading any records
    /// persisted by earlier runs.
    pub fn open(data_dir: &Path) -> PipelineResult<Self> {
        let threats_path = data_dir.join("threats.jsonl");
        let correlations_path = data_dir.join("correlations.jsonl");

        let threats = load_jsonl(&threats_path)?;
        let correlations = load_jsonl(&correlations_path)?;

        Ok(Self {
            threats_path,
            correlations_path,
            threats,
            correlations,
        })
    }

    /// Append a threat record to the store.
    pub fn insert_threat(&mut self, record: &ThreatRecord) -> PipelineResult<()> {
        append_jsonl(&self.threats_path, record)?;
        self.threats.push(record.clone());
        Ok(())
    }

    /// Create and persist the correlation record for one correlation
    /// event.
    ///
    /// The severity tier is copied into the record at creation time, and
    /// the indicator list is snapshotted alongside the score, so the
    /// record stays meaningful even if thresholds or the feed change.
    pub fn record(
        &mut self,
        agent_id: &str,
        execution_id: i64,
        severity: EscalationTier,
        findings: &serde_json::Value,
        indicators: &[String],
        created_at: DateTime<Utc>,
    ) -> PipelineResult<CorrelationRecord> {
        let score = correlation_score(findings, indicators);
        let record = CorrelationRecord {
            agent_id: agent_id.to_string(),
            execution_id,
            correlation_score: score,
            severity,
            threat_intel: serde_json::json!({ "indicators": indicators }),
            created_at,
        };

        append_jsonl(&self.correlations_path, &record)?;
        self.correlations.push(record.clone());

        log::info!(
            "[CORRELATE] agent={} execution={} severity={} score={:.2}",
            record.agent_id,
            record.execution_id,
            record.severity,
            record.correlation_score,
        );

        Ok(record)
    }

    /// Correlation history for one agent, newest first.
    ///
    /// The returned iterator is lazy and restartable; call again for a
    /// fresh pass. No ordering is promised across different agents.
    pub fn history<'a>(
        &'a self,
        agent_id: &'a str,
        limit: usize,
    ) -> impl Iterator<Item = &'a CorrelationRecord> + 'a {
        self.correlations
            .iter()
            .rev()
            .filter(move |record| record.agent_id == agent_id)
            .take(limit)
    }

    /// Threat counts per escalation tier plus average confidence.
    ///
    /// Tiers are recomputed from the stored metrics rather than cached,
    /// so the counts always reflect the current classifier table.
    pub fn statistics(&self) -> ThreatStatistics {
        let mut stats = ThreatStatistics::default();
        let mut confidence_sum = 0.0;

        for threat in &self.threats {
            let tier = classifier::classify(threat.threat_level, threat.confidence)
                .unwrap_or(EscalationTier::Info);
            match tier {
                EscalationTier::Critical => stats.critical += 1,
                EscalationTier::High => stats.high += 1,
                EscalationTier::Medium => stats.medium += 1,
                EscalationTier::Low => stats.low += 1,
                EscalationTier::Info => stats.info += 1,
            }
            confidence_sum += threat.confidence;
        }

        stats.total_threats = self.threats.len() as u64;
        if !self.threats.is_empty() {
            stats.avg_confidence =
                (confidence_sum / self.threats.len() as f64 * 100.0).round() / 100.0;
        }
        stats
    }

    /// All stored threat records, oldest first.
    pub fn threats(&self) -> &[ThreatRecord] {
        &self.threats
    }

    /// Total number of correlation records.
    pub fn correlation_count(&self) -> usize {
        self.correlations.len()
    }
}

/// Append one record as a JSON line, creating the file and parent
/// directories if needed. Failures map to `Storage`.
pub(crate) fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> PipelineResult<()> {
    let line = serde_json::to_string(record)
        .map_err(|e| PipelineError::Storage(format!("{}: {}", path.display(), e)))?;

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| PipelineError::Storage(format!("{}: {}", parent.display(), e)))?;
        }
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| PipelineError::Storage(format!("{}: {}", path.display(), e)))?;
    writeln!(file, "{}", line)
        .map_err(|e| PipelineError::Storage(format!("{}: {}", path.display(), e)))?;
    file.flush()
        .map_err(|e| PipelineError::Storage(format!("{}: {}", path.display(), e)))?;
    Ok(())
}

/// Load every parseable record from a JSONL file. A missing file is an
/// empty store; a corrupt line is skipped with a warning rather than
/// poisoning the whole log.
pub(crate) fn load_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> PipelineResult<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| PipelineError::Storage(format!("{}: {}", path.display(), e)))?;

    let mut records = Vec::new();
    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                log::warn!(
                    "[CORRELATE] Skipping corrupt line {} in {}: {}",
                    number + 1,
                    path.display(),
                    e
                );
            }
        }
    }
    Ok(records)
}
