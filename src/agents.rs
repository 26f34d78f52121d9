//! # Agent Execution Interface
//!
//! The pipeline consumes agent executions, it does not perform them.
//! Whatever sits behind this trait - a scanner, a canned stub, an LLM
//! call - is opaque to the core: it takes an agent id plus a config blob
//! and hands back a report with threat metrics, findings, and recommended
//! containment steps.

use crate::{AgentReport, ExecutionStatus, PipelineResult};

/// External agent execution service.
pub trait AgentExecutor: Send {
    /// Run one agent and return its report.
    ///
    /// An `Err` means the execution itself failed; the schedule poller
    /// records it as a failed execution and still advances the schedule.
    fn execute(&mut self, agent_id: &str, config: &serde_json::Value) -> PipelineResult<AgentReport>;
}

/// Placeholder executor for deployments where no execution service is
/// wired up yet. Every run completes with a benign, zero-confidence
/// report, so schedules keep cycling without triggering escalation.
pub struct StubExecutor;

impl AgentExecutor for StubExecutor {
    fn execute(&mut self, agent_id: &str, _config: &serde_json::Value) -> PipelineResult<AgentReport> {
        log::debug!("[AGENT] Stub execution for {}", agent_id);
        Ok(AgentReport {
            status: ExecutionStatus::Completed,
            threat_type: "none".to_string(),
            threat_level: 1,
            confidence: 0.0,
            analysis: format!("stub execution for {}", agent_id),
            findings: serde_json::Value::Null,
            recommendations: Vec::new(),
        })
    }
}
