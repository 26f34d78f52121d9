//! # Containment Executor
//!
//! Executes automated defensive actions recommended by agents:
//! block-ip, quarantine, isolate, throttle. DEFENSE ONLY - contain and
//! log, never retaliate.
//!
//! The executor is only ever reached when the integration mode is active;
//! the escalation pipeline enforces that gate before calling in. Every
//! action is idempotent: re-executing an already-applied (action, target)
//! pair is a no-op success. A failed action is logged and does not abort
//! the remaining actions in the same recommendation list.
//!
//! ## Platform Support (block_ip)
//! - **Linux**: iptables rules with comment tagging
//! - **Windows**: netsh advfirewall rules with a THREATFLOW prefix
//!
//! ## Safety
//! - Never blocks private/loopback addresses (127.0.0.1, 10.x,
//!   172.16-31.x, 192.168.x)
//! - Targets are parsed into `std::net::IpAddr` before any shell
//!   execution (no injection)

use std::collections::HashSet;
use std::net::IpAddr;
use std::process::Command;

use crate::{ActionKind, PipelineError, PipelineResult, Recommendation};

/// The rule tag/comment used to identify threatflow firewall rules.
const RULE_TAG: &str = "THREATFLOW-BLOCK";

/// Seam between the executor and whatever actually applies an action.
///
/// Production uses [`FirewallBackend`]; tests substitute a spy to verify
/// the passive-mode invariant (zero calls) and failure aggregation.
pub trait ContainmentBackend: Send {
    /// Apply one action against a target. Returns whether the action took
    /// effect.
    fn apply(&mut self, action: ActionKind, target: &str) -> PipelineResult<bool>;
}

/// Outcome of one recommended action.
#[derive(Debug, Clone)]
pub struct ContainmentOutcome {
    pub action: String,
    pub target: String,
    pub applied: bool,
    /// Failure detail, when the action did not apply.
    pub detail: Option<String>,
}

/// Aggregate result of running one recommendation list.
#[derive(Debug, Clone, Default)]
pub struct ContainmentReport {
    pub outcomes: Vec<ContainmentOutcome>,
}

impl ContainmentReport {
    pub fn applied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.applied).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.applied).count()
    }
}

/// Idempotent action executor over a pluggable backend.
pub struct ContainmentExecutor {
    backend: Box<dyn ContainmentBackend>,
    applied: HashSet<(ActionKind, String)>,
}

impl ContainmentExecutor {
    pub fn new(backend: Box<dyn ContainmentBackend>) -> Self {
        Self {
            backend,
            applied: HashSet::new(),
        }
    }

    /// Execute a single containment action.
    ///
    /// Safe to invoke multiple times with the same target: an action this
    /// executor already applied is a no-op success, not an error.
    pub fn execute(&mut self, action: ActionKind, target: &str) -> PipelineResult<bool> {
        let key = (action, target.to_string());
        if self.applied.contains(&key) {
            log::info!("[CONTAIN] {} already applied to {}, skipping duplicate", action, target);
            return Ok(true);
        }

        let applied = self.backend.apply(action, target)?;
        if applied {
            self.applied.insert(key);
        }
        Ok(applied)
    }

    /// Run every action in a recommendation list, continuing past
    /// failures and unknown action names.
    ///
    /// An unknown action aborts only that one entry (recorded as
    /// `UnsupportedAction` in its outcome detail); a failed action is
    /// logged and the remaining entries still run.
    pub fn run_recommendations(&mut self, recommendations: &[Recommendation]) -> ContainmentReport {
        let mut report = ContainmentReport::default();

        for rec in recommendations {
            let outcome = match rec.action.parse::<ActionKind>() {
                Ok(kind) => match self.execute(kind, &rec.target) {
                    Ok(applied) => ContainmentOutcome {
                        action: rec.action.clone(),
                        target: rec.target.clone(),
                        applied,
                        detail: None,
                    },
                    Err(e) => {
                        log::error!("[CONTAIN] {} against {} failed: {}", rec.action, rec.target, e);
                        ContainmentOutcome {
                            action: rec.action.clone(),
                            target: rec.target.clone(),
                            applied: false,
                            detail: Some(e.to_string()),
                        }
                    }
                },
                Err(e) => {
                    log::warn!("[CONTAIN] Unknown containment action: {}", rec.action);
                    ContainmentOutcome {
                        action: rec.action.clone(),
                        target: rec.target.clone(),
                        applied: false,
                        detail: Some(e.to_string()),
                    }
                }
            };
            report.outcomes.push(outcome);
        }

        report
    }

    /// Number of distinct (action, target) pairs applied so far.
    pub fn applied_len(&self) -> usize {
        self.applied.len()
    }
}

/// Production backend: block-ip goes to the system firewall; the
/// remaining action kinds are logged as applied operations for the
/// surrounding infrastructure to pick up.
pub struct FirewallBackend;

impl ContainmentBackend for FirewallBackend {
    fn apply(&mut self, action: ActionKind, target: &str) -> PipelineResult<bool> {
        match action {
            ActionKind::BlockIp => block_ip(target),
            ActionKind::Quarantine => {
                log::info!("[CONTAIN] Quarantined target: {}", target);
                Ok(true)
            }
            ActionKind::Isolate => {
                log::info!("[CONTAIN] Isolated target from network: {}", target);
                Ok(true)
            }
            ActionKind::Throttle => {
                log::info!("[CONTAIN] Throttled connections to: {}", target);
                Ok(true)
            }
        }
    }
}

/// Check if an IP address is in a private/reserved range.
///
/// We never block private addresses to prevent accidental lockout of
/// internal services or the administrator's own connection.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()             // 127.0.0.0/8
                || v4.is_private()        // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
                || v4.is_link_local()     // 169.254.0.0/16
                || v4.is_broadcast()      // 255.255.255.255
                || v4.is_unspecified()    // 0.0.0.0
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// Block an IP address via the system firewall.
///
/// The target string must parse as an IP address; `IpAddr::to_string()`
/// only produces valid IP notation, so no shell metacharacters can reach
/// the firewall command.
fn block_ip(target: &str) -> PipelineResult<bool> {
    let ip: IpAddr = target.parse().map_err(|_| {
        PipelineError::InvalidArgument(format!("block_ip target is not an IP address: {}", target))
    })?;

    if is_private_ip(&ip) {
        return Err(PipelineError::Containment(format!(
            "Refusing to block private/reserved IP: {}",
            ip
        )));
    }

    let ip_str = ip.to_string();

    if cfg!(target_os = "linux") {
        let output = Command::new("iptables")
            .args([
                "-A", "INPUT",
                "-s", &ip_str,
                "-j", "DROP",
                "-m", "comment", "--comment", RULE_TAG,
            ])
            .output()
            .map_err(|e| PipelineError::Containment(format!("Failed to execute iptables: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Containment(format!(
                "iptables block failed for {}: {}",
                ip_str, stderr
            )));
        }

        log::info!("[CONTAIN] Blocked IP via iptables: {} (tag: {})", ip_str, RULE_TAG);
    } else if cfg!(target_os = "windows") {
        let name = format!("{}-{}", RULE_TAG, ip_str);
        let output = Command::new("netsh")
            .args([
                "advfirewall", "firewall", "add", "rule",
                &format!("name={}", name),
                "dir=in",
                "action=block",
                &format!("remoteip={}", ip_str),
            ])
            .output()
            .map_err(|e| PipelineError::Containment(format!("Failed to execute netsh: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Containment(format!(
                "netsh block failed for {}: {}",
                ip_str, stderr
            )));
        }

        log::info!("[CONTAIN] Blocked IP via netsh: {} (rule: {})", ip_str, name);
    } else {
        log::warn!("[CONTAIN] Unsupported platform - block not executed for {}", ip_str);
        return Err(PipelineError::Containment(
            "IP blocking not supported on this platform".to_string(),
        ));
    }

    Ok(true)
}
