//! # Alert Dispatcher
//!
//! Sends alerts through multiple channels when threats escalate.
//! Supports:
//! - JSONL file alerts (always active, one JSON object per line)
//! - Webhook notifications (optional, ureq HTTP POST with one retry)
//! - Email queue (optional, writes .eml files for external SMTP pickup)
//!
//! Alerting is best-effort by contract: with neither webhook nor email
//! configured a dispatch succeeds as a no-op, and an exhausted webhook
//! retry surfaces `DeliveryFailed` for the caller to log — it is never
//! fatal to the pipeline. The webhook call plus its single retry fit
//! inside the configured latency budget; email is fire-and-forget.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::{AlertsConfig, EscalationTier, GeneralConfig, PipelineError, PipelineResult};

/// What happened to one alert dispatch. `None` means the sink was not
/// configured.
#[derive(Debug, Clone)]
pub struct AlertReceipt {
    /// Whether the JSONL audit line was written.
    pub logged: bool,

    /// Webhook outcome, if a webhook URL is configured.
    pub webhook_delivered: Option<bool>,

    /// Email-queue outcome, if an alert email is configured.
    pub email_queued: Option<bool>,

    pub sent_at: DateTime<Utc>,
}

impl AlertReceipt {
    /// True if at least one configured sink accepted the alert.
    pub fn delivered(&self) -> bool {
        self.webhook_delivered == Some(true) || self.email_queued == Some(true)
    }
}

/// Dispatches alerts to the configured sinks.
pub struct AlertDispatcher {
    config: AlertsConfig,
    email_queue_dir: PathBuf,
    agent: ureq::Agent,
}

impl AlertDispatcher {
    /// Create a dispatcher from the alert and general config sections.
    ///
    /// The per-attempt HTTP timeout is half the configured budget so that
    /// the initial attempt plus the single retry stay inside it.
    pub fn new(config: &AlertsConfig, general: &GeneralConfig) -> Self {
        let per_attempt = Duration::from_secs((general.http_timeout_secs / 2).max(1));
        let agent = ureq::AgentBuilder::new().timeout(per_attempt).build();
        Self {
            config: config.clone(),
            email_queue_dir: general.data_dir.join("email_queue"),
            agent,
        }
    }

    /// Send an alert through every configured sink.
    ///
    /// # Arguments
    /// * `tier` - Escalation tier driving labels and log level.
    /// * `message` - Human-readable one-line summary.
    /// * `payload` - Structured alert context (threat id, execution id,
    ///   threat data), forwarded verbatim to the sinks.
    ///
    /// # Returns
    /// A receipt describing per-sink outcomes. `DeliveryFailed` is
    /// returned when a configured webhook stays undeliverable after the
    /// retry; callers treat that as a warning, not a pipeline failure.
    pub fn send_alert(
        &self,
        tier: EscalationTier,
        message: &str,
        payload: &serde_json::Value,
    ) -> PipelineResult<AlertReceipt> {
        let sent_at = Utc::now();
        let alert_obj = json!({
            "timestamp": sent_at.to_rfc3339(),
            "level": tier.as_str(),
            "message": message,
            "payload": payload,
            "channel": "threatflow",
        });

        let mut receipt = AlertReceipt {
            logged: false,
            webhook_delivered: None,
            email_queued: None,
            sent_at,
        };

        // Audit line first: it must exist even when every remote sink is
        // down or unconfigured.
        match self.log_alert(&alert_obj) {
            Ok(()) => receipt.logged = true,
            Err(e) => log::warn!("[ALERT] Failed to write alert log: {}", e),
        }

        log::warn!("[ALERT] {} | {} | {}", sent_at.to_rfc3339(), tier.label(), message);

        if let Some(ref email) = self.config.alert_email {
            match self.queue_email(email, tier, message, payload, sent_at) {
                Ok(()) => receipt.email_queued = Some(true),
                Err(e) => {
                    receipt.email_queued = Some(false);
                    log::warn!("[ALERT] Failed to queue email to {}: {}", email, e);
                }
            }
        }

        if let Some(ref url) = self.config.webhook_url {
            match self.post_webhook(url, &alert_obj) {
                Ok(()) => receipt.webhook_delivered = Some(true),
                Err(e) => {
                    receipt.webhook_delivered = Some(false);
                    log::warn!(
                        "[ALERT] DeliveryFailed: webhook {} undeliverable after retry \
                         (alert still logged locally): {}",
                        url,
                        e,
                    );
                    return Err(e);
                }
            }
        }

        Ok(receipt)
    }

    /// Append the alert as a JSON line to the alert audit log.
    fn log_alert(&self, alert_obj: &serde_json::Value) -> PipelineResult<()> {
        let path = &self.config.alert_log_path;
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", serde_json::to_string(alert_obj)?)?;
        file.flush()?;
        Ok(())
    }

    /// POST the alert JSON to the webhook, retrying once on transient
    /// failure (timeout or 5xx). Compatible with Slack, Discord,
    /// PagerDuty, and generic HTTP endpoints.
    fn post_webhook(&self, url: &str, alert_obj: &serde_json::Value) -> PipelineResult<()> {
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(PipelineError::Config(format!(
                "Webhook URL must start with http:// or https://, got: {}",
                url
            )));
        }

        let body = serde_json::to_string(alert_obj)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .agent
                .post(url)
                .set("Content-Type", "application/json")
                .send_string(&body)
            {
                Ok(response) => {
                    log::info!(
                        "[ALERT] Webhook POST to {} succeeded (status {}, attempt {})",
                        url,
                        response.status(),
                        attempt,
                    );
                    return Ok(());
                }
                Err(e) if attempt == 1 && is_transient(&e) => {
                    log::warn!("[ALERT] Webhook POST to {} failed transiently, retrying: {}", url, e);
                }
                Err(e) => {
                    return Err(PipelineError::DeliveryFailed(format!(
                        "webhook {} after {} attempt(s): {}",
                        url, attempt, e
                    )));
                }
            }
        }
    }

    /// Queue an email alert by writing a .eml file.
    ///
    /// Emails are written to `{data_dir}/email_queue/` as .eml files for a
    /// separate process (cron, systemd timer, or sendmail pickup) to
    /// deliver via SMTP. Fire-and-forget: no retry.
    fn queue_email(
        &self,
        email: &str,
        tier: EscalationTier,
        message: &str,
        payload: &serde_json::Value,
        sent_at: DateTime<Utc>,
    ) -> PipelineResult<()> {
        let subject = format!("[{}] Security alert from threatflow", tier.label());
        let timestamp_rfc2822 = sent_at.format("%a, %d %b %Y %H:%M:%S +0000").to_string();
        let hostname = hostname_string();

        let body = format!(
            "threatflow Security Alert\n\
             =========================\n\
             \n\
             Timestamp: {}\n\
             Hostname:  {}\n\
             Level:     {}\n\
             \n\
             {}\n\
             \n\
             Details:\n{}\n\
             \n\
             ---\n\
             This is an automated alert from threatflow.\n",
            sent_at.to_rfc3339(),
            hostname,
            tier.label(),
            message,
            serde_json::to_string_pretty(payload)?,
        );

        let from_addr = format!("threatflow@{}", hostname);
        let eml_content = format!(
            "From: threatflow <{}>\r\n\
             To: {}\r\n\
             Subject: {}\r\n\
             Date: {}\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             X-Threatflow-Level: {}\r\n\
             \r\n\
             {}",
            from_addr, email, subject, timestamp_rfc2822, tier.label(), body,
        );

        if !self.email_queue_dir.exists() {
            std::fs::create_dir_all(&self.email_queue_dir)?;
        }

        let filename = format!(
            "threatflow_{}_{}.eml",
            sent_at.format("%Y%m%d_%H%M%S%3f"),
            tier.as_str(),
        );
        let eml_path = self.email_queue_dir.join(&filename);

        let mut file = std::fs::File::create(&eml_path)?;
        file.write_all(eml_content.as_bytes())?;
        file.flush()?;

        log::info!("[ALERT] Queued {} alert email to {} at {:?}", tier.label(), email, eml_path);
        Ok(())
    }
}

/// Timeouts and other transport-level failures are retryable, as are 5xx
/// responses; 4xx means the payload or endpoint is wrong and a retry
/// cannot help.
fn is_transient(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Status(code, _) => *code >= 500,
        ureq::Error::Transport(_) => true,
    }
}

/// Get the system hostname, falling back to "unknown" on error.
fn hostname_string() -> String {
    if cfg!(target_os = "windows") {
        std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".to_string())
    } else {
        std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or_else(|_| "unknown".to_string())
    }
}
