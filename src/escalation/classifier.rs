//! # Severity Classifier
//!
//! Maps an agent-reported (threat level, confidence) pair onto one of the
//! five escalation tiers. This is a pure, total function over the valid
//! input domain; out-of-range inputs are rejected, never clamped.
//!
//! ## Thresholds
//!
//! Evaluated highest to lowest, first match wins:
//!
//! | Tier     | Condition                              |
//! |----------|----------------------------------------|
//! | critical | level >= 4 and confidence >= 0.8       |
//! | high     | level >= 3 and confidence >= 0.7       |
//! | medium   | level >= 2 and confidence >= 0.6       |
//! | low      | level >= 1 and confidence >= 0.5       |
//! | info     | otherwise                              |
//!
//! Raising either input while holding the other fixed never lowers the
//! resulting tier.

use crate::{validate_threat_inputs, EscalationTier, PipelineResult};

/// Classify a threat into an escalation tier.
///
/// # Arguments
/// * `threat_level` - Reported severity, 1-5.
/// * `confidence` - Reporter confidence, 0.0-1.0.
///
/// # Returns
/// The escalation tier, or `InvalidArgument` for out-of-range input.
pub fn classify(threat_level: i32, confidence: f64) -> PipelineResult<EscalationTier> {
    validate_threat_inputs(threat_level, confidence)?;

    let tier = if threat_level >= 4 && confidence >= 0.8 {
        EscalationTier::Critical
    } else if threat_level >= 3 && confidence >= 0.7 {
        EscalationTier::High
    } else if threat_level >= 2 && confidence >= 0.6 {
        EscalationTier::Medium
    } else if threat_level >= 1 && confidence >= 0.5 {
        EscalationTier::Low
    } else {
        EscalationTier::Info
    };

    Ok(tier)
}
