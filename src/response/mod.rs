//! # Response Subsystems
//!
//! Side effects triggered by the escalation pipeline:
//! - Alert delivery (JSONL audit log, webhook POST, email queue)
//! - Automated containment (block/quarantine/isolate/throttle)
//!
//! Both subsystems are best-effort from the pipeline's point of view: a
//! delivery or containment failure is logged and reported back, never
//! allowed to take the pipeline down. Containment additionally requires
//! the active integration mode; the pipeline checks the mode before
//! calling into this module at all.

pub mod alerter;
pub mod containment;
