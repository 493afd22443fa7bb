//! Telemetry module for the payment gate.
//!
//! Provides structured logging, assessment tracing, and Prometheus metrics.
//! All output is file-based or scrape-on-demand - no network dependencies.

mod logging;
mod metrics;
pub mod security_log;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_assessment_duration, record_decision, record_denial, record_low_confidence_parse,
    record_parse, record_voice_verification, render, set_rate_windows, set_replay_cache_entries,
};
pub use security_log::{log_security_event, SecurityEvent, SecuritySeverity};
pub use spans::{AssessmentSpan, SpanExt};
