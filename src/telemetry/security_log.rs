//! Security audit logging for the payment gate.
//!
//! SECURITY: every guard trip, identity change, and denial lands here as a
//! structured tracing event on the `security_audit` target, so denied and
//! suspicious commands can be reconstructed after the fact.

use tracing::{debug, error, info, warn};

/// Security event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    /// Rate limiting triggered.
    RateLimited,
    /// Duplicate command hash inside the replay window.
    ReplayDetected,
    /// Command arrived from a fingerprint with no enrollment.
    UnknownDevice,
    /// Voice template enrolled or extended.
    VoiceEnrolled,
    /// Voice sample accepted.
    VoiceVerified,
    /// Voice sample rejected or comparator failure.
    VoiceVerifyFailed,
    /// Assessment denied a command.
    DecisionDenied,
    /// Parse confidence fell below the floor.
    LowConfidenceParse,
    /// Security configuration changed at runtime.
    ConfigUpdated,
    /// Lockdown posture activated.
    LockdownActivated,
    /// Rate and replay state flushed.
    GuardsReset,
    /// At-rest encryption or decryption failure.
    EncryptionFailure,
}

impl SecurityEvent {
    /// Severity this event is reported at.
    pub fn severity(&self) -> SecuritySeverity {
        match self {
            Self::RateLimited => SecuritySeverity::Warning,
            Self::ReplayDetected => SecuritySeverity::Critical,
            Self::UnknownDevice => SecuritySeverity::Warning,
            Self::VoiceEnrolled => SecuritySeverity::Info,
            Self::VoiceVerified => SecuritySeverity::Debug,
            Self::VoiceVerifyFailed => SecuritySeverity::Warning,
            Self::DecisionDenied => SecuritySeverity::Warning,
            Self::LowConfidenceParse => SecuritySeverity::Info,
            Self::ConfigUpdated => SecuritySeverity::Info,
            Self::LockdownActivated => SecuritySeverity::Critical,
            Self::GuardsReset => SecuritySeverity::Info,
            Self::EncryptionFailure => SecuritySeverity::Error,
        }
    }

    /// Stable label carried on the `event` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::ReplayDetected => "replay_detected",
            Self::UnknownDevice => "unknown_device",
            Self::VoiceEnrolled => "voice_enrolled",
            Self::VoiceVerified => "voice_verified",
            Self::VoiceVerifyFailed => "voice_verify_failed",
            Self::DecisionDenied => "decision_denied",
            Self::LowConfidenceParse => "low_confidence_parse",
            Self::ConfigUpdated => "config_updated",
            Self::LockdownActivated => "lockdown_activated",
            Self::GuardsReset => "guards_reset",
            Self::EncryptionFailure => "encryption_failure",
        }
    }
}

/// Severity levels for security events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecuritySeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl SecuritySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Log a security event with structured data.
///
/// The detail pairs are flattened into a single `detail` field; the event
/// label and severity ride alongside, and timestamps come from the
/// subscriber.
///
/// # Example
/// ```
/// use echopay_core::telemetry::{log_security_event, SecurityEvent};
///
/// log_security_event(
///     SecurityEvent::RateLimited,
///     "Command quota exhausted",
///     &[("user", "user-77"), ("scope", "user")],
/// );
/// ```
pub fn log_security_event(event: SecurityEvent, message: &str, details: &[(&str, &str)]) {
    let detail = details
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ");
    let label = event.as_str();
    let severity = event.severity();

    match severity {
        SecuritySeverity::Debug => debug!(
            target: "security_audit",
            event = label,
            severity = severity.as_str(),
            detail = %detail,
            "{message}"
        ),
        SecuritySeverity::Info => info!(
            target: "security_audit",
            event = label,
            severity = severity.as_str(),
            detail = %detail,
            "{message}"
        ),
        SecuritySeverity::Warning => warn!(
            target: "security_audit",
            event = label,
            severity = severity.as_str(),
            detail = %detail,
            "{message}"
        ),
        SecuritySeverity::Error => error!(
            target: "security_audit",
            event = label,
            severity = severity.as_str(),
            detail = %detail,
            "{message}"
        ),
        SecuritySeverity::Critical => error!(
            target: "security_audit",
            event = label,
            severity = severity.as_str(),
            detail = %detail,
            "🚨 {message}"
        ),
    }
}
