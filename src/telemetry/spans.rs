//! Span utilities and extension traits for pipeline tracing.
//!
//! Provides standardized span creation and result recording.

use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for creating standardized assessment spans.
pub struct AssessmentSpan;

impl AssessmentSpan {
    /// Create a new assessment span with standard fields.
    ///
    /// Fields included:
    /// - `assessment_id`: Unique identifier for the assessment
    /// - `user_id`: Speaker the command is attributed to
    /// - `command_kind`: To be filled in after parsing
    /// - `status`: To be filled in by `SpanExt::record_result`
    /// - `error.message`: To be filled in on error
    /// - `risk_score`: To be filled in after scoring
    pub fn new(assessment_id: &str, user_id: &str) -> Span {
        info_span!(
            "command_assessment",
            assessment_id = %assessment_id,
            user_id = %user_id,
            command_kind = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            risk_score = tracing::field::Empty,
        )
    }
}
