//! Prometheus metrics for the command pipeline.
//!
//! Metrics register against the default registry on first use; hosts scrape
//! them through [`render`] or their own registry gather.

use once_cell::sync::Lazy;
use prometheus::{
    exponential_buckets, linear_buckets, register_histogram, register_int_counter,
    register_int_counter_vec, register_int_gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};

// COUNTER (uses _total suffix)
static COMMANDS_PARSED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "echopay_commands_parsed_total",
        "Total transcripts parsed, by command kind.",
        &["kind"]
    )
    .unwrap()
});
static LOW_CONFIDENCE_PARSES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "echopay_low_confidence_parses_total",
        "Total parses that fell below the confidence floor."
    )
    .unwrap()
});
static DENIALS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "echopay_denials_total",
        "Total hard denials, by reason label.",
        &["reason"]
    )
    .unwrap()
});
static DECISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "echopay_decisions_total",
        "Total security decisions, by required verification level.",
        &["level", "allowed"]
    )
    .unwrap()
});
static VOICE_VERIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "echopay_voice_verifications_total",
        "Total voice verification attempts, by outcome.",
        &["outcome"]
    )
    .unwrap()
});

// GAUGE (no _total suffix)
static REPLAY_CACHE_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "echopay_replay_cache_entries",
        "Current number of live replay cache entries."
    )
    .unwrap()
});
static RATE_WINDOWS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "echopay_rate_windows",
        "Current number of tracked rate limit windows."
    )
    .unwrap()
});

// HISTOGRAM (uses unit suffix where one applies)
static PARSE_CONFIDENCE: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "echopay_parse_confidence",
        "Distribution of parse confidence scores.",
        linear_buckets(0.0, 0.1, 11).unwrap()
    )
    .unwrap()
});
static RISK_SCORE: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "echopay_risk_score",
        "Distribution of assessment risk scores.",
        linear_buckets(0.0, 10.0, 11).unwrap()
    )
    .unwrap()
});
static ASSESSMENT_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "echopay_assessment_duration_seconds",
        "Latency of a full parse-and-assess pass.",
        exponential_buckets(0.0005, 2.0, 12).unwrap()
    )
    .unwrap()
});

pub fn record_parse(kind: &str, confidence: f64) {
    COMMANDS_PARSED_TOTAL.with_label_values(&[kind]).inc();
    PARSE_CONFIDENCE.observe(confidence);
}

pub fn record_low_confidence_parse() {
    LOW_CONFIDENCE_PARSES_TOTAL.inc();
}

pub fn record_denial(reason: &str) {
    DENIALS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_decision(level: &str, allowed: bool, risk_score: u8) {
    DECISIONS_TOTAL
        .with_label_values(&[level, if allowed { "true" } else { "false" }])
        .inc();
    RISK_SCORE.observe(f64::from(risk_score));
}

pub fn record_voice_verification(verified: bool) {
    VOICE_VERIFICATIONS_TOTAL
        .with_label_values(&[if verified { "verified" } else { "rejected" }])
        .inc();
}

pub fn record_assessment_duration(duration_secs: f64) {
    ASSESSMENT_DURATION_SECONDS.observe(duration_secs);
}

pub fn set_replay_cache_entries(entries: usize) {
    REPLAY_CACHE_ENTRIES.set(entries as i64);
}

pub fn set_rate_windows(windows: usize) {
    RATE_WINDOWS.set(windows as i64);
}

/// Render the default registry in Prometheus text exposition format.
pub fn render() -> String {
    TextEncoder::new()
        .encode_to_string(&prometheus::gather())
        .unwrap_or_default()
}
