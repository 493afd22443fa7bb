//! TDD-Light tests for the full assessment pipeline.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use echopay_core::config::{PipelineConfig, SecurityConfig, SecurityConfigPatch};
use echopay_core::error::{DenialReason, OracleError};
use echopay_core::identity::DeviceFingerprint;
use echopay_core::parser::CommandKind;
use echopay_core::risk::{RiskFactor, SecurityLevel, SecurityPosture};
use echopay_core::security::AtRestCipher;
use echopay_core::tx::{BalanceOracle, FeeOracle};
use echopay_core::{AssessmentRequest, Pipeline};

const ALICE_ADDR: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
const BOB_ADDR: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";

fn pipeline() -> Pipeline {
    let pipeline = Pipeline::new(PipelineConfig::default());
    pipeline.contacts.add("alice", ALICE_ADDR);
    pipeline.contacts.add("bob", BOB_ADDR);
    pipeline
}

fn pipeline_with_quota(quota: u32) -> Pipeline {
    let config = PipelineConfig {
        security: SecurityConfig {
            rate_limit_per_hour: quota,
            ..SecurityConfig::default()
        },
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config);
    pipeline.contacts.add("alice", ALICE_ADDR);
    pipeline
}

// Unit vector at a chosen cosine against the enrolled [1, 0] print.
fn voice_sample(cosine: f32) -> Vec<f32> {
    vec![cosine, (1.0 - cosine * cosine).sqrt()]
}

// =============================================================================
// Happy path
// =============================================================================

#[test]
fn clean_payment_clears_at_basic() {
    let pipeline = pipeline();
    let request = AssessmentRequest::new("u1", "send 5 dot to alice");

    let assessment = pipeline.assess(&request);

    assert_eq!(assessment.command.kind, CommandKind::Payment);
    assert_eq!(assessment.command.amount, Some(dec!(5)));
    assert_eq!(assessment.command.recipient_address.as_deref(), Some(ALICE_ADDR));
    assert!(assessment.decision.allowed);
    assert!(!assessment.decision.is_denied());
    assert_eq!(assessment.decision.required_level, SecurityLevel::Basic);
    assert_eq!(assessment.decision.risk_score, 0);
    assert!(assessment.decision.risk_factors.is_empty());
    assert!(assessment.signals.rate.as_ref().map_or(false, |r| r.allowed));
    assert!(!assessment.signals.replay_detected);
}

#[test]
fn each_assessment_gets_its_own_id() {
    let pipeline = pipeline();

    let first = pipeline.assess(&AssessmentRequest::new("u1", "send 1 dot to alice").with_timestamp_ms(1));
    let second = pipeline.assess(&AssessmentRequest::new("u1", "send 1 dot to alice").with_timestamp_ms(2));

    assert_ne!(first.decision.assessment_id, second.decision.assessment_id);
}

#[test]
fn large_amount_escalates_to_multifactor() {
    let pipeline = pipeline();
    let request = AssessmentRequest::new("u1", "send 1500 dot to alice");

    let assessment = pipeline.assess(&request);

    assert!(assessment.decision.allowed);
    assert_eq!(assessment.decision.required_level, SecurityLevel::Multifactor);
    assert!(assessment
        .decision
        .risk_factors
        .contains(&RiskFactor::LargeAmount));
}

// =============================================================================
// Guards
// =============================================================================

#[test]
fn quota_exhaustion_denies_the_next_payment() {
    let pipeline = pipeline_with_quota(2);

    for i in 0..2i64 {
        let request =
            AssessmentRequest::new("u1", "send 1 dot to alice").with_timestamp_ms(i);
        assert!(pipeline.assess(&request).decision.allowed, "request {i}");
    }

    let request = AssessmentRequest::new("u1", "send 1 dot to alice").with_timestamp_ms(99);
    let denied = pipeline.assess(&request);

    assert!(denied.decision.is_denied());
    assert!(matches!(
        denied.decision.denial,
        Some(DenialReason::RateLimited { .. })
    ));
    assert_eq!(denied.decision.required_level, SecurityLevel::Basic);
    assert!(denied.decision.risk_factors.is_empty());
}

#[test]
fn same_capture_timestamp_is_a_replay() {
    let pipeline = pipeline();
    let request =
        AssessmentRequest::new("u1", "send 5 dot to alice").with_timestamp_ms(1_700_000_000_000);

    let first = pipeline.assess(&request);
    let second = pipeline.assess(&request);

    assert!(first.decision.allowed);
    assert!(!first.signals.replay_detected);
    assert!(second.signals.replay_detected);
    assert_eq!(second.decision.denial, Some(DenialReason::ReplayDetected));
}

#[test]
fn distinct_capture_timestamps_are_not_replays() {
    let pipeline = pipeline();

    let first = pipeline
        .assess(&AssessmentRequest::new("u1", "send 5 dot to alice").with_timestamp_ms(1000));
    let second = pipeline
        .assess(&AssessmentRequest::new("u1", "send 5 dot to alice").with_timestamp_ms(1001));

    assert!(first.decision.allowed);
    assert!(second.decision.allowed);
}

#[test]
fn transcript_whitespace_does_not_evade_replay_detection() {
    let pipeline = pipeline();

    let first = pipeline
        .assess(&AssessmentRequest::new("u1", "send 5 dot to alice").with_timestamp_ms(1000));
    let padded = pipeline
        .assess(&AssessmentRequest::new("u1", "  send 5 dot to alice  ").with_timestamp_ms(1000));

    assert!(first.decision.allowed);
    assert!(padded.signals.replay_detected);
}

#[test]
fn non_payment_commands_skip_the_guards() {
    let pipeline = pipeline_with_quota(1);

    for _ in 0..3 {
        let query = pipeline.assess(&AssessmentRequest::new("u1", "what's my balance"));
        assert_eq!(query.command.kind, CommandKind::Query);
        assert!(query.decision.allowed);
        assert!(query.signals.rate.is_none());
    }

    // The whole quota is still there for the actual payment.
    let payment = pipeline
        .assess(&AssessmentRequest::new("u1", "send 1 dot to alice").with_timestamp_ms(1));
    assert!(payment.decision.allowed);

    let over = pipeline
        .assess(&AssessmentRequest::new("u1", "send 2 dot to alice").with_timestamp_ms(2));
    assert!(matches!(
        over.decision.denial,
        Some(DenialReason::RateLimited { .. })
    ));
}

#[test]
fn rate_denied_payment_is_not_remembered_as_a_replay() {
    let pipeline = pipeline_with_quota(1);
    // Replay window longer than the rate window, so a post-window retry
    // would still be inside it had the denied command been cached.
    pipeline.update_security_config(&SecurityConfigPatch {
        replay_window_ms: Some(7_200_000),
        ..SecurityConfigPatch::default()
    });
    let t0 = Instant::now();
    let wall = Utc::now();
    let accepted = AssessmentRequest::new("u1", "send 1 dot to alice").with_timestamp_ms(7);
    let throttled = AssessmentRequest::new("u1", "send 2 dot to alice").with_timestamp_ms(8);

    assert!(pipeline.assess_at(&accepted, t0, wall).decision.allowed);
    assert!(matches!(
        pipeline.assess_at(&throttled, t0, wall).decision.denial,
        Some(DenialReason::RateLimited { .. })
    ));

    // Only the capture that was actually accepted reads as a duplicate.
    let second_window = t0 + Duration::from_secs(3601);
    assert!(matches!(
        pipeline.assess_at(&accepted, second_window, wall).decision.denial,
        Some(DenialReason::ReplayDetected)
    ));

    // The throttled capture was never cached, so its retry goes through.
    let third_window = second_window + Duration::from_secs(3601);
    assert!(pipeline.assess_at(&throttled, third_window, wall).decision.allowed);
}

// =============================================================================
// Identity signals
// =============================================================================

#[test]
fn unknown_device_raises_risk_without_denying() {
    let pipeline = pipeline();
    let request =
        AssessmentRequest::new("u1", "send 5 dot to alice").with_device("unseen-hash");

    let assessment = pipeline.assess(&request);

    assert!(assessment.decision.allowed);
    assert_eq!(assessment.decision.risk_score, 25);
    assert!(assessment
        .decision
        .risk_factors
        .contains(&RiskFactor::UnknownDevice));
    assert_eq!(assessment.signals.device_known, Some(false));
}

#[test]
fn registered_device_clears_the_factor() {
    let pipeline = pipeline();
    let fingerprint = DeviceFingerprint::from_components(BTreeMap::from([
        ("os".to_string(), "ios 17".to_string()),
        ("model".to_string(), "iphone 15".to_string()),
    ]));
    assert!(pipeline.register_device("u1", &fingerprint));

    let request = AssessmentRequest::new("u1", "send 5 dot to alice")
        .with_device(fingerprint.hash.clone());
    let assessment = pipeline.assess(&request);

    assert_eq!(assessment.signals.device_known, Some(true));
    assert_eq!(assessment.decision.risk_score, 0);
    assert!(assessment.decision.risk_factors.is_empty());
}

#[test]
fn missing_voice_is_a_factor_once_policy_requires_it() {
    let pipeline = pipeline();
    pipeline.update_security_config(&SecurityConfigPatch {
        voice_verification_required: Some(true),
        ..SecurityConfigPatch::default()
    });

    let request = AssessmentRequest::new("u1", "send 5 dot to alice");
    let assessment = pipeline.assess(&request);

    assert!(assessment.decision.allowed);
    assert_eq!(assessment.decision.risk_score, 20);
    assert!(assessment
        .decision
        .risk_factors
        .contains(&RiskFactor::VoiceVerificationMissing));
}

#[test]
fn voice_enrolls_then_verifies_then_flags_drift() {
    let pipeline = pipeline();
    pipeline.update_security_config(&SecurityConfigPatch {
        voice_verification_required: Some(true),
        ..SecurityConfigPatch::default()
    });

    // First contact enrolls and counts as verified.
    let enroll = AssessmentRequest::new("u1", "send 1 dot to alice")
        .with_voice_sample(vec![1.0, 0.0])
        .with_timestamp_ms(1);
    let enrolled = pipeline.assess(&enroll);
    assert!(enrolled.signals.voice.map_or(false, |v| v.verified));
    assert!(enrolled.decision.risk_factors.is_empty());

    // A close sample verifies and extends the profile.
    let close = AssessmentRequest::new("u1", "send 2 dot to alice")
        .with_voice_sample(voice_sample(0.95))
        .with_timestamp_ms(2);
    let verified = pipeline.assess(&close);
    assert!(verified.signals.voice.map_or(false, |v| v.verified));
    assert!(verified.decision.risk_factors.is_empty());
    assert_eq!(pipeline.voice.template_count("u1"), 2);

    // A distant sample fails verification and shows up as a factor.
    let distant = AssessmentRequest::new("u1", "send 3 dot to alice")
        .with_voice_sample(voice_sample(0.5))
        .with_timestamp_ms(3);
    let flagged = pipeline.assess(&distant);
    assert!(!flagged.signals.voice.map_or(true, |v| v.verified));
    assert!(flagged
        .decision
        .risk_factors
        .contains(&RiskFactor::LowVoiceConfidence));
}

#[test]
fn low_confidence_voice_is_ignored_when_policy_does_not_require_it() {
    let pipeline = pipeline();
    pipeline.verify_voice("u1", &[1.0, 0.0]);

    let request = AssessmentRequest::new("u1", "send 5 dot to alice")
        .with_voice_sample(voice_sample(0.5));
    let assessment = pipeline.assess(&request);

    assert_eq!(assessment.decision.risk_score, 0);
    assert!(assessment.decision.risk_factors.is_empty());
}

#[test]
fn stacked_factors_escalate_the_required_level() {
    let pipeline = pipeline();
    pipeline.update_security_config(&SecurityConfigPatch {
        voice_verification_required: Some(true),
        ..SecurityConfigPatch::default()
    });

    // Unknown device (25) plus missing voice (20) crosses the biometric line.
    let request =
        AssessmentRequest::new("u1", "send 5 dot to alice").with_device("unseen-hash");
    let assessment = pipeline.assess(&request);

    assert!(assessment.decision.allowed);
    assert_eq!(assessment.decision.risk_score, 45);
    assert_eq!(assessment.decision.required_level, SecurityLevel::Biometric);
}

// =============================================================================
// Lockdown and reset
// =============================================================================

#[test]
fn lockdown_blocks_payments_until_guards_reset() {
    let pipeline = pipeline();
    assert!(pipeline
        .assess(&AssessmentRequest::new("u1", "send 1 dot to alice").with_timestamp_ms(1))
        .decision
        .allowed);

    pipeline.lockdown();
    assert_eq!(pipeline.security_config().rate_limit_per_hour, 0);

    let blocked = pipeline
        .assess(&AssessmentRequest::new("u1", "send 1 dot to alice").with_timestamp_ms(2));
    assert!(matches!(
        blocked.decision.denial,
        Some(DenialReason::RateLimited { retry_after_ms: 3_600_000 })
    ));

    pipeline.reset_guards();
    assert_eq!(pipeline.security_config().rate_limit_per_hour, 100);

    let restored = pipeline
        .assess(&AssessmentRequest::new("u1", "send 1 dot to alice").with_timestamp_ms(3));
    assert!(restored.decision.allowed);
}

#[test]
fn reset_also_forgets_replay_history() {
    let pipeline = pipeline();
    let request =
        AssessmentRequest::new("u1", "send 1 dot to alice").with_timestamp_ms(42);

    assert!(pipeline.assess(&request).decision.allowed);
    pipeline.reset_guards();

    // The same capture is fresh again after the flush.
    assert!(pipeline.assess(&request).decision.allowed);
}

// =============================================================================
// Policy updates and overview
// =============================================================================

#[test]
fn config_patch_touches_only_named_fields() {
    let pipeline = pipeline();

    let effective = pipeline.update_security_config(&SecurityConfigPatch {
        rate_limit_per_hour: Some(5),
        ..SecurityConfigPatch::default()
    });
    assert_eq!(effective.rate_limit_per_hour, 5);
    assert!(!effective.require_biometric);
    assert!(effective.encryption_required);

    let effective = pipeline.update_security_config(&SecurityConfigPatch {
        require_biometric: Some(true),
        ..SecurityConfigPatch::default()
    });
    assert_eq!(effective.rate_limit_per_hour, 5);
    assert!(effective.require_biometric);
}

#[test]
fn overview_tracks_usage_posture_and_ambient_risk() {
    let pipeline = pipeline();

    let fresh = pipeline.security_overview("u1");
    assert_eq!(fresh.posture, SecurityPosture::Basic);
    assert_eq!(fresh.rate_used, 0);
    assert_eq!(fresh.rate_quota, 100);
    // No device on file yet.
    assert_eq!(fresh.ambient_risk, 20);

    let fingerprint =
        DeviceFingerprint::from_components(BTreeMap::from([("os".to_string(), "ios".to_string())]));
    pipeline.register_device("u1", &fingerprint);
    pipeline.assess(&AssessmentRequest::new("u1", "send 1 dot to alice").with_timestamp_ms(1));

    let after = pipeline.security_overview("u1");
    assert_eq!(after.rate_used, 1);
    assert_eq!(after.ambient_risk, 0);

    pipeline.update_security_config(&SecurityConfigPatch {
        require_biometric: Some(true),
        ..SecurityConfigPatch::default()
    });
    assert_eq!(pipeline.security_overview("u1").posture, SecurityPosture::Enhanced);

    pipeline.update_security_config(&SecurityConfigPatch {
        voice_verification_required: Some(true),
        ..SecurityConfigPatch::default()
    });
    assert_eq!(pipeline.security_overview("u1").posture, SecurityPosture::Maximum);
}

// =============================================================================
// Parse entry point
// =============================================================================

#[test]
fn parse_command_resolves_contacts_and_suggests_on_failure() {
    let pipeline = pipeline();

    let resolved = pipeline.parse_command("send 5 dot to alice");
    assert_eq!(resolved.recipient_address.as_deref(), Some(ALICE_ADDR));
    assert!(resolved.suggestions.is_empty());

    let garbled = pipeline.parse_command("frobnicate the widget");
    assert_eq!(garbled.kind, CommandKind::Unknown);
    assert!(!garbled.suggestions.is_empty());
    assert!(garbled.suggestions.len() <= 3);
}

// =============================================================================
// Terminal validation
// =============================================================================

#[test]
fn validation_runs_on_the_assessed_command() {
    let pipeline = pipeline();
    let assessment = pipeline.assess(&AssessmentRequest::new("u1", "send 5 dot to alice"));

    let report = pipeline.validate_transaction(&assessment.command, dec!(100), Some(dec!(0.01)));
    assert!(report.ok);
    assert_eq!(report.fee, Some(dec!(0.01)));

    let broke = pipeline.validate_transaction(&assessment.command, dec!(1), Some(dec!(0.01)));
    assert_eq!(
        broke.denial,
        Some(DenialReason::InsufficientBalance {
            available: dec!(1),
            required: dec!(5),
        })
    );
}

struct StaticOracle {
    balance: Decimal,
    fee: Decimal,
}

#[async_trait]
impl BalanceOracle for StaticOracle {
    async fn free_balance(&self, _account: &str) -> Result<Decimal, OracleError> {
        Ok(self.balance)
    }
}

#[async_trait]
impl FeeOracle for StaticOracle {
    async fn estimate_fee(
        &self,
        _from: &str,
        _to: &str,
        _amount: Decimal,
    ) -> Result<Decimal, OracleError> {
        Ok(self.fee)
    }
}

#[tokio::test]
async fn oracle_validation_flows_through_the_pipeline() {
    let pipeline = pipeline();
    let command = pipeline.parse_command("send 5 dot to alice");
    let oracle = StaticOracle {
        balance: dec!(100),
        fee: dec!(0.02),
    };

    let report = pipeline
        .validate_with_oracles(&command, BOB_ADDR, &oracle, &oracle)
        .await;

    assert!(report.ok);
    assert_eq!(report.fee, Some(dec!(0.02)));
}

// =============================================================================
// At-rest protection
// =============================================================================

#[test]
fn snapshots_round_trip_through_the_configured_cipher() {
    let cipher = AtRestCipher::new(&[7u8; 32]).unwrap();
    let pipeline = Pipeline::new(PipelineConfig::default()).with_cipher(cipher);

    let envelope = pipeline.encrypt_at_rest(b"voice profile snapshot").unwrap();
    assert_ne!(envelope.as_slice(), b"voice profile snapshot");

    let restored = pipeline.decrypt_at_rest(&envelope).unwrap();
    assert_eq!(restored, b"voice profile snapshot");
}

#[test]
fn missing_cipher_fails_closed() {
    let pipeline = Pipeline::new(PipelineConfig::default());

    assert!(matches!(
        pipeline.encrypt_at_rest(b"secret"),
        Err(echopay_core::security::CryptoError::KeyUnavailable)
    ));
    assert!(matches!(
        pipeline.decrypt_at_rest(b"EPAY..."),
        Err(echopay_core::security::CryptoError::KeyUnavailable)
    ));
}
