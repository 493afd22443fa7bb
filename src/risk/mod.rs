//! Risk scoring and security level resolution.
//!
//! Scoring is additive and monotone: each independent factor contributes its
//! fixed weight at most once, the sum saturates at the cap, and the level
//! resolves from thresholds plus two unconditional overrides (amount past
//! the MFA ceiling, biometric-required config).
//!
//! Hard failures (rate limit, replay, malformed payment) short-circuit into
//! a denied decision with no soft factors; everything else stays allowed and
//! reports the verification tier the caller must clear before executing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::error::DenialReason;
use crate::guards::RateLimitResult;
use crate::identity::VoiceVerification;
use crate::parser::{CommandKind, ParsedCommand};

/// Verification tier a command must clear before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Basic,
    Biometric,
    Multifactor,
}

impl SecurityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Basic => "basic",
            SecurityLevel::Biometric => "biometric",
            SecurityLevel::Multifactor => "multifactor",
        }
    }
}

/// Individual contributor to the risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    UnknownDevice,
    LargeAmount,
    VoiceVerificationMissing,
    LowVoiceConfidence,
    ElevatedRateUsage,
}

impl RiskFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFactor::UnknownDevice => "unknown_device",
            RiskFactor::LargeAmount => "large_amount",
            RiskFactor::VoiceVerificationMissing => "voice_missing",
            RiskFactor::LowVoiceConfidence => "voice_low_confidence",
            RiskFactor::ElevatedRateUsage => "elevated_rate_usage",
        }
    }

    /// Human-readable description for confirmation surfaces.
    pub fn description(&self) -> &'static str {
        match self {
            RiskFactor::UnknownDevice => "Unknown device",
            RiskFactor::LargeAmount => "Large transaction amount",
            RiskFactor::VoiceVerificationMissing => "No voice verification",
            RiskFactor::LowVoiceConfidence => "Low voice confidence",
            RiskFactor::ElevatedRateUsage => "Elevated rate limit usage",
        }
    }
}

/// Weights and thresholds for the additive scorer.
#[derive(Debug, Clone)]
pub struct RiskWeights {
    pub unknown_device: u8,
    pub large_amount: u8,
    pub voice_missing: u8,
    pub voice_low_confidence: u8,
    pub elevated_rate_usage: u8,
    /// Score at or above this resolves to Multifactor.
    pub multifactor_threshold: u8,
    /// Score at or above this resolves to Biometric.
    pub biometric_threshold: u8,
    /// Voice confidence below this adds the low-confidence factor.
    pub voice_confidence_floor: f64,
    /// Rate usage ratio above this adds the elevated-usage factor.
    pub rate_usage_threshold: f64,
    /// Risk scores saturate here.
    pub max_score: u8,
    /// Ambient weight when a user has no registered device.
    pub posture_no_device: u8,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            unknown_device: 25,
            large_amount: 30,
            voice_missing: 20,
            voice_low_confidence: 15,
            elevated_rate_usage: 30,
            multifactor_threshold: 50,
            biometric_threshold: 30,
            voice_confidence_floor: 0.8,
            rate_usage_threshold: 0.8,
            max_score: 100,
            posture_no_device: 20,
        }
    }
}

/// Ambient signals gathered before scoring.
#[derive(Debug, Clone, Default)]
pub struct TransactionSignals {
    /// Rate decision for this command, when a guard ran.
    pub rate: Option<RateLimitResult>,
    pub replay_detected: bool,
    /// None when the command carried no device fingerprint.
    pub device_known: Option<bool>,
    pub voice: Option<VoiceVerification>,
}

/// Outcome of one assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityDecision {
    pub assessment_id: Uuid,
    pub required_level: SecurityLevel,
    /// Saturating sum of factor weights, capped.
    pub risk_score: u8,
    pub risk_factors: Vec<RiskFactor>,
    pub allowed: bool,
    pub denial: Option<DenialReason>,
}

impl SecurityDecision {
    pub(crate) fn denied(reason: DenialReason) -> Self {
        Self {
            assessment_id: Uuid::new_v4(),
            required_level: SecurityLevel::Basic,
            risk_score: 0,
            risk_factors: Vec::new(),
            allowed: false,
            denial: Some(reason),
        }
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}

/// Coarse configuration posture for status surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPosture {
    Basic,
    Enhanced,
    Maximum,
}

impl SecurityPosture {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityPosture::Basic => "basic",
            SecurityPosture::Enhanced => "enhanced",
            SecurityPosture::Maximum => "maximum",
        }
    }
}

/// Ambient security report for one user, independent of any command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityOverview {
    pub user_id: String,
    pub rate_used: u32,
    pub rate_quota: u32,
    pub biometric_required: bool,
    pub voice_verification_required: bool,
    pub posture: SecurityPosture,
    pub ambient_risk: u8,
}

/// Additive scorer over command and signals.
pub struct RiskScorer {
    weights: RiskWeights,
}

impl RiskScorer {
    pub fn new(weights: RiskWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &RiskWeights {
        &self.weights
    }

    /// Score one command under the live config. Hard failures deny with no
    /// soft factors; soft factors never deny.
    pub fn assess(
        &self,
        command: &ParsedCommand,
        signals: &TransactionSignals,
        config: &SecurityConfig,
    ) -> SecurityDecision {
        if let Some(rate) = &signals.rate {
            if !rate.allowed {
                return SecurityDecision::denied(DenialReason::RateLimited {
                    retry_after_ms: rate.retry_after.as_millis() as u64,
                });
            }
        }
        if signals.replay_detected {
            return SecurityDecision::denied(DenialReason::ReplayDetected);
        }

        if command.kind == CommandKind::Payment {
            match command.amount {
                None => {
                    return SecurityDecision::denied(DenialReason::InvalidAmount {
                        detail: "missing amount".to_string(),
                    })
                }
                Some(amount) if amount <= Decimal::ZERO => {
                    return SecurityDecision::denied(DenialReason::InvalidAmount {
                        detail: format!("non-positive amount {amount}"),
                    })
                }
                _ => {}
            }
            if command.recipient_address.is_none() {
                return SecurityDecision::denied(DenialReason::InvalidRecipient {
                    detail: "recipient did not resolve to an address".to_string(),
                });
            }
        }

        let mut factors = Vec::new();
        let mut score = 0u8;

        if signals.device_known == Some(false) {
            factors.push(RiskFactor::UnknownDevice);
            score = score.saturating_add(self.weights.unknown_device);
        }

        let large_amount = command.kind == CommandKind::Payment
            && command
                .amount
                .map_or(false, |amount| amount > config.max_amount_without_mfa);
        if large_amount {
            factors.push(RiskFactor::LargeAmount);
            score = score.saturating_add(self.weights.large_amount);
        }

        if config.voice_verification_required {
            match &signals.voice {
                None => {
                    factors.push(RiskFactor::VoiceVerificationMissing);
                    score = score.saturating_add(self.weights.voice_missing);
                }
                Some(voice) if voice.confidence < self.weights.voice_confidence_floor => {
                    factors.push(RiskFactor::LowVoiceConfidence);
                    score = score.saturating_add(self.weights.voice_low_confidence);
                }
                Some(_) => {}
            }
        }

        if let Some(rate) = &signals.rate {
            if rate.usage_ratio > self.weights.rate_usage_threshold {
                factors.push(RiskFactor::ElevatedRateUsage);
                score = score.saturating_add(self.weights.elevated_rate_usage);
            }
        }

        let risk_score = score.min(self.weights.max_score);

        // The amount override cannot be argued down by an otherwise clean
        // signal set.
        let required_level = if risk_score >= self.weights.multifactor_threshold || large_amount {
            SecurityLevel::Multifactor
        } else if risk_score >= self.weights.biometric_threshold || config.require_biometric {
            SecurityLevel::Biometric
        } else {
            SecurityLevel::Basic
        };

        SecurityDecision {
            assessment_id: Uuid::new_v4(),
            required_level,
            risk_score,
            risk_factors: factors,
            allowed: true,
            denial: None,
        }
    }

    /// Ambient posture for one user, no command involved.
    pub fn overview(
        &self,
        user_id: &str,
        rate_used: u32,
        device_seen: bool,
        config: &SecurityConfig,
    ) -> SecurityOverview {
        let posture = if config.voice_verification_required {
            SecurityPosture::Maximum
        } else if config.require_biometric {
            SecurityPosture::Enhanced
        } else {
            SecurityPosture::Basic
        };

        let mut ambient_risk = 0u8;
        if !device_seen {
            ambient_risk = ambient_risk.saturating_add(self.weights.posture_no_device);
        }
        let usage = if config.rate_limit_per_hour == 0 {
            1.0
        } else {
            f64::from(rate_used) / f64::from(config.rate_limit_per_hour)
        };
        if usage > self.weights.rate_usage_threshold {
            ambient_risk = ambient_risk.saturating_add(self.weights.elevated_rate_usage);
        }

        SecurityOverview {
            user_id: user_id.to_string(),
            rate_used,
            rate_quota: config.rate_limit_per_hour,
            biometric_required: config.require_biometric,
            voice_verification_required: config.voice_verification_required,
            posture,
            ambient_risk: ambient_risk.min(self.weights.max_score),
        }
    }
}
