//! EchoPay CORE
//!
//! Voice-payment command interpretation and transaction risk gating. A raw
//! transcript becomes a typed command, passes through abuse guards and
//! identity signals, and comes out as an auditable security decision plus a
//! terminal transaction validation.
//!
//! # Boundaries
//!
//! - Parsing and scoring are pure; the guard and identity stores are the
//!   only shared mutable state.
//! - Wallet connectivity, persistence, and UI stay upstream: balances and
//!   fees arrive through oracle traits, contacts through a directory trait,
//!   and snapshots leave the process as encrypted bytes.
//! - Every denial carries a reason. Dependency failures deny, they never
//!   allow.

pub mod config;
pub mod error;
pub mod guards;
pub mod identity;
pub mod parser;
pub mod risk;
pub mod security;
pub mod telemetry;
pub mod tx;

use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use config::{PipelineConfig, SecurityConfig, SecurityConfigPatch, SharedSecurityConfig};
use guards::{command_hash, RateLimitResult, RateLimiter, RateSubject, ReplayGuard};
use identity::{DeviceFingerprint, DeviceRegistry, VoiceVerification, VoiceVerifier};
use parser::{normalize, CommandKind, CommandParser, InMemoryContacts, ParsedCommand};
use risk::{
    RiskScorer, SecurityDecision, SecurityLevel, SecurityOverview, TransactionSignals,
};
use security::{AtRestCipher, CryptoError};
use telemetry::{log_security_event, AssessmentSpan, SecurityEvent, SpanExt};
use tx::{BalanceOracle, FeeOracle, TransactionValidator, ValidationReport};

/// One utterance plus the ambient caller context.
#[derive(Debug, Clone)]
pub struct AssessmentRequest {
    pub user_id: String,
    pub transcript: String,
    /// Device fingerprint hash, when the client supplied one.
    pub device_hash: Option<String>,
    /// Call origin (app instance, session), for origin-scope rate limiting.
    pub origin: Option<String>,
    /// Voice feature vector captured with this utterance.
    pub voice_sample: Option<Vec<f32>>,
    /// Client capture timestamp (ms since epoch) for replay keying. The
    /// wall clock stands in when absent.
    pub timestamp_ms: Option<i64>,
}

impl AssessmentRequest {
    pub fn new(user_id: impl Into<String>, transcript: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            transcript: transcript.into(),
            device_hash: None,
            origin: None,
            voice_sample: None,
            timestamp_ms: None,
        }
    }

    pub fn with_device(mut self, hash: impl Into<String>) -> Self {
        self.device_hash = Some(hash.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_voice_sample(mut self, sample: Vec<f32>) -> Self {
        self.voice_sample = Some(sample);
        self
    }

    pub fn with_timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }
}

/// Everything one pass through the pipeline produced.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub command: ParsedCommand,
    pub signals: TransactionSignals,
    pub decision: SecurityDecision,
}

/// The gating pipeline. One instance per process or tenant; every store in
/// it is internally synchronized, so `&self` methods are safe to share.
pub struct Pipeline {
    pub parser: CommandParser,
    pub contacts: InMemoryContacts,
    pub rate_limiter: RateLimiter,
    pub replay_guard: ReplayGuard,
    pub devices: DeviceRegistry,
    pub voice: VoiceVerifier,
    pub scorer: RiskScorer,
    pub validator: TransactionValidator,
    pub security: SharedSecurityConfig,
    cipher: Option<AtRestCipher>,
    /// Quota restored by `reset_guards` after a lockdown.
    baseline_rate_limit: u32,
}

impl Pipeline {
    /// Create a pipeline instance with the given configuration.
    pub fn new(config: PipelineConfig) -> Self {
        let baseline_rate_limit = config.security.rate_limit_per_hour;
        Self {
            parser: CommandParser::new(config.parser),
            contacts: InMemoryContacts::new(),
            rate_limiter: RateLimiter::new(config.rate_limit),
            replay_guard: ReplayGuard::new(config.replay),
            devices: DeviceRegistry::new(),
            voice: VoiceVerifier::new(config.voice),
            scorer: RiskScorer::new(config.risk),
            validator: TransactionValidator::new(config.validator),
            security: SharedSecurityConfig::new(config.security),
            cipher: None,
            baseline_rate_limit,
        }
    }

    /// Attach an at-rest cipher for snapshot export.
    pub fn with_cipher(mut self, cipher: AtRestCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Interpret a transcript with the wall clock.
    pub fn parse_command(&self, transcript: &str) -> ParsedCommand {
        self.parse_command_at(transcript, Utc::now())
    }

    /// Interpret a transcript with an injected timestamp.
    pub fn parse_command_at(&self, transcript: &str, now: DateTime<Utc>) -> ParsedCommand {
        let command = self.parser.parse_at(transcript, &self.contacts, now);
        telemetry::record_parse(command.kind.as_str(), command.confidence);
        if command.confidence < self.parser.config().confidence_floor {
            telemetry::record_low_confidence_parse();
            log_security_event(
                SecurityEvent::LowConfidenceParse,
                "Low confidence parse",
                &[
                    ("kind", command.kind.as_str()),
                    ("confidence", &format!("{:.2}", command.confidence)),
                ],
            );
        }
        command
    }

    /// Run the full pipeline: parse, guards, identity signals, risk.
    pub fn assess(&self, request: &AssessmentRequest) -> Assessment {
        self.assess_at(request, Instant::now(), Utc::now())
    }

    /// Run the full pipeline with injected clocks.
    pub fn assess_at(
        &self,
        request: &AssessmentRequest,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Assessment {
        let started = Instant::now();
        let assessment_id = Uuid::new_v4();
        let span = AssessmentSpan::new(&assessment_id.to_string(), &request.user_id);
        let _guard = span.enter();

        let config = self.security.get();
        let command = self.parse_command_at(&request.transcript, wall);
        span.record("command_kind", command.kind.as_str());

        // Guards and identity meter payments only; queries, contact edits and
        // settings move no funds.
        let mut signals = TransactionSignals::default();
        if command.kind == CommandKind::Payment {
            let mut subject = RateSubject::user(request.user_id.as_str());
            if let Some(device) = &request.device_hash {
                subject = subject.with_device(device.as_str());
            }
            if let Some(origin) = &request.origin {
                subject = subject.with_origin(origin.as_str());
            }
            let rate = self
                .rate_limiter
                .acquire_at(&subject, config.rate_limit_per_hour, now);
            telemetry::set_rate_windows(self.rate_limiter.window_count());
            if !rate.allowed {
                let scope = rate.limited_scope.map_or("user", |s| s.as_str());
                let retry_ms = rate.retry_after.as_millis().to_string();
                log_security_event(
                    SecurityEvent::RateLimited,
                    "Rate limit exceeded",
                    &[
                        ("user", request.user_id.as_str()),
                        ("scope", scope),
                        ("retry_after_ms", &retry_ms),
                    ],
                );
            }
            let rate_allowed = rate.allowed;
            signals.rate = Some(rate);

            // A rate-limited command never reaches the replay cache, so its
            // retry after the window is not misread as a duplicate.
            if rate_allowed {
                let stamp = request
                    .timestamp_ms
                    .unwrap_or_else(|| wall.timestamp_millis());
                let hash = command_hash(&request.user_id, &normalize(&request.transcript), stamp);
                let replay = self
                    .replay_guard
                    .observe_at(&hash, config.replay_window(), now);
                telemetry::set_replay_cache_entries(self.replay_guard.len());
                if replay {
                    log_security_event(
                        SecurityEvent::ReplayDetected,
                        "Duplicate command rejected",
                        &[("user", request.user_id.as_str()), ("hash", &hash[..16])],
                    );
                }
                signals.replay_detected = replay;
            }

            if let Some(device) = &request.device_hash {
                let known = self.devices.is_known(&request.user_id, device);
                if !known {
                    log_security_event(
                        SecurityEvent::UnknownDevice,
                        "Transaction from unknown device",
                        &[
                            ("user", request.user_id.as_str()),
                            ("device", device.as_str()),
                        ],
                    );
                }
                signals.device_known = Some(known);
            }

            if let Some(sample) = &request.voice_sample {
                let verification = self.voice.verify_at(&request.user_id, sample, wall);
                telemetry::record_voice_verification(verification.verified);
                signals.voice = Some(verification);
            }
        }

        let mut decision = if command.kind == CommandKind::Payment {
            self.scorer.assess(&command, &signals, &config)
        } else {
            SecurityDecision {
                assessment_id,
                required_level: SecurityLevel::Basic,
                risk_score: 0,
                risk_factors: Vec::new(),
                allowed: true,
                denial: None,
            }
        };
        // One id across the span, the logs, and the decision.
        decision.assessment_id = assessment_id;

        telemetry::record_decision(
            decision.required_level.as_str(),
            decision.allowed,
            decision.risk_score,
        );
        span.record("risk_score", u64::from(decision.risk_score));
        let outcome = decision.denial.as_ref().map_or(Ok(()), Err);
        span.record_result(&outcome);
        if let Some(denial) = &decision.denial {
            telemetry::record_denial(denial.as_str());
            log_security_event(
                SecurityEvent::DecisionDenied,
                "Command denied",
                &[
                    ("user", request.user_id.as_str()),
                    ("reason", denial.as_str()),
                ],
            );
        }
        telemetry::record_assessment_duration(started.elapsed().as_secs_f64());

        Assessment {
            command,
            signals,
            decision,
        }
    }

    /// Read-only rate probe; counts nothing.
    pub fn check_rate_limit(&self, subject: &RateSubject) -> RateLimitResult {
        self.rate_limiter
            .check(subject, self.security.get().rate_limit_per_hour)
    }

    /// Authoritative rate acquisition for callers bypassing `assess`.
    pub fn acquire_rate_slot(&self, subject: &RateSubject) -> RateLimitResult {
        let result = self
            .rate_limiter
            .acquire(subject, self.security.get().rate_limit_per_hour);
        telemetry::set_rate_windows(self.rate_limiter.window_count());
        result
    }

    /// Record one command occurrence; true means replay.
    pub fn check_replay(&self, user_id: &str, transcript: &str, timestamp_ms: i64) -> bool {
        let hash = command_hash(user_id, &normalize(transcript), timestamp_ms);
        let replay = self
            .replay_guard
            .observe(&hash, self.security.get().replay_window());
        telemetry::set_replay_cache_entries(self.replay_guard.len());
        if replay {
            log_security_event(
                SecurityEvent::ReplayDetected,
                "Duplicate command rejected",
                &[("user", user_id), ("hash", &hash[..16])],
            );
        }
        replay
    }

    /// Register a device for a user; true when it was new.
    pub fn register_device(&self, user_id: &str, fingerprint: &DeviceFingerprint) -> bool {
        self.devices.register(user_id, fingerprint)
    }

    /// Verify a voice sample against the user's profile.
    pub fn verify_voice(&self, user_id: &str, sample: &[f32]) -> VoiceVerification {
        let verification = self.voice.verify(user_id, sample);
        telemetry::record_voice_verification(verification.verified);
        verification
    }

    /// Score a command with caller-gathered signals.
    pub fn assess_risk(
        &self,
        command: &ParsedCommand,
        signals: &TransactionSignals,
    ) -> SecurityDecision {
        self.scorer.assess(command, signals, &self.security.get())
    }

    /// Terminal validation with balance and fee already in hand.
    pub fn validate_transaction(
        &self,
        command: &ParsedCommand,
        balance: Decimal,
        fee: Option<Decimal>,
    ) -> ValidationReport {
        let report = self.validator.validate(command, balance, fee);
        if let Some(denial) = &report.denial {
            telemetry::record_denial(denial.as_str());
        }
        report
    }

    /// Terminal validation through the oracle seams.
    pub async fn validate_with_oracles(
        &self,
        command: &ParsedCommand,
        from_account: &str,
        balances: &dyn BalanceOracle,
        fees: &dyn FeeOracle,
    ) -> ValidationReport {
        let report = self
            .validator
            .validate_via_oracles(command, from_account, balances, fees)
            .await;
        if let Some(denial) = &report.denial {
            telemetry::record_denial(denial.as_str());
        }
        report
    }

    /// Encrypt bytes for storage outside the process.
    pub fn encrypt_at_rest(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let Some(cipher) = &self.cipher else {
            if self.security.get().encryption_required {
                log_security_event(
                    SecurityEvent::EncryptionFailure,
                    "Encryption required but no key configured",
                    &[],
                );
            }
            return Err(CryptoError::KeyUnavailable);
        };
        cipher.encrypt(plaintext).map_err(|err| {
            log_security_event(
                SecurityEvent::EncryptionFailure,
                "At-rest encryption failed",
                &[("detail", &err.to_string())],
            );
            err
        })
    }

    /// Decrypt an envelope produced by [`encrypt_at_rest`](Self::encrypt_at_rest).
    pub fn decrypt_at_rest(&self, envelope: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let Some(cipher) = &self.cipher else {
            return Err(CryptoError::KeyUnavailable);
        };
        cipher.decrypt(envelope).map_err(|err| {
            log_security_event(
                SecurityEvent::EncryptionFailure,
                "At-rest decryption failed",
                &[("detail", &err.to_string())],
            );
            err
        })
    }

    /// Ambient security report for one user.
    pub fn security_overview(&self, user_id: &str) -> SecurityOverview {
        self.security_overview_at(user_id, Instant::now())
    }

    /// Ambient security report with an injected clock.
    pub fn security_overview_at(&self, user_id: &str, now: Instant) -> SecurityOverview {
        let config = self.security.get();
        let rate_used = self.rate_limiter.user_count_at(user_id, now);
        let device_seen = self.devices.has_any(user_id);
        self.scorer.overview(user_id, rate_used, device_seen, &config)
    }

    /// Stop all traffic: zero the quota and flush every rate window.
    pub fn lockdown(&self) {
        self.security.set_rate_limit_per_hour(0);
        self.rate_limiter.flush();
        telemetry::set_rate_windows(0);
        log_security_event(
            SecurityEvent::LockdownActivated,
            "Emergency lockdown activated",
            &[],
        );
    }

    /// Clear guard state and restore the construction-time quota.
    pub fn reset_guards(&self) {
        self.rate_limiter.flush();
        self.replay_guard.flush();
        self.security
            .set_rate_limit_per_hour(self.baseline_rate_limit);
        telemetry::set_rate_windows(0);
        telemetry::set_replay_cache_entries(0);
        let quota = self.baseline_rate_limit.to_string();
        log_security_event(
            SecurityEvent::GuardsReset,
            "Guard state reset",
            &[("restored_quota", &quota)],
        );
    }

    /// Snapshot of the live security policy.
    pub fn security_config(&self) -> SecurityConfig {
        self.security.get()
    }

    /// Apply a partial policy override and return the effective policy.
    pub fn update_security_config(&self, patch: &SecurityConfigPatch) -> SecurityConfig {
        let effective = self.security.update(patch);
        let quota = effective.rate_limit_per_hour.to_string();
        let biometric = effective.require_biometric.to_string();
        let voice = effective.voice_verification_required.to_string();
        log_security_event(
            SecurityEvent::ConfigUpdated,
            "Security config updated",
            &[
                ("rate_limit_per_hour", &quota),
                ("require_biometric", &biometric),
                ("voice_verification_required", &voice),
            ],
        );
        effective
    }
}
