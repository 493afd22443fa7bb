//! Pipeline configuration loading from environment variables and TOML files.
//!
//! All values are loaded from `ECHOPAY_*` environment variables with sensible
//! defaults. Invalid values fall back to defaults without crashing. A TOML
//! file can seed the security policy before env overrides are applied.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `ECHOPAY_REQUIRE_BIOMETRIC` | false | Biometric step-up for every transaction |
//! | `ECHOPAY_RATE_LIMIT_PER_HOUR` | 100 | Per-user commands per window |
//! | `ECHOPAY_MAX_AMOUNT_WITHOUT_MFA` | 1000 | Amount above which MFA is forced |
//! | `ECHOPAY_REPLAY_WINDOW_MS` | 30000 | Duplicate-command rejection window |
//! | `ECHOPAY_ENCRYPTION_REQUIRED` | true | Require encryption for at-rest snapshots |
//! | `ECHOPAY_VOICE_VERIFICATION_REQUIRED` | false | Require a voice sample per transaction |
//! | `ECHOPAY_CONFIDENCE_FLOOR` | 0.7 | Parse confidence below which suggestions are offered |
//! | `ECHOPAY_FUZZY_THRESHOLD` | 0.6 | Minimum similarity for fuzzy contact matches |
//! | `ECHOPAY_DEFAULT_CURRENCY` | DOT | Currency assumed when none is spoken |
//! | `ECHOPAY_ORACLE_TIMEOUT_MS` | 5000 | Balance/fee oracle deadline |
//! | `ECHOPAY_FEE_POLICY` | deny | `deny` or `warn` when fees cannot be estimated |
//!
//! # Config file
//!
//! Security policy can also be seeded from a TOML file. Amounts are strings
//! to avoid float rounding:
//!
//! ```toml
//! require_biometric = false
//! rate_limit_per_hour = 100
//! max_amount_without_mfa = "1000"
//! replay_window_ms = 30000
//! encryption_required = true
//! voice_verification_required = false
//! ```

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guards::{RateLimitConfig, ReplayConfig};
use crate::identity::VoiceConfig;
use crate::parser::ParserConfig;
use crate::risk::RiskWeights;
use crate::tx::{FeePolicy, ValidatorConfig};

/// Errors that can occur while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {detail}")]
    FileRead { path: String, detail: String },

    #[error("Invalid config file {path}: {detail}")]
    FileParse { path: String, detail: String },
}

/// Security policy evaluated on every transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Force the biometric security level even at low risk scores.
    pub require_biometric: bool,
    /// Per-user commands per rate window. Zero denies everything.
    pub rate_limit_per_hour: u32,
    /// Amounts above this always require multifactor confirmation.
    pub max_amount_without_mfa: Decimal,
    /// Window within which a repeated command hash is a replay.
    pub replay_window_ms: u64,
    /// Whether at-rest snapshots must be encrypted.
    pub encryption_required: bool,
    /// Whether every transaction needs a voice sample.
    pub voice_verification_required: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            require_biometric: false,
            rate_limit_per_hour: 100,
            max_amount_without_mfa: Decimal::from(1000),
            replay_window_ms: 30_000,
            encryption_required: true,
            voice_verification_required: false,
        }
    }
}

impl SecurityConfig {
    /// Replay window as a `Duration`.
    pub fn replay_window(&self) -> Duration {
        Duration::from_millis(self.replay_window_ms)
    }

    /// Load the security policy from a TOML file. Missing fields keep defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::FileParse {
            path: path.display().to_string(),
            detail: e.to_string(),
        })
    }

    /// Apply a partial override, field by field.
    pub fn apply(&mut self, patch: &SecurityConfigPatch) {
        if let Some(v) = patch.require_biometric {
            self.require_biometric = v;
        }
        if let Some(v) = patch.rate_limit_per_hour {
            self.rate_limit_per_hour = v;
        }
        if let Some(v) = patch.max_amount_without_mfa {
            self.max_amount_without_mfa = v;
        }
        if let Some(v) = patch.replay_window_ms {
            self.replay_window_ms = v;
        }
        if let Some(v) = patch.encryption_required {
            self.encryption_required = v;
        }
        if let Some(v) = patch.voice_verification_required {
            self.voice_verification_required = v;
        }
    }
}

/// Partial security policy override. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfigPatch {
    pub require_biometric: Option<bool>,
    pub rate_limit_per_hour: Option<u32>,
    pub max_amount_without_mfa: Option<Decimal>,
    pub replay_window_ms: Option<u64>,
    pub encryption_required: Option<bool>,
    pub voice_verification_required: Option<bool>,
}

/// Shared, runtime-mutable handle to the security policy.
#[derive(Clone)]
pub struct SharedSecurityConfig {
    inner: Arc<RwLock<SecurityConfig>>,
}

impl SharedSecurityConfig {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Snapshot of the current policy.
    pub fn get(&self) -> SecurityConfig {
        self.inner.read().clone()
    }

    /// Apply a partial override and return the effective policy.
    pub fn update(&self, patch: &SecurityConfigPatch) -> SecurityConfig {
        let mut guard = self.inner.write();
        guard.apply(patch);
        guard.clone()
    }

    /// Replace the per-user quota, used by lockdown and reset.
    pub fn set_rate_limit_per_hour(&self, quota: u32) {
        self.inner.write().rate_limit_per_hour = quota;
    }
}

/// Everything the pipeline needs at construction time.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub security: SecurityConfig,
    pub parser: ParserConfig,
    pub rate_limit: RateLimitConfig,
    pub replay: ReplayConfig,
    pub voice: VoiceConfig,
    pub risk: RiskWeights,
    pub validator: ValidatorConfig,
}

impl PipelineConfig {
    /// Load configuration from environment variables over defaults.
    pub fn from_env() -> Self {
        load()
    }

    /// Load in precedence order: defaults, then the optional TOML policy
    /// file, then `ECHOPAY_*` environment overrides.
    pub fn from_sources(policy_file: Option<&Path>) -> Result<Self, ConfigError> {
        let seed = match policy_file {
            Some(path) => SecurityConfig::from_toml_file(path)?,
            None => SecurityConfig::default(),
        };
        Ok(Self {
            security: load_security_config(seed),
            parser: load_parser_config(),
            rate_limit: RateLimitConfig::default(),
            replay: ReplayConfig::default(),
            voice: VoiceConfig::default(),
            risk: RiskWeights::default(),
            validator: load_validator_config(),
        })
    }

    /// Serializable summary of the effective tuning values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            rate_limit_per_hour: self.security.rate_limit_per_hour,
            device_quota_multiplier: self.rate_limit.device_multiplier,
            origin_quota_multiplier: self.rate_limit.origin_multiplier,
            replay_window_ms: self.security.replay_window_ms,
            max_amount_without_mfa: self.security.max_amount_without_mfa,
            require_biometric: self.security.require_biometric,
            voice_verification_required: self.security.voice_verification_required,
            encryption_required: self.security.encryption_required,
            confidence_floor: self.parser.confidence_floor,
            fuzzy_threshold: self.parser.fuzzy_threshold,
            default_currency: self.parser.default_currency.clone(),
            voice_accept_threshold: self.voice.accept_threshold,
            voice_enroll_threshold: self.voice.enroll_threshold,
            multifactor_threshold: self.risk.multifactor_threshold,
            biometric_threshold: self.risk.biometric_threshold,
            oracle_timeout_ms: self.validator.oracle_timeout.as_millis() as u64,
        }
    }
}

/// Effective tuning summary (serializable, for startup logging).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub rate_limit_per_hour: u32,
    pub device_quota_multiplier: u32,
    pub origin_quota_multiplier: u32,
    pub replay_window_ms: u64,
    pub max_amount_without_mfa: Decimal,
    pub require_biometric: bool,
    pub voice_verification_required: bool,
    pub encryption_required: bool,
    pub confidence_floor: f64,
    pub fuzzy_threshold: f64,
    pub default_currency: String,
    pub voice_accept_threshold: f64,
    pub voice_enroll_threshold: f64,
    pub multifactor_threshold: u8,
    pub biometric_threshold: u8,
    pub oracle_timeout_ms: u64,
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse an `f64` env var, returning `default` on missing or invalid.
fn parse_f64(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<f64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var ("true"/"false"/"1"/"0"), `default` otherwise.
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Parse a decimal env var, returning `default` on missing or invalid.
fn parse_decimal(key: &str, default: Decimal) -> Decimal {
    match std::env::var(key) {
        Ok(val) => Decimal::from_str(&val).unwrap_or(default),
        Err(_) => default,
    }
}

fn load_security_config(defaults: SecurityConfig) -> SecurityConfig {
    let max_amount = parse_decimal("ECHOPAY_MAX_AMOUNT_WITHOUT_MFA", defaults.max_amount_without_mfa);
    let replay_window_ms = parse_u64("ECHOPAY_REPLAY_WINDOW_MS", defaults.replay_window_ms);
    SecurityConfig {
        require_biometric: parse_bool("ECHOPAY_REQUIRE_BIOMETRIC", defaults.require_biometric),
        rate_limit_per_hour: parse_u32("ECHOPAY_RATE_LIMIT_PER_HOUR", defaults.rate_limit_per_hour),
        max_amount_without_mfa: max_amount.max(Decimal::ZERO),
        replay_window_ms: replay_window_ms.max(1_000), // floor: 1s
        encryption_required: parse_bool("ECHOPAY_ENCRYPTION_REQUIRED", defaults.encryption_required),
        voice_verification_required: parse_bool(
            "ECHOPAY_VOICE_VERIFICATION_REQUIRED",
            defaults.voice_verification_required,
        ),
    }
}

fn load_parser_config() -> ParserConfig {
    let mut parser = ParserConfig::default();
    parser.confidence_floor =
        parse_f64("ECHOPAY_CONFIDENCE_FLOOR", parser.confidence_floor).clamp(0.0, 1.0);
    parser.fuzzy_threshold =
        parse_f64("ECHOPAY_FUZZY_THRESHOLD", parser.fuzzy_threshold).clamp(0.0, 1.0);
    if let Ok(currency) = std::env::var("ECHOPAY_DEFAULT_CURRENCY") {
        let currency = currency.trim();
        if !currency.is_empty() {
            parser.default_currency = currency.to_ascii_uppercase();
        }
    }
    parser
}

fn load_validator_config() -> ValidatorConfig {
    let mut validator = ValidatorConfig::default();
    let timeout_ms = parse_u64(
        "ECHOPAY_ORACLE_TIMEOUT_MS",
        validator.oracle_timeout.as_millis() as u64,
    );
    validator.oracle_timeout = Duration::from_millis(timeout_ms.max(100)); // floor: 100ms
    if let Ok(policy) = std::env::var("ECHOPAY_FEE_POLICY") {
        match policy.to_ascii_lowercase().as_str() {
            "deny" => validator.fee_policy = FeePolicy::DenyWithoutEstimate,
            "warn" => validator.fee_policy = FeePolicy::WarnAndContinue,
            _ => {}
        }
    }
    validator
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> PipelineConfig {
    PipelineConfig {
        security: load_security_config(SecurityConfig::default()),
        parser: load_parser_config(),
        rate_limit: RateLimitConfig::default(),
        replay: ReplayConfig::default(),
        voice: VoiceConfig::default(),
        risk: RiskWeights::default(),
        validator: load_validator_config(),
    }
}
