//! Voice biometric verification.
//!
//! Profiles hold up to a handful of recent voiceprint templates per user.
//! The first sample a user ever presents enrolls them; later samples are
//! compared against every stored template and judged on the best match.
//! High-confidence matches extend the template set so a voice can drift.
//!
//! Comparator failures fail closed: the sample is rejected and nothing
//! about the profile is disclosed.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::telemetry::{log_security_event, SecurityEvent};

/// Feature vector extracted from an utterance.
pub type Voiceprint = Vec<f32>;

/// Errors from voiceprint comparison.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VoiceError {
    #[error("voiceprint dimension mismatch: candidate {candidate}, template {template}")]
    DimensionMismatch { candidate: usize, template: usize },
    #[error("empty voiceprint sample")]
    EmptySample,
}

/// Similarity between a candidate sample and a stored template, in [0, 1].
pub trait VoiceprintComparator: Send + Sync {
    fn compare(&self, candidate: &[f32], template: &[f32]) -> Result<f64, VoiceError>;
}

/// Cosine similarity comparator. Zero-norm vectors score 0.0 rather than
/// erroring, so silence never accidentally verifies.
#[derive(Debug, Default, Clone, Copy)]
pub struct CosineComparator;

impl VoiceprintComparator for CosineComparator {
    fn compare(&self, candidate: &[f32], template: &[f32]) -> Result<f64, VoiceError> {
        if candidate.is_empty() || template.is_empty() {
            return Err(VoiceError::EmptySample);
        }
        if candidate.len() != template.len() {
            return Err(VoiceError::DimensionMismatch {
                candidate: candidate.len(),
                template: template.len(),
            });
        }

        let mut dot = 0.0f64;
        let mut candidate_norm = 0.0f64;
        let mut template_norm = 0.0f64;
        for (a, b) in candidate.iter().zip(template) {
            let (a, b) = (f64::from(*a), f64::from(*b));
            dot += a * b;
            candidate_norm += a * a;
            template_norm += b * b;
        }

        if candidate_norm == 0.0 || template_norm == 0.0 {
            return Ok(0.0);
        }
        Ok((dot / (candidate_norm.sqrt() * template_norm.sqrt())).clamp(0.0, 1.0))
    }
}

/// Stored template with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSample {
    pub template: Voiceprint,
    /// Match confidence at enrollment time; 1.0 for the founding sample.
    pub confidence: f64,
    pub enrolled_at: DateTime<Utc>,
    /// Hex sha-256 of the template bytes.
    pub template_hash: String,
}

/// Outcome of one verification attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoiceVerification {
    pub verified: bool,
    /// Best similarity across stored templates.
    pub confidence: f64,
    /// Whether the user has a voice profile at all.
    pub enrolled: bool,
}

/// Voice verifier tuning.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Best match must strictly exceed this to verify.
    pub accept_threshold: f64,
    /// Verified matches strictly above this extend the template set.
    pub enroll_threshold: f64,
    /// Most recent templates kept per user; oldest evicted first.
    pub max_templates: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.85,
            enroll_threshold: 0.9,
            max_templates: 5,
        }
    }
}

/// Per-user voice profiles behind one lock; verification mutates the
/// profile (auto-enroll, template extension), so reads and writes share it.
pub struct VoiceVerifier {
    profiles: Mutex<HashMap<String, Vec<VoiceSample>>>,
    comparator: Box<dyn VoiceprintComparator>,
    config: VoiceConfig,
}

impl VoiceVerifier {
    pub fn new(config: VoiceConfig) -> Self {
        Self::with_comparator(config, Box::new(CosineComparator))
    }

    pub fn with_comparator(config: VoiceConfig, comparator: Box<dyn VoiceprintComparator>) -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
            comparator,
            config,
        }
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    /// Verify with the wall clock.
    pub fn verify(&self, user_id: &str, sample: &[f32]) -> VoiceVerification {
        self.verify_at(user_id, sample, Utc::now())
    }

    /// Verify a sample against the user's profile, enrolling on first
    /// contact and extending on high-confidence matches.
    pub fn verify_at(&self, user_id: &str, sample: &[f32], now: DateTime<Utc>) -> VoiceVerification {
        if sample.is_empty() {
            log_security_event(
                SecurityEvent::VoiceVerifyFailed,
                "Empty voice sample rejected",
                &[("user", user_id)],
            );
            return VoiceVerification {
                verified: false,
                confidence: 0.0,
                enrolled: false,
            };
        }

        let mut profiles = self.profiles.lock();
        let templates = profiles.entry(user_id.to_string()).or_default();

        if templates.is_empty() {
            templates.push(make_sample(sample, 1.0, now));
            log_security_event(
                SecurityEvent::VoiceEnrolled,
                "First voice sample enrolled",
                &[("user", user_id)],
            );
            return VoiceVerification {
                verified: true,
                confidence: 1.0,
                enrolled: true,
            };
        }

        let mut best = 0.0f64;
        for stored in templates.iter() {
            match self.comparator.compare(sample, &stored.template) {
                Ok(similarity) => best = best.max(similarity),
                Err(e) => {
                    log_security_event(
                        SecurityEvent::VoiceVerifyFailed,
                        "Voiceprint comparison failed",
                        &[("user", user_id), ("detail", &e.to_string())],
                    );
                    return VoiceVerification {
                        verified: false,
                        confidence: 0.0,
                        enrolled: false,
                    };
                }
            }
        }

        let verified = best > self.config.accept_threshold;
        if verified {
            log_security_event(
                SecurityEvent::VoiceVerified,
                "Voice sample verified",
                &[("user", user_id), ("confidence", &format!("{best:.3}"))],
            );
            if best > self.config.enroll_threshold {
                templates.push(make_sample(sample, best, now));
                if templates.len() > self.config.max_templates {
                    templates.remove(0);
                }
            }
        }

        VoiceVerification {
            verified,
            confidence: best,
            enrolled: true,
        }
    }

    /// Number of stored templates for a user.
    pub fn template_count(&self, user_id: &str) -> usize {
        self.profiles.lock().get(user_id).map_or(0, Vec::len)
    }

    pub fn is_enrolled(&self, user_id: &str) -> bool {
        self.template_count(user_id) > 0
    }

    /// Drop a user's profile entirely. Returns true if one existed.
    pub fn forget(&self, user_id: &str) -> bool {
        self.profiles.lock().remove(user_id).is_some()
    }

    /// Ordered copy of all profiles, for at-rest persistence.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<VoiceSample>> {
        self.profiles
            .lock()
            .iter()
            .map(|(user, samples)| (user.clone(), samples.clone()))
            .collect()
    }

    /// Replace all profiles with a snapshot.
    pub fn restore(&self, snapshot: BTreeMap<String, Vec<VoiceSample>>) {
        let mut profiles = self.profiles.lock();
        profiles.clear();
        profiles.extend(snapshot);
    }
}

fn make_sample(template: &[f32], confidence: f64, now: DateTime<Utc>) -> VoiceSample {
    VoiceSample {
        template: template.to_vec(),
        confidence,
        enrolled_at: now,
        template_hash: template_hash(template),
    }
}

/// Hex sha-256 over the little-endian template bytes.
pub fn template_hash(template: &[f32]) -> String {
    let mut hasher = Sha256::new();
    for value in template {
        hasher.update(value.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}
