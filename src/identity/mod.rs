//! Identity signals: device fingerprints and voice biometrics.
//!
//! Both are advisory. They feed the risk scorer as signals; neither can
//! deny a command on its own.

mod device;
mod voice;

pub use device::{DeviceFingerprint, DeviceRegistry, KnownDevice};
pub use voice::{
    template_hash, CosineComparator, VoiceConfig, VoiceError, VoiceSample, VoiceVerification,
    VoiceVerifier, Voiceprint, VoiceprintComparator,
};
