//! Fuzz target for the at-rest envelope format.
//!
//! Tests that arbitrary byte sequences cannot cause panics or memory issues
//! when decrypted, and that genuine envelopes always round-trip.

#![no_main]

use libfuzzer_sys::fuzz_target;

use echopay_core::security::{AtRestCipher, KEY_SIZE};

fuzz_target!(|data: &[u8]| {
    let cipher = AtRestCipher::new(&[0x42u8; KEY_SIZE]).expect("fixed-size key");

    // Attempt to decrypt arbitrary bytes as an envelope.
    // This should never panic - only return Ok or Err.
    let _ = cipher.decrypt(data);

    // Anything we encrypt ourselves must come back byte for byte.
    let envelope = cipher.encrypt(data).expect("encryption is total");
    let plaintext = cipher.decrypt(&envelope).expect("fresh envelope decrypts");
    assert_eq!(plaintext, data);
});
