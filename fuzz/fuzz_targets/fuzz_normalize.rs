//! Fuzz target for transcript normalization.
//!
//! Normalization runs ahead of replay hashing, so it must be total and
//! idempotent: hashing a normalized transcript twice has to agree.

#![no_main]

use libfuzzer_sys::fuzz_target;

use echopay_core::guards::command_hash;
use echopay_core::parser::normalize;

fuzz_target!(|data: &str| {
    let once = normalize(data);
    let twice = normalize(&once);
    assert_eq!(once, twice, "normalize must be idempotent");

    // Replay keys over normalized text must be stable.
    let a = command_hash("fuzz-user", &once, 0);
    let b = command_hash("fuzz-user", &twice, 0);
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
});
