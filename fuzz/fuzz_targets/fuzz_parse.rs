//! Fuzz target for transcript parsing.
//!
//! Tests that arbitrary strings cannot cause panics in the command parser,
//! and that the parse invariants hold on every input.

#![no_main]

use libfuzzer_sys::fuzz_target;

use echopay_core::parser::{CommandKind, CommandParser, InMemoryContacts, ParserConfig};

fuzz_target!(|data: &str| {
    let contacts = InMemoryContacts::new();
    contacts.add("alice", "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY");
    contacts.add("bob", "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty");

    let parser = CommandParser::new(ParserConfig::default());

    // parse() should never panic on any input
    let command = parser.parse(data, &contacts);

    // Basic invariants that should always hold
    assert!(
        (0.0..=1.0).contains(&command.confidence),
        "confidence {} out of range",
        command.confidence
    );
    assert!(
        command.suggestions.len() <= parser.config().max_suggestions,
        "suggestion cap exceeded"
    );
    if command.kind != CommandKind::Payment {
        assert!(command.amount.is_none(), "non-payment carries an amount");
    }

    // summary() and help_text() should never panic either
    let _ = command.summary();
    let _ = parser.help_text(data);
});
