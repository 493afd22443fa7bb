//! Voice command interpretation.
//!
//! Turns a raw transcript into a typed [`ParsedCommand`] by running an
//! ordered rule table over the normalized text. Each rule pairs a compiled
//! pattern with an extractor keyed by the rule name, so classification never
//! depends on ad hoc keyword scans of the whole utterance. Confidence starts
//! at the matched group's base and is scaled by named penalties and boosts;
//! anything below the floor gets recovery suggestions attached.
//!
//! Normalization is NFKC plus trimming and never lowercases: SS58 address
//! tokens are case-sensitive, so patterns match case-insensitively instead.

mod contacts;
mod patterns;
mod suggest;

pub use contacts::{
    find_fuzzy, levenshtein, similarity, Contact, ContactDirectory, InMemoryContacts,
};
pub use patterns::is_valid_address;
pub use suggest::SuggestionEngine;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use regex::Captures;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use patterns::{build_rule_groups, parse_amount, RuleGroup};

/// Base confidence for transcripts no rule recognizes.
const UNKNOWN_BASE_CONFIDENCE: f64 = 0.1;

/// Command categories, in match priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Payment,
    Contact,
    Query,
    Settings,
    Unknown,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Payment => "payment",
            CommandKind::Contact => "contact",
            CommandKind::Query => "query",
            CommandKind::Settings => "settings",
            CommandKind::Unknown => "unknown",
        }
    }
}

/// Interpretation of one transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub kind: CommandKind,
    pub action: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub recipient: Option<String>,
    /// Resolved SS58 address when the recipient maps to one.
    pub recipient_address: Option<String>,
    /// Interpretation confidence in [0, 1].
    pub confidence: f64,
    /// Recovery examples, present only below the confidence floor.
    pub suggestions: Vec<String>,
    pub parameters: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl ParsedCommand {
    fn new(kind: CommandKind, action: &str, confidence: f64) -> Self {
        Self {
            kind,
            action: action.to_string(),
            amount: None,
            currency: None,
            recipient: None,
            recipient_address: None,
            confidence,
            suggestions: Vec::new(),
            parameters: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// One-line rendering for confirmation prompts.
    pub fn summary(&self) -> String {
        match self.kind {
            CommandKind::Payment => {
                let amount = self
                    .amount
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "?".to_string());
                let currency = self.currency.as_deref().unwrap_or("?");
                let recipient = self.recipient.as_deref().unwrap_or("?");
                format!("Send {amount} {currency} to {recipient}")
            }
            CommandKind::Contact => {
                let recipient = self.recipient.as_deref().unwrap_or("");
                format!("{} contact {}", self.action, recipient)
                    .trim_end()
                    .to_string()
            }
            CommandKind::Query => format!("Show {}", self.action),
            CommandKind::Settings => format!("{} settings", self.action),
            CommandKind::Unknown => "Unknown command".to_string(),
        }
    }
}

/// Parser tuning. All multipliers apply to the matched group's base
/// confidence; the floor decides when suggestions are attached.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Below this, suggestions are attached to the parse.
    pub confidence_floor: f64,
    /// Similarity a fuzzy contact match must strictly exceed.
    pub fuzzy_threshold: f64,
    /// Uppercase ticker assumed when the transcript names none.
    pub default_currency: String,
    /// Recognized tickers, lowercase.
    pub currencies: Vec<String>,
    pub max_suggestions: usize,
    /// Missing or non-positive amount.
    pub missing_amount_penalty: f64,
    /// Currency token present but not a recognized ticker.
    pub unknown_currency_penalty: f64,
    /// Recipient resolved through the contact directory exactly.
    pub exact_contact_boost: f64,
    /// Recipient given as a raw address instead of a name.
    pub raw_address_penalty: f64,
    /// Recipient resolved by fuzzy match.
    pub fuzzy_contact_penalty: f64,
    /// Recipient resolved to nothing.
    pub unresolved_recipient_penalty: f64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.7,
            fuzzy_threshold: 0.6,
            default_currency: "DOT".to_string(),
            currencies: ["dot", "wnd", "usdc", "ksm", "glmr", "astr"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_suggestions: 3,
            missing_amount_penalty: 0.5,
            unknown_currency_penalty: 0.8,
            exact_contact_boost: 1.1,
            raw_address_penalty: 0.9,
            fuzzy_contact_penalty: 0.8,
            unresolved_recipient_penalty: 0.5,
        }
    }
}

/// NFKC-normalize and trim a transcript. Curly apostrophes from speech
/// transcription collapse to ASCII so contraction patterns match.
pub fn normalize(input: &str) -> String {
    input
        .nfkc()
        .collect::<String>()
        .replace('\u{2019}', "'")
        .trim()
        .to_string()
}

/// Compiled rule table plus tuning. Construction compiles every pattern;
/// parsing is read-only and shares across threads.
pub struct CommandParser {
    config: ParserConfig,
    groups: Vec<RuleGroup>,
    suggester: SuggestionEngine,
}

impl CommandParser {
    pub fn new(config: ParserConfig) -> Self {
        let suggester = SuggestionEngine::new(config.max_suggestions);
        Self {
            config,
            groups: build_rule_groups(),
            suggester,
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse with the wall clock.
    pub fn parse(&self, input: &str, contacts: &dyn ContactDirectory) -> ParsedCommand {
        self.parse_at(input, contacts, Utc::now())
    }

    /// Parse with an injected timestamp.
    pub fn parse_at(
        &self,
        input: &str,
        contacts: &dyn ContactDirectory,
        now: DateTime<Utc>,
    ) -> ParsedCommand {
        let normalized = normalize(input);
        let lower = normalized.to_lowercase();

        if normalized.is_empty() {
            let mut cmd = ParsedCommand::new(CommandKind::Unknown, "unknown", 0.0);
            cmd.parameters
                .insert("original_command".to_string(), normalized);
            return self.finalize(cmd, &lower, now);
        }

        for group in &self.groups {
            for rule in &group.rules {
                let Some(caps) = rule.regex.captures(&normalized) else {
                    continue;
                };
                let mut cmd = match group.kind {
                    CommandKind::Payment => {
                        self.extract_payment(&caps, group.base_confidence, contacts)
                    }
                    CommandKind::Contact => extract_contact(rule.name, &caps, group.base_confidence),
                    CommandKind::Query => extract_query(rule.name, group.base_confidence),
                    CommandKind::Settings => {
                        extract_settings(rule.name, &caps, &lower, group.base_confidence)
                    }
                    CommandKind::Unknown => continue,
                };
                cmd.parameters
                    .insert("original_command".to_string(), normalized.clone());
                cmd.parameters
                    .insert("rule".to_string(), rule.name.to_string());
                return self.finalize(cmd, &lower, now);
            }
        }

        let mut cmd = ParsedCommand::new(CommandKind::Unknown, "unknown", UNKNOWN_BASE_CONFIDENCE);
        cmd.parameters
            .insert("original_command".to_string(), normalized);
        self.finalize(cmd, &lower, now)
    }

    /// Recovery text for an unrecognized transcript.
    pub fn help_text(&self, input: &str) -> String {
        self.suggester.help_text(&normalize(input).to_lowercase())
    }

    fn finalize(&self, mut cmd: ParsedCommand, lower: &str, now: DateTime<Utc>) -> ParsedCommand {
        cmd.confidence = cmd.confidence.clamp(0.0, 1.0);
        if cmd.confidence < self.config.confidence_floor {
            cmd.suggestions = self.suggester.suggest(lower);
        }
        cmd.timestamp = now;
        cmd
    }

    fn extract_payment(
        &self,
        caps: &Captures<'_>,
        base: f64,
        contacts: &dyn ContactDirectory,
    ) -> ParsedCommand {
        let c1 = caps.get(1).map(|m| m.as_str().to_string());
        let c2 = caps.get(2).map(|m| m.as_str().to_string());
        let c3 = caps.get(3).map(|m| m.as_str().to_string());

        // The recipient-first form puts a name in the first slot; every
        // amount-first form puts digits there.
        let first_is_name = c1
            .as_deref()
            .map_or(false, |token| parse_amount(token).is_none());
        let (amount_token, currency_token, recipient_token) = if first_is_name {
            (c2, c3, c1)
        } else {
            (c1.clone(), c2, c3.or(c1))
        };

        let mut confidence = base;

        let amount = amount_token.as_deref().and_then(parse_amount);
        if amount.map_or(true, |a| a <= Decimal::ZERO) {
            confidence *= self.config.missing_amount_penalty;
        }

        let mut currency = self.config.default_currency.clone();
        if let Some(token) = &currency_token {
            let ticker = token.to_lowercase();
            if self.config.currencies.iter().any(|c| *c == ticker) {
                currency = token.to_uppercase();
            } else {
                confidence *= self.config.unknown_currency_penalty;
            }
        }

        let mut recipient = recipient_token;
        let mut recipient_address = None;
        if let Some(name) = recipient.clone() {
            if let Some(contact) = contacts.find(&name) {
                recipient_address = Some(contact.address);
                confidence *= self.config.exact_contact_boost;
            } else if is_valid_address(&name) {
                recipient_address = Some(name);
                confidence *= self.config.raw_address_penalty;
            } else if let Some(contact) = find_fuzzy(contacts, &name, self.config.fuzzy_threshold) {
                recipient = Some(contact.name);
                recipient_address = Some(contact.address);
                confidence *= self.config.fuzzy_contact_penalty;
            } else {
                confidence *= self.config.unresolved_recipient_penalty;
            }
        }

        let mut cmd = ParsedCommand::new(CommandKind::Payment, "send", confidence);
        cmd.amount = amount;
        cmd.currency = Some(currency);
        cmd.recipient = recipient;
        cmd.recipient_address = recipient_address;
        cmd
    }
}

fn extract_contact(rule_name: &str, caps: &Captures<'_>, base: f64) -> ParsedCommand {
    match rule_name {
        "contact.add" => {
            let mut cmd = ParsedCommand::new(CommandKind::Contact, "add", base);
            if let Some(name) = caps.get(1) {
                cmd.recipient = Some(name.as_str().to_string());
                cmd.parameters
                    .insert("contact_name".to_string(), name.as_str().to_string());
            }
            if let Some(address) = caps.get(2) {
                cmd.recipient_address = Some(address.as_str().to_string());
                cmd.parameters
                    .insert("contact_address".to_string(), address.as_str().to_string());
            }
            cmd
        }
        "contact.remove" => {
            let mut cmd = ParsedCommand::new(CommandKind::Contact, "remove", base);
            if let Some(name) = caps.get(1) {
                cmd.recipient = Some(name.as_str().to_string());
                cmd.parameters
                    .insert("contact_name".to_string(), name.as_str().to_string());
            }
            cmd
        }
        _ => ParsedCommand::new(CommandKind::Contact, "list", base),
    }
}

fn extract_query(rule_name: &str, base: f64) -> ParsedCommand {
    // query.funds is a phrasing of the balance question.
    let action = match rule_name {
        "query.history" => "history",
        "query.status" => "status",
        _ => "balance",
    };
    let mut cmd = ParsedCommand::new(CommandKind::Query, action, base);
    cmd.parameters
        .insert("query_type".to_string(), action.to_string());
    cmd
}

fn extract_settings(rule_name: &str, caps: &Captures<'_>, lower: &str, base: f64) -> ParsedCommand {
    match rule_name {
        "settings.toggle" => {
            let action = if lower.contains("disable") || lower.contains("turn off") {
                "disable"
            } else {
                "enable"
            };
            let mut cmd = ParsedCommand::new(CommandKind::Settings, action, base);
            if let Some(feature) = caps.get(1) {
                let feature = feature
                    .as_str()
                    .to_lowercase()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                cmd.parameters.insert("feature".to_string(), feature);
            }
            cmd
        }
        "settings.update" => ParsedCommand::new(CommandKind::Settings, "update", base),
        _ => ParsedCommand::new(CommandKind::Settings, "open", base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ALICE_ADDR: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const BOB_ADDR: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";

    fn parser() -> CommandParser {
        CommandParser::new(ParserConfig::default())
    }

    fn directory() -> InMemoryContacts {
        let contacts = InMemoryContacts::new();
        contacts.add("alice", ALICE_ADDR);
        contacts.add("bob", BOB_ADDR);
        contacts
    }

    #[test]
    fn test_normalize_preserves_address_case() {
        let normalized = normalize(&format!("  send 5 dot to {ALICE_ADDR} "));
        assert!(normalized.contains(ALICE_ADDR));
        assert!(!normalized.ends_with(' '));
    }

    #[test]
    fn test_normalize_folds_fullwidth_and_apostrophes() {
        assert_eq!(normalize("ｗｈａｔ\u{2019}ｓ"), "what's");
    }

    #[test]
    fn test_empty_input_is_unknown_with_zero_confidence() {
        let cmd = parser().parse("   ", &directory());
        assert_eq!(cmd.kind, CommandKind::Unknown);
        assert_eq!(cmd.confidence, 0.0);
        assert!(!cmd.suggestions.is_empty());
    }

    #[test]
    fn test_exact_contact_payment() {
        let cmd = parser().parse("send 5 dot to alice", &directory());
        assert_eq!(cmd.kind, CommandKind::Payment);
        assert_eq!(cmd.action, "send");
        assert_eq!(cmd.amount, Some(dec!(5)));
        assert_eq!(cmd.currency.as_deref(), Some("DOT"));
        assert_eq!(cmd.recipient.as_deref(), Some("alice"));
        assert_eq!(cmd.recipient_address.as_deref(), Some(ALICE_ADDR));
        // 0.9 boosted by the exact contact match, clamped to 1.0.
        assert!((cmd.confidence - 0.99).abs() < 1e-9);
        assert!(cmd.suggestions.is_empty());
    }

    #[test]
    fn test_payment_defaults_currency_without_penalty() {
        let cmd = parser().parse("send 5 to alice", &directory());
        assert_eq!(cmd.currency.as_deref(), Some("DOT"));
        assert!((cmd.confidence - 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_currency_keeps_default_and_pays_penalty() {
        let cmd = parser().parse("send 5 xyz to alice", &directory());
        assert_eq!(cmd.currency.as_deref(), Some("DOT"));
        // 0.9 * 0.8 * 1.1
        assert!((cmd.confidence - 0.792).abs() < 1e-9);
    }

    #[test]
    fn test_recipient_first_form() {
        let cmd = parser().parse("give bob 10 wnd", &directory());
        assert_eq!(cmd.kind, CommandKind::Payment);
        assert_eq!(cmd.amount, Some(dec!(10)));
        assert_eq!(cmd.currency.as_deref(), Some("WND"));
        assert_eq!(cmd.recipient.as_deref(), Some("bob"));
        assert_eq!(cmd.recipient_address.as_deref(), Some(BOB_ADDR));
    }

    #[test]
    fn test_raw_address_recipient() {
        let cmd = parser().parse(&format!("send 2 dot to {ALICE_ADDR}"), &directory());
        assert_eq!(cmd.recipient_address.as_deref(), Some(ALICE_ADDR));
        // 0.9 * 0.9
        assert!((cmd.confidence - 0.81).abs() < 1e-9);
    }

    #[test]
    fn test_fuzzy_recipient_substitutes_canonical_name() {
        let cmd = parser().parse("send 5 dot to alicia", &directory());
        assert_eq!(cmd.recipient.as_deref(), Some("alice"));
        assert_eq!(cmd.recipient_address.as_deref(), Some(ALICE_ADDR));
        // 0.9 * 0.8, above the floor so no suggestions.
        assert!((cmd.confidence - 0.72).abs() < 1e-9);
        assert!(cmd.suggestions.is_empty());
    }

    #[test]
    fn test_unresolved_recipient_attracts_suggestions() {
        let cmd = parser().parse("send 5 dot to zorblax", &directory());
        // 0.9 * 0.5 lands under the floor.
        assert!((cmd.confidence - 0.45).abs() < 1e-9);
        assert!(!cmd.suggestions.is_empty());
        assert!(cmd.suggestions.len() <= 3);
    }

    #[test]
    fn test_zero_amount_penalized() {
        let cmd = parser().parse("send 0 dot to alice", &directory());
        assert_eq!(cmd.amount, Some(Decimal::ZERO));
        // 0.9 * 0.5 * 1.1
        assert!((cmd.confidence - 0.495).abs() < 1e-9);
    }

    #[test]
    fn test_worth_of_form() {
        let cmd = parser().parse("transfer 3 dollars worth of dot to bob", &directory());
        assert_eq!(cmd.amount, Some(dec!(3)));
        assert_eq!(cmd.currency.as_deref(), Some("DOT"));
        assert_eq!(cmd.recipient.as_deref(), Some("bob"));
    }

    #[test]
    fn test_contact_add_with_address() {
        let cmd = parser().parse(&format!("add contact dave with address {BOB_ADDR}"), &directory());
        assert_eq!(cmd.kind, CommandKind::Contact);
        assert_eq!(cmd.action, "add");
        assert_eq!(cmd.recipient.as_deref(), Some("dave"));
        assert_eq!(cmd.recipient_address.as_deref(), Some(BOB_ADDR));
        assert_eq!(cmd.parameters.get("contact_address").map(String::as_str), Some(BOB_ADDR));
    }

    #[test]
    fn test_contact_list_variants() {
        for input in ["show my contacts", "list contacts", "display my contacts"] {
            let cmd = parser().parse(input, &directory());
            assert_eq!(cmd.kind, CommandKind::Contact, "{input}");
            assert_eq!(cmd.action, "list", "{input}");
        }
    }

    #[test]
    fn test_query_actions() {
        let parser = parser();
        let dir = directory();
        assert_eq!(parser.parse("what's my balance", &dir).action, "balance");
        assert_eq!(parser.parse("show transaction history", &dir).action, "history");
        assert_eq!(parser.parse("check network status", &dir).action, "status");
        assert_eq!(parser.parse("how much money do i have", &dir).action, "balance");
    }

    #[test]
    fn test_settings_toggle_extracts_feature() {
        let cmd = parser().parse("turn off voice verification", &directory());
        assert_eq!(cmd.kind, CommandKind::Settings);
        assert_eq!(cmd.action, "disable");
        assert_eq!(
            cmd.parameters.get("feature").map(String::as_str),
            Some("voice verification")
        );
    }

    #[test]
    fn test_payment_takes_priority_over_query() {
        let cmd = parser().parse("send 5 dot to alice and show my balance", &directory());
        assert_eq!(cmd.kind, CommandKind::Payment);
    }

    #[test]
    fn test_unrecognized_input_keeps_low_base() {
        let cmd = parser().parse("make me a sandwich", &directory());
        assert_eq!(cmd.kind, CommandKind::Unknown);
        assert!((cmd.confidence - UNKNOWN_BASE_CONFIDENCE).abs() < 1e-9);
        assert!(!cmd.suggestions.is_empty());
    }

    #[test]
    fn test_summary_strings() {
        let parser = parser();
        let dir = directory();
        assert_eq!(
            parser.parse("send 5 dot to alice", &dir).summary(),
            "Send 5 DOT to alice"
        );
        assert_eq!(parser.parse("add contact dave", &dir).summary(), "add contact dave");
        assert_eq!(parser.parse("list contacts", &dir).summary(), "list contact");
        assert_eq!(parser.parse("what's my balance", &dir).summary(), "Show balance");
        assert_eq!(parser.parse("open settings", &dir).summary(), "open settings");
        assert_eq!(parser.parse("gibberish", &dir).summary(), "Unknown command");
    }

    #[test]
    fn test_timestamp_is_injected() {
        let now = Utc::now();
        let cmd = parser().parse_at("send 5 dot to alice", &directory(), now);
        assert_eq!(cmd.timestamp, now);
    }

    #[test]
    fn test_parameters_carry_original_and_rule() {
        let cmd = parser().parse("Send 5 DOT to Alice", &directory());
        assert_eq!(
            cmd.parameters.get("original_command").map(String::as_str),
            Some("Send 5 DOT to Alice")
        );
        assert_eq!(
            cmd.parameters.get("rule").map(String::as_str),
            Some("payment.amount_first")
        );
    }
}
