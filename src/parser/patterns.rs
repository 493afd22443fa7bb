//! Compiled command grammar.
//!
//! Rules are grouped by command kind and tried in declaration order; the
//! first capturing match wins. Patterns run case-insensitively over the
//! case-preserved transcript so SS58 address tokens survive extraction.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use super::CommandKind;

/// One named pattern inside a rule group.
pub(crate) struct Rule {
    pub name: &'static str,
    pub regex: Regex,
}

/// Ordered patterns for one command kind with its base confidence.
pub(crate) struct RuleGroup {
    pub kind: CommandKind,
    pub base_confidence: f64,
    pub rules: Vec<Rule>,
}

fn rule(name: &'static str, pattern: &str) -> Rule {
    Rule {
        name,
        // Compiled once at parser construction; patterns are static.
        regex: Regex::new(pattern).expect("valid command pattern"),
    }
}

/// The grammar, in match priority order: payment, contact, query, settings.
pub(crate) fn build_rule_groups() -> Vec<RuleGroup> {
    vec![
        RuleGroup {
            kind: CommandKind::Payment,
            base_confidence: 0.90,
            rules: vec![
                rule(
                    "payment.amount_first",
                    r"(?i)(?:send|pay|transfer)\s+(\d+(?:\.\d+)?)\s*([a-zA-Z]{2,5})?\s+to\s+([a-zA-Z0-9]+)",
                ),
                rule(
                    "payment.recipient_first",
                    r"(?i)(?:give|send)\s+([a-zA-Z0-9]+)\s+(\d+(?:\.\d+)?)\s*([a-zA-Z]{2,5})?",
                ),
                rule(
                    "payment.worth_of",
                    r"(?i)(?:transfer|pay)\s+(\d+(?:\.\d+)?)\s+(?:dollars?\s+worth\s+of\s+)?([a-zA-Z]{2,5})?\s+to\s+([a-zA-Z0-9]+)",
                ),
            ],
        },
        RuleGroup {
            kind: CommandKind::Contact,
            base_confidence: 0.85,
            rules: vec![
                rule(
                    "contact.add",
                    r"(?i)(?:add|create)\s+contact\s+([a-zA-Z0-9]+)(?:\s+with\s+address\s+([a-zA-Z0-9]+))?",
                ),
                rule(
                    "contact.remove",
                    r"(?i)(?:remove|delete)\s+contact\s+([a-zA-Z0-9]+)",
                ),
                rule(
                    "contact.list",
                    r"(?i)(?:show|list|display)\s+(?:my\s+)?contacts",
                ),
            ],
        },
        RuleGroup {
            kind: CommandKind::Query,
            base_confidence: 0.90,
            rules: vec![
                rule(
                    "query.balance",
                    r"(?i)(?:what|show|check|display)(?:'s|\s+is)?\s+my\s+balance",
                ),
                rule(
                    "query.history",
                    r"(?i)(?:show|display|list)\s+(?:my\s+)?(?:transaction\s+)?history",
                ),
                rule(
                    "query.status",
                    r"(?i)(?:check|show|what)(?:'s|\s+is)?\s+(?:the\s+)?(?:network\s+)?status",
                ),
                rule(
                    "query.funds",
                    r"(?i)(?:how\s+much|what)\s+(?:money|funds|balance)\s+(?:do\s+i\s+have|have\s+i)",
                ),
            ],
        },
        RuleGroup {
            kind: CommandKind::Settings,
            base_confidence: 0.80,
            rules: vec![
                rule("settings.open", r"(?i)(?:open|show|go\s+to)\s+settings"),
                rule(
                    "settings.update",
                    r"(?i)(?:change|update|modify)\s+(?:my\s+)?(?:security|preferences)",
                ),
                rule(
                    "settings.toggle",
                    r"(?i)(?:enable|disable|turn\s+on|turn\s+off)\s+(biometric|voice\s+verification)",
                ),
            ],
        },
    ]
}

/// SS58 address shape: base58 alphabet, 47 or 48 chars.
pub fn is_valid_address(candidate: &str) -> bool {
    static ADDRESS: OnceLock<Regex> = OnceLock::new();
    let re = ADDRESS
        .get_or_init(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{47,48}$").expect("valid address pattern"));
    re.is_match(candidate)
}

/// Strict decimal parse for amount captures.
pub(crate) fn parse_amount(token: &str) -> Option<Decimal> {
    Decimal::from_str(token).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    #[test]
    fn test_address_shape_accepted() {
        assert!(is_valid_address(ALICE));
        assert!(is_valid_address(&"1".repeat(47)));
        assert!(is_valid_address(&"z".repeat(48)));
    }

    #[test]
    fn test_address_shape_rejected() {
        // Too short, too long, and excluded base58 characters.
        assert!(!is_valid_address(&"1".repeat(46)));
        assert!(!is_valid_address(&"1".repeat(49)));
        assert!(!is_valid_address(&format!("0{}", "1".repeat(46))));
        assert!(!is_valid_address(&format!("O{}", "1".repeat(46))));
        assert!(!is_valid_address(&format!("I{}", "1".repeat(46))));
        assert!(!is_valid_address(&format!("l{}", "1".repeat(46))));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn test_groups_in_priority_order() {
        let groups = build_rule_groups();
        let kinds: Vec<CommandKind> = groups.iter().map(|g| g.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CommandKind::Payment,
                CommandKind::Contact,
                CommandKind::Query,
                CommandKind::Settings,
            ]
        );
    }

    #[test]
    fn test_payment_patterns_capture_groups() {
        let groups = build_rule_groups();
        let payment = &groups[0];

        let caps = payment.rules[0]
            .regex
            .captures("send 5.5 dot to alice")
            .unwrap();
        assert_eq!(&caps[1], "5.5");
        assert_eq!(&caps[2], "dot");
        assert_eq!(&caps[3], "alice");

        let caps = payment.rules[1].regex.captures("give bob 10 wnd").unwrap();
        assert_eq!(&caps[1], "bob");
        assert_eq!(&caps[2], "10");
        assert_eq!(&caps[3], "wnd");

        let caps = payment.rules[2]
            .regex
            .captures("transfer 3 dollars worth of dot to charlie")
            .unwrap();
        assert_eq!(&caps[1], "3");
        assert_eq!(&caps[2], "dot");
        assert_eq!(&caps[3], "charlie");
    }

    #[test]
    fn test_optional_currency_not_swallowed_by_to() {
        let groups = build_rule_groups();
        let caps = groups[0].rules[0].regex.captures("send 5 to alice").unwrap();
        assert_eq!(&caps[1], "5");
        assert!(caps.get(2).is_none());
        assert_eq!(&caps[3], "alice");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("5"), Some(Decimal::from(5)));
        assert!(parse_amount("5.25").is_some());
        assert!(parse_amount("alice").is_none());
        assert!(parse_amount("").is_none());
    }
}
