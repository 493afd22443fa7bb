//! Recovery suggestions for low-confidence transcripts.
//!
//! Keyword hits are matched with Aho-Corasick over the lowercased input;
//! a digit anywhere also counts as payment intent.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};

const PAYMENT_KEYWORDS: &[&str] = &["send", "pay", "transfer"];
const QUERY_KEYWORDS: &[&str] = &["balance", "check", "show", "what"];
const CONTACT_KEYWORDS: &[&str] = &["contact", "add", "list"];

const PAYMENT_EXAMPLES: &[&str] = &[
    "Try: \"Send 5 DOT to Alice\"",
    "Try: \"Pay 10 WND to Bob\"",
    "Try: \"Transfer 2.5 DOT to Charlie\"",
];
const QUERY_EXAMPLES: &[&str] = &[
    "Try: \"What's my balance?\"",
    "Try: \"Show transaction history\"",
    "Try: \"Check network status\"",
];
const CONTACT_EXAMPLES: &[&str] = &[
    "Try: \"Add contact Alice\"",
    "Try: \"Show my contacts\"",
    "Try: \"Remove contact Bob\"",
];
const DEFAULT_EXAMPLES: &[&str] = &[
    "Try: \"Send 5 DOT to Alice\"",
    "Try: \"What's my balance?\"",
    "Try: \"Show my contacts\"",
    "Try: \"Open settings\"",
];

/// Builds example phrases matched to whatever intent the input hints at.
pub struct SuggestionEngine {
    payment: AhoCorasick,
    query: AhoCorasick,
    contact: AhoCorasick,
    max_suggestions: usize,
}

impl SuggestionEngine {
    pub fn new(max_suggestions: usize) -> Self {
        Self {
            payment: keyword_matcher(PAYMENT_KEYWORDS),
            query: keyword_matcher(QUERY_KEYWORDS),
            contact: keyword_matcher(CONTACT_KEYWORDS),
            max_suggestions,
        }
    }

    /// Category examples for every intent the input hints at, capped at
    /// `max_suggestions`. Unrecognizable input gets the default set.
    pub fn suggest(&self, input: &str) -> Vec<String> {
        let mut suggestions: Vec<String> = Vec::new();

        if self.payment.is_match(input) || input.chars().any(|c| c.is_ascii_digit()) {
            suggestions.extend(PAYMENT_EXAMPLES.iter().map(|s| s.to_string()));
        }
        if self.query.is_match(input) {
            suggestions.extend(QUERY_EXAMPLES.iter().map(|s| s.to_string()));
        }
        if self.contact.is_match(input) {
            suggestions.extend(CONTACT_EXAMPLES.iter().map(|s| s.to_string()));
        }
        if suggestions.is_empty() {
            suggestions.extend(DEFAULT_EXAMPLES.iter().map(|s| s.to_string()));
        }

        suggestions.truncate(self.max_suggestions);
        suggestions
    }

    /// One-line recovery message for surfacing to the speaker.
    pub fn help_text(&self, input: &str) -> String {
        format!(
            "I didn't understand that command. {}",
            self.suggest(input).join(", ")
        )
    }
}

fn keyword_matcher(keywords: &[&str]) -> AhoCorasick {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .build(keywords)
        .expect("valid keyword patterns")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_keywords_yield_payment_examples() {
        let engine = SuggestionEngine::new(3);
        let suggestions = engine.suggest("send everything somewhere");
        assert_eq!(suggestions.len(), 3);
        assert!(suggestions[0].contains("Send 5 DOT to Alice"));
    }

    #[test]
    fn test_digits_count_as_payment_intent() {
        let engine = SuggestionEngine::new(3);
        let suggestions = engine.suggest("uh 50 something");
        assert!(suggestions[0].contains("Send 5 DOT to Alice"));
    }

    #[test]
    fn test_query_keywords_yield_query_examples() {
        let engine = SuggestionEngine::new(3);
        let suggestions = engine.suggest("what was that");
        assert!(suggestions[0].contains("balance"));
    }

    #[test]
    fn test_unrecognizable_input_gets_default_set() {
        let engine = SuggestionEngine::new(3);
        let suggestions = engine.suggest("gouda or cheddar");
        assert_eq!(suggestions.len(), 3);
        assert!(suggestions[0].contains("Send 5 DOT to Alice"));
        assert!(suggestions[1].contains("balance"));
    }

    #[test]
    fn test_cap_applies_across_categories() {
        let engine = SuggestionEngine::new(3);
        // Hits payment, query, and contact sets at once.
        let suggestions = engine.suggest("send check contact");
        assert_eq!(suggestions.len(), 3);
    }

    #[test]
    fn test_empty_input_is_not_payment() {
        let engine = SuggestionEngine::new(4);
        let suggestions = engine.suggest("");
        assert_eq!(suggestions.len(), 4);
        assert!(suggestions[3].contains("Open settings"));
    }
}
