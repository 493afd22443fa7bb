//! Contact directory and fuzzy name resolution.
//!
//! Voice transcripts mangle names, so recipient resolution falls back to
//! normalized edit-distance matching over the known contacts.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A known payee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Display name. Lookups are case-insensitive.
    pub name: String,
    /// SS58 account address.
    pub address: String,
    /// Whether the address has been confirmed out of band.
    pub verified: bool,
}

/// Read-only view of known payees used during recipient resolution.
pub trait ContactDirectory: Send + Sync {
    /// Case-insensitive exact lookup.
    fn find(&self, name: &str) -> Option<Contact>;

    /// All contacts, for fuzzy scans.
    fn all(&self) -> Vec<Contact>;
}

/// In-memory contact directory keyed by lowercased name.
#[derive(Default)]
pub struct InMemoryContacts {
    entries: RwLock<HashMap<String, Contact>>,
}

impl InMemoryContacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an unverified contact.
    pub fn add(&self, name: &str, address: &str) {
        self.insert(Contact {
            name: name.to_string(),
            address: address.to_string(),
            verified: false,
        });
    }

    /// Insert or replace a contact.
    pub fn insert(&self, contact: Contact) {
        self.entries
            .write()
            .insert(contact.name.to_lowercase(), contact);
    }

    /// Remove a contact. Returns true if it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.entries.write().remove(&name.to_lowercase()).is_some()
    }

    /// All contacts sorted by name, for list displays.
    pub fn list(&self) -> Vec<Contact> {
        let mut contacts: Vec<Contact> = self.entries.read().values().cloned().collect();
        contacts.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        contacts
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ContactDirectory for InMemoryContacts {
    fn find(&self, name: &str) -> Option<Contact> {
        self.entries.read().get(&name.to_lowercase()).cloned()
    }

    fn all(&self) -> Vec<Contact> {
        self.entries.read().values().cloned().collect()
    }
}

/// Best fuzzy match strictly above `threshold`, or None.
///
/// Ties keep the earlier candidate; a later contact must strictly beat the
/// current best to replace it.
pub fn find_fuzzy(
    directory: &dyn ContactDirectory,
    name: &str,
    threshold: f64,
) -> Option<Contact> {
    let name = name.to_lowercase();
    let mut best: Option<(f64, Contact)> = None;

    for contact in directory.all() {
        let score = similarity(&name, &contact.name.to_lowercase());
        if score > threshold && best.as_ref().map_or(true, |(b, _)| score > *b) {
            best = Some((score, contact));
        }
    }

    best.map(|(_, contact)| contact)
}

/// Normalized similarity in [0, 1]: 1.0 is identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longer = a.chars().count().max(b.chars().count());
    if longer == 0 {
        return 1.0;
    }
    let distance = levenshtein(a, b);
    (longer - distance) as f64 / longer as f64
}

/// Edit distance over chars, two-row dynamic programming.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> InMemoryContacts {
        let contacts = InMemoryContacts::new();
        contacts.add("alice", "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY");
        contacts.add("bob", "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty");
        contacts.add("charlie", "5FLSigC9HGRKVhB9FiEo4Y3koPsNmBmLJbpXg2mp1hXcS59Y");
        contacts
    }

    #[test]
    fn test_levenshtein_known_distances() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("alice", "alice"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("alice", "alice"), 1.0);
        assert!(similarity("alice", "alicia") > 0.8);
        assert!(similarity("alice", "zzzzz") < 0.2);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let contacts = directory();
        assert!(contacts.find("Alice").is_some());
        assert!(contacts.find("ALICE").is_some());
        assert!(contacts.find("mallory").is_none());
    }

    #[test]
    fn test_fuzzy_match_above_threshold() {
        let contacts = directory();
        let hit = find_fuzzy(&contacts, "alicia", 0.6).unwrap();
        assert_eq!(hit.name, "alice");
    }

    #[test]
    fn test_fuzzy_threshold_is_strict() {
        let contacts = directory();
        // "bub" vs "bob": similarity 2/3, above 0.6 but not above 0.7.
        assert!(find_fuzzy(&contacts, "bub", 0.6).is_some());
        assert!(find_fuzzy(&contacts, "bub", 0.7).is_none());
    }

    #[test]
    fn test_fuzzy_no_match_for_gibberish() {
        let contacts = directory();
        assert!(find_fuzzy(&contacts, "xqzwv", 0.6).is_none());
    }

    #[test]
    fn test_list_is_sorted_by_name() {
        let contacts = directory();
        contacts.add("Zed", "5DAAnrj7VHTznn2AWBemMuyBwZWs6FNFjdyVXUeYum3PTXFy");
        let names: Vec<String> = contacts.list().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["alice", "bob", "charlie", "Zed"]);
    }

    #[test]
    fn test_remove_reports_existence() {
        let contacts = directory();
        assert!(contacts.remove("Bob"));
        assert!(!contacts.remove("bob"));
        assert_eq!(contacts.len(), 2);
    }

    #[test]
    fn test_insert_replaces_by_name() {
        let contacts = directory();
        contacts.add("Alice", "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty");
        assert_eq!(contacts.len(), 3);
        let alice = contacts.find("alice").unwrap();
        assert!(alice.address.starts_with("5FHneW"));
    }
}
