// Fuzzy chat filter - subsequence matching over chat names
//
// A query matches a name when every query character appears in the name in
// order, not necessarily adjacent: each character becomes an escaped literal
// in a regex pattern, separated by an unbounded ".*" gap. Escaping keeps
// metacharacters in the query literal, and the regex crate's automaton
// engine cannot backtrack catastrophically on adversarial input.

use crate::models::Chat;
use regex::Regex;

/// Compiled subsequence matcher for one query.
pub struct FuzzyMatcher {
    // None for the empty query, which matches everything.
    regex: Option<Regex>,
}

impl FuzzyMatcher {
    pub fn new(query: &str, case_insensitive: bool) -> Self {
        if query.is_empty() {
            return Self { regex: None };
        }

        let pattern: String = query
            .chars()
            .map(|c| regex::escape(&c.to_string()))
            .collect::<Vec<_>>()
            .join(".*");
        let pattern = if case_insensitive {
            format!("(?i){}", pattern)
        } else {
            pattern
        };

        // The pattern is built from escaped literals and ".*" only, so
        // compilation cannot fail.
        let regex = Regex::new(&pattern).ok();
        Self { regex }
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(name),
            None => true,
        }
    }
}

/// Narrow `chats` to entries whose name matches `query`, preserving the
/// original relative order. An empty query returns the list unchanged.
pub fn filter_chats<'a>(chats: &'a [Chat], query: &str, case_insensitive: bool) -> Vec<&'a Chat> {
    let matcher = FuzzyMatcher::new(query, case_insensitive);
    chats.iter().filter(|chat| matcher.matches(&chat.name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(name: &str) -> Chat {
        Chat {
            id: name.to_string(),
            name: name.to_string(),
            loading: false,
        }
    }

    #[test]
    fn test_subsequence_match() {
        // "p...a" is a subsequence of "project-alpha"
        let chats = vec![chat("project-alpha")];
        assert_eq!(filter_chats(&chats, "pa", false).len(), 1);
    }

    #[test]
    fn test_no_subsequence_excludes() {
        let chats = vec![chat("beta")];
        assert!(filter_chats(&chats, "xz", false).is_empty());
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let chats = vec![chat("alpha"), chat("beta"), chat("gamma")];
        let filtered = filter_chats(&chats, "", false);
        assert_eq!(filtered.len(), 3);
        let names: Vec<&str> = filtered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_order_preserving_subsequence_of_input() {
        let chats = vec![
            chat("newsroom"),
            chat("terminal club"),
            chat("no-match"),
            chat("nominal"),
        ];
        let filtered = filter_chats(&chats, "nm", false);
        let names: Vec<&str> = filtered.iter().map(|c| c.name.as_str()).collect();
        // "terminal club" is out: its only 'm' comes before its 'n'.
        assert_eq!(names, vec!["newsroom", "no-match", "nominal"]);
    }

    #[test]
    fn test_query_metacharacters_are_literal() {
        let chats = vec![chat("a.b"), chat("axb")];
        // "." must not act as a wildcard: only the literal dot name matches.
        let filtered = filter_chats(&chats, ".", false);
        let names: Vec<&str> = filtered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a.b"]);

        // A query that is pure regex syntax matches nothing rather than
        // blowing up or matching everything.
        assert!(filter_chats(&chats, "[z](", false).is_empty());
    }

    #[test]
    fn test_case_sensitivity_is_configured() {
        let chats = vec![chat("Project-Alpha")];
        assert!(filter_chats(&chats, "pa", false).is_empty());
        assert_eq!(filter_chats(&chats, "pa", true).len(), 1);
    }

    #[test]
    fn test_characters_must_appear_in_order() {
        let chats = vec![chat("ab")];
        assert_eq!(filter_chats(&chats, "ab", false).len(), 1);
        assert!(filter_chats(&chats, "ba", false).is_empty());
    }
}
