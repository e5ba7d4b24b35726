/// Anti-repetition memory: the last opener each role used.
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::schema::message::Role;

/// Number of word tokens that make up an opener.
pub const OPENER_WORDS: usize = 4;

static GREETING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(hi|hey|hello|morning|good\s+(morning|afternoon|evening))(\s+[\p{L}.'’-]+){0,2}\s*[,.!]?\s*$",
    )
    .expect("valid greeting regex")
});

static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+(?:['’][\p{L}]+)?").expect("valid word regex"));

/// True for a short standalone greeting line ("Hi Rohan!", "Morning.").
pub fn is_greeting(line: &str) -> bool {
    GREETING.is_match(line)
}

/// The opener of a message body: the first few lowercase word tokens of its
/// first non-empty, non-greeting line. Empty when there is no such line.
pub fn extract_opener(body: &str) -> String {
    let line = body
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !is_greeting(l))
        .unwrap_or("");

    WORD.find_iter(line)
        .take(OPENER_WORDS)
        .map(|m| m.as_str().to_lowercase().replace('’', "'"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One slot per role holding the most recent opener. No longer history is
/// kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AntiRepetitionMemory {
    last: FxHashMap<Role, String>,
}

impl AntiRepetitionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_opener(&self, role: Role) -> Option<&str> {
        self.last.get(&role).map(String::as_str)
    }

    /// Record `opener` for `role`, returning the opener it replaces.
    pub fn remember(&mut self, role: Role, opener: String) -> Option<String> {
        if opener.is_empty() {
            return self.last.get(&role).cloned();
        }
        self.last.insert(role, opener)
    }

    /// Put back a value previously returned by [`remember`](Self::remember).
    pub fn restore(&mut self, role: Role, previous: Option<String>) {
        match previous {
            Some(opener) => {
                self.last.insert(role, opener);
            }
            None => {
                self.last.remove(&role);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opener_skips_greeting_line() {
        let body = "Hi Rohan!\nSolid week on the plan, BP 131/84.\nKeep the Zone-2 runs going.";
        assert_eq!(extract_opener(body), "solid week on the");
    }

    #[test]
    fn opener_of_short_line() {
        assert_eq!(extract_opener("Quick one."), "quick one");
        assert_eq!(extract_opener(""), "");
        assert_eq!(extract_opener("Hi Rohan,\n"), "");
    }

    #[test]
    fn opener_ignores_case_and_punctuation() {
        assert_eq!(
            extract_opener("Let’s keep dinner earlier."),
            extract_opener("let's KEEP dinner, earlier!")
        );
    }

    #[test]
    fn greeting_detection() {
        assert!(is_greeting("Hi Rohan!"));
        assert!(is_greeting("Good morning Rohan."));
        assert!(is_greeting("Hey,"));
        assert!(!is_greeting("Highlights from this week: BP 130/84."));
        assert!(!is_greeting("Hi Rohan, your BP came down to 130/84 this week and HRV is up."));
    }

    #[test]
    fn remember_returns_previous_and_restore_rolls_back() {
        let mut memory = AntiRepetitionMemory::new();
        assert_eq!(memory.remember(Role::Concierge, "solid week on the".to_string()), None);
        let prev = memory.remember(Role::Concierge, "quick recap from this".to_string());
        assert_eq!(prev.as_deref(), Some("solid week on the"));
        assert_eq!(memory.last_opener(Role::Concierge), Some("quick recap from this"));

        memory.restore(Role::Concierge, prev);
        assert_eq!(memory.last_opener(Role::Concierge), Some("solid week on the"));

        memory.restore(Role::Concierge, None);
        assert_eq!(memory.last_opener(Role::Concierge), None);
    }

    #[test]
    fn roles_are_independent() {
        let mut memory = AntiRepetitionMemory::new();
        memory.remember(Role::Physician, "results are back and".to_string());
        assert_eq!(memory.last_opener(Role::Nutritionist), None);
    }
}
