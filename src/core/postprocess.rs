/// Post-processing: sanitize structural leakage, tidy punctuation, drop
/// near-duplicates, and order the log.
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::core::config::DedupConfig;
use crate::core::context::is_greeting;
use crate::schema::event::EventKind;
use crate::schema::message::{Message, Role};

/// Colon anywhere, a hyphen only when spaced, en/em dash either way.
const SEPARATOR: &str = r"(?:\s*:\s*|\s+-\s+|\s*[—–]\s*)";

static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•·]|\d{1,2}[.)])\s+").expect("valid bullet regex"));

static HEADER: Lazy<Regex> = Lazy::new(|| {
    let mut heads: Vec<String> = EventKind::ALL
        .iter()
        .map(|k| regex::escape(k.header()))
        .collect();
    heads.push(r"medical check-?in".to_string());
    heads.push(r"ordering your diagnostic panel".to_string());
    heads.push(r"travel adaptation[^:—–]{0,40}".to_string());
    Regex::new(&format!(
        r"(?i)^\s*(?:{})(?:{}|\s*$)",
        heads.join("|"),
        SEPARATOR
    ))
    .expect("valid header regex")
});

static LABEL_HEAD: Lazy<Regex> = Lazy::new(|| {
    let heads = [
        r"watch[-\s]?outs",
        r"flags",
        r"risks?",
        r"focus for next week",
        r"what we['’]ll prioriti[sz]e",
        r"next[-\s]?week focus",
        r"next steps?",
        r"action items?",
        r"actions?",
        r"observations?",
        r"recommendations?",
        r"symptoms?",
        r"review",
        r"plan(?: for (?:next|this) week)?",
        r"form cues?",
        r"hypothesis",
        r"next",
        r"summary",
        r"interpretation",
        r"options?",
        r"from your log",
        r"training update",
        r"my read",
        r"panel summary",
        r"on labs/vitals",
        r"on symptoms",
        r"on the plus side",
        r"i['’]m keeping an eye on",
        r"one thing to watch",
        r"worth flagging",
        r"latest numbers",
        r"focus",
        r"note",
        r"update",
    ];
    Regex::new(&format!(r"(?i)^\s*(?:{}){}", heads.join("|"), SEPARATOR))
        .expect("valid label regex")
});

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));
static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([,.;:!?])").expect("valid regex"));
static MULTI_DOTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").expect("valid regex"));
static BANG_Q_DOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"([?!])\s*\.").expect("valid regex"));
static REPEATED_BANG_Q: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([?!])[?!]+").expect("valid regex"));
static TIGHT_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([,;])(\p{L})").expect("valid regex"));
static TRAILING_COLON: Lazy<Regex> = Lazy::new(|| Regex::new(r"[:;]\s*$").expect("valid regex"));
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid regex"));

/// True when a line opens with a section label ("Plan:", "Summary —").
pub fn is_label_head(line: &str) -> bool {
    LABEL_HEAD.is_match(line)
}

/// Punctuation and spacing cleanup for one line. Idempotent.
fn tidy_line(line: &str) -> String {
    let s = MULTI_SPACE.replace_all(line.trim(), " ");
    let s = SPACE_BEFORE_PUNCT.replace_all(&s, "$1");
    let s = MULTI_DOTS.replace_all(&s, ".");
    let s = BANG_Q_DOT.replace_all(&s, "$1");
    let s = REPEATED_BANG_Q.replace_all(&s, "$1");
    let s = TIGHT_COMMA.replace_all(&s, "$1 $2");
    let s = TRAILING_COLON.replace(&s, ".");
    let mut s = s.trim().to_string();

    if let Some(first) = s.chars().next() {
        if first.is_ascii_lowercase() {
            s.replace_range(..1, &first.to_ascii_uppercase().to_string());
        }
    }
    if !s.is_empty() && !s.ends_with(['.', '?', '!']) {
        s.push('.');
    }
    s
}

/// Comparison key for in-message duplicate lines.
fn line_key(line: &str) -> String {
    NON_WORD
        .replace_all(&line.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Tidy every line, then drop blank and repeated lines.
pub fn tidy(text: &str) -> String {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for line in text.lines() {
        let line = tidy_line(line);
        if line.is_empty() {
            continue;
        }
        let key = line_key(&line);
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(line);
    }
    out.join("\n")
}

/// Lowercase, punctuation-free, single-spaced form used for similarity.
pub fn normalize(text: &str) -> String {
    line_key(text)
}

/// Sørensen–Dice coefficient over character bigrams of normalized text.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a == b {
        return 1.0;
    }

    let bigrams = |s: &str| {
        let chars: Vec<char> = s.chars().collect();
        let mut counts: FxHashMap<(char, char), usize> = FxHashMap::default();
        for pair in chars.windows(2) {
            *counts.entry((pair[0], pair[1])).or_insert(0) += 1;
        }
        (counts, chars.len().saturating_sub(1))
    };

    let (left, left_total) = bigrams(&a);
    let (right, right_total) = bigrams(&b);
    if left_total + right_total == 0 {
        return 0.0;
    }

    let shared: usize = left
        .iter()
        .map(|(bigram, n)| (*n).min(right.get(bigram).copied().unwrap_or(0)))
        .sum();
    2.0 * shared as f64 / (left_total + right_total) as f64
}

/// Sanitizes bodies and removes near-duplicate messages.
///
/// All transforms are idempotent and the duplicate window only counts kept
/// messages, so [`finalize`](Self::finalize) on its own output is a no-op.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    threshold: f64,
    lookback: usize,
    role_prefix: Option<Regex>,
    member_self_greeting: Option<Regex>,
}

impl PostProcessor {
    pub fn new(dedup: &DedupConfig) -> Self {
        Self {
            threshold: dedup.threshold,
            lookback: dedup.lookback,
            role_prefix: None,
            member_self_greeting: None,
        }
    }

    /// Names whose "Name:" echoes are stripped from the start of lines.
    pub fn with_speaker_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut alternatives: Vec<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !n.is_empty())
            .map(|n| regex::escape(&n))
            .collect();
        // Longest first so "Dr. Warren (Medical)" wins over "Dr. Warren".
        alternatives.sort_by_key(|n| std::cmp::Reverse(n.len()));
        alternatives.dedup();
        if !alternatives.is_empty() {
            self.role_prefix = Regex::new(&format!(
                r"(?i)^\s*(?:{})(?:\s*:\s*|\s+-\s+|\s*[—–]\s*)",
                alternatives.join("|")
            ))
            .ok();
        }
        self
    }

    /// The client's name, so a member message greeting the client is cleaned.
    pub fn with_member_name(mut self, name: &str) -> Self {
        let name = name.trim();
        if !name.is_empty() {
            self.member_self_greeting = Regex::new(&format!(
                r"(?i)^\s*(?:hi|hey|hello)\s+{}\b[\s,.!–—-]*",
                regex::escape(name)
            ))
            .ok();
        }
        self
    }

    fn strip_line<'a>(&self, mut line: &'a str, role: Role) -> &'a str {
        loop {
            let before = line.len();
            for re in [&*BULLET, &*HEADER, &*LABEL_HEAD] {
                if let Some(m) = re.find(line) {
                    line = &line[m.end()..];
                }
            }
            if let Some(re) = &self.role_prefix {
                if let Some(m) = re.find(line) {
                    line = &line[m.end()..];
                }
            }
            if role.is_member() {
                if let Some(re) = &self.member_self_greeting {
                    if let Some(m) = re.find(line) {
                        line = &line[m.end()..];
                    }
                }
            }
            line = line.trim();
            if line.len() == before {
                return line;
            }
        }
    }

    /// Remove header echoes, role-name prefixes, bullets, label heads and
    /// member greetings, then tidy.
    pub fn sanitize(&self, body: &str, role: Role) -> String {
        let lines: Vec<&str> = body
            .lines()
            .map(|l| self.strip_line(l, role))
            .filter(|l| !l.is_empty())
            .filter(|l| !(role.is_member() && is_greeting(l)))
            .collect();
        tidy(&lines.join("\n"))
    }

    /// True when `body` is too similar to one of the last `lookback` kept
    /// messages from the same role.
    pub fn is_near_duplicate(&self, role: Role, body: &str, kept: &[Message]) -> bool {
        kept.iter()
            .rev()
            .filter(|m| m.role == role)
            .take(self.lookback)
            .any(|m| similarity(&m.body, body) >= self.threshold)
    }

    /// Sanitize, order by `(week, seq)` and drop near-duplicates.
    pub fn finalize(&self, messages: Vec<Message>) -> Vec<Message> {
        let mut messages: Vec<Message> = messages
            .into_iter()
            .map(|mut m| {
                m.body = self.sanitize(&m.body, m.role);
                m
            })
            .filter(|m| !m.body.is_empty())
            .collect();
        messages.sort_by_key(|m| (m.week, m.seq));

        let mut kept: Vec<Message> = Vec::with_capacity(messages.len());
        for message in messages {
            if self.is_near_duplicate(message.role, &message.body, &kept) {
                debug!(
                    week = message.week,
                    seq = message.seq,
                    role = %message.role,
                    "dropped near-duplicate message"
                );
                continue;
            }
            kept.push(message);
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> PostProcessor {
        PostProcessor::new(&DedupConfig::default())
            .with_speaker_names(["Ruby (Concierge)", "Ruby", "Dr. Warren", "Rohan"])
            .with_member_name("Rohan")
    }

    fn msg(role: Role, week: u32, seq: u64, body: &str) -> Message {
        Message {
            role,
            week,
            seq,
            kind: EventKind::WeeklyReport,
            body: body.to_string(),
        }
    }

    #[test]
    fn tidy_fixes_punctuation() {
        assert_eq!(tidy("sleep was short ?."), "Sleep was short?");
        assert_eq!(tidy("great week!!."), "Great week!");
        assert_eq!(tidy("BP is 130/84 ,HRV up.."), "BP is 130/84, HRV up.");
        assert_eq!(tidy("next up   is mobility;"), "Next up is mobility.");
        assert_eq!(tidy("keep going"), "Keep going.");
    }

    #[test]
    fn tidy_drops_repeated_lines() {
        assert_eq!(
            tidy("Keep dinner earlier.\nkeep dinner earlier\nSleep by 11."),
            "Keep dinner earlier.\nSleep by 11."
        );
    }

    #[test]
    fn tidy_is_idempotent() {
        for raw in [
            "a , b ,c;d ..",
            "what?! really ?? ok :",
            "  x  -  y  ",
            "Numbers: 1,000 steps; fine",
        ] {
            let once = tidy(raw);
            assert_eq!(tidy(&once), once, "input {:?}", raw);
        }
    }

    #[test]
    fn sanitize_strips_structure() {
        let p = processor();
        let body = "Weekly report: BP 131/84 this week.\n- Plan: keep the Zone-2 runs\nRuby: I'll book the lab.\nSummary — steady progress";
        assert_eq!(
            p.sanitize(body, Role::Concierge),
            "BP 131/84 this week.\nKeep the Zone-2 runs.\nI'll book the lab.\nSteady progress."
        );
    }

    #[test]
    fn sanitize_strips_display_name_prefix() {
        let p = processor();
        assert_eq!(
            p.sanitize("Ruby (Concierge): Lab is booked.", Role::Concierge),
            "Lab is booked."
        );
        assert_eq!(
            p.sanitize("Dr. Warren - results look fine.", Role::Physician),
            "Results look fine."
        );
    }

    #[test]
    fn member_does_not_greet_themselves() {
        let p = processor();
        assert_eq!(
            p.sanitize("Hi Rohan,\nQuick one on protein timing?", Role::Member),
            "Quick one on protein timing?"
        );
        assert_eq!(
            p.sanitize("Hey Rohan, is the sauna okay after runs?", Role::Member),
            "Is the sauna okay after runs?"
        );
        // Team roles may greet.
        assert_eq!(
            p.sanitize("Hi Rohan!\nLab is booked.", Role::Concierge),
            "Hi Rohan!\nLab is booked."
        );
    }

    #[test]
    fn hyphenated_words_are_not_labels() {
        let p = processor();
        assert_eq!(
            p.sanitize("Plan-based meals are working.", Role::Nutritionist),
            "Plan-based meals are working."
        );
        assert!(!is_label_head("Next-week travel is locked in."));
        assert!(is_label_head("Next week focus: sleep"));
        assert!(is_label_head("Summary — steady"));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let p = processor();
        let body = "Exercise update - Plan: - hips first ..\nhips first\nRuby — noted !";
        let once = p.sanitize(body, Role::Physiotherapist);
        assert_eq!(p.sanitize(&once, Role::Physiotherapist), once);
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity("Keep going!", "keep going"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        let s = similarity(
            "Solid week on the plan, BP 131/84.",
            "Solid week on the plan, BP 132/84.",
        );
        assert!(s > 0.85 && s < 1.0, "similarity {s}");
        let s = similarity("Solid week on the plan.", "Travel week ahead, pack light.");
        assert!(s < 0.5, "similarity {s}");
    }

    #[test]
    fn near_duplicates_respect_role_and_window() {
        let p = processor();
        let kept = vec![
            msg(Role::Concierge, 0, 0, "Solid week on the plan, BP 131/84."),
            msg(Role::Physician, 0, 1, "Labs are booked for Tuesday."),
        ];
        assert!(p.is_near_duplicate(Role::Concierge, "Solid week on the plan, BP 132/84.", &kept));
        assert!(!p.is_near_duplicate(Role::Nutritionist, "Solid week on the plan, BP 132/84.", &kept));

        let mut long = kept.clone();
        for i in 0..3 {
            long.push(msg(Role::Concierge, 1, 2 + i, &format!("Different message number {i} here.")));
        }
        // The first Concierge message is now outside the lookback of 3.
        assert!(!p.is_near_duplicate(Role::Concierge, "Solid week on the plan, BP 132/84.", &long));
    }

    #[test]
    fn finalize_sorts_and_drops() {
        let p = processor();
        let messages = vec![
            msg(Role::Concierge, 1, 5, "Second week went well."),
            msg(Role::Concierge, 0, 1, "Welcome aboard, Rohan."),
            msg(Role::Concierge, 1, 6, "Second week went well!"),
            msg(Role::Nutritionist, 0, 2, "Summary:"),
        ];
        let out = p.finalize(messages);
        let seqs: Vec<u64> = out.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![1, 5]);
    }

    #[test]
    fn finalize_twice_is_a_no_op() {
        let p = processor();
        let messages = vec![
            msg(Role::Concierge, 0, 0, "Weekly report: solid week ,BP 131/84.."),
            msg(Role::Concierge, 0, 1, "solid week, BP 131/84"),
            msg(Role::Member, 0, 2, "Hi Rohan\nQuick one on sleep?"),
            msg(Role::Concierge, 1, 3, "Different words entirely this time."),
        ];
        let once = p.finalize(messages);
        let twice = p.finalize(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }
}
