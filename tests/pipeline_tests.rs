/// Pipeline integration tests — end-to-end week loop to exported log.

use coaching_engine::core::config::{ConfigError, NlgMode, RunConfig};
use coaching_engine::core::context::extract_opener;
use coaching_engine::core::export::{LogEntry, TRANSCRIPT_FOOTER};
use coaching_engine::core::pipeline::{CoachingEngine, EngineError, RunOutput};
use coaching_engine::core::polish::{PolishError, PolishMode, PolishRequest, Polisher};
use coaching_engine::core::postprocess::PostProcessor;
use coaching_engine::schema::biomarker::Metric;
use coaching_engine::schema::event::EventKind;
use coaching_engine::schema::message::Role;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

fn bp_config() -> RunConfig {
    RunConfig::load_from_ron(std::path::Path::new("tests/fixtures/bp_run.ron")).unwrap()
}

fn run(config: RunConfig) -> RunOutput {
    CoachingEngine::builder()
        .with_config(config)
        .build()
        .unwrap()
        .run()
        .unwrap()
}

fn assert_openers_alternate(output: &RunOutput) {
    let mut last: FxHashMap<Role, String> = FxHashMap::default();
    for message in &output.messages {
        let opener = extract_opener(&message.body);
        if opener.is_empty() {
            continue;
        }
        if let Some(previous) = last.get(&message.role) {
            assert_ne!(
                previous, &opener,
                "{} repeated its opener in week {}",
                message.role, message.week
            );
        }
        last.insert(message.role, opener);
    }
}

#[test]
fn four_week_bp_scenario() {
    let output = run(bp_config());

    assert_eq!(output.weeks, 4);
    assert_eq!(output.history.len(), 4);
    assert_eq!(output.events_of(EventKind::WeeklyReport), 4);
    assert_eq!(output.events_of(EventKind::Diagnostics), 0);
    assert_eq!(output.events_of(EventKind::PtUpdate), 2);
    assert_eq!(output.events_of(EventKind::TravelNote), 1);

    for record in &output.history {
        for metric in [Metric::SystolicBp, Metric::DiastolicBp] {
            let value = record.state.get(metric);
            assert!(
                metric.range().contains(value),
                "{} out of range in week {}: {}",
                metric.key(),
                record.week,
                value
            );
        }
        assert_eq!(record.context.outcomes.len(), 1);
        assert_eq!(record.context.outcomes[0].probability, 0.5);
    }

    assert_eq!(output.entries.len(), output.messages.len());
    assert_eq!(output.entries[0].sender, "Ruby (Concierge)");
    assert_eq!(output.entries[0].kind, EventKind::WeeklyReport);
    assert!(output.entries.iter().all(|e| !e.text.is_empty()));
}

#[test]
fn same_seed_same_log() {
    let a = run(bp_config());
    let b = run(bp_config());
    assert_eq!(a.jsonl().unwrap(), b.jsonl().unwrap());
    assert_eq!(a.transcript(), b.transcript());
}

#[test]
fn seed_changes_the_log() {
    let a = run(bp_config());
    let b = run(RunConfig {
        seed: 7,
        ..bp_config()
    });
    assert_ne!(a.transcript(), b.transcript());
}

#[test]
fn eight_week_cadence() {
    let output = run(RunConfig {
        weeks: 8,
        ..RunConfig::default()
    });
    assert_eq!(output.events_of(EventKind::WeeklyReport), 8);
    assert_eq!(output.events_of(EventKind::PtUpdate), 4);
    assert_eq!(output.events_of(EventKind::NutritionUpdate), 2);
    assert_eq!(output.events_of(EventKind::TravelNote), 2);
    assert_eq!(output.events_of(EventKind::Diagnostics), 0);
    let member = output.events_of(EventKind::MemberInitiated);
    assert!((24..=56).contains(&member), "{} member events", member);
}

#[test]
fn log_is_chronological() {
    let output = run(RunConfig {
        weeks: 12,
        ..RunConfig::default()
    });
    assert!(output
        .messages
        .windows(2)
        .all(|w| (w[0].week, w[0].seq) < (w[1].week, w[1].seq)));
    assert!(output
        .entries
        .windows(2)
        .all(|w| w[0].timestamp < w[1].timestamp));
    // Diagnostics in week 12 are spoken by three different roles.
    let speakers: Vec<Role> = output
        .messages
        .iter()
        .filter(|m| m.kind == EventKind::Diagnostics)
        .map(|m| m.role)
        .collect();
    assert!(!speakers.is_empty());
    assert!(speakers.len() <= 3);
}

#[test]
fn same_role_never_repeats_opener() {
    let output = run(RunConfig {
        weeks: 16,
        ..RunConfig::default()
    });
    assert_openers_alternate(&output);
}

#[test]
fn finalize_is_idempotent_on_output() {
    let config = RunConfig {
        weeks: 8,
        ..RunConfig::default()
    };
    let engine = CoachingEngine::builder()
        .with_config(config.clone())
        .build()
        .unwrap();
    let post = PostProcessor::new(&config.dedup)
        .with_speaker_names(engine.voices().speaker_names())
        .with_member_name(engine.voices().member_name());
    let output = run(config);
    assert_eq!(post.finalize(output.messages.clone()), output.messages);
}

#[test]
fn invalid_timezone_fails_build() {
    let err = CoachingEngine::builder()
        .with_config(RunConfig {
            timezone: "Asia/Nowhere".to_string(),
            ..RunConfig::default()
        })
        .build()
        .err()
        .unwrap();
    assert!(matches!(
        err,
        EngineError::Config(ConfigError::InvalidTimezone(tz)) if tz == "Asia/Nowhere"
    ));
}

#[test]
fn write_to_creates_both_files() {
    let output = run(bp_config());
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    let (jsonl_path, transcript_path) = output.write_to(&out_dir).unwrap();

    let jsonl = std::fs::read_to_string(&jsonl_path).unwrap();
    let parsed: Vec<LogEntry> = jsonl
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(parsed, output.entries);

    let transcript = std::fs::read_to_string(&transcript_path).unwrap();
    assert_eq!(transcript.lines().count(), output.entries.len() + 2);
    assert!(transcript.trim_end().ends_with(TRANSCRIPT_FOOTER));
}

// --- Polisher boundary ---

/// Returns the seed and records every request.
struct EchoPolisher {
    requests: Rc<RefCell<Vec<PolishRequest>>>,
}

impl Polisher for EchoPolisher {
    fn polish(&mut self, request: &PolishRequest) -> Result<String, PolishError> {
        self.requests.borrow_mut().push(request.clone());
        Ok(request.seed.clone())
    }
}

struct FailingPolisher;

impl Polisher for FailingPolisher {
    fn polish(&mut self, _request: &PolishRequest) -> Result<String, PolishError> {
        Err(PolishError::Status(503))
    }
}

/// Always opens the same way.
struct SameOpenerPolisher;

impl Polisher for SameOpenerPolisher {
    fn polish(&mut self, request: &PolishRequest) -> Result<String, PolishError> {
        Ok(format!("Checking in on the plan this week.\n{}", request.seed))
    }
}

fn polished_run(polisher: Box<dyn Polisher>) -> RunOutput {
    let mut config = bp_config();
    config.nlg.mode = NlgMode::Paraphrase;
    CoachingEngine::builder()
        .with_config(config)
        .with_polisher(polisher)
        .build()
        .unwrap()
        .run()
        .unwrap()
}

#[test]
fn echo_polisher_matches_unpolished_run() {
    let requests = Rc::new(RefCell::new(Vec::new()));
    let output = polished_run(Box::new(EchoPolisher {
        requests: Rc::clone(&requests),
    }));
    let plain = run(bp_config());
    assert_eq!(output.transcript(), plain.transcript());

    let requests = requests.borrow();
    assert!(requests.len() >= output.messages.len());
    assert!(requests.iter().all(|r| r.mode == PolishMode::Paraphrase));
    assert!(requests.iter().all(|r| r.facts.contains_key("week_number")));
    let concierge: Vec<&PolishRequest> = requests
        .iter()
        .filter(|r| r.role == Role::Concierge)
        .collect();
    assert!(concierge[0].avoid_opening_like.is_none());
    assert!(concierge[1].avoid_opening_like.is_some());
    assert_eq!(concierge[0].display_name, "Ruby (Concierge)");
}

#[test]
fn failing_polisher_falls_back_to_seed() {
    let output = polished_run(Box::new(FailingPolisher));
    let plain = run(bp_config());
    assert_eq!(output.jsonl().unwrap(), plain.jsonl().unwrap());
}

#[test]
fn repeated_polished_opener_is_rejected() {
    let output = polished_run(Box::new(SameOpenerPolisher));
    assert!(output
        .messages
        .iter()
        .any(|m| m.body.starts_with("Checking in on the plan")));
    assert_openers_alternate(&output);
}

/// Counts warmups and answers every request with the same text.
struct WarmupCounter {
    warmups: Rc<RefCell<usize>>,
    calls: Rc<RefCell<usize>>,
}

impl Polisher for WarmupCounter {
    fn polish(&mut self, request: &PolishRequest) -> Result<String, PolishError> {
        *self.calls.borrow_mut() += 1;
        Ok(request.seed.clone())
    }

    fn warmup(&mut self) {
        *self.warmups.borrow_mut() += 1;
    }
}

#[test]
fn polisher_warmed_once_and_cached_per_engine() {
    let warmups = Rc::new(RefCell::new(0));
    let calls = Rc::new(RefCell::new(0));
    let mut config = bp_config();
    config.nlg.mode = NlgMode::Paraphrase;
    let mut engine = CoachingEngine::builder()
        .with_config(config)
        .with_polisher(Box::new(WarmupCounter {
            warmups: Rc::clone(&warmups),
            calls: Rc::clone(&calls),
        }))
        .build()
        .unwrap();

    let first = engine.run().unwrap();
    assert_eq!(*warmups.borrow(), 1);
    let after_first = *calls.borrow();
    assert!(after_first > 0);

    // Same seed, same requests: the second run is served from the cache.
    let second = engine.run().unwrap();
    assert_eq!(*warmups.borrow(), 2);
    assert_eq!(*calls.borrow(), after_first);
    assert_eq!(first.transcript(), second.transcript());
}

#[test]
fn cache_can_be_switched_off() {
    let calls = Rc::new(RefCell::new(0));
    let mut config = bp_config();
    config.nlg.mode = NlgMode::Paraphrase;
    config.nlg.cache = false;
    let mut engine = CoachingEngine::builder()
        .with_config(config)
        .with_polisher(Box::new(WarmupCounter {
            warmups: Rc::new(RefCell::new(0)),
            calls: Rc::clone(&calls),
        }))
        .build()
        .unwrap();

    engine.run().unwrap();
    let after_first = *calls.borrow();
    engine.run().unwrap();
    assert_eq!(*calls.borrow(), 2 * after_first);
}
