/// Variation pool loading, merging and linting integration tests.

use coaching_engine::core::variety::{
    lint_pools, select_variant, LintSeverity, PoolSet, REQUIRED_POOLS,
};
use coaching_engine::core::context::extract_opener;
use coaching_engine::schema::message::{Facts, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn fixture() -> PoolSet {
    PoolSet::load_from_ron(std::path::Path::new("tests/fixtures/test_pools.ron")).unwrap()
}

#[test]
fn default_pools_cover_every_required_pool() {
    let pools = PoolSet::defaults().unwrap();
    for name in REQUIRED_POOLS {
        assert!(pools.get(name).is_some(), "Missing pool: {}", name);
    }
}

#[test]
fn default_pools_lint_clean() {
    let pools = PoolSet::defaults().unwrap();
    let issues = lint_pools(&pools);
    assert!(
        issues.is_empty(),
        "Unexpected lint issues: {:?}",
        issues
    );
}

#[test]
fn fixture_loads() {
    let pools = fixture();
    assert_eq!(pools.pools.len(), 3);
    assert_eq!(pools.get("pt_update.lead").unwrap().len(), 3);
    assert_eq!(pools.get("pt_update.lead").unwrap().variants[0].weight, 2);
}

#[test]
fn fixture_merges_over_defaults() {
    let mut pools = PoolSet::defaults().unwrap();
    let before = pools.pools.len();
    pools.merge(fixture());
    assert_eq!(pools.pools.len(), before);
    assert_eq!(pools.get("greeting").unwrap().len(), 2);
    assert!(lint_pools(&pools).is_empty());
}

#[test]
fn fixture_alone_reports_missing_pools() {
    let issues = lint_pools(&fixture());
    let missing = issues
        .iter()
        .filter(|i| i.severity == LintSeverity::Error && i.message.contains("missing"))
        .count();
    assert_eq!(missing, REQUIRED_POOLS.len() - 3);
}

#[test]
fn linter_catches_bad_pools() {
    let input = r#"{
        "travel_note.lead": Pool(
            variants: [
                (text: "Safe travels to {destination} this week."),
                (text: "Safe travels to {destination}, pack the bands."),
            ],
        ),
        "travel_note.detail": Pool(
            variants: [
                (text: "Flight lands at {arrival_time}."),
                (text: "Summary: sleep is {sleep} h."),
            ],
        ),
        "wearable_update.lead": Pool(
            variants: [
                (text: "HRV is {hrv} ms."),
            ],
        ),
    }"#;
    let issues = lint_pools(&PoolSet::parse_ron(input).unwrap());
    let about = |pool: &str, severity: LintSeverity| {
        issues
            .iter()
            .filter(|i| i.pool == pool && i.severity == severity)
            .count()
    };

    // Shared opener, unknown fact, label lead, single variant.
    assert_eq!(about("travel_note.lead", LintSeverity::Error), 1);
    assert_eq!(about("travel_note.detail", LintSeverity::Error), 1);
    assert_eq!(about("travel_note.detail", LintSeverity::Warning), 1);
    assert_eq!(about("wearable_update.lead", LintSeverity::Warning), 1);
    assert!(issues
        .iter()
        .any(|i| i.message.contains("arrival_time")));
}

#[test]
fn selection_avoids_previous_opener() {
    let pools = fixture();
    let pool = pools.get("pt_update.lead").unwrap();
    let mut facts = Facts::new();
    facts.insert("phase".to_string(), Value::from(3u32));
    facts.insert("block".to_string(), Value::from("strength"));

    let mut rng = StdRng::seed_from_u64(7);
    let mut previous = String::new();
    for _ in 0..50 {
        let text = select_variant(pool, &facts, Some(&previous), &mut rng).unwrap();
        let opener = extract_opener(&text);
        assert_ne!(opener, previous);
        previous = opener;
    }
}
