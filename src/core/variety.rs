/// Variation pools: weighted phrasing variants per event kind, loading,
/// opener-avoiding selection and linting.
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::core::context::extract_opener;
use crate::core::postprocess::is_label_head;
use crate::core::template::{Template, TemplateError};
use crate::schema::message::{Facts, Value};

const DEFAULT_POOLS: &str = include_str!("../../data/pools.ron");

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool '{pool}': {source}")]
    Template {
        pool: String,
        #[source]
        source: TemplateError,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Facts every composed message carries.
pub const COMMON_FACTS: &[&str] = &["role", "event_kind", "week", "week_number", "member"];

/// Pools the composer reads. A missing one degrades to canonical phrasing.
pub const REQUIRED_POOLS: &[&str] = &[
    "greeting",
    "welcome.lead",
    "welcome.detail",
    "weekly_report.adherent_lead",
    "weekly_report.lapsed_lead",
    "weekly_report.detail",
    "weekly_report.streak",
    "weekly_report.hours",
    "pt_update.lead",
    "pt_update.detail",
    "diagnostics.booking_lead",
    "diagnostics.confirm_lead",
    "diagnostics.results_lead",
    "diagnostics.detail",
    "nutrition_update.lead",
    "nutrition_update.detail",
    "travel_note.lead",
    "travel_note.detail",
    "wearable_update.lead",
    "wearable_update.detail",
    "member_question.lead",
    "member_reply.lead",
    "member_reply.detail",
];

/// Event-specific facts a pool may reference, on top of [`COMMON_FACTS`].
/// `None` for a pool family the composer never reads.
pub fn pool_facts(pool: &str) -> Option<&'static [&'static str]> {
    let family = pool.split('.').next().unwrap_or(pool);
    let facts: &'static [&'static str] = match family {
        "greeting" => &[],
        "welcome" | "weekly_report" => &[
            "adherent",
            "adherence_pct",
            "bp",
            "hrv",
            "rhr",
            "sleep",
            "streak",
            "hours",
            "focus",
        ],
        "pt_update" => &["phase", "block", "focus_area", "adherent"],
        "diagnostics" => &["apob", "ldl_c", "hs_crp", "hba1c", "bp", "bmi", "quarter"],
        "nutrition_update" => &["apob", "ldl_c", "bmi", "meal_focus"],
        "travel_note" => &["destination", "sleep", "hrv"],
        "wearable_update" => &["hrv", "rhr", "sleep", "hrv_trend", "sleep_trend"],
        "member_question" => &["topic"],
        "member_reply" => &["topic", "bp", "hrv", "sleep", "apob", "rhr"],
        _ => return None,
    };
    Some(facts)
}

/// Lead pools are subject to the anti-repeat rule.
pub fn is_lead_pool(pool: &str) -> bool {
    pool.rsplit('.').next().is_some_and(|last| last.ends_with("lead"))
}

/// A weighted phrasing variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub weight: u32,
    pub template: Template,
}

/// Ordered phrasing variants for one slot of one event kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationPool {
    pub name: String,
    pub variants: Vec<Variant>,
}

impl VariationPool {
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// A set of named variation pools.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PoolSet {
    pub pools: FxHashMap<String, VariationPool>,
}

// The RON format is a map of name → Pool(variants: [...]).

#[derive(Debug, Deserialize)]
struct RonVariant {
    #[serde(default = "default_weight")]
    weight: u32,
    text: String,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Pool")]
struct RonPool {
    variants: Vec<RonVariant>,
}

impl PoolSet {
    /// The pools shipped with the crate.
    pub fn defaults() -> Result<PoolSet, PoolError> {
        Self::parse_ron(DEFAULT_POOLS)
    }

    /// Load a pool set from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<PoolSet, PoolError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a pool set from a RON string.
    pub fn parse_ron(input: &str) -> Result<PoolSet, PoolError> {
        let raw: FxHashMap<String, RonPool> = ron::from_str(input)?;
        let mut pools = FxHashMap::default();

        for (name, ron_pool) in raw {
            let mut variants = Vec::with_capacity(ron_pool.variants.len());
            for v in ron_pool.variants {
                let template = Template::parse(&v.text).map_err(|source| PoolError::Template {
                    pool: name.clone(),
                    source,
                })?;
                variants.push(Variant {
                    weight: v.weight,
                    template,
                });
            }
            pools.insert(name.clone(), VariationPool { name, variants });
        }

        Ok(PoolSet { pools })
    }

    /// Merge another pool set into this one. Pools from `other` replace
    /// pools in `self` with the same name.
    pub fn merge(&mut self, other: PoolSet) {
        for (name, pool) in other.pools {
            self.pools.insert(name, pool);
        }
    }

    pub fn get(&self, name: &str) -> Option<&VariationPool> {
        self.pools.get(name)
    }
}

fn render_all(pool: &VariationPool, facts: &Facts) -> Vec<(u32, String)> {
    pool.variants
        .iter()
        .filter_map(|v| match v.template.render(facts) {
            Ok(text) => Some((v.weight, text)),
            Err(e) => {
                warn!(pool = %pool.name, error = %e, "skipping variant that failed to render");
                None
            }
        })
        .collect()
}

fn pick_index<R: Rng>(weights: &[u32], rng: &mut R) -> usize {
    match WeightedIndex::new(weights) {
        Ok(dist) => dist.sample(rng),
        // All weights zero: fall back to uniform.
        Err(_) => rng.gen_range(0..weights.len()),
    }
}

/// Choose one variant whose rendered opener differs from `avoid_opener`.
///
/// When the pool has fewer than two variants, or every variant would repeat
/// the opener, repetition is accepted. Returns `None` only when no variant
/// renders.
pub fn select_variant<R: Rng>(
    pool: &VariationPool,
    facts: &Facts,
    avoid_opener: Option<&str>,
    rng: &mut R,
) -> Option<String> {
    let rendered = render_all(pool, facts);
    if rendered.is_empty() {
        return None;
    }

    let mut candidates: Vec<&(u32, String)> = rendered.iter().collect();
    if let Some(avoid) = avoid_opener.filter(|a| !a.is_empty()) {
        if pool.len() >= 2 {
            let fresh: Vec<&(u32, String)> = rendered
                .iter()
                .filter(|(_, text)| extract_opener(text) != avoid)
                .collect();
            if !fresh.is_empty() {
                candidates = fresh;
            }
        }
    }

    let weights: Vec<u32> = candidates.iter().map(|(w, _)| *w).collect();
    let chosen = pick_index(&weights, rng);
    Some(candidates[chosen].1.clone())
}

/// Choose up to `count` distinct variants, weighted, without replacement.
pub fn select_distinct<R: Rng>(
    pool: &VariationPool,
    facts: &Facts,
    count: usize,
    rng: &mut R,
) -> Vec<String> {
    let mut rendered = render_all(pool, facts);
    let mut picked = Vec::with_capacity(count.min(rendered.len()));
    while picked.len() < count && !rendered.is_empty() {
        let weights: Vec<u32> = rendered.iter().map(|(w, _)| *w).collect();
        let chosen = pick_index(&weights, rng);
        picked.push(rendered.remove(chosen).1);
    }
    picked
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LintSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LintIssue {
    pub severity: LintSeverity,
    pub pool: String,
    pub message: String,
}

impl LintIssue {
    fn error(pool: &str, message: String) -> Self {
        Self {
            severity: LintSeverity::Error,
            pool: pool.to_string(),
            message,
        }
    }

    fn warning(pool: &str, message: String) -> Self {
        Self {
            severity: LintSeverity::Warning,
            pool: pool.to_string(),
            message,
        }
    }
}

/// Render a template with each placeholder standing in for itself, so
/// openers can be compared without real facts.
fn placeholder_render(template: &Template) -> String {
    let facts: Facts = template
        .fact_names()
        .map(|name| (name.to_string(), Value::from(name)))
        .collect();
    template.render(&facts).unwrap_or_default()
}

/// Check a pool set for problems that would break anti-repetition or
/// rendering. Issues are sorted by pool name.
pub fn lint_pools(pools: &PoolSet) -> Vec<LintIssue> {
    let mut issues = Vec::new();

    for required in REQUIRED_POOLS {
        if !pools.pools.contains_key(*required) {
            issues.push(LintIssue::error(required, "required pool is missing".to_string()));
        }
    }

    let mut names: Vec<&String> = pools.pools.keys().collect();
    names.sort();

    for name in names {
        let pool = &pools.pools[name];

        let Some(kind_facts) = pool_facts(name) else {
            issues.push(LintIssue::warning(name, "pool is never read".to_string()));
            continue;
        };

        if pool.len() < 2 {
            issues.push(LintIssue::warning(
                name,
                format!("only {} variant(s); openers may repeat", pool.len()),
            ));
        }

        let mut seen: FxHashMap<String, usize> = FxHashMap::default();
        for (i, variant) in pool.variants.iter().enumerate() {
            for fact in variant.template.fact_names() {
                if !COMMON_FACTS.contains(&fact) && !kind_facts.contains(&fact) {
                    issues.push(LintIssue::error(
                        name,
                        format!("variant {} uses unknown fact '{{{}}}'", i, fact),
                    ));
                }
            }

            let text = placeholder_render(&variant.template);
            if text.lines().any(is_label_head) {
                issues.push(LintIssue::warning(
                    name,
                    format!("variant {} opens with a label: \"{}\"", i, text),
                ));
            }

            let opener = extract_opener(&text);
            if opener.is_empty() {
                continue;
            }
            if let Some(first) = seen.get(&opener) {
                issues.push(LintIssue::error(
                    name,
                    format!(
                        "variants {} and {} share the opener \"{}\"",
                        first, i, opener
                    ),
                ));
            } else {
                seen.insert(opener, i);
            }
        }
    }

    issues
}
