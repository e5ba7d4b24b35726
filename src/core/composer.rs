/// Message composition — turns one scheduled event into seed text and facts.
///
/// Every message is a lead line drawn under the anti-repeat rule, a few
/// detail lines, and sometimes a greeting. All draws come from the
/// composition stream, so a seed reproduces the same wording.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::core::context::{extract_opener, AntiRepetitionMemory};
use crate::core::simulation::WeekContext;
use crate::core::variety::{select_distinct, select_variant, PoolSet};
use crate::core::voice::VoiceRegistry;
use crate::schema::biomarker::{BiomarkerState, Metric};
use crate::schema::event::{EventKind, EventOccurrence};
use crate::schema::intervention::InterventionPlan;
use crate::schema::message::{Facts, Role, Value};

/// Member question topics and the expert who answers each.
const TOPICS: &[(&str, Role)] = &[
    ("sleep", Role::PerformanceScientist),
    ("HRV", Role::PerformanceScientist),
    ("training load", Role::PerformanceScientist),
    ("recovery", Role::PerformanceScientist),
    ("blood pressure", Role::Physician),
    ("ApoB", Role::Physician),
    ("supplements", Role::Physician),
    ("the next blood panel", Role::Physician),
    ("protein", Role::Nutritionist),
    ("late dinners", Role::Nutritionist),
    ("eating on the road", Role::Nutritionist),
    ("caffeine", Role::Nutritionist),
];

const PT_BLOCKS: &[&str] = &[
    "mobility and core",
    "strength foundation",
    "Zone-2 base",
    "strength and power",
    "balance and stability",
];

const FOCUS_AREAS: &[&str] = &[
    "hips",
    "thoracic spine",
    "ankles",
    "posterior chain",
    "shoulders",
    "core bracing",
];

const MEAL_FOCUS: &[&str] = &[
    "fibre at breakfast",
    "oily fish twice a week",
    "an earlier dinner",
    "protein at every meal",
    "swapping refined carbs for legumes",
    "olive oil over butter",
];

/// Share of weekly reports that mention logged hours.
const HOURS_CHANCE: f64 = 0.35;

/// Minimum win streak worth mentioning.
const STREAK_MENTION: u32 = 3;

/// Logged training hours: normal around the weekly commitment, clamped.
const HOURS_MEAN: f64 = 5.0;
const HOURS_SD: f64 = 1.0;
const HOURS_RANGE: (f64, f64) = (2.0, 7.0);

/// One composed message, before polishing and post-processing.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedMessage {
    pub role: Role,
    pub kind: EventKind,
    pub week: u32,
    /// Template-built body; the fallback whenever polishing fails.
    pub seed: String,
    pub facts: Facts,
    /// Opener of `seed`, already recorded in memory.
    pub opener: String,
    /// What memory held for this role before this message.
    pub previous_opener: Option<String>,
}

/// Builds seed messages from variation pools.
pub struct MessageComposer {
    pools: PoolSet,
    voices: VoiceRegistry,
    rng: StdRng,
}

impl MessageComposer {
    pub fn new(pools: PoolSet, voices: VoiceRegistry, seed: u64) -> Self {
        Self {
            pools,
            voices,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn voices(&self) -> &VoiceRegistry {
        &self.voices
    }

    /// Compose every message for `event`, recording each sender's opener in
    /// `memory`.
    ///
    /// Diagnostics yields three messages (booking, confirmation, results);
    /// a member-initiated event yields the question and one expert reply.
    pub fn compose(
        &mut self,
        event: &EventOccurrence,
        ctx: &WeekContext,
        state: &BiomarkerState,
        plan: &InterventionPlan,
        memory: &mut AntiRepetitionMemory,
    ) -> Vec<ComposedMessage> {
        let week = event.week;
        match event.kind {
            EventKind::WeeklyReport => {
                let facts = self.report_facts(week, ctx, state, plan);
                let (lead, details) = if week == 0 {
                    ("welcome.lead", vec!["welcome.detail"])
                } else if ctx.adherent {
                    ("weekly_report.adherent_lead", vec!["weekly_report.detail"])
                } else {
                    ("weekly_report.lapsed_lead", vec!["weekly_report.detail"])
                };
                let mut extra = Vec::new();
                if week > 0 {
                    if ctx.streak >= STREAK_MENTION {
                        extra.push("weekly_report.streak");
                    }
                    if self.rng.gen_bool(HOURS_CHANCE) {
                        extra.push("weekly_report.hours");
                    }
                }
                vec![self.compose_one(
                    Role::Concierge,
                    event.kind,
                    week,
                    facts,
                    lead,
                    &details,
                    &extra,
                    memory,
                )]
            }
            EventKind::PtUpdate => {
                let mut facts = self.base_facts(Role::Physiotherapist, event.kind, week);
                let phase = ctx.exercise_phase;
                facts.insert("phase".into(), Value::from(phase + 1));
                facts.insert(
                    "block".into(),
                    Value::from(PT_BLOCKS[phase as usize % PT_BLOCKS.len()]),
                );
                facts.insert("focus_area".into(), Value::from(self.pick(FOCUS_AREAS)));
                facts.insert("adherent".into(), Value::from(ctx.adherent));
                vec![self.compose_one(
                    Role::Physiotherapist,
                    event.kind,
                    week,
                    facts,
                    "pt_update.lead",
                    &["pt_update.detail"],
                    &[],
                    memory,
                )]
            }
            EventKind::Diagnostics => {
                let quarter = ctx.week_number() / 12;
                let steps = [
                    (Role::Concierge, "diagnostics.booking_lead", None),
                    (Role::Assistant, "diagnostics.confirm_lead", None),
                    (
                        Role::Physician,
                        "diagnostics.results_lead",
                        Some("diagnostics.detail"),
                    ),
                ];
                steps
                    .into_iter()
                    .filter(|(role, _, _)| event.roles.contains(role))
                    .map(|(role, lead, detail)| {
                        let mut facts = self.base_facts(role, event.kind, week);
                        for metric in [
                            Metric::ApoB,
                            Metric::LdlC,
                            Metric::HsCrp,
                            Metric::HbA1c,
                            Metric::Bmi,
                        ] {
                            facts.insert(metric.key().into(), Value::from(state.display(metric)));
                        }
                        facts.insert("bp".into(), Value::from(state.blood_pressure()));
                        facts.insert("quarter".into(), Value::from(quarter.max(1)));
                        let details: Vec<&str> = detail.into_iter().collect();
                        self.compose_one(role, event.kind, week, facts, lead, &details, &[], memory)
                    })
                    .collect()
            }
            EventKind::NutritionUpdate => {
                let mut facts = self.base_facts(Role::Nutritionist, event.kind, week);
                for metric in [Metric::ApoB, Metric::LdlC, Metric::Bmi] {
                    facts.insert(metric.key().into(), Value::from(state.display(metric)));
                }
                facts.insert("meal_focus".into(), Value::from(self.pick(MEAL_FOCUS)));
                vec![self.compose_one(
                    Role::Nutritionist,
                    event.kind,
                    week,
                    facts,
                    "nutrition_update.lead",
                    &["nutrition_update.detail"],
                    &[],
                    memory,
                )]
            }
            EventKind::TravelNote => {
                let mut facts = self.base_facts(Role::Concierge, event.kind, week);
                let destination = ctx
                    .travel
                    .as_ref()
                    .map(|leg| leg.destination.clone())
                    .unwrap_or_else(|| "the trip".to_string());
                facts.insert("destination".into(), Value::from(destination));
                facts.insert("sleep".into(), Value::from(state.display(Metric::SleepHours)));
                facts.insert("hrv".into(), Value::from(state.display(Metric::HrvMs)));
                vec![self.compose_one(
                    Role::Concierge,
                    event.kind,
                    week,
                    facts,
                    "travel_note.lead",
                    &["travel_note.detail"],
                    &[],
                    memory,
                )]
            }
            EventKind::WearableUpdate => {
                let role = Role::PerformanceScientist;
                let mut facts = self.base_facts(role, event.kind, week);
                facts.insert("hrv".into(), Value::from(state.display(Metric::HrvMs)));
                facts.insert("rhr".into(), Value::from(state.display(Metric::RhrBpm)));
                facts.insert("sleep".into(), Value::from(state.display(Metric::SleepHours)));
                facts.insert(
                    "hrv_trend".into(),
                    Value::from(trend(ctx.deltas.get(Metric::HrvMs), 0.5)),
                );
                facts.insert(
                    "sleep_trend".into(),
                    Value::from(trend(ctx.deltas.get(Metric::SleepHours), 0.05)),
                );
                vec![self.compose_one(
                    role,
                    event.kind,
                    week,
                    facts,
                    "wearable_update.lead",
                    &["wearable_update.detail"],
                    &[],
                    memory,
                )]
            }
            EventKind::MemberInitiated => {
                let (topic, expert) = TOPICS[self.rng.gen_range(0..TOPICS.len())];

                let mut facts = self.base_facts(Role::Member, event.kind, week);
                facts.insert("topic".into(), Value::from(topic));
                let question = self.compose_one(
                    Role::Member,
                    event.kind,
                    week,
                    facts,
                    "member_question.lead",
                    &[],
                    &[],
                    memory,
                );

                let mut facts = self.base_facts(expert, event.kind, week);
                facts.insert("topic".into(), Value::from(topic));
                facts.insert("bp".into(), Value::from(state.blood_pressure()));
                facts.insert("hrv".into(), Value::from(state.display(Metric::HrvMs)));
                facts.insert("sleep".into(), Value::from(state.display(Metric::SleepHours)));
                facts.insert("apob".into(), Value::from(state.display(Metric::ApoB)));
                facts.insert("rhr".into(), Value::from(state.display(Metric::RhrBpm)));
                let reply = self.compose_one(
                    expert,
                    event.kind,
                    week,
                    facts,
                    "member_reply.lead",
                    &["member_reply.detail"],
                    &[],
                    memory,
                );

                vec![question, reply]
            }
        }
    }

    fn base_facts(&self, role: Role, kind: EventKind, week: u32) -> Facts {
        let mut facts = Facts::new();
        facts.insert("role".into(), Value::from(role.key()));
        facts.insert("event_kind".into(), Value::from(kind.name()));
        facts.insert("week".into(), Value::from(week));
        facts.insert("week_number".into(), Value::from(week + 1));
        facts.insert("member".into(), Value::from(self.voices.member_name()));
        facts
    }

    fn report_facts(
        &mut self,
        week: u32,
        ctx: &WeekContext,
        state: &BiomarkerState,
        plan: &InterventionPlan,
    ) -> Facts {
        let mut facts = self.base_facts(Role::Concierge, EventKind::WeeklyReport, week);
        facts.insert("adherent".into(), Value::from(ctx.adherent));
        facts.insert(
            "adherence_pct".into(),
            Value::from((ctx.adherence_rate() * 100.0).round() as i64),
        );
        facts.insert("bp".into(), Value::from(state.blood_pressure()));
        facts.insert("hrv".into(), Value::from(state.display(Metric::HrvMs)));
        facts.insert("rhr".into(), Value::from(state.display(Metric::RhrBpm)));
        facts.insert("sleep".into(), Value::from(state.display(Metric::SleepHours)));
        facts.insert("streak".into(), Value::from(ctx.streak));

        let hours = sample_weekly_hours(&mut self.rng);
        facts.insert("hours".into(), Value::from(format!("{:.1}", hours)));

        // First lapsed intervention, else the first in the plan.
        let focus = ctx
            .outcomes
            .iter()
            .find(|o| !o.adhered)
            .or_else(|| ctx.outcomes.first())
            .map(|o| o.intervention.to_lowercase())
            .or_else(|| plan.iter().next().map(|i| i.name.to_lowercase()))
            .unwrap_or_else(|| "the basics".to_string());
        facts.insert("focus".into(), Value::from(focus));
        facts
    }

    fn pick(&mut self, options: &[&'static str]) -> &'static str {
        options[self.rng.gen_range(0..options.len())]
    }

    #[allow(clippy::too_many_arguments)]
    fn compose_one(
        &mut self,
        role: Role,
        kind: EventKind,
        week: u32,
        facts: Facts,
        lead_pool: &str,
        detail_pools: &[&str],
        extra_pools: &[&str],
        memory: &mut AntiRepetitionMemory,
    ) -> ComposedMessage {
        let avoid = memory.last_opener(role).map(str::to_string);

        let lead = match self.pools.get(lead_pool) {
            Some(pool) => select_variant(pool, &facts, avoid.as_deref(), &mut self.rng),
            None => None,
        };
        let lead = lead.unwrap_or_else(|| {
            warn!(pool = lead_pool, week, "empty variation pool, using canonical phrasing");
            format!("{} for week {}.", kind.header(), week + 1)
        });

        let mut lines = vec![lead];
        for name in detail_pools {
            if let Some(pool) = self.pools.get(name) {
                let count = self.rng.gen_range(1..=2);
                lines.extend(select_distinct(pool, &facts, count, &mut self.rng));
            }
        }
        for name in extra_pools {
            if let Some(pool) = self.pools.get(name) {
                lines.extend(select_variant(pool, &facts, None, &mut self.rng));
            }
        }
        // Lead plus at most three details.
        lines.truncate(4);

        let greet_chance = f64::from(self.voices.greet_chance(role));
        if greet_chance > 0.0 && self.rng.gen_bool(greet_chance) {
            if let Some(pool) = self.pools.get("greeting") {
                if let Some(greeting) = select_variant(pool, &facts, None, &mut self.rng) {
                    lines.insert(0, greeting);
                }
            }
        }

        let seed = lines.join("\n");
        let opener = extract_opener(&seed);
        let previous_opener = memory.remember(role, opener.clone());

        ComposedMessage {
            role,
            kind,
            week,
            seed,
            facts,
            opener,
            previous_opener,
        }
    }
}

/// Hours logged this week. Box-Muller draw from N(5, 1), clamped to [2, 7].
fn sample_weekly_hours<R: Rng>(rng: &mut R) -> f64 {
    // 1 - u keeps the log argument in (0, 1].
    let u1 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    (HOURS_MEAN + HOURS_SD * z).clamp(HOURS_RANGE.0, HOURS_RANGE.1)
}

/// "up", "down" or "flat" for a weekly change.
fn trend(delta: f64, tolerance: f64) -> &'static str {
    if delta > tolerance {
        "up"
    } else if delta < -tolerance {
        "down"
    } else {
        "flat"
    }
}
