/// Weekly biomarker simulation: adherence draws, intervention effects, travel
/// penalties and bounded noise.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

use crate::core::travel::{TravelLeg, TravelModel};
use crate::schema::biomarker::{BiomarkerState, Metric, METRIC_COUNT};
use crate::schema::intervention::InterventionPlan;

/// Change actually applied to each metric in one week, after clamping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedDeltas {
    deltas: Vec<(Metric, f64)>,
}

impl Default for AppliedDeltas {
    fn default() -> Self {
        Self {
            deltas: Metric::ALL.iter().map(|m| (*m, 0.0)).collect(),
        }
    }
}

impl AppliedDeltas {
    pub fn get(&self, metric: Metric) -> f64 {
        self.deltas
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, d)| *d)
            .unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Metric, f64)> {
        self.deltas.iter()
    }
}

/// Outcome of one intervention's adherence draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdherenceOutcome {
    pub intervention: String,
    pub probability: f64,
    pub adhered: bool,
}

/// Accumulated simulation state, rebuilt in place each week.
///
/// This is the only channel through which the engine tells the composer why
/// a week's numbers moved.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeekContext {
    /// 0-based index of the week most recently advanced.
    pub week: u32,
    /// Week-level adherence: at least half the plan was followed.
    pub adherent: bool,
    pub outcomes: Vec<AdherenceOutcome>,
    /// Adherent with no travel penalty.
    pub win: bool,
    pub streak: u32,
    pub exercise_phase: u32,
    pub travel: Option<TravelLeg>,
    pub busy: bool,
    pub deltas: AppliedDeltas,
}

impl WeekContext {
    /// 1-based week number used for cadence arithmetic.
    pub fn week_number(&self) -> u32 {
        self.week + 1
    }

    /// Share of interventions adhered to this week, 1.0 for an empty plan.
    pub fn adherence_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 1.0;
        }
        let adhered = self.outcomes.iter().filter(|o| o.adhered).count();
        adhered as f64 / self.outcomes.len() as f64
    }

    pub fn is_travel_week(&self) -> bool {
        self.travel.is_some()
    }
}

/// Additive adjustments to each intervention's base adherence probability.
#[derive(Debug, Clone, PartialEq)]
pub struct AdherenceModifiers {
    pub travel: f64,
    pub busy: f64,
    pub assistant_support: f64,
    pub previous_win: f64,
    pub overload: f64,
    pub overload_hours: f64,
    /// Every `busy_every`-th week number is busy; zero means never.
    pub busy_every: u32,
    pub floor: f64,
    pub ceiling: f64,
}

impl Default for AdherenceModifiers {
    fn default() -> Self {
        Self {
            travel: -0.15,
            busy: -0.10,
            assistant_support: 0.10,
            previous_win: 0.05,
            overload: -0.10,
            overload_hours: 5.0,
            busy_every: 6,
            floor: 0.05,
            ceiling: 0.95,
        }
    }
}

impl AdherenceModifiers {
    /// Base probabilities used as-is.
    pub fn none() -> Self {
        Self {
            travel: 0.0,
            busy: 0.0,
            assistant_support: 0.0,
            previous_win: 0.0,
            overload: 0.0,
            overload_hours: f64::INFINITY,
            busy_every: 0,
            floor: 0.0,
            ceiling: 1.0,
        }
    }

    pub fn is_busy_week(&self, week: u32) -> bool {
        self.busy_every > 0 && (week + 1) % self.busy_every == 0
    }

    pub fn probability(
        &self,
        base: f64,
        travel: bool,
        busy: bool,
        previous_win: bool,
        weekly_hours: f64,
    ) -> f64 {
        let mut p = base + self.assistant_support;
        if travel {
            p += self.travel;
        }
        if busy {
            p += self.busy;
        }
        if previous_win {
            p += self.previous_win;
        }
        if weekly_hours > self.overload_hours {
            p += self.overload;
        }
        p.clamp(self.floor, self.ceiling)
    }
}

/// Per-metric noise amplitudes. Noise is triangular on `(-a, a)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseSpec {
    amplitudes: Vec<(Metric, f64)>,
}

impl Default for NoiseSpec {
    fn default() -> Self {
        let amplitudes = Metric::ALL
            .iter()
            .map(|m| {
                let a = match m {
                    Metric::SystolicBp => 0.8,
                    Metric::DiastolicBp => 0.6,
                    Metric::ApoB => 1.2,
                    Metric::LdlC => 1.6,
                    Metric::HsCrp => 0.2,
                    Metric::HbA1c => 0.04,
                    Metric::Bmi => 0.06,
                    Metric::HrvMs => 1.6,
                    Metric::RhrBpm => 1.0,
                    Metric::SleepHours => 0.2,
                };
                (*m, a)
            })
            .collect();
        Self { amplitudes }
    }
}

impl NoiseSpec {
    pub fn zero() -> Self {
        Self {
            amplitudes: Metric::ALL.iter().map(|m| (*m, 0.0)).collect(),
        }
    }

    pub fn with_amplitude(mut self, metric: Metric, amplitude: f64) -> Self {
        for (m, a) in self.amplitudes.iter_mut() {
            if *m == metric {
                *a = amplitude.abs();
            }
        }
        self
    }

    pub fn amplitude(&self, metric: Metric) -> f64 {
        self.amplitudes
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, a)| *a)
            .unwrap_or(0.0)
    }

    /// Two draws are taken whatever the amplitude so the stream position
    /// never depends on the noise settings.
    fn sample<R: Rng>(&self, metric: Metric, rng: &mut R) -> f64 {
        let u1: f64 = rng.gen();
        let u2: f64 = rng.gen();
        self.amplitude(metric) * (u1 - u2)
    }
}

/// Advances the biomarker state one week at a time.
///
/// Owns the run's single adherence/noise stream, so two engines built from
/// the same seed produce the same sequence of weeks.
pub struct WeeklySimulationEngine {
    rng: StdRng,
    noise: NoiseSpec,
    modifiers: AdherenceModifiers,
    lapse_fraction: f64,
    phase_every: u32,
    travel: Box<dyn TravelModel>,
}

impl WeeklySimulationEngine {
    pub fn new(seed: u64, travel: Box<dyn TravelModel>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            noise: NoiseSpec::default(),
            modifiers: AdherenceModifiers::default(),
            lapse_fraction: 0.2,
            phase_every: 2,
            travel,
        }
    }

    pub fn with_noise(mut self, noise: NoiseSpec) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_modifiers(mut self, modifiers: AdherenceModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_lapse_fraction(mut self, lapse_fraction: f64) -> Self {
        self.lapse_fraction = lapse_fraction;
        self
    }

    pub fn with_phase_every(mut self, weeks: u32) -> Self {
        self.phase_every = weeks.max(1);
        self
    }

    /// Simulate week `week`: draw adherence per intervention, apply effects
    /// (or lapse drift), travel penalty and noise, clamp, and rebuild `ctx`.
    pub fn advance(
        &mut self,
        week: u32,
        state: &mut BiomarkerState,
        plan: &InterventionPlan,
        ctx: &mut WeekContext,
    ) -> AppliedDeltas {
        let travel = self.travel.leg_for_week(week);
        let busy = self.modifiers.is_busy_week(week);
        let previous_win = ctx.win;
        let weekly_hours = plan.weekly_hours();

        let mut raw = [0.0; METRIC_COUNT];

        let mut outcomes = Vec::with_capacity(plan.len());
        for intervention in plan.iter() {
            let probability = self.modifiers.probability(
                intervention.base_adherence,
                travel.is_some(),
                busy,
                previous_win,
                weekly_hours,
            );
            let adhered = self.rng.gen::<f64>() < probability;
            let scale = if adhered { 1.0 } else { -self.lapse_fraction };
            for (metric, effect) in &intervention.effects {
                raw[metric.index()] += scale * effect;
            }
            outcomes.push(AdherenceOutcome {
                intervention: intervention.name.clone(),
                probability,
                adhered,
            });
        }

        if let Some(leg) = &travel {
            for (metric, delta) in &leg.penalty.deltas {
                raw[metric.index()] += delta;
            }
        }

        for metric in Metric::ALL {
            raw[metric.index()] += self.noise.sample(metric, &mut self.rng);
        }

        let deltas = AppliedDeltas {
            deltas: Metric::ALL
                .iter()
                .map(|m| (*m, state.apply_delta(*m, raw[m.index()])))
                .collect(),
        };

        let adhered = outcomes.iter().filter(|o| o.adhered).count();
        let adherent = adhered * 2 >= outcomes.len();
        let win = adherent && travel.is_none();

        ctx.week = week;
        ctx.adherent = adherent;
        ctx.outcomes = outcomes;
        ctx.win = win;
        ctx.streak = if win { ctx.streak + 1 } else { 0 };
        ctx.exercise_phase = week / self.phase_every;
        ctx.busy = busy;
        ctx.travel = travel;
        ctx.deltas = deltas.clone();

        debug!(
            week,
            adherent,
            adhered,
            planned = plan.len(),
            streak = ctx.streak,
            travel = ctx.travel.as_ref().map(|t| t.destination.as_str()),
            bp = %state.blood_pressure(),
            "advanced week"
        );

        deltas
    }
}
