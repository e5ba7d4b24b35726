/// Event scheduling: cadence events plus drawn wearable and member traffic.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::config::ConfigError;
use crate::core::simulation::WeekContext;
use crate::schema::event::{EventKind, EventOccurrence};

/// Cadences are in weeks and apply to the 1-based week number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub pt_every: u32,
    pub diagnostics_every: u32,
    pub nutrition_every: u32,
    /// Remainder of the week number at which nutrition updates land.
    pub nutrition_offset: u32,
    pub wearable_chance: f64,
    pub member_min: u32,
    pub member_max: u32,
    /// Exercise program phase length.
    pub phase_every: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pt_every: 2,
            diagnostics_every: 12,
            nutrition_every: 4,
            nutrition_offset: 3,
            wearable_chance: 0.5,
            member_min: 3,
            member_max: 7,
            phase_every: 2,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("schedule.pt_every", self.pt_every),
            ("schedule.diagnostics_every", self.diagnostics_every),
            ("schedule.nutrition_every", self.nutrition_every),
            ("schedule.phase_every", self.phase_every),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidCadence { name });
            }
        }
        if !(0.0..=1.0).contains(&self.wearable_chance) {
            return Err(ConfigError::InvalidProbability {
                name: "schedule.wearable_chance",
                value: self.wearable_chance,
            });
        }
        if self.member_min > self.member_max {
            return Err(ConfigError::InvalidMemberRange {
                min: self.member_min,
                max: self.member_max,
            });
        }
        Ok(())
    }
}

/// Decides which events fire each week.
///
/// Draws come from the scheduling stream only, never from the simulation
/// stream, so biomarker noise and event traffic are independently
/// reproducible.
#[derive(Debug, Clone)]
pub struct EventScheduler {
    config: SchedulerConfig,
    total_weeks: i64,
    rng: StdRng,
}

impl EventScheduler {
    pub fn new(config: SchedulerConfig, total_weeks: i64, seed: u64) -> Self {
        Self {
            config,
            total_weeks,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Events for week `week`, in priority order.
    ///
    /// Empty when the week lies outside a positive run length. Week 0 always
    /// carries the welcome report.
    pub fn events_for_week(&mut self, week: u32, ctx: &WeekContext) -> Vec<EventOccurrence> {
        if self.total_weeks <= 0 || i64::from(week) >= self.total_weeks {
            return Vec::new();
        }

        let cfg = &self.config;
        let number = week + 1;
        let travel = ctx.week == week && ctx.is_travel_week();

        // Fixed draw order: wearable roll, then member count.
        let wearable_roll: f64 = self.rng.gen();
        let member_count = self.rng.gen_range(cfg.member_min..=cfg.member_max);

        let mut kinds = Vec::new();
        if number % cfg.diagnostics_every == 0 {
            kinds.push(EventKind::Diagnostics);
        }
        kinds.push(EventKind::WeeklyReport);
        if number % cfg.pt_every == 0 {
            kinds.push(EventKind::PtUpdate);
        }
        if number % cfg.nutrition_every == cfg.nutrition_offset % cfg.nutrition_every {
            kinds.push(EventKind::NutritionUpdate);
        }
        if travel {
            kinds.push(EventKind::TravelNote);
        }
        if travel || wearable_roll < cfg.wearable_chance {
            kinds.push(EventKind::WearableUpdate);
        }

        let mut events: Vec<EventOccurrence> = kinds
            .into_iter()
            .map(|kind| EventOccurrence::new(kind, week, 0))
            .collect();
        events.extend(
            (0..member_count).map(|i| EventOccurrence::new(EventKind::MemberInitiated, week, i)),
        );
        events.sort_by_key(|e| (e.kind, e.ordinal));
        events
    }
}
