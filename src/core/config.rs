/// Run configuration: RON loading, defaults, and validation.
///
/// Everything that can make a run fail is checked here, before the first
/// week is simulated.
use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::core::scheduler::SchedulerConfig;
use crate::core::simulation::{AdherenceModifiers, NoiseSpec};
use crate::core::travel::{FixedTravelPlan, TravelPenalty};
use crate::schema::biomarker::{BiomarkerState, Metric};
use crate::schema::intervention::{
    default_interventions, InterventionPlan, InterventionSpec, PlanChange, PlanChangeSpec,
    PlanError,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid intervention plan: {0}")]
    Plan(#[from] PlanError),
    #[error("unknown metric '{key}' in {section}")]
    UnknownMetric { section: &'static str, key: String },
    #[error("week count must be positive, got {0}")]
    NonPositiveWeeks(i64),
    #[error("cadence '{name}' must be at least 1")]
    InvalidCadence { name: &'static str },
    #[error("invalid probability for '{name}': {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("member question range {min}..={max} is empty")]
    InvalidMemberRange { min: u32, max: u32 },
    #[error("invalid timezone offset '{0}', expected e.g. +08:00")]
    InvalidTimezone(String),
    #[error("invalid start date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("travel is enabled but no destinations are configured")]
    EmptyDestinations,
    #[error("similarity threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),
    #[error("invalid value for '{name}': {value}")]
    InvalidValue { name: &'static str, value: f64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Polishing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NlgProvider {
    #[default]
    None,
    Ollama,
}

/// How the collaborator is asked to rewrite a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NlgMode {
    #[default]
    Off,
    Paraphrase,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NlgConfig {
    pub provider: NlgProvider,
    pub mode: NlgMode,
    pub model: String,
    pub host: String,
    pub timeout_secs: u64,
    pub temperature: f64,
    /// Reuse responses to identical requests within a run.
    pub cache: bool,
}

impl Default for NlgConfig {
    fn default() -> Self {
        Self {
            provider: NlgProvider::None,
            mode: NlgMode::Off,
            model: "llama3.1:8b".to_string(),
            host: "http://localhost:11434".to_string(),
            timeout_secs: 6,
            temperature: 0.7,
            cache: true,
        }
    }
}

impl NlgConfig {
    /// True when a collaborator should be consulted at all.
    pub fn enabled(&self) -> bool {
        self.provider != NlgProvider::None && self.mode != NlgMode::Off
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelConfig {
    /// Every `cadence_weeks`-th week number is a travel week. Zero disables
    /// travel.
    pub cadence_weeks: u32,
    pub destinations: Vec<String>,
    /// Metric key → delta applied in a travel week.
    pub penalty: BTreeMap<String, f64>,
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            cadence_weeks: 4,
            destinations: ["United Kingdom", "United States", "South Korea", "Jakarta"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            penalty: BTreeMap::from([
                ("sleep_hours".to_string(), -0.2),
                ("hrv_ms".to_string(), -1.0),
                ("rhr_bpm".to_string(), 1.0),
                ("systolic_bp".to_string(), 0.5),
                ("diastolic_bp".to_string(), 0.3),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdherenceConfig {
    /// When false every modifier is disabled and probabilities are clamped
    /// to [0, 1].
    pub enabled: bool,
    pub travel: f64,
    pub busy: f64,
    pub assistant_support: f64,
    pub previous_win: f64,
    pub overload: f64,
    pub overload_hours: f64,
    /// Every `busy_every`-th week number is a busy week. Zero disables.
    pub busy_every: u32,
    pub min: f64,
    pub max: f64,
}

impl Default for AdherenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            travel: -0.15,
            busy: -0.10,
            assistant_support: 0.10,
            previous_win: 0.05,
            overload: -0.10,
            overload_hours: 5.0,
            busy_every: 6,
            min: 0.05,
            max: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub threshold: f64,
    pub lookback: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            lookback: 3,
        }
    }
}

/// A complete run description. Every field has a default, so an empty RON
/// file `()` is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub seed: u64,
    pub weeks: i64,
    pub start_date: String,
    pub timezone: String,
    pub client_name: String,
    /// Metric key → starting value. Unlisted metrics use their baseline.
    pub baseline: BTreeMap<String, f64>,
    pub interventions: Vec<InterventionSpec>,
    pub plan_changes: Vec<PlanChangeSpec>,
    /// Fraction of an intervention's effect reversed in a lapsed week.
    pub lapse_fraction: f64,
    pub travel: TravelConfig,
    /// Metric key → noise amplitude override.
    pub noise: BTreeMap<String, f64>,
    pub adherence: AdherenceConfig,
    pub schedule: SchedulerConfig,
    pub dedup: DedupConfig,
    pub nlg: NlgConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            weeks: 32,
            start_date: "2025-01-06".to_string(),
            timezone: "+08:00".to_string(),
            client_name: "Rohan".to_string(),
            baseline: BTreeMap::new(),
            interventions: default_interventions(),
            plan_changes: Vec::new(),
            lapse_fraction: 0.2,
            travel: TravelConfig::default(),
            noise: BTreeMap::new(),
            adherence: AdherenceConfig::default(),
            schedule: SchedulerConfig::default(),
            dedup: DedupConfig::default(),
            nlg: NlgConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn load_from_ron(path: &Path) -> Result<RunConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<RunConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }

    /// Check every section. Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.week_count()?;
        self.start()?;
        self.offset()?;
        self.baseline_state()?;
        self.plan()?;
        self.plan_change_schedule()?;
        self.noise_spec()?;
        self.travel_plan()?;
        self.adherence_modifiers()?;
        self.schedule.validate()?;

        if !(0.0..=1.0).contains(&self.lapse_fraction) {
            return Err(ConfigError::InvalidValue {
                name: "lapse_fraction",
                value: self.lapse_fraction,
            });
        }
        if !(self.dedup.threshold > 0.0 && self.dedup.threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(self.dedup.threshold));
        }
        Ok(())
    }

    pub fn week_count(&self) -> Result<u32, ConfigError> {
        if self.weeks <= 0 {
            return Err(ConfigError::NonPositiveWeeks(self.weeks));
        }
        u32::try_from(self.weeks).map_err(|_| ConfigError::InvalidValue {
            name: "weeks",
            value: self.weeks as f64,
        })
    }

    pub fn start(&self) -> Result<NaiveDate, ConfigError> {
        NaiveDate::parse_from_str(self.start_date.trim(), "%Y-%m-%d")
            .map_err(|_| ConfigError::InvalidDate(self.start_date.clone()))
    }

    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        parse_offset(&self.timezone).ok_or_else(|| ConfigError::InvalidTimezone(self.timezone.clone()))
    }

    pub fn baseline_state(&self) -> Result<BiomarkerState, ConfigError> {
        let profile = metric_map("baseline", &self.baseline)?;
        Ok(BiomarkerState::from_profile(profile))
    }

    pub fn plan(&self) -> Result<InterventionPlan, ConfigError> {
        Ok(InterventionPlan::from_specs(&self.interventions)?)
    }

    /// Validated plan changes, sorted by week (stable for same-week changes).
    ///
    /// Changes are dry-run against the initial plan so a replace or remove
    /// of an intervention that won't exist is rejected up front.
    pub fn plan_change_schedule(&self) -> Result<Vec<(u32, PlanChange)>, ConfigError> {
        let mut changes = self
            .plan_changes
            .iter()
            .map(|spec| spec.to_change())
            .collect::<Result<Vec<_>, _>>()?;
        changes.sort_by_key(|(week, _)| *week);

        let mut dry_run = self.plan()?;
        for (_, change) in &changes {
            dry_run.apply(change.clone())?;
        }
        Ok(changes)
    }

    pub fn noise_spec(&self) -> Result<NoiseSpec, ConfigError> {
        let mut noise = NoiseSpec::default();
        for (metric, amplitude) in metric_map("noise", &self.noise)? {
            if !amplitude.is_finite() || amplitude < 0.0 {
                return Err(ConfigError::InvalidValue {
                    name: "noise",
                    value: amplitude,
                });
            }
            noise = noise.with_amplitude(metric, amplitude);
        }
        Ok(noise)
    }

    pub fn travel_plan(&self) -> Result<FixedTravelPlan, ConfigError> {
        let penalty = TravelPenalty::new(metric_map("travel penalty", &self.travel.penalty)?);
        if self.travel.cadence_weeks > 0 && self.travel.destinations.is_empty() {
            return Err(ConfigError::EmptyDestinations);
        }
        Ok(FixedTravelPlan::new(
            self.travel.cadence_weeks,
            self.travel.destinations.clone(),
            penalty,
        ))
    }

    pub fn adherence_modifiers(&self) -> Result<AdherenceModifiers, ConfigError> {
        let a = &self.adherence;
        if !a.enabled {
            return Ok(AdherenceModifiers::none());
        }
        for (name, value) in [("adherence.min", a.min), ("adherence.max", a.max)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidProbability { name, value });
            }
        }
        if a.min > a.max {
            return Err(ConfigError::InvalidValue {
                name: "adherence.min",
                value: a.min,
            });
        }
        Ok(AdherenceModifiers {
            travel: a.travel,
            busy: a.busy,
            assistant_support: a.assistant_support,
            previous_win: a.previous_win,
            overload: a.overload,
            overload_hours: a.overload_hours,
            busy_every: a.busy_every,
            floor: a.min,
            ceiling: a.max,
        })
    }
}

fn metric_map(
    section: &'static str,
    raw: &BTreeMap<String, f64>,
) -> Result<Vec<(Metric, f64)>, ConfigError> {
    raw.iter()
        .map(|(key, value)| {
            Metric::from_key(key)
                .map(|m| (m, *value))
                .ok_or_else(|| ConfigError::UnknownMetric {
                    section,
                    key: key.clone(),
                })
        })
        .collect()
}

/// Parse "+08:00", "-05:30", "+0800", "Z" or "UTC".
pub fn parse_offset(input: &str) -> Option<FixedOffset> {
    let s = input.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => (rest.get(..2)?, rest.get(2..)?),
        None => (rest, "0"),
    };
    if hours.is_empty() || !hours.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !minutes.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
