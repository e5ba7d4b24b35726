use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::biomarker::Metric;
use super::message::Role;

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("intervention '{intervention}' targets unknown metric '{key}'")]
    UnknownMetric { intervention: String, key: String },
    #[error("intervention '{intervention}' has adherence probability {probability} outside [0, 1]")]
    AdherenceOutOfRange {
        intervention: String,
        probability: f64,
    },
    #[error("intervention '{0}' has no effects")]
    NoEffects(String),
    #[error("intervention '{0}' has a non-finite effect or cost")]
    NonFinite(String),
    #[error("no intervention named '{0}' in the plan")]
    NotFound(String),
}

/// Unvalidated intervention as written in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionSpec {
    pub name: String,
    #[serde(default)]
    pub domain: String,
    /// Metric key → change per adherent week.
    pub effects: BTreeMap<String, f64>,
    #[serde(default = "default_adherence")]
    pub base_adherence: f64,
    #[serde(default)]
    pub time_cost_hours: f64,
    #[serde(default = "default_recommender")]
    pub recommended_by: Role,
}

fn default_adherence() -> f64 {
    0.5
}

fn default_recommender() -> Role {
    Role::Concierge
}

/// A validated intervention.
#[derive(Debug, Clone, PartialEq)]
pub struct Intervention {
    pub name: String,
    pub domain: String,
    pub effects: Vec<(Metric, f64)>,
    pub base_adherence: f64,
    pub time_cost_hours: f64,
    pub recommended_by: Role,
}

impl Intervention {
    /// Validate a spec: every key must be a known metric and the adherence
    /// probability must lie in [0, 1].
    pub fn from_spec(spec: &InterventionSpec) -> Result<Intervention, PlanError> {
        if !(0.0..=1.0).contains(&spec.base_adherence) {
            return Err(PlanError::AdherenceOutOfRange {
                intervention: spec.name.clone(),
                probability: spec.base_adherence,
            });
        }
        if spec.effects.is_empty() {
            return Err(PlanError::NoEffects(spec.name.clone()));
        }
        if !spec.time_cost_hours.is_finite() || spec.time_cost_hours < 0.0 {
            return Err(PlanError::NonFinite(spec.name.clone()));
        }

        let mut effects = Vec::with_capacity(spec.effects.len());
        for (key, delta) in &spec.effects {
            let metric = Metric::from_key(key).ok_or_else(|| PlanError::UnknownMetric {
                intervention: spec.name.clone(),
                key: key.clone(),
            })?;
            if !delta.is_finite() {
                return Err(PlanError::NonFinite(spec.name.clone()));
            }
            effects.push((metric, *delta));
        }

        Ok(Intervention {
            name: spec.name.clone(),
            domain: spec.domain.clone(),
            effects,
            base_adherence: spec.base_adherence,
            time_cost_hours: spec.time_cost_hours,
            recommended_by: spec.recommended_by,
        })
    }

    /// Expected effect on one metric, zero if untargeted.
    pub fn effect_on(&self, metric: Metric) -> f64 {
        self.effects
            .iter()
            .filter(|(m, _)| *m == metric)
            .map(|(_, d)| d)
            .sum()
    }
}

/// Ordered set of active interventions.
///
/// Changes are forward-only: adding or replacing affects the next call to
/// the simulation engine, never weeks already advanced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterventionPlan {
    interventions: Vec<Intervention>,
}

impl InterventionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &[InterventionSpec]) -> Result<InterventionPlan, PlanError> {
        let mut plan = Self::new();
        for spec in specs {
            plan.add(Intervention::from_spec(spec)?);
        }
        Ok(plan)
    }

    pub fn add(&mut self, intervention: Intervention) {
        self.interventions.push(intervention);
    }

    /// Replace the intervention with the same name, keeping its position.
    pub fn replace(&mut self, intervention: Intervention) -> Result<(), PlanError> {
        let slot = self
            .interventions
            .iter_mut()
            .find(|iv| iv.name == intervention.name)
            .ok_or_else(|| PlanError::NotFound(intervention.name.clone()))?;
        *slot = intervention;
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Intervention> {
        let pos = self.interventions.iter().position(|iv| iv.name == name)?;
        Some(self.interventions.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Intervention> {
        self.interventions.iter()
    }

    pub fn len(&self) -> usize {
        self.interventions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interventions.is_empty()
    }

    /// Total weekly time the plan asks of the client.
    pub fn weekly_hours(&self) -> f64 {
        self.interventions.iter().map(|iv| iv.time_cost_hours).sum()
    }

    pub fn apply(&mut self, change: PlanChange) -> Result<(), PlanError> {
        match change {
            PlanChange::Add(intervention) => {
                self.add(intervention);
                Ok(())
            }
            PlanChange::Replace(intervention) => self.replace(intervention),
            PlanChange::Remove(name) => self
                .remove(&name)
                .map(|_| ())
                .ok_or(PlanError::NotFound(name)),
        }
    }
}

/// A between-weeks edit to the active plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanChange {
    Add(Intervention),
    Replace(Intervention),
    Remove(String),
}

/// Config form of a plan change, applied before the given week is simulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanChangeSpec {
    Add { week: u32, intervention: InterventionSpec },
    Replace { week: u32, intervention: InterventionSpec },
    Remove { week: u32, name: String },
}

impl PlanChangeSpec {
    pub fn to_change(&self) -> Result<(u32, PlanChange), PlanError> {
        Ok(match self {
            Self::Add { week, intervention } => {
                (*week, PlanChange::Add(Intervention::from_spec(intervention)?))
            }
            Self::Replace { week, intervention } => {
                (*week, PlanChange::Replace(Intervention::from_spec(intervention)?))
            }
            Self::Remove { week, name } => (*week, PlanChange::Remove(name.clone())),
        })
    }
}

/// The canonical plan used when a run config doesn't provide one.
pub fn default_interventions() -> Vec<InterventionSpec> {
    fn spec(
        name: &str,
        domain: &str,
        effects: &[(&str, f64)],
        hours: f64,
        by: Role,
    ) -> InterventionSpec {
        InterventionSpec {
            name: name.to_string(),
            domain: domain.to_string(),
            effects: effects.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            base_adherence: 0.5,
            time_cost_hours: hours,
            recommended_by: by,
        }
    }

    vec![
        spec(
            "Mediterranean-pattern meals",
            "nutrition",
            &[("apob", -0.7), ("ldl_c", -0.9), ("hs_crp", -0.06), ("bmi", -0.03)],
            1.5,
            Role::Nutritionist,
        ),
        spec(
            "Omega-3 supplementation",
            "nutrition",
            &[("apob", -0.4), ("hs_crp", -0.05)],
            0.1,
            Role::Nutritionist,
        ),
        spec(
            "Caffeine cutoff at 13:00",
            "sleep",
            &[("sleep_hours", 0.10), ("hrv_ms", 0.5), ("rhr_bpm", -0.2)],
            0.0,
            Role::Nutritionist,
        ),
        spec(
            "Morning light exposure",
            "sleep",
            &[("sleep_hours", 0.08), ("hrv_ms", 0.6), ("rhr_bpm", -0.2)],
            0.3,
            Role::PerformanceScientist,
        ),
        spec(
            "Zone-2 run",
            "cardio",
            &[
                ("hrv_ms", 0.7),
                ("rhr_bpm", -0.3),
                ("systolic_bp", -0.6),
                ("diastolic_bp", -0.4),
            ],
            0.8,
            Role::PerformanceScientist,
        ),
        spec(
            "Strength training and daily mobility",
            "pt",
            &[("bmi", -0.04), ("systolic_bp", -0.5), ("diastolic_bp", -0.3)],
            2.2,
            Role::Physiotherapist,
        ),
        spec(
            "Sodium awareness",
            "nutrition",
            &[("systolic_bp", -0.4), ("diastolic_bp", -0.3)],
            0.2,
            Role::Nutritionist,
        ),
    ]
}
