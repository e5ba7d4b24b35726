/// Weekly simulation integration tests: reproducibility, bounds and drift.

use coaching_engine::core::config::RunConfig;
use coaching_engine::core::simulation::{
    AdherenceModifiers, NoiseSpec, WeekContext, WeeklySimulationEngine,
};
use coaching_engine::core::travel::FixedTravelPlan;
use coaching_engine::schema::biomarker::{BiomarkerState, Metric};
use coaching_engine::schema::intervention::{Intervention, InterventionPlan, InterventionSpec};
use coaching_engine::schema::message::Role;
use std::collections::BTreeMap;

fn single_plan(effects: &[(&str, f64)], base_adherence: f64) -> InterventionPlan {
    let spec = InterventionSpec {
        name: "test".to_string(),
        domain: "cardio".to_string(),
        effects: effects.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        base_adherence,
        time_cost_hours: 1.0,
        recommended_by: Role::Physician,
    };
    let mut plan = InterventionPlan::new();
    plan.add(Intervention::from_spec(&spec).unwrap());
    plan
}

/// Run `weeks` weeks with the config's travel, noise and modifiers and
/// return the state after each week.
fn trajectory(config: &RunConfig, weeks: u32) -> Vec<(BiomarkerState, WeekContext)> {
    let mut engine =
        WeeklySimulationEngine::new(config.seed, Box::new(config.travel_plan().unwrap()))
            .with_noise(config.noise_spec().unwrap())
            .with_modifiers(config.adherence_modifiers().unwrap())
            .with_lapse_fraction(config.lapse_fraction);
    let plan = config.plan().unwrap();
    let mut state = config.baseline_state().unwrap();
    let mut ctx = WeekContext::default();
    (0..weeks)
        .map(|week| {
            engine.advance(week, &mut state, &plan, &mut ctx);
            (state.clone(), ctx.clone())
        })
        .collect()
}

#[test]
fn same_seed_same_trajectory() {
    let config = RunConfig::default();
    let a = trajectory(&config, 24);
    let b = trajectory(&config, 24);
    assert_eq!(a, b);
}

#[test]
fn different_seeds_diverge() {
    let a = trajectory(&RunConfig::default(), 12);
    let config = RunConfig {
        seed: 43,
        ..RunConfig::default()
    };
    let b = trajectory(&config, 12);
    assert_ne!(a, b);
}

#[test]
fn extreme_effects_stay_in_bounds() {
    let plan = single_plan(
        &[
            ("systolic_bp", -40.0),
            ("hrv_ms", 30.0),
            ("sleep_hours", 2.0),
            ("hs_crp", -5.0),
        ],
        1.0,
    );
    let mut engine = WeeklySimulationEngine::new(5, Box::new(FixedTravelPlan::grounded()))
        .with_modifiers(AdherenceModifiers::none());
    let mut state = BiomarkerState::default();
    let mut ctx = WeekContext::default();
    for week in 0..52 {
        engine.advance(week, &mut state, &plan, &mut ctx);
        assert!(state.within_bounds(), "out of bounds in week {}", week);
    }
    assert_eq!(state.get(Metric::SystolicBp), Metric::SystolicBp.range().min);
    assert_eq!(state.get(Metric::HrvMs), Metric::HrvMs.range().max);
}

#[test]
fn out_of_range_baseline_is_clamped() {
    let config = RunConfig {
        baseline: BTreeMap::from([
            ("systolic_bp".to_string(), 400.0),
            ("sleep_hours".to_string(), 1.0),
        ]),
        ..RunConfig::default()
    };
    let state = config.baseline_state().unwrap();
    assert_eq!(state.get(Metric::SystolicBp), 170.0);
    assert_eq!(state.get(Metric::SleepHours), 4.0);
}

#[test]
fn non_adherence_drifts_back() {
    let plan = single_plan(&[("systolic_bp", -2.0), ("diastolic_bp", -1.0)], 0.0);
    let mut engine = WeeklySimulationEngine::new(9, Box::new(FixedTravelPlan::grounded()))
        .with_noise(NoiseSpec::zero())
        .with_modifiers(AdherenceModifiers::none())
        .with_lapse_fraction(0.2);
    let mut state = BiomarkerState::default();
    let mut ctx = WeekContext::default();
    for week in 0..5 {
        engine.advance(week, &mut state, &plan, &mut ctx);
        assert!(!ctx.adherent);
        assert!(!ctx.win);
        assert_eq!(ctx.streak, 0);
    }
    assert!((state.get(Metric::SystolicBp) - 136.0).abs() < 1e-9);
    assert!((state.get(Metric::DiastolicBp) - 87.0).abs() < 1e-9);
}

#[test]
fn travel_weeks_follow_cadence() {
    let config = RunConfig::default();
    let travel_weeks: Vec<u32> = trajectory(&config, 12)
        .iter()
        .filter(|(_, ctx)| ctx.is_travel_week())
        .map(|(_, ctx)| ctx.week)
        .collect();
    assert_eq!(travel_weeks, vec![3, 7, 11]);
}
