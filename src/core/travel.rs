/// Travel disruption, consumed by the simulation engine as an input.
use serde::{Deserialize, Serialize};

use crate::schema::biomarker::Metric;

/// Per-metric deltas applied in a travel week, independent of adherence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TravelPenalty {
    pub deltas: Vec<(Metric, f64)>,
}

impl TravelPenalty {
    pub fn new(deltas: Vec<(Metric, f64)>) -> Self {
        Self { deltas }
    }
}

/// One trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelLeg {
    pub destination: String,
    pub penalty: TravelPenalty,
}

/// Supplies the travel disruption for a week, if any.
pub trait TravelModel {
    /// `week` is the 0-based week index.
    fn leg_for_week(&self, week: u32) -> Option<TravelLeg>;
}

/// Travel on a fixed cadence, cycling through destinations.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedTravelPlan {
    cadence: u32,
    destinations: Vec<String>,
    penalty: TravelPenalty,
}

impl FixedTravelPlan {
    pub fn new(cadence: u32, destinations: Vec<String>, penalty: TravelPenalty) -> Self {
        Self {
            cadence,
            destinations,
            penalty,
        }
    }

    /// A plan that never travels.
    pub fn grounded() -> Self {
        Self::new(0, Vec::new(), TravelPenalty::default())
    }
}

impl TravelModel for FixedTravelPlan {
    fn leg_for_week(&self, week: u32) -> Option<TravelLeg> {
        if self.cadence == 0 || self.destinations.is_empty() {
            return None;
        }
        let number = week + 1;
        if number % self.cadence != 0 {
            return None;
        }
        let trip = (number / self.cadence - 1) as usize;
        Some(TravelLeg {
            destination: self.destinations[trip % self.destinations.len()].clone(),
            penalty: self.penalty.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> FixedTravelPlan {
        FixedTravelPlan::new(
            4,
            vec!["United Kingdom".to_string(), "Jakarta".to_string()],
            TravelPenalty::new(vec![(Metric::SleepHours, -0.2)]),
        )
    }

    #[test]
    fn travels_every_fourth_week_number() {
        let plan = plan();
        let travel_weeks: Vec<u32> = (0..16).filter(|w| plan.leg_for_week(*w).is_some()).collect();
        assert_eq!(travel_weeks, vec![3, 7, 11, 15]);
    }

    #[test]
    fn destinations_cycle() {
        let plan = plan();
        let dests: Vec<String> = [3, 7, 11]
            .iter()
            .map(|w| plan.leg_for_week(*w).unwrap().destination)
            .collect();
        assert_eq!(dests, vec!["United Kingdom", "Jakarta", "United Kingdom"]);
    }

    #[test]
    fn grounded_plan_never_travels() {
        let plan = FixedTravelPlan::grounded();
        assert!((0..52).all(|w| plan.leg_for_week(w).is_none()));
    }
}
