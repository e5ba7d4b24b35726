use serde::{Deserialize, Serialize};

use super::message::Role;

/// The kind of a scheduled firing.
///
/// Variant order is the tie-break priority when several events land in the
/// same week: `Diagnostics` is composed first, `MemberInitiated` last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Diagnostics,
    WeeklyReport,
    PtUpdate,
    NutritionUpdate,
    TravelNote,
    WearableUpdate,
    MemberInitiated,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Diagnostics,
        EventKind::WeeklyReport,
        EventKind::PtUpdate,
        EventKind::NutritionUpdate,
        EventKind::TravelNote,
        EventKind::WearableUpdate,
        EventKind::MemberInitiated,
    ];

    /// Wire name (e.g., "weekly_report").
    pub fn name(&self) -> &'static str {
        match self {
            Self::Diagnostics => "diagnostics",
            Self::WeeklyReport => "weekly_report",
            Self::PtUpdate => "pt_update",
            Self::NutritionUpdate => "nutrition_update",
            Self::TravelNote => "travel_note",
            Self::WearableUpdate => "wearable_update",
            Self::MemberInitiated => "member_initiated",
        }
    }

    /// Header a collaborator is told to omit, and which the post-processor
    /// strips if it leaks into a body anyway.
    pub fn header(&self) -> &'static str {
        match self {
            Self::Diagnostics => "Diagnostics results",
            Self::WeeklyReport => "Weekly report",
            Self::PtUpdate => "Exercise update",
            Self::NutritionUpdate => "Nutrition update",
            Self::TravelNote => "Travel adaptation",
            Self::WearableUpdate => "Wearable note",
            Self::MemberInitiated => "Question",
        }
    }
}

/// A scheduled firing of one event kind in one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventOccurrence {
    pub kind: EventKind,
    pub week: u32,
    /// Roles expected to speak, in speaking order. For member-initiated
    /// events the replying expert is chosen at composition time, so only the
    /// member is listed here.
    pub roles: Vec<Role>,
    /// Ordinal among same-kind occurrences in this week.
    pub ordinal: u32,
}

impl EventOccurrence {
    pub fn new(kind: EventKind, week: u32, ordinal: u32) -> Self {
        let roles = match kind {
            EventKind::Diagnostics => vec![Role::Concierge, Role::Assistant, Role::Physician],
            EventKind::WeeklyReport | EventKind::TravelNote => vec![Role::Concierge],
            EventKind::PtUpdate => vec![Role::Physiotherapist],
            EventKind::NutritionUpdate => vec![Role::Nutritionist],
            EventKind::WearableUpdate => vec![Role::PerformanceScientist],
            EventKind::MemberInitiated => vec![Role::Member],
        };
        Self {
            kind,
            week,
            roles,
            ordinal,
        }
    }
}
