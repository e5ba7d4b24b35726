/// Post-run coverage checks. Issues are warnings; a run never fails here.
use std::collections::BTreeSet;
use std::fmt;

use crate::core::export::LogEntry;
use crate::schema::event::EventKind;

/// Expected range of member-initiated messages per week.
const MEMBER_PER_WEEK: (f64, f64) = (3.0, 7.0);

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub check: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.check, self.message)
    }
}

fn count(entries: &[LogEntry], kind: EventKind) -> usize {
    entries.iter().filter(|e| e.kind == kind).count()
}

/// Check a finished log of `weeks` weeks for missing coverage.
pub fn validate_log(entries: &[LogEntry], weeks: u32) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let weeks_usize = weeks as usize;

    let reports = count(entries, EventKind::WeeklyReport);
    if reports < weeks_usize {
        issues.push(ValidationIssue {
            check: "weekly_report",
            message: format!("{} weekly reports for {} weeks", reports, weeks),
        });
    }

    let pt = count(entries, EventKind::PtUpdate);
    let pt_min = (weeks_usize / 2).saturating_sub(1);
    if pt < pt_min {
        issues.push(ValidationIssue {
            check: "pt_update",
            message: format!("{} PT updates, expected at least {}", pt, pt_min),
        });
    }

    // One diagnostics round per week it fires in, however many speakers.
    let diagnostics: BTreeSet<u32> = entries
        .iter()
        .filter(|e| e.kind == EventKind::Diagnostics)
        .map(|e| e.week)
        .collect();
    let diagnostics_expected = weeks_usize / 12;
    if diagnostics.len() != diagnostics_expected {
        issues.push(ValidationIssue {
            check: "diagnostics",
            message: format!(
                "{} diagnostics rounds, expected {}",
                diagnostics.len(),
                diagnostics_expected
            ),
        });
    }

    let travel = count(entries, EventKind::TravelNote);
    let travel_min = weeks_usize / 4;
    if travel < travel_min {
        issues.push(ValidationIssue {
            check: "travel_note",
            message: format!("{} travel notes, expected at least {}", travel, travel_min),
        });
    }

    if weeks > 0 {
        let member = entries.iter().filter(|e| e.initiated_by_member).count();
        let average = member as f64 / f64::from(weeks);
        if average < MEMBER_PER_WEEK.0 || average > MEMBER_PER_WEEK.1 {
            issues.push(ValidationIssue {
                check: "member_initiated",
                message: format!("{:.1} member messages per week", average),
            });
        }
    }

    issues
}
