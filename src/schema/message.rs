use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::event::EventKind;

/// Sender identity in the chat log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Care-team orchestrator: weekly reports, travel notes, booking.
    Concierge,
    Physician,
    PerformanceScientist,
    Nutritionist,
    Physiotherapist,
    /// The client's personal assistant.
    Assistant,
    /// The client.
    Member,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Concierge,
        Role::Physician,
        Role::PerformanceScientist,
        Role::Nutritionist,
        Role::Physiotherapist,
        Role::Assistant,
        Role::Member,
    ];

    /// Stable key used in facts payloads and voice files.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Concierge => "concierge",
            Self::Physician => "physician",
            Self::PerformanceScientist => "performance_scientist",
            Self::Nutritionist => "nutritionist",
            Self::Physiotherapist => "physiotherapist",
            Self::Assistant => "assistant",
            Self::Member => "member",
        }
    }

    pub fn is_member(&self) -> bool {
        matches!(self, Self::Member)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A fact value carried to templates and to the polishing collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Float(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Ordered fact map. Ordered so prompts and exports are reproducible.
pub type Facts = BTreeMap<String, Value>;

/// One chat message.
///
/// `seq` is assigned at insertion time and is unique across the run, so
/// `(week, seq)` is a total chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub week: u32,
    pub seq: u64,
    pub kind: EventKind,
    pub body: String,
}

impl Message {
    pub fn initiated_by_member(&self) -> bool {
        self.role.is_member() && self.kind == EventKind::MemberInitiated
    }
}
