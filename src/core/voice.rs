/// Voice system — display names, tone and greeting habits per role.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::schema::message::Role;

const DEFAULT_VOICES: &str = include_str!("../../data/voices.ron");

/// How one role sounds in the chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub role: Role,
    /// Sender label in the exported log. Empty for the member, whose label
    /// is the client's name.
    #[serde(default)]
    pub display_name: String,
    /// Passed to the polishing collaborator.
    #[serde(default)]
    pub tone: String,
    /// Probability of opening with a greeting line (0.0..1.0).
    #[serde(default)]
    pub greet_chance: f32,
}

/// Registry of voices keyed by role.
#[derive(Debug, Clone, Default)]
pub struct VoiceRegistry {
    voices: FxHashMap<Role, Voice>,
    member_name: String,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The voices shipped with the crate.
    pub fn defaults() -> Result<Self, VoiceError> {
        Self::parse_ron(DEFAULT_VOICES)
    }

    pub fn register(&mut self, voice: Voice) {
        self.voices.insert(voice.role, voice);
    }

    pub fn get(&self, role: Role) -> Option<&Voice> {
        self.voices.get(&role)
    }

    /// Parse a list of voices from a RON string.
    pub fn parse_ron(input: &str) -> Result<Self, VoiceError> {
        let voices: Vec<Voice> = ron::from_str(input)?;
        let mut registry = Self::new();
        for voice in voices {
            registry.register(voice);
        }
        Ok(registry)
    }

    /// Load voices from a RON file into this registry, replacing voices for
    /// the same roles.
    pub fn load_from_ron(&mut self, path: &Path) -> Result<(), VoiceError> {
        let contents = std::fs::read_to_string(path)?;
        let loaded = Self::parse_ron(&contents)?;
        self.merge(loaded);
        Ok(())
    }

    pub fn merge(&mut self, other: VoiceRegistry) {
        for (_, voice) in other.voices {
            self.register(voice);
        }
        if !other.member_name.is_empty() {
            self.member_name = other.member_name;
        }
    }

    pub fn set_member_name(&mut self, name: &str) {
        self.member_name = name.trim().to_string();
    }

    pub fn member_name(&self) -> &str {
        if self.member_name.is_empty() {
            "Member"
        } else {
            &self.member_name
        }
    }

    /// Sender label for a role. Falls back to the client's name for the
    /// member and to the role key for an unregistered role.
    pub fn display_name(&self, role: Role) -> String {
        match self.voices.get(&role) {
            Some(voice) if !voice.display_name.is_empty() => voice.display_name.clone(),
            _ if role.is_member() => self.member_name().to_string(),
            _ => role.key().to_string(),
        }
    }

    /// First word of the display name ("Ruby", "Dr. Warren" → "Dr.").
    pub fn short_name(&self, role: Role) -> String {
        let full = self.display_name(role);
        match full.find(" (") {
            Some(idx) => full[..idx].to_string(),
            None => full,
        }
    }

    pub fn tone(&self, role: Role) -> &str {
        self.voices
            .get(&role)
            .map(|v| v.tone.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or("concise and helpful")
    }

    /// Greeting probability. The member never greets.
    pub fn greet_chance(&self, role: Role) -> f32 {
        if role.is_member() {
            return 0.0;
        }
        self.voices
            .get(&role)
            .map(|v| v.greet_chance.clamp(0.0, 1.0))
            .unwrap_or(0.0)
    }

    /// Every label a collaborator might echo at the start of a line.
    pub fn speaker_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for role in Role::ALL {
            names.push(self.display_name(role));
            names.push(self.short_name(role));
        }
        names.sort();
        names.dedup();
        names
    }

    /// Roles with no registered voice.
    pub fn missing_roles(&self) -> Vec<Role> {
        Role::ALL
            .iter()
            .copied()
            .filter(|r| !self.voices.contains_key(r))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_role() {
        let registry = VoiceRegistry::defaults().unwrap();
        assert!(registry.missing_roles().is_empty());
        assert_eq!(registry.display_name(Role::Concierge), "Ruby (Concierge)");
        assert_eq!(registry.display_name(Role::Physician), "Dr. Warren (Medical)");
        assert_eq!(registry.display_name(Role::Assistant), "Sarah Tan (PA)");
    }

    #[test]
    fn member_label_is_client_name() {
        let mut registry = VoiceRegistry::defaults().unwrap();
        assert_eq!(registry.display_name(Role::Member), "Member");
        registry.set_member_name("Rohan");
        assert_eq!(registry.display_name(Role::Member), "Rohan");
        assert_eq!(registry.greet_chance(Role::Member), 0.0);
    }

    #[test]
    fn short_names_drop_role_suffix() {
        let registry = VoiceRegistry::defaults().unwrap();
        assert_eq!(registry.short_name(Role::Concierge), "Ruby");
        assert_eq!(registry.short_name(Role::Physician), "Dr. Warren");
        let names = registry.speaker_names();
        assert!(names.contains(&"Ruby".to_string()));
        assert!(names.contains(&"Ruby (Concierge)".to_string()));
    }

    #[test]
    fn merge_overrides_by_role() {
        let mut registry = VoiceRegistry::defaults().unwrap();
        let custom = VoiceRegistry::parse_ron(
            r#"[(role: Concierge, display_name: "Mia (Concierge)", greet_chance: 0.5)]"#,
        )
        .unwrap();
        registry.merge(custom);
        assert_eq!(registry.display_name(Role::Concierge), "Mia (Concierge)");
        assert_eq!(registry.greet_chance(Role::Concierge), 0.5);
        assert_eq!(registry.tone(Role::Concierge), "concise and helpful");
        assert_eq!(registry.display_name(Role::Nutritionist), "Carla (Nutrition)");
    }

    #[test]
    fn unregistered_role_falls_back_to_key() {
        let registry = VoiceRegistry::new();
        assert_eq!(registry.display_name(Role::Physiotherapist), "physiotherapist");
        assert_eq!(registry.greet_chance(Role::Physiotherapist), 0.0);
    }

    #[test]
    fn load_test_voices_from_ron() {
        let path = std::path::PathBuf::from("tests/fixtures/test_voices.ron");
        let mut registry = VoiceRegistry::new();
        registry.load_from_ron(&path).unwrap();
        assert_eq!(registry.display_name(Role::Concierge), "Ruby (Concierge)");
        assert_eq!(registry.missing_roles().len(), 5);
    }
}
