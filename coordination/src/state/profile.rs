//! Named configuration bundle a workflow or brainstorm session resolves
//! itself against at start time (spec §4.C `profiles` record / glossary
//! "Profile"): tracker, working directory, plan-file layout, per-agent
//! trust level, and reviewer personas. Grounded on the
//! [`BrainstormSession`](super::BrainstormSession) record-module pattern.

use serde::{Deserialize, Serialize};

use super::types::{TrustLevel, DEFAULT_PLAN_PATH_PATTERN};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub tracker: String,
    pub working_dir: String,
    pub plan_output_dir: String,
    pub plan_path_pattern: String,
    /// Opaque per-agent driver/model configuration (spec §4.C), stored as
    /// the tracker adapter's own JSON shape rather than modeled here.
    pub agents_json: String,
    pub is_active: bool,
    pub trust_level: TrustLevel,
    pub checkpoints_enabled: bool,
    /// Reviewer personas to run competitively (spec §8 Scenario 4). Empty
    /// or single-element means single-persona review.
    pub reviewer_personas: Vec<String>,
}

impl Profile {
    pub fn new(id: impl Into<String>, tracker: impl Into<String>, working_dir: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracker: tracker.into(),
            working_dir: working_dir.into(),
            plan_output_dir: "docs/plans".to_string(),
            plan_path_pattern: DEFAULT_PLAN_PATH_PATTERN.to_string(),
            agents_json: "{}".to_string(),
            is_active: true,
            trust_level: TrustLevel::Standard,
            checkpoints_enabled: true,
            reviewer_personas: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_profile_defaults_to_standard_trust_with_checkpoints_enabled() {
        let profile = Profile::new("default", "github", "/repo");
        assert_eq!(profile.trust_level, TrustLevel::Standard);
        assert!(profile.checkpoints_enabled);
        assert!(profile.reviewer_personas.is_empty());
    }
}
