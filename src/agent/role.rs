use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::retrieval::{QueryOptions, RetrievalStore, DEFAULT_SIMILARITY_THRESHOLD};

/// Name of the terminal phase whose output feeds the synthesis
pub const REVIEW_PHASE: &str = "review";

/// An instruction injected into the prompts of the listed phases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub note: String,
    pub phases: Vec<String>,
}

/// Where a role looks for supporting documents before each phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSettings {
    pub collections: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Maximum number of documents inlined into one prompt
    #[serde(default = "default_context_documents")]
    pub context_documents: usize,
    /// Client namespace the role reads from; the shared store's when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    /// Collections the role may touch; empty allows all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_collections: Vec<String>,
}

fn default_similarity_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_context_documents() -> usize {
    3
}

fn default_max_history() -> usize {
    RoleSpec::DEFAULT_MAX_HISTORY
}

impl RetrievalSettings {
    pub fn new(collections: Vec<String>) -> Self {
        Self {
            collections,
            tags: Vec::new(),
            similarity_threshold: default_similarity_threshold(),
            context_documents: default_context_documents(),
            client: None,
            allowed_collections: Vec::new(),
        }
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    pub fn with_allowed_collections(mut self, collections: Vec<String>) -> Self {
        self.allowed_collections = collections;
        self
    }

    /// The role's view of a shared store: its own namespace and allow-list
    pub fn scope(&self, store: &RetrievalStore) -> RetrievalStore {
        let scoped = match &self.client {
            Some(client) => store.clone().with_client_name(client.as_str()),
            None => store.clone(),
        };
        scoped.with_allowed_collections(self.allowed_collections.iter().cloned())
    }

    /// Query options for one collection lookup
    pub fn query_options(&self) -> QueryOptions {
        let options = QueryOptions::new()
            .with_threshold(self.similarity_threshold)
            .with_limit(self.context_documents.max(1) * 4);
        if self.tags.is_empty() {
            options
        } else {
            options.with_tags(self.tags.iter().cloned())
        }
    }
}

/// A panel role as plain data: who the agent is and which phases it runs, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSpec {
    /// Role identifier, also the key of this role's outputs in the analysis record
    pub id: String,
    /// Perspective tag attached to this role's review
    pub perspective: String,
    pub role_description: String,
    pub phases: Vec<String>,
    pub phase_prompts: BTreeMap<String, String>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalSettings>,
}

impl RoleSpec {
    pub const DEFAULT_MAX_HISTORY: usize = 15;

    /// Structural checks run when the panel is loaded
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("role id cannot be empty".to_string());
        }
        // The id names the role's result file
        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!(
                "role id '{}' may only contain ASCII letters, digits, '_' and '-'",
                self.id
            ));
        }
        if self.perspective.trim().is_empty() {
            return Err(format!("role '{}' has no perspective", self.id));
        }
        if self.phases.is_empty() {
            return Err(format!("role '{}' defines no phases", self.id));
        }
        if self.max_history == 0 {
            return Err(format!("role '{}' must keep at least one history entry", self.id));
        }

        let mut seen = HashSet::new();
        for phase in &self.phases {
            if !seen.insert(phase.as_str()) {
                return Err(format!("role '{}' repeats phase '{}'", self.id, phase));
            }
            if !self.phase_prompts.contains_key(phase) {
                return Err(format!(
                    "role '{}' has no prompt for phase '{}'",
                    self.id, phase
                ));
            }
        }

        for note in &self.notes {
            if let Some(unknown) = note.phases.iter().find(|p| !seen.contains(p.as_str())) {
                return Err(format!(
                    "role '{}' has a note for unknown phase '{}'",
                    self.id, unknown
                ));
            }
        }

        if let Some(retrieval) = &self.retrieval {
            if !(0.0..=1.0).contains(&retrieval.similarity_threshold) {
                return Err(format!(
                    "role '{}' similarity threshold must be within [0, 1]",
                    self.id
                ));
            }
            if retrieval.client.as_deref().is_some_and(|c| c.trim().is_empty()) {
                return Err(format!("role '{}' has an empty retrieval client", self.id));
            }
            if !retrieval.allowed_collections.is_empty() {
                if let Some(denied) = retrieval
                    .collections
                    .iter()
                    .find(|c| !retrieval.allowed_collections.contains(c))
                {
                    return Err(format!(
                        "role '{}' queries collection '{}' outside its allowed collections",
                        self.id, denied
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn has_phase(&self, phase: &str) -> bool {
        self.phases.iter().any(|p| p == phase)
    }

    pub fn phase_prompt(&self, phase: &str) -> Option<&str> {
        self.phase_prompts.get(phase).map(String::as_str)
    }

    /// Notes whose phase list contains `phase`
    pub fn notes_for(&self, phase: &str) -> Vec<&str> {
        self.notes
            .iter()
            .filter(|n| n.phases.iter().any(|p| p == phase))
            .map(|n| n.note.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_role() -> RoleSpec {
        RoleSpec {
            id: "internal".to_string(),
            perspective: "singapore_law".to_string(),
            role_description: "a practitioner".to_string(),
            phases: vec!["analysis".to_string(), REVIEW_PHASE.to_string()],
            phase_prompts: BTreeMap::from([
                ("analysis".to_string(), "Analyse.".to_string()),
                (REVIEW_PHASE.to_string(), "Review.".to_string()),
            ]),
            notes: vec![Note {
                note: "Cite sections".to_string(),
                phases: vec!["analysis".to_string()],
            }],
            max_history: 15,
            retrieval: None,
        }
    }

    #[test]
    fn test_valid_role() {
        assert!(sample_role().validate().is_ok());
    }

    #[test]
    fn test_repeated_phase_is_rejected() {
        let mut role = sample_role();
        role.phases.push("analysis".to_string());
        assert!(role.validate().unwrap_err().contains("repeats phase"));
    }

    #[test]
    fn test_note_for_unknown_phase_is_rejected() {
        let mut role = sample_role();
        role.notes[0].phases = vec!["closing".to_string()];
        assert!(role.validate().unwrap_err().contains("closing"));
    }

    #[test]
    fn test_path_like_role_id_is_rejected() {
        for id in ["../escape", "a/b", "a\\b", "with space"] {
            let mut role = sample_role();
            role.id = id.to_string();
            assert!(role.validate().unwrap_err().contains("may only contain"), "{}", id);
        }

        let mut role = sample_role();
        role.id = "us-law_2".to_string();
        assert!(role.validate().is_ok());
    }

    #[test]
    fn test_queried_collection_must_be_allowed() {
        let mut role = sample_role();
        role.retrieval = Some(
            RetrievalSettings::new(vec!["collection1".to_string()])
                .with_allowed_collections(vec!["collection2".to_string(), "collection3".to_string()]),
        );
        assert!(role.validate().unwrap_err().contains("collection1"));

        role.retrieval = Some(
            RetrievalSettings::new(vec!["collection2".to_string()])
                .with_allowed_collections(vec!["collection2".to_string(), "collection3".to_string()]),
        );
        assert!(role.validate().is_ok());
    }

    #[test]
    fn test_retrieval_settings_defaults_from_json() {
        let settings: RetrievalSettings =
            serde_json::from_str(r#"{"collections": ["cases"]}"#).unwrap();
        assert!(settings.client.is_none());
        assert!(settings.allowed_collections.is_empty());
        assert_eq!(settings.context_documents, 3);
    }

    #[test]
    fn test_zero_history_is_rejected() {
        let mut role = sample_role();
        role.max_history = 0;
        assert!(role.validate().is_err());
    }

    #[test]
    fn test_notes_for_phase() {
        let role = sample_role();
        assert_eq!(role.notes_for("analysis"), vec!["Cite sections"]);
        assert!(role.notes_for(REVIEW_PHASE).is_empty());
    }

    #[test]
    fn test_defaults_when_deserializing() {
        let role: RoleSpec = serde_json::from_value(serde_json::json!({
            "id": "external",
            "perspective": "us_law",
            "role_description": "a scholar",
            "phases": ["review"],
            "phase_prompts": {"review": "Review."},
            "retrieval": {"collections": ["external-collection"]}
        }))
        .unwrap();
        assert_eq!(role.max_history, RoleSpec::DEFAULT_MAX_HISTORY);
        assert!(role.notes.is_empty());
        let retrieval = role.retrieval.unwrap();
        assert_eq!(retrieval.context_documents, 3);
        assert!((retrieval.similarity_threshold - 0.7).abs() < f32::EPSILON);
    }
}
