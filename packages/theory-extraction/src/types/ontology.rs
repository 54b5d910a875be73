//! Ontological categories assigned to vocabulary terms.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Generic fallback for an undiscoverable domain or range.
pub const GENERIC_ENTITY: &str = "Entity";

/// Primary ontological category of a term.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum OntologyCategory {
    Entity,
    Relationship,
    Property,
    Action,
    Measure,
    Modifier,
    TruthValue,
    Operator,
}

impl OntologyCategory {
    pub const ALL: [OntologyCategory; 8] = [
        OntologyCategory::Entity,
        OntologyCategory::Relationship,
        OntologyCategory::Property,
        OntologyCategory::Action,
        OntologyCategory::Measure,
        OntologyCategory::Modifier,
        OntologyCategory::TruthValue,
        OntologyCategory::Operator,
    ];

    /// Relationships and actions connect a domain to a range.
    pub fn is_relational(&self) -> bool {
        matches!(self, OntologyCategory::Relationship | OntologyCategory::Action)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OntologyCategory::Entity => "Entity",
            OntologyCategory::Relationship => "Relationship",
            OntologyCategory::Property => "Property",
            OntologyCategory::Action => "Action",
            OntologyCategory::Measure => "Measure",
            OntologyCategory::Modifier => "Modifier",
            OntologyCategory::TruthValue => "TruthValue",
            OntologyCategory::Operator => "Operator",
        }
    }
}

impl fmt::Display for OntologyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OntologyCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        OntologyCategory::ALL
            .into_iter()
            .find(|c| c.as_str().to_lowercase() == wanted)
            .ok_or_else(|| format!("unknown ontological category: {s}"))
    }
}

/// Where an assignment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    /// Returned by the classification call
    Model,
    /// Filled in by the keyword heuristic
    Heuristic,
}

/// The ontological classification of one vocabulary term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyAssignment {
    /// Normalized term
    pub term: String,

    pub primary_type: OntologyCategory,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    /// Set for relationships and actions; `Entity` when nothing more specific
    /// is discoverable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_type: Option<String>,

    pub source: AssignmentSource,
}

impl OntologyAssignment {
    pub fn new(term: impl Into<String>, primary_type: OntologyCategory) -> Self {
        Self {
            term: term.into(),
            primary_type,
            subtype: None,
            domain_type: None,
            range_type: None,
            source: AssignmentSource::Model,
        }
    }
}
