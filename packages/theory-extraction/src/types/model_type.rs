//! Structural model types and which of them may be combined.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The structural representation judged best-fit for a theory.
///
/// Declaration order is the canonical order used to break score ties.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    TableMatrix,
    PropertyGraph,
    Sequence,
    Statistical,
    Logical,
    Hypergraph,
}

impl ModelType {
    /// Every model type, in canonical order.
    pub const ALL: [ModelType; 6] = [
        ModelType::TableMatrix,
        ModelType::PropertyGraph,
        ModelType::Sequence,
        ModelType::Statistical,
        ModelType::Logical,
        ModelType::Hypergraph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::TableMatrix => "table_matrix",
            ModelType::PropertyGraph => "property_graph",
            ModelType::Sequence => "sequence",
            ModelType::Statistical => "statistical",
            ModelType::Logical => "logical",
            ModelType::Hypergraph => "hypergraph",
        }
    }

    /// Prompt template id of this type's specialized detector.
    pub fn detector_template_id(&self) -> String {
        format!("detect_{}", self.as_str())
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['-', ' '], "_");
        ModelType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown model type: {s}"))
    }
}

/// Pairs of model types whose structures are mutually exclusive, i.e. two
/// competing encodings of the same relational content. Any pair not listed
/// may be combined into a hybrid schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityMatrix {
    exclusive: BTreeSet<(ModelType, ModelType)>,
}

impl Default for CompatibilityMatrix {
    fn default() -> Self {
        // n-ary relations are either hyperedges or rows/edges, not both
        Self::permissive()
            .with_exclusive(ModelType::PropertyGraph, ModelType::Hypergraph)
            .with_exclusive(ModelType::TableMatrix, ModelType::Hypergraph)
    }
}

impl CompatibilityMatrix {
    /// A matrix where every pair is compatible.
    pub fn permissive() -> Self {
        Self {
            exclusive: BTreeSet::new(),
        }
    }

    /// Mark a pair as mutually exclusive (order does not matter).
    pub fn with_exclusive(mut self, a: ModelType, b: ModelType) -> Self {
        self.exclusive.insert(Self::key(a, b));
        self
    }

    /// Whether two model types may appear in the same hybrid schema.
    pub fn compatible(&self, a: ModelType, b: ModelType) -> bool {
        a == b || !self.exclusive.contains(&Self::key(a, b))
    }

    fn key(a: ModelType, b: ModelType) -> (ModelType, ModelType) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}
