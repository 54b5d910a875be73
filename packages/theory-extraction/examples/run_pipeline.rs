//! Run the pipeline over a small two-theory paper.
//!
//! Uses the scripted client so the run is deterministic and needs no
//! completion service. Swap in any `CompletionClient` for real use.
//!
//! A YAML config may be given through `THEORY_PIPELINE_CONFIG`:
//!
//! ```bash
//! RUST_LOG=theory_extraction=debug cargo run --example run_pipeline
//! THEORY_PIPELINE_CONFIG=pipeline.yaml cargo run --example run_pipeline
//! ```

use anyhow::{Context, Result};
use serde_json::json;
use theory_extraction::{
    pipeline::{ONTOLOGICAL_CLASSIFICATION, SCHEMA_GENERATION, SEGMENTATION, VOCABULARY_EXTRACTION},
    CompletionClientExt, Document, MemoryStore, ModelType, PipelineConfig, PipelineOrchestrator,
    ScriptedClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PAPER: &str = "Social capital theory holds that networks of civic engagement foster norms of \
reciprocity and social trust. Trust lowers the cost of collective action. \
The ladder of participation describes stages from manipulation through consultation to citizen control.";

fn load_config() -> Result<PipelineConfig> {
    match std::env::var("THEORY_PIPELINE_CONFIG") {
        Ok(path) => {
            let yaml = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {path}"))?;
            Ok(PipelineConfig::from_yaml_str(&yaml)?)
        }
        Err(_) => Ok(PipelineConfig::default()),
    }
}

fn demo_client() -> ScriptedClient {
    let split = PAPER
        .find("The ladder")
        .map(|byte| PAPER[..byte].chars().count())
        .unwrap_or(0);
    let total = PAPER.chars().count();

    let client = ScriptedClient::new()
        .with_json(
            SEGMENTATION,
            json!({"theory_count": 2, "theories": [
                {"title": "Social capital", "start": 0, "end": split.saturating_sub(1)},
                {"title": "Ladder of participation", "start": split, "end": total}
            ]}),
        )
        .with_json_when(
            VOCABULARY_EXTRACTION,
            "Social capital",
            json!({"terms": [
                {"term": "Civic engagement", "definition": "participation in community associations", "category": "process"},
                {"term": "Social trust", "definition": "generalized confidence of citizens in one another", "category": "construct"},
                {"term": "Reciprocity", "definition": "norm of returning favours", "category": "mechanism"},
                {"term": "Collective action", "definition": "citizens acting together toward a shared goal", "category": "outcome"}
            ]}),
        )
        .with_json_when(
            VOCABULARY_EXTRACTION,
            "ladder",
            json!({"terms": [
                {"term": "Manipulation", "definition": "lowest rung, participation in name only", "category": "process"},
                {"term": "Consultation", "definition": "citizens are heard but hold no power", "category": "process"},
                {"term": "Citizen control", "definition": "citizens govern the programme", "category": "outcome"}
            ]}),
        )
        .with_json_when(
            ONTOLOGICAL_CLASSIFICATION,
            "Social capital",
            json!({"assignments": [
                {"term": "Civic engagement", "primary_type": "Action"},
                {"term": "Social trust", "primary_type": "Measure"},
                {"term": "Reciprocity", "primary_type": "Property"},
                {"term": "Collective action", "primary_type": "Action"}
            ]}),
        )
        .with_json_when(
            ONTOLOGICAL_CLASSIFICATION,
            "ladder",
            json!({"assignments": [
                {"term": "Manipulation", "primary_type": "Entity", "subtype": "stage"},
                {"term": "Consultation", "primary_type": "Entity", "subtype": "stage"},
                {"term": "Citizen control", "primary_type": "Entity", "subtype": "stage"}
            ]}),
        )
        .with_json_when(
            SCHEMA_GENERATION,
            "Generate a statistical schema",
            json!({
                "title": "Social capital model",
                "node_types": [
                    {"name": "Civic engagement"},
                    {"name": "Social trust", "properties": ["Reciprocity"]},
                    {"name": "Collective action"}
                ],
                "edge_types": [
                    {"name": "fosters", "source": "Civic engagement", "target": "Social trust"},
                    {"name": "enables", "source": "Social trust", "target": "Collective action"}
                ]
            }),
        )
        .with_json_when(
            SCHEMA_GENERATION,
            "Generate a sequence schema",
            json!({
                "title": "Participation stages",
                "node_types": [{"name": "Stage"}],
                "definitions": [
                    {"term": "Manipulation", "role": "Entity"},
                    {"term": "Consultation", "role": "Entity"},
                    {"term": "Citizen control", "role": "Entity"}
                ]
            }),
        );

    ModelType::ALL.into_iter().fold(client, |client, model_type| {
        let template = model_type.detector_template_id();
        let (capital, ladder) = match model_type {
            ModelType::Statistical => (0.91, 0.20),
            ModelType::Sequence => (0.30, 0.93),
            ModelType::PropertyGraph => (0.55, 0.25),
            _ => (0.10, 0.10),
        };
        client
            .with_json_when(template.clone(), "Social capital", json!({"confidence": capital}))
            .with_json_when(template, "ladder", json!({"confidence": ladder}))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,theory_extraction=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;
    config.validate()?;
    let client = demo_client().rate_limited(nonzero_ext::nonzero!(50u32));
    let orchestrator = PipelineOrchestrator::with_config(client, MemoryStore::new(), config);

    let document = Document::new("civic-theories", PAPER).with_citation("Demo paper, 2026");
    let report = orchestrator.run(&document).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    for segment in &report.segments {
        println!("--- {} ({})", segment.segment_id, segment.status);
        if let Some(blueprint) = &segment.blueprint {
            println!("{}", blueprint.to_yaml()?);
        }
    }
    println!("--- audit");
    println!("{}", orchestrator.audit().to_json()?);

    Ok(())
}
