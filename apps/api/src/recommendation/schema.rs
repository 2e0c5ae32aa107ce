use serde_json::{json, Value};

use crate::models::GrowthPotential;

/// Response schema passed to Gemini's structured-output mode.
///
/// The model honours it on a best-effort basis only, so callers still
/// validate what comes back.
pub fn recommendation_schema() -> Value {
    let growth_levels: Vec<&str> = GrowthPotential::ALL.iter().map(|g| g.as_str()).collect();

    json!({
        "type": "OBJECT",
        "properties": {
            "recommendations": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING" },
                        "description": { "type": "STRING" },
                        "whyFit": { "type": "STRING" },
                        "nextSteps": {
                            "type": "ARRAY",
                            "items": { "type": "STRING" }
                        },
                        "growthPotential": {
                            "type": "STRING",
                            "enum": growth_levels,
                            "description": "Must be 'High', 'Medium', or 'Low'"
                        }
                    },
                    "required": ["title", "description", "whyFit", "nextSteps", "growthPotential"]
                }
            },
            "overallSummary": { "type": "STRING" }
        },
        "required": ["recommendations", "overallSummary"]
    })
}
