use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::llm_client::{strip_json_fences, GenerativeModel, LlmError};
use crate::models::{RecommendationResponse, SubjectEntry};
use crate::recommendation::prompts::{build_recommendation_prompt, EXPECTED_RECOMMENDATIONS};
use crate::recommendation::schema::recommendation_schema;

pub const PARSE_FAILURE_MESSAGE: &str = "Could not interpret recommendations. Please try again.";

/// Failure of a recommendation request. Display text is user-facing.
#[derive(Debug, Error)]
pub enum RecommendationError {
    /// The model could not be reached or refused the call (network, auth, quota).
    #[error("{0}")]
    ModelInvocation(String),

    /// The model answered, but not with a usable recommendation payload.
    #[error("{}", PARSE_FAILURE_MESSAGE)]
    ResponseParse,
}

impl From<LlmError> for RecommendationError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Api { message, .. } => RecommendationError::ModelInvocation(message),
            other => RecommendationError::ModelInvocation(other.to_string()),
        }
    }
}

/// Stateless client turning subject grades into career recommendations.
#[derive(Clone)]
pub struct RecommendationClient {
    model: Arc<dyn GenerativeModel>,
}

impl RecommendationClient {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// Makes exactly one model call. Subjects must carry percentage-formatted
    /// grades; the caller guarantees there are enough of them.
    pub async fn fetch_recommendations(
        &self,
        subjects: &[SubjectEntry],
    ) -> Result<RecommendationResponse, RecommendationError> {
        let prompt = build_recommendation_prompt(subjects);

        let raw = self
            .model
            .generate_json(&prompt, &recommendation_schema())
            .await
            .map_err(|e| {
                warn!("Recommendation request failed: {e}");
                RecommendationError::from(e)
            })?;

        let response = parse_recommendations(&raw)?;
        info!(
            "Received {} career recommendations for {} subjects",
            response.recommendations.len(),
            subjects.len()
        );
        Ok(response)
    }
}

/// Parses and validates the model's raw output.
///
/// Field presence and types are checked by strict deserialization; the
/// underlying serde error is logged, never returned.
pub fn parse_recommendations(raw: &str) -> Result<RecommendationResponse, RecommendationError> {
    let text = strip_json_fences(raw);

    let response: RecommendationResponse = serde_json::from_str(text).map_err(|e| {
        warn!("Failed to parse recommendation response: {e}");
        RecommendationError::ResponseParse
    })?;

    if response.recommendations.len() != EXPECTED_RECOMMENDATIONS {
        warn!(
            "Expected {} recommendations, model returned {}",
            EXPECTED_RECOMMENDATIONS,
            response.recommendations.len()
        );
    }

    Ok(response)
}
