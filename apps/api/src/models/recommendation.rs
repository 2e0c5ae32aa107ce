use serde::{Deserialize, Serialize};

/// Coarse outlook label the model attaches to each career.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrowthPotential {
    High,
    Medium,
    Low,
}

impl GrowthPotential {
    pub const ALL: [GrowthPotential; 3] = [Self::High, Self::Medium, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthPotential::High => "High",
            GrowthPotential::Medium => "Medium",
            GrowthPotential::Low => "Low",
        }
    }
}

/// A single career path suggested by the model. Wire names are camelCase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareerRecommendation {
    pub title: String,
    pub description: String,
    pub why_fit: String,
    pub next_steps: Vec<String>,
    pub growth_potential: GrowthPotential,
}

/// The full structured answer to a recommendation request.
///
/// Both fields are required; a payload missing either does not deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub recommendations: Vec<CareerRecommendation>,
    pub overall_summary: String,
}

impl RecommendationResponse {
    pub fn titles(&self) -> Vec<&str> {
        self.recommendations.iter().map(|r| r.title.as_str()).collect()
    }
}
