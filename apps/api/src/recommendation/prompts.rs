// Prompt text for the recommendation request.

use crate::models::SubjectEntry;

/// Number of career paths requested from the model.
pub const EXPECTED_RECOMMENDATIONS: usize = 4;

/// Recommendation prompt template. Replace `{subjects}` before sending.
pub const RECOMMENDATION_PROMPT_TEMPLATE: &str = "Analyze the following high school subjects and their percentage grades: {subjects}. \
    Based on these academic strengths and interests, recommend 4 diverse future career paths. \
    Consider the difficulty of subjects and how percentage marks reflect potential aptitude and dedication in specific fields.";

/// Renders subjects as `Mathematics: 90%, Physics: 85%`.
/// Grades are expected to be percentage-formatted already.
pub fn format_subject_grades(subjects: &[SubjectEntry]) -> String {
    subjects
        .iter()
        .map(|s| format!("{}: {}", s.name, s.grade))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn build_recommendation_prompt(subjects: &[SubjectEntry]) -> String {
    RECOMMENDATION_PROMPT_TEMPLATE.replace("{subjects}", &format_subject_grades(subjects))
}
