// System instruction for the advisory chat.

use crate::models::{RecommendationResponse, SubjectEntry};

/// Replace `{profile}` and `{careers}` before use.
pub const ADVISOR_SYSTEM_TEMPLATE: &str = r#"You are an expert Career Advisor AI.
The student has the following profile with percentage grades: {profile}.
You previously recommended: {careers}.

GUIDELINES:
- Use clean Markdown for formatting (bold for emphasis, bullet points for lists).
- Academic grades are percentages where 90-100% is exceptional, 70-89% is strong, and <50% might indicate a struggle.
- Avoid using excessive headers (###) inside short chat messages.
- Be encouraging and actionable.
- If asked about specific universities or degrees, provide general paths and requirements.
- Keep responses conversational but professional."#;

/// Renders subjects as `Mathematics (90%), Physics (85%)`.
pub fn format_profile(subjects: &[SubjectEntry]) -> String {
    subjects
        .iter()
        .map(|s| format!("{} ({})", s.name, s.grade))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn build_system_instruction(
    context: &RecommendationResponse,
    subjects: &[SubjectEntry],
) -> String {
    ADVISOR_SYSTEM_TEMPLATE
        .replace("{profile}", &format_profile(subjects))
        .replace("{careers}", &context.titles().join(", "))
}
