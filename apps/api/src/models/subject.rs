use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Highest grade a subject can carry, as a percentage.
pub const MAX_GRADE: u64 = 100;

/// One subject/grade pair as entered by the student.
///
/// `grade` is either empty or a canonical decimal integer in `0..=100`.
/// Empty values are allowed while the form is being edited but such entries
/// are never sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectEntry {
    pub id: Uuid,
    pub name: String,
    pub grade: String,
}

/// Partial edit of a subject. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubjectUpdate {
    pub name: Option<String>,
    pub grade: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GradeError {
    #[error("Grade must be a whole number, got '{0}'")]
    NotANumber(String),

    #[error("Grade must be between 0 and {MAX_GRADE}, got {0}")]
    OutOfRange(u64),
}

impl SubjectEntry {
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: String::new(),
            grade: String::new(),
        }
    }

    #[cfg(test)]
    pub fn new(name: impl Into<String>, grade: &str) -> Result<Self, GradeError> {
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            grade: normalize_grade(grade)?,
        })
    }

    /// True when both a name and a grade are filled in.
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.grade.is_empty()
    }

    /// Copy of this entry with the grade rendered as a percentage ("87%").
    /// Only used when composing prompts.
    pub fn with_percent_grade(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.trim().to_string(),
            grade: format!("{}%", self.grade),
        }
    }

    /// Applies an update atomically: if the grade is invalid nothing changes.
    pub fn apply(&mut self, update: SubjectUpdate) -> Result<(), GradeError> {
        let grade = update.grade.as_deref().map(normalize_grade).transpose()?;
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(grade) = grade {
            self.grade = grade;
        }
        Ok(())
    }
}

/// Validates a raw grade string and returns the value to store.
///
/// Whitespace-only input clears the grade. Anything else must be a plain
/// decimal integer in `0..=100`; it is stored without leading zeros.
pub fn normalize_grade(raw: &str) -> Result<String, GradeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(GradeError::NotANumber(trimmed.to_string()));
    }
    // All-digit strings only fail to parse on overflow, which is out of range anyway.
    let value: u64 = trimmed.parse().unwrap_or(u64::MAX);
    if value > MAX_GRADE {
        return Err(GradeError::OutOfRange(value));
    }
    Ok(value.to_string())
}
