//! Shared domain types: subjects, recommendations and chat messages.

pub mod chat;
pub mod recommendation;
pub mod subject;

pub use chat::{ChatMessage, Transcript};
pub use recommendation::{GrowthPotential, RecommendationResponse};
pub use subject::{SubjectEntry, SubjectUpdate};
