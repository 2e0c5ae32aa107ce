//! Career recommendations: prompt, response schema and the client that turns
//! a student's grades into a validated `RecommendationResponse`.
//! All model calls go through llm_client; no direct Gemini calls here.

pub mod client;
pub mod prompts;
pub mod schema;

pub use client::{RecommendationClient, RecommendationError};
