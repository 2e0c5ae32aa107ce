//! Advisory chat: a stateful conversation seeded with the student's profile
//! and the careers already recommended.

pub mod prompts;
pub mod session;

pub use session::{AdvisorSession, ChatStreamError};
