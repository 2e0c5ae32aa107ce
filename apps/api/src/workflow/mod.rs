// Application state machine: per-session workspaces, the orchestrator that
// drives model calls against them, and their HTTP handlers.
// Transitions are synchronous; I/O happens only in the orchestrator.

pub mod handlers;
pub mod orchestrator;
pub mod registry;
pub mod workspace;

pub use orchestrator::Orchestrator;
pub use registry::WorkspaceRegistry;
pub use workspace::WorkflowError;
