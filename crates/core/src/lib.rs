//! # LaBPrompT Core
//!
//! Domain types, traits, and error definitions for LaBPrompT, the
//! system-prompt laboratory. This crate has **no framework dependencies**:
//! it defines the domain model that every other crate implements against.
//!
//! ## Layout
//!
//! - [`prompt`]: the structured brief a user fills in ([`PromptData`]) and
//!   what comes back ([`GeneratedPrompt`])
//! - [`message`] / [`session`]: conversation turns and per-session chat state
//! - [`provider`]: the trait over the generative-AI backend
//! - [`error`]: the error taxonomy shared by all crates

pub mod error;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use error::{AuthError, Error, ProviderError, Result, ValidationError};
pub use message::{Attachment, Role, Turn};
pub use prompt::{
    Correction, DynamicVariable, Example, Flow, GeneratedPrompt, MasterPromptFormat, OutputFormat,
    PromptData, ToolSpec,
};
pub use provider::{
    FunctionCall, GenerateRequest, GenerateResponse, Provider, ResponseMode, ToolDefinition, Usage,
};
pub use session::{ChatSession, SessionId};
