//! Prompt construction and post-processing for LaBPrompT.
//!
//! Everything here is pure: text in, text out, no I/O.
//!
//! - [`assembler`]: turns a [`PromptData`](labprompt_core::PromptData) brief
//!   into the document sent to the model, and wraps it in the expansion
//!   instruction that asks for a full master prompt
//! - [`normalizer`]: cleans up raw model output (code fences, JSON
//!   re-formatting, brace-extraction fallback)
//! - [`optimizer`]: folds reviewer corrections into a refactoring instruction
//! - [`analysis`]: instruction and result mapping for document analysis
//! - [`voice`]: function declarations and parsing for voice commands

pub mod analysis;
pub mod assembler;
pub mod normalizer;
pub mod optimizer;
pub mod voice;

pub use assembler::{assemble, build_generation_prompt, expansion_instruction};
pub use normalizer::{Normalized, TargetFormat, normalize, normalize_json_strict};
pub use optimizer::refactor_instruction;
pub use voice::VoiceCommand;
