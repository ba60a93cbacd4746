//! Document analysis: turn an uploaded file into a pre-filled brief.

use labprompt_core::error::ValidationError;
use labprompt_core::{Error, PromptData};

/// MIME types accepted for document analysis.
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "text/plain",
    "text/markdown",
    "text/csv",
    "application/json",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "image/png",
    "image/jpeg",
    "image/webp",
];

pub fn is_supported_mime(mime_type: &str) -> bool {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    SUPPORTED_MIME_TYPES.contains(&essence.as_str())
}

/// Reject unsupported MIME types before anything is decoded or sent.
pub fn check_mime(mime_type: &str) -> Result<(), ValidationError> {
    if is_supported_mime(mime_type) {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedFile(mime_type.to_string()))
    }
}

/// Instruction sent alongside the inline file.
pub fn extraction_instruction(file_name: &str) -> String {
    let file_name = if file_name.trim().is_empty() {
        "the attached document"
    } else {
        file_name.trim()
    };
    format!(
        "Analyze {file_name} and extract the information needed to configure an AI agent \
         that would serve the business it describes.\n\n\
         Return a single JSON object with these keys (omit a key when the document gives \
         no information for it):\n\
         {{\n\
         \x20 \"persona\": \"who the agent is\",\n\
         \x20 \"objective\": \"what the agent must achieve\",\n\
         \x20 \"businessContext\": \"the company, products and audience\",\n\
         \x20 \"interactionContext\": \"channel and situation of the conversations\",\n\
         \x20 \"rules\": [\"rule\"],\n\
         \x20 \"tools\": [{{\"name\": \"tool_name\", \"description\": \"what it does\"}}],\n\
         \x20 \"variables\": [{{\"key\": \"variable_name\", \"example\": \"sample value\"}}],\n\
         \x20 \"examples\": [{{\"user\": \"user message\", \"agent\": \"ideal reply\"}}]\n\
         }}\n\n\
         Use only facts present in the document. The response MUST pass strict JSON parsing."
    )
}

/// Map the model's extraction onto a partial brief.
///
/// Accepts both the English keys requested by [`extraction_instruction`]
/// and the form's own field names.
pub fn parse_extracted(raw: &str) -> Result<PromptData, Error> {
    let value = crate::normalizer::parse_json_lenient(raw)?;
    if !value.is_object() {
        return Err(Error::Parse("document analysis did not return an object".into()));
    }
    serde_json::from_value(value)
        .map_err(|e| Error::Parse(format!("document analysis has an unexpected shape: {e}")))
}
