//! Prompt optimization from reviewer corrections.

use std::fmt::Write;

use labprompt_core::error::ValidationError;
use labprompt_core::prompt::{Correction, MasterPromptFormat};

/// Build the instruction asking the model to refactor `current_prompt` so
/// that each correction's corrected response becomes the expected behavior.
pub fn refactor_instruction(
    current_prompt: &str,
    corrections: &[Correction],
    format: MasterPromptFormat,
) -> Result<String, ValidationError> {
    let current_prompt = current_prompt.trim();
    if current_prompt.is_empty() {
        return Err(ValidationError::MissingField("currentPrompt"));
    }
    if corrections.is_empty() {
        return Err(ValidationError::Invalid(
            "at least one correction is required".into(),
        ));
    }

    let mut out = String::new();
    out.push_str(
        "You are a senior prompt engineer. The master prompt below produced \
         responses that a reviewer corrected. Rewrite the prompt so that an \
         agent following it would give the corrected responses.\n\n",
    );
    let _ = write!(out, "<current_prompt>\n{current_prompt}\n</current_prompt>\n\n");

    out.push_str("Corrections:\n");
    for (i, c) in corrections.iter().enumerate() {
        let _ = write!(
            out,
            "\n### Correction {}\nUser query: {}\nOriginal response: {}\nCorrected response: {}\n",
            i + 1,
            c.user_query.trim(),
            c.prior_response.trim(),
            c.corrected_response.trim(),
        );
    }

    out.push_str(
        "\nRequirements:\n\
         - Generalize each correction into a rule or instruction; do not hard-code the examples.\n\
         - Keep everything in the current prompt that the corrections do not contradict.\n\
         - Return only the rewritten prompt, without commentary.\n",
    );
    match format {
        MasterPromptFormat::Markdown => {
            out.push_str("- Keep the Markdown section structure of the current prompt.\n");
        }
        MasterPromptFormat::Json => {
            out.push_str(
                "- Return a single JSON object that MUST pass strict JSON parsing. \
                 Do not wrap it in code fences.\n",
            );
        }
    }

    Ok(out.trim_end().to_string())
}
