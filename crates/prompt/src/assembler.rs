//! Prompt assembly: the brief document and the expansion instruction.
//!
//! Sections are emitted in a fixed order:
//!
//! 1. Persona, objective, business context, interaction context (always)
//! 2. Tools, dynamic variables (only when non-empty)
//! 3. Rules (always)
//! 4. Examples, flows (only when non-empty)
//! 5. Output-format instructions for the target agent
//!
//! Assembly is deterministic: identical briefs always produce identical
//! text.

use labprompt_core::ValidationError;
use labprompt_core::prompt::{Flow, MasterPromptFormat, OutputFormat, PromptData};

// ── Brief document ────────────────────────────────────────────────────────

/// Assemble the brief document for a validated [`PromptData`].
///
/// Fails with [`ValidationError::MissingField`] on the first required field
/// that is blank, before any text is produced.
pub fn assemble(data: &PromptData) -> Result<String, ValidationError> {
    data.validate()?;

    let mut doc = String::new();

    push_section(&mut doc, "Persona", data.persona.trim());
    push_section(&mut doc, "Objective", data.objective.trim());
    push_section(&mut doc, "Business Context", data.business_context.trim());
    push_section(&mut doc, "Interaction Context", data.interaction_context.trim());

    if !data.tools.is_empty() {
        let body = data
            .tools
            .iter()
            .map(|t| format!("- **{}**: {}", t.name.trim(), t.description.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        push_section(&mut doc, "Available Tools", &body);
    }

    if !data.variables.is_empty() {
        let body = data
            .variables
            .iter()
            .map(|v| format!("- `{{{{{}}}}}` (example: {})", v.key.trim(), v.example.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        push_section(&mut doc, "Dynamic Variables", &body);
    }

    let rules: Vec<String> = data.rules.iter().map(|r| bullet(r.trim())).collect();
    let rules_body = if rules.is_empty() {
        "- No additional rules.".to_string()
    } else {
        rules.join("\n")
    };
    push_section(&mut doc, "Rules", &rules_body);

    if !data.examples.is_empty() {
        let body = data
            .examples
            .iter()
            .enumerate()
            .map(|(i, ex)| {
                format!(
                    "### Example {}\nUser: {}\nAgent: {}",
                    i + 1,
                    ex.user.trim(),
                    ex.agent.trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        push_section(&mut doc, "Examples", &body);
    }

    if !data.flows.is_empty() {
        let body = data
            .flows
            .iter()
            .enumerate()
            .map(|(i, flow)| render_flow(i + 1, flow))
            .collect::<Vec<_>>()
            .join("\n\n");
        push_section(&mut doc, "Flows", &body);
    }

    let mut format_body = output_format_instructions(data.output_format).to_string();
    if !data.output_structure.trim().is_empty() {
        format_body.push_str("\n\nExpected structure:\n");
        format_body.push_str(data.output_structure.trim());
    }
    push_section(&mut doc, &format!("Output Format ({})", data.output_format), &format_body);

    Ok(doc.trim_end().to_string())
}

/// One `- ` bullet; continuation lines are indented under it.
fn bullet(text: &str) -> String {
    let mut out = String::from("- ");
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            out.push_str("\n  ");
        }
        out.push_str(line.trim_end());
    }
    out
}

fn push_section(doc: &mut String, title: &str, body: &str) {
    doc.push_str("## ");
    doc.push_str(title);
    doc.push('\n');
    doc.push_str(body);
    doc.push_str("\n\n");
}

fn render_flow(index: usize, flow: &Flow) -> String {
    let mut out = format!("### Flow {}: {}\n", index, flow.name.trim());
    out.push_str(&format!("- Prompt type: {}\n", flow.prompt_type.trim()));
    out.push_str(&format!("- Objective: {}", flow.objective.trim()));

    if let Some(rag) = flow.rag_context.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        out.push_str(&format!("\n- Knowledge base (RAG) context: {rag}"));
    }
    if flow.chain_of_thought == Some(true) {
        out.push_str("\n- Reason step by step before answering (chain of thought).");
    }
    if flow.guardrails == Some(true) {
        out.push_str(
            "\n- Apply guardrails: refuse out-of-scope, unsafe or policy-violating requests.",
        );
    }
    if let Some(shots) = flow.few_shot.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        out.push_str(&format!("\n- Few-shot examples:\n{shots}"));
    }
    out
}

/// Instructions telling the target agent how to format its answers.
pub fn output_format_instructions(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Json => {
            "Respond ONLY with valid JSON.\n\
             - Do NOT use markdown, code fences (```), or any text outside the JSON.\n\
             - Start the response immediately with `{` or `[`.\n\
             - The response must be parseable by a strict JSON parser."
        }
        OutputFormat::Xml => {
            "Respond ONLY with well-formed XML.\n\
             - Do NOT use markdown, code fences (```), or any text outside the XML.\n\
             - Start the response immediately with `<`.\n\
             - Every opened tag must be closed."
        }
        OutputFormat::Yaml => {
            "Respond ONLY with valid YAML.\n\
             - Do NOT use markdown, code fences (```), or any text outside the YAML.\n\
             - Start the response immediately with a valid YAML key or `-`.\n\
             - Use two-space indentation and never use tabs."
        }
        OutputFormat::Text => {
            "Respond in clear, natural language.\n\
             - Avoid markdown formatting (no headings, bold, tables or code fences).\n\
             - Use short paragraphs and plain line breaks."
        }
    }
}

// ── Expansion instruction ─────────────────────────────────────────────────

/// Wrap an assembled brief in the instruction asking the model to expand it
/// into a master prompt of roughly `target_chars` characters.
pub fn expansion_instruction(brief: &str, target_chars: usize, format: MasterPromptFormat) -> String {
    let guide = match format {
        MasterPromptFormat::Markdown => MARKDOWN_GUIDE,
        MasterPromptFormat::Json => JSON_GUIDE,
    };

    format!(
        "You are a senior prompt engineer. Expand the brief below into a complete, \
production-ready MASTER PROMPT (system prompt) for an AI agent.\n\
\n\
Requirements:\n\
- Target length: approximately {target_chars} characters.\n\
- Keep every fact, rule, tool, variable, example and flow from the brief; \
elaborate them, never drop them.\n\
- Write the master prompt in the same language as the brief.\n\
- Output only the master prompt, with no preamble or closing remarks.\n\
\n\
<brief>\n{brief}\n</brief>\n\
\n\
{guide}"
    )
}

/// Validate, assemble and wrap a brief in one step, targeting
/// `target_chars` characters.
pub fn build_generation_prompt(
    data: &PromptData,
    target_chars: usize,
) -> Result<String, ValidationError> {
    let brief = assemble(data)?;
    Ok(expansion_instruction(
        &brief,
        target_chars,
        data.master_prompt_format,
    ))
}

const MARKDOWN_GUIDE: &str = "\
Format: Markdown. Use exactly this heading hierarchy:
# <Agent name>: Master Prompt
## 1. Identity and Persona
### 1.1 Tone of Voice
## 2. Objective
## 3. Business Context
## 4. Interaction Context
## 5. Tools
### 5.x <Tool name>: when and how to use it
## 6. Dynamic Variables
## 7. Rules and Restrictions
## 8. Flows
### 8.x <Flow name>
## 9. Examples
## 10. Output Format
Omit a numbered section only when the brief has nothing for it. Use bullet \
lists for rules and keep one rule per bullet.";

const JSON_GUIDE: &str = r#"Format: JSON. The output MUST pass strict JSON parsing:
no comments, no trailing commas, no code fences, double-quoted keys and strings.
Follow this structure (extend arrays as needed, keep key names exactly):
{
  "agent": {
    "name": "",
    "persona": "",
    "tone": ""
  },
  "objective": "",
  "businessContext": "",
  "interactionContext": "",
  "tools": [
    { "name": "", "description": "", "whenToUse": "" }
  ],
  "dynamicVariables": [
    { "key": "", "description": "", "example": "" }
  ],
  "rules": [""],
  "flows": [
    { "name": "", "type": "", "objective": "", "steps": [""] }
  ],
  "examples": [
    { "user": "", "agent": "" }
  ],
  "outputFormat": { "type": "", "instructions": "" }
}
Start the response with `{` and end it with `}`."#;
