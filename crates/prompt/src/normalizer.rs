//! Response normalization.
//!
//! Raw model output is cleaned up according to the format the caller
//! expects. For JSON the strict path is: strip a surrounding code fence,
//! parse, re-serialize with two-space indentation. When strict parsing
//! fails, the first-`{`-to-last-`}` span is tried instead.
//!
//! The fallback only extracts a whole object from surrounding prose.
//! Malformed but close JSON (trailing commas, single quotes, comments) is
//! not repaired.

use std::sync::LazyLock;

use labprompt_core::prompt::{MasterPromptFormat, OutputFormat};
use labprompt_core::Error;
use regex_lite::Regex;
use tracing::{debug, warn};

/// Greedy span from the first `{` to the last `}`.
static BRACE_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{.*\}").unwrap_or_else(|_| unreachable!("static pattern compiles"))
});

/// The shape the caller expects the model's text to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Json,
    Markdown,
    Text,
    Xml,
    Yaml,
}

impl From<MasterPromptFormat> for TargetFormat {
    fn from(format: MasterPromptFormat) -> Self {
        match format {
            MasterPromptFormat::Markdown => Self::Markdown,
            MasterPromptFormat::Json => Self::Json,
        }
    }
}

impl From<OutputFormat> for TargetFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => Self::Json,
            OutputFormat::Xml => Self::Xml,
            OutputFormat::Yaml => Self::Yaml,
            OutputFormat::Text => Self::Text,
        }
    }
}

/// Normalized model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    /// Set when JSON re-formatting failed and the trimmed text was kept.
    pub warning: Option<String>,
}

/// Normalize `raw` for `format`. Never fails: a JSON response that cannot
/// be parsed comes back trimmed and unchanged, with a warning.
pub fn normalize(raw: &str, format: TargetFormat) -> Normalized {
    match format {
        TargetFormat::Json => match normalize_json_strict(raw) {
            Ok(text) => Normalized {
                text,
                warning: None,
            },
            Err(e) => {
                warn!(error = %e, "JSON normalization failed, returning raw text");
                Normalized {
                    text: raw.trim().to_string(),
                    warning: Some(
                        "The response is not valid JSON and was returned unformatted.".into(),
                    ),
                }
            }
        },
        TargetFormat::Markdown | TargetFormat::Text | TargetFormat::Xml | TargetFormat::Yaml => {
            Normalized {
                text: raw.trim().to_string(),
                warning: None,
            }
        }
    }
}

/// Parse `raw` as JSON (fence-stripping and brace extraction included) and
/// pretty-print it with two-space indentation.
///
/// Fails with [`Error::Parse`] when neither the whole text nor the
/// extracted span is valid JSON.
pub fn normalize_json_strict(raw: &str) -> Result<String, Error> {
    let value = parse_json_lenient(raw)?;
    serde_json::to_string_pretty(&value).map_err(Error::from)
}

/// Parse `raw` as JSON, falling back to brace extraction.
pub fn parse_json_lenient(raw: &str) -> Result<serde_json::Value, Error> {
    let body = strip_code_fences(raw);

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => Ok(value),
        Err(strict_err) => {
            debug!(error = %strict_err, "Strict JSON parse failed, trying brace extraction");
            let span = extract_brace_span(body).ok_or_else(|| {
                Error::Parse(format!("no JSON object found in response: {strict_err}"))
            })?;
            serde_json::from_str(span)
                .map_err(|e| Error::Parse(format!("extracted JSON object is invalid: {e}")))
        }
    }
}

/// Remove a surrounding Markdown code fence, with or without a language tag.
///
/// Text without a leading fence is returned trimmed.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let body = match rest.find('\n') {
        Some(idx) if is_language_tag(&rest[..idx]) => &rest[idx + 1..],
        _ => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn is_language_tag(s: &str) -> bool {
    s.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '+')
}

/// The greedy first-`{`-to-last-`}` span of `text`, if any.
pub fn extract_brace_span(text: &str) -> Option<&str> {
    BRACE_SPAN.find(text).map(|m| m.as_str())
}
