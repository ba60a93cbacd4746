//! The structured brief behind every generated prompt.
//!
//! [`PromptData`] mirrors the form the user fills in. Field names on the
//! wire follow the UI's JSON (`objetivo`, `contextoNegocio`, ...), with
//! English aliases accepted on input.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Target master-prompt size when the brief does not specify one.
pub const DEFAULT_PROMPT_SIZE: usize = 8_000;

/// Format the end-user-facing agent must answer in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Xml,
    Yaml,
    #[default]
    Text,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Xml => write!(f, "xml"),
            Self::Yaml => write!(f, "yaml"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Format of the generated master prompt itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasterPromptFormat {
    #[default]
    Markdown,
    Json,
}

impl std::fmt::Display for MasterPromptFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// A tool the target agent can call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(default, rename = "nome", alias = "name")]
    pub name: String,
    #[serde(default, rename = "descricao", alias = "description")]
    pub description: String,
}

/// A placeholder the target agent receives at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicVariable {
    #[serde(default, rename = "chave", alias = "key")]
    pub key: String,
    #[serde(default, rename = "valorExemplo", alias = "example")]
    pub example: String,
}

/// One user/agent exchange shown to the model as a reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    #[serde(default, rename = "usuario", alias = "user")]
    pub user: String,
    #[serde(default, rename = "agente", alias = "agent")]
    pub agent: String,
}

/// A named sub-task the target agent handles with its own prompting strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    #[serde(default, rename = "nome", alias = "name")]
    pub name: String,

    #[serde(default, rename = "tipoPrompt", alias = "promptType")]
    pub prompt_type: String,

    #[serde(default, rename = "objetivo", alias = "objective")]
    pub objective: String,

    #[serde(
        default,
        rename = "contextoRag",
        alias = "ragContext",
        skip_serializing_if = "Option::is_none"
    )]
    pub rag_context: Option<String>,

    #[serde(
        default,
        rename = "cadeiaPensamento",
        alias = "chainOfThought",
        skip_serializing_if = "Option::is_none"
    )]
    pub chain_of_thought: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrails: Option<bool>,

    #[serde(
        default,
        rename = "fewShot",
        skip_serializing_if = "Option::is_none"
    )]
    pub few_shot: Option<String>,
}

/// The structured brief for a master prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptData {
    #[serde(default)]
    pub persona: String,

    #[serde(default, rename = "objetivo", alias = "objective")]
    pub objective: String,

    #[serde(default, rename = "contextoNegocio", alias = "businessContext")]
    pub business_context: String,

    #[serde(default, rename = "contexto", alias = "interactionContext")]
    pub interaction_context: String,

    #[serde(default, rename = "regras", alias = "rules")]
    pub rules: Vec<String>,

    #[serde(default, rename = "ferramentas", alias = "tools")]
    pub tools: Vec<ToolSpec>,

    #[serde(default, rename = "variaveisDinamicas", alias = "variables")]
    pub variables: Vec<DynamicVariable>,

    #[serde(default, rename = "exemplos", alias = "examples")]
    pub examples: Vec<Example>,

    #[serde(default, rename = "fluxos", alias = "flows")]
    pub flows: Vec<Flow>,

    #[serde(default, rename = "formatoSaida", alias = "outputFormat")]
    pub output_format: OutputFormat,

    #[serde(default, rename = "estruturaSaida", alias = "outputStructure")]
    pub output_structure: String,

    #[serde(default = "default_prompt_size", rename = "promptSize")]
    pub prompt_size: usize,

    #[serde(default, rename = "masterPromptFormat")]
    pub master_prompt_format: MasterPromptFormat,
}

fn default_prompt_size() -> usize {
    DEFAULT_PROMPT_SIZE
}

impl Default for PromptData {
    fn default() -> Self {
        Self {
            persona: String::new(),
            objective: String::new(),
            business_context: String::new(),
            interaction_context: String::new(),
            rules: Vec::new(),
            tools: Vec::new(),
            variables: Vec::new(),
            examples: Vec::new(),
            flows: Vec::new(),
            output_format: OutputFormat::default(),
            output_structure: String::new(),
            prompt_size: DEFAULT_PROMPT_SIZE,
            master_prompt_format: MasterPromptFormat::default(),
        }
    }
}

impl PromptData {
    /// Check the four required text fields, in form order, then the rules.
    ///
    /// Fails on the first field that is empty after trimming, or on the
    /// first blank rule.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("persona", &self.persona),
            ("objective", &self.objective),
            ("business context", &self.business_context),
            ("interaction context", &self.interaction_context),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(field));
            }
        }
        if let Some(n) = self.rules.iter().position(|r| r.trim().is_empty()) {
            return Err(ValidationError::Invalid(format!("rule {} is blank", n + 1)));
        }
        Ok(())
    }
}

/// The model's expansion of a [`PromptData`], after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPrompt {
    pub text: String,
    pub format: MasterPromptFormat,

    /// Set when JSON output could not be re-formatted and was passed through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A reviewer's fix to one agent answer, fed back into prompt optimization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub user_query: String,
    pub prior_response: String,
    pub corrected_response: String,
}
