//! Voice commands: function declarations the model may call to edit the
//! brief, and parsing of the calls it returns.

use labprompt_core::provider::{FunctionCall, ToolDefinition};
use labprompt_core::Error;
use serde::Serialize;
use serde_json::{Value, json};

/// Brief fields a `set_field` command may target.
pub const SETTABLE_FIELDS: &[&str] = &[
    "persona",
    "objective",
    "businessContext",
    "interactionContext",
    "outputStructure",
];

/// A parsed edit to the brief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum VoiceCommand {
    SetField { field: String, value: String },
    AddRule { rule: String },
    AddTool { name: String, description: String },
    AddExample { user: String, agent: String },
    SetOutputFormat { format: String },
    GeneratePrompt,
}

impl VoiceCommand {
    /// Parse one function call. Unknown names and missing arguments are
    /// parse errors.
    pub fn from_call(call: &FunctionCall) -> Result<Self, Error> {
        let arg = |key: &str| -> Result<String, Error> {
            call.args
                .get(key)
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    Error::Parse(format!("{}: missing argument '{key}'", call.name))
                })
        };

        match call.name.as_str() {
            "set_field" => {
                let field = arg("field")?;
                if !SETTABLE_FIELDS.contains(&field.as_str()) {
                    return Err(Error::Parse(format!("set_field: unknown field '{field}'")));
                }
                Ok(Self::SetField {
                    field,
                    value: arg("value")?,
                })
            }
            "add_rule" => Ok(Self::AddRule { rule: arg("rule")? }),
            "add_tool" => Ok(Self::AddTool {
                name: arg("name")?,
                description: arg("description")?,
            }),
            "add_example" => Ok(Self::AddExample {
                user: arg("user")?,
                agent: arg("agent")?,
            }),
            "set_output_format" => {
                let format = arg("format")?.to_ascii_lowercase();
                match format.as_str() {
                    "json" | "xml" | "yaml" | "text" => Ok(Self::SetOutputFormat { format }),
                    other => Err(Error::Parse(format!(
                        "set_output_format: unsupported format '{other}'"
                    ))),
                }
            }
            "generate_prompt" => Ok(Self::GeneratePrompt),
            other => Err(Error::Parse(format!("unknown voice command '{other}'"))),
        }
    }
}

fn string_params(props: &[(&str, &str)]) -> Value {
    let properties: serde_json::Map<String, Value> = props
        .iter()
        .map(|(name, description)| {
            (
                (*name).to_string(),
                json!({ "type": "string", "description": description }),
            )
        })
        .collect();
    let required: Vec<&str> = props.iter().map(|(name, _)| *name).collect();
    json!({ "type": "object", "properties": properties, "required": required })
}

/// The function declarations sent with every voice-command request.
pub fn command_declarations() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "set_field".into(),
            description: "Set a text field of the prompt brief.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "field": { "type": "string", "enum": SETTABLE_FIELDS },
                    "value": { "type": "string", "description": "New field content" }
                },
                "required": ["field", "value"]
            }),
        },
        ToolDefinition {
            name: "add_rule".into(),
            description: "Add a rule the agent must follow.".into(),
            parameters: string_params(&[("rule", "The rule text")]),
        },
        ToolDefinition {
            name: "add_tool".into(),
            description: "Declare a tool the agent can use.".into(),
            parameters: string_params(&[
                ("name", "Tool identifier"),
                ("description", "What the tool does"),
            ]),
        },
        ToolDefinition {
            name: "add_example".into(),
            description: "Add an example exchange between a user and the agent.".into(),
            parameters: string_params(&[
                ("user", "The user's message"),
                ("agent", "The ideal agent reply"),
            ]),
        },
        ToolDefinition {
            name: "set_output_format".into(),
            description: "Choose the format of the agent's answers.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "format": { "type": "string", "enum": ["json", "xml", "yaml", "text"] }
                },
                "required": ["format"]
            }),
        },
        ToolDefinition {
            name: "generate_prompt".into(),
            description: "Generate the master prompt from the current brief.".into(),
            parameters: json!({ "type": "object", "properties": {} }),
        },
    ]
}

/// Instruction sent with a transcript (or with recorded audio when
/// `transcript` is `None`).
pub fn instruction(transcript: Option<&str>) -> String {
    let head = "You control a prompt-building form by calling the declared functions. \
                Translate the user's spoken request into one or more function calls. \
                Do not answer in text.";
    match transcript.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => format!("{head}\n\nUser said: \"{t}\""),
        None => format!("{head}\n\nThe user's request is in the attached audio."),
    }
}
