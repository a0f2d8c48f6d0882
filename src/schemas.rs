//! # Schemas Module
//!
//! Wire types for the chat and embedding endpoints.
//!
//! Chat types follow the OpenAI chat completions format, which is also what the
//! upstream speaks. Buffered responses are a pass-through: every envelope field
//! the upstream sends is kept, including ones this module does not model, and
//! fields the upstream leaves out stay out.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Object tag of a streamed chunk.
pub const CHUNK_OBJECT: &str = "chat.completion.chunk";

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// # Chat Request
///
/// Inbound chat request, forwarded to the upstream with `model` and every set
/// generation parameter merged into one JSON body.
///
/// `model` and `messages` default to empty when absent so that the orchestrator
/// can reject them with its own not-found error instead of a parse error.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChatRequest {
    /// Upstream model identifier, forwarded verbatim
    #[serde(default)]
    pub model: String,
    /// Conversation so far
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling parameter (0.0 to 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Frequency penalty (-2.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// Presence penalty (-2.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// Which tool(s) the model may use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Stream the response as server-sent events
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    /// Check the fields the orchestrator needs before any upstream call.
    pub fn check_required(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name must be provided".to_string());
        }
        if self.messages.is_empty() {
            return Err("Messages must be provided".to_string());
        }
        Ok(())
    }

    /// Check generation parameters against their documented bounds.
    pub fn check_parameters(&self) -> Result<(), String> {
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;
        check_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;

        if self.max_tokens == Some(0) {
            return Err("max_tokens must be at least 1".to_string());
        }

        if let Some(position) = self.messages.iter().position(|message| {
            !matches!(
                message.content,
                None | Some(Value::Null) | Some(Value::String(_)) | Some(Value::Array(_))
            )
        }) {
            return Err(format!(
                "messages[{}].content must be a string, an array of content parts or null",
                position
            ));
        }

        if let Some(tools) = &self.tools {
            if let Some(tool) = tools.iter().find(|tool| tool.function.name.trim().is_empty()) {
                return Err(format!("tool of type '{}' has an empty function name", tool.tool_type));
            }
        }

        Ok(())
    }

    /// Copy of this request with the `stream` flag forced, as sent upstream.
    pub fn for_upstream(&self, stream: bool) -> Self {
        Self {
            stream,
            ..self.clone()
        }
    }
}

fn check_range(name: &str, value: Option<f64>, min: f64, max: f64) -> Result<(), String> {
    match value {
        Some(v) if v.is_nan() || v < min || v > max => Err(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, v
        )),
        _ => Ok(()),
    }
}

/// Deserialize a field that is present in the input, keeping an explicit `null`
/// apart from an absent key (which falls back to `#[serde(default)]`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// One conversation message.
///
/// Forwarded upstream as received: `content` may be a string, an array of
/// content parts or `null`, and keys not modelled here (`cache_control`, ...)
/// are carried in `extra`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Tool call ID (for tool role messages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(Value::String(content.into())),
            name: None,
            tool_calls: None,
            tool_call_id: None,
            extra: Map::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// Text content, when the content is a plain string.
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }
}

/// # Tool Definition
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Tool {
    /// Tool type, only "function" is defined today
    #[serde(rename = "type", default = "default_tool_type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

fn default_tool_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

/// # Tool Choice
///
/// Accepts the OpenAI object form, a list of tool names, or a bare string
/// (`"auto"`, `"none"`, `"required"` or a single tool name).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Function {
        #[serde(rename = "type")]
        tool_type: String,
        function: FunctionChoice,
    },
    Names(Vec<String>),
    Mode(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FunctionChoice {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as a JSON encoded string
    pub arguments: String,
}

/// Why the model stopped generating.
///
/// Values outside the OpenAI set are kept as-is so that responses round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Other(other) => other,
        }
    }
}

impl From<String> for FinishReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Other(value),
        }
    }
}

impl From<FinishReason> for String {
    fn from(reason: FinishReason) -> Self {
        match reason {
            FinishReason::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

/// # Chat Response
///
/// Buffered completion as returned by the upstream.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    /// Unix timestamp in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Upstream fields not modelled above (provider, system_fingerprint, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatResponse {
    /// Content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Choice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub message: ResponseMessage,
    /// Outer `None` when the upstream left the key out, inner `None` for `null`
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<Option<FinishReason>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Choice {
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref().and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResponseMessage {
    pub role: Role,
    /// `null` when the assistant answered with tool calls only
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// # Chat Completion Chunk
///
/// One server-sent event of a streamed response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatStreamChunk {
    pub id: String,
    /// Always [`CHUNK_OBJECT`]
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Partial tool calls, forwarded as the upstream sent them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
}

impl ChatStreamChunk {
    fn single(id: &str, model: &str, created: i64, delta: Delta, finish_reason: Option<FinishReason>) -> Self {
        Self {
            id: id.to_string(),
            object: CHUNK_OBJECT.to_string(),
            created,
            model: model.to_string(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }

    /// Chunk carrying one upstream delta. The first chunk of a stream also carries the role.
    pub fn delta(id: &str, model: &str, created: i64, mut delta: Delta, first: bool) -> Self {
        if first {
            delta.role = Some(Role::Assistant);
        }
        Self::single(id, model, created, delta, None)
    }

    /// Chunk carrying one content fragment.
    pub fn content(id: &str, model: &str, created: i64, content: String, first: bool) -> Self {
        let delta = Delta {
            content: Some(content),
            ..Delta::default()
        };
        Self::delta(id, model, created, delta, first)
    }

    /// Closing chunk with an empty delta and the finish reason.
    pub fn finish(id: &str, model: &str, created: i64, reason: FinishReason) -> Self {
        Self::single(id, model, created, Delta::default(), Some(reason))
    }
}

/// Embedding input: one text or a batch.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

impl EmbeddingInput {
    pub fn into_texts(self) -> Vec<String> {
        match self {
            EmbeddingInput::Single(text) => vec![text],
            EmbeddingInput::Batch(texts) => texts,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            EmbeddingInput::Single(text) => text.is_empty(),
            EmbeddingInput::Batch(texts) => texts.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default, alias = "inputs")]
    pub input: Option<EmbeddingInput>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingItem {
    pub object: String,
    pub embedding: Vec<f32>,
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingResponse {
    pub object: String,
    pub data: Vec<EmbeddingItem>,
    pub model: String,
    pub usage: EmbeddingUsage,
}

impl EmbeddingResponse {
    pub fn from_vectors(model: impl Into<String>, vectors: Vec<Vec<f32>>) -> Self {
        let data = vectors
            .into_iter()
            .enumerate()
            .map(|(index, embedding)| EmbeddingItem {
                object: "embedding".to_string(),
                embedding,
                index,
            })
            .collect();

        Self {
            object: "list".to_string(),
            data,
            model: model.into(),
            usage: EmbeddingUsage::default(),
        }
    }
}
