use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 消息内容片段
/// 文本、模型发起的工具调用、工具返回结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        args: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        result: Value,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// 用于错误信息
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolCall { .. } => "tool-call",
            Self::ToolResult { .. } => "tool-result",
        }
    }
}

/// 规范化消息
/// 构造后不可修改，只提供只读访问
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    role: Role,
    #[serde(deserialize_with = "deserialize_content")]
    content: Vec<ContentPart>,
}

/// content 既可以是纯文本，也可以是片段数组
#[derive(Deserialize)]
#[serde(untagged)]
enum ContentWire {
    Text(String),
    Parts(Vec<ContentPart>),
}

fn deserialize_content<'de, D>(deserializer: D) -> std::result::Result<Vec<ContentPart>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match ContentWire::deserialize(deserializer)? {
        ContentWire::Text(text) => vec![ContentPart::text(text)],
        ContentWire::Parts(parts) => parts,
    })
}

impl CanonicalMessage {
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self { role, content }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentPart::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentPart::text(text)])
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: Value,
    ) -> Self {
        Self::new(
            Role::Tool,
            vec![ContentPart::ToolResult {
                tool_call_id: tool_call_id.into(),
                tool_name: tool_name.into(),
                result,
            }],
        )
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &[ContentPart] {
        &self.content
    }
}

/// 工具定义，name 在同一请求内唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema
    #[serde(default)]
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters,
        }
    }
}

/// 工具选择策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Tool { name: String },
}

impl TryFrom<&Value> for ToolChoice {
    type Error = Error;

    /// 解析 `{"type": "auto"}` / `{"type": "tool", "toolName": "..."}` 形式，
    /// 也接受裸字符串 `"auto"`
    fn try_from(value: &Value) -> Result<Self> {
        let tag = type_tag(value)
            .ok_or_else(|| Error::UnsupportedToolChoice(value.to_string()))?;

        match tag {
            "auto" => Ok(Self::Auto),
            "none" => Ok(Self::None),
            "required" => Ok(Self::Required),
            "tool" => {
                let name = value
                    .get("toolName")
                    .or_else(|| value.get("name"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::UnsupportedToolChoice("tool without toolName".into()))?;
                Ok(Self::Tool {
                    name: name.to_string(),
                })
            }
            other => Err(Error::UnsupportedToolChoice(other.to_string())),
        }
    }
}

/// 生成模式
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Regular,
    ObjectJson,
    /// 携带需要强制调用的单个工具
    ObjectTool(ToolDefinition),
    ObjectGrammar,
}

impl Mode {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::ObjectJson => "object-json",
            Self::ObjectTool(_) => "object-tool",
            Self::ObjectGrammar => "object-grammar",
        }
    }
}

impl TryFrom<&Value> for Mode {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        let tag = type_tag(value).ok_or_else(|| Error::UnsupportedMode(value.to_string()))?;

        match tag {
            "regular" => Ok(Self::Regular),
            "object-json" => Ok(Self::ObjectJson),
            "object-tool" => {
                let tool = value
                    .get("tool")
                    .cloned()
                    .ok_or_else(|| Error::UnsupportedMode("object-tool without tool".into()))?;
                Ok(Self::ObjectTool(serde_json::from_value(tool)?))
            }
            "object-grammar" => Ok(Self::ObjectGrammar),
            other => Err(Error::UnsupportedMode(other.to_string())),
        }
    }
}

fn type_tag(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => obj.get("type").and_then(Value::as_str),
        _ => None,
    }
}

/// 采样参数，全部可选
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// 规范化生成请求
/// 每次调用构造一次，由 RequestMapper 按值消费
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRequest {
    pub mode: Mode,
    pub messages: Vec<CanonicalMessage>,
    pub sampling: SamplingParams,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
}

/// 请求的 JSON 形式，mode / toolChoice 保留原始值以便给出准确的错误
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalRequestWire {
    mode: Value,
    #[serde(default)]
    messages: Vec<CanonicalMessage>,
    #[serde(flatten)]
    sampling: SamplingParams,
    #[serde(default)]
    tools: Vec<ToolDefinition>,
    #[serde(default)]
    tool_choice: Option<Value>,
}

impl CanonicalRequest {
    pub fn new(mode: Mode, messages: Vec<CanonicalMessage>) -> Self {
        Self {
            mode,
            messages,
            sampling: SamplingParams::default(),
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>, tool_choice: Option<ToolChoice>) -> Self {
        self.tools = tools;
        self.tool_choice = tool_choice;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    /// 从 JSON 解析请求
    /// 未知的 mode / toolChoice 分别返回 UnsupportedMode / UnsupportedToolChoice
    pub fn from_value(value: Value) -> Result<Self> {
        let wire: CanonicalRequestWire = serde_json::from_value(value)?;
        let mode = Mode::try_from(&wire.mode)?;
        let tool_choice = wire
            .tool_choice
            .as_ref()
            .map(ToolChoice::try_from)
            .transpose()?;

        Ok(Self {
            mode,
            messages: wire.messages,
            sampling: wire.sampling,
            tools: wire.tools,
            tool_choice,
        })
    }
}

/// 结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other,
    Unknown,
}

/// Token 用量
/// 后端目前不返回用量，两项恒为 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// 模型发起的一次工具调用，arguments 为 JSON 文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub name: String,
    pub arguments: String,
}

/// 非致命警告，例如后端不支持的采样参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub setting: String,
    pub reason: String,
}

impl Warning {
    pub fn unsupported_setting(setting: &str) -> Self {
        Self {
            setting: setting.to_string(),
            reason: "unsupported-setting".to_string(),
        }
    }
}

/// 原始调用回显，便于追踪结果来自哪个后端请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCall {
    pub raw_prompt: Value,
    pub raw_settings: Value,
}

/// 非流式结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalResult {
    pub text: String,
    pub tool_calls: Vec<ToolCallResult>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub raw_call: RawCall,
    pub warnings: Vec<Warning>,
}

/// 流式事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    #[serde(rename_all = "camelCase")]
    TextDelta { text_delta: String },
    ToolCall(ToolCallResult),
    #[serde(rename_all = "camelCase")]
    Finish {
        finish_reason: FinishReason,
        usage: Usage,
    },
    Error { error: String },
}

impl StreamEvent {
    pub fn text_delta(text: impl Into<String>) -> Self {
        Self::TextDelta {
            text_delta: text.into(),
        }
    }

    /// 正常结束：stop + 零用量
    pub fn finish_stop() -> Self {
        Self::Finish {
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_regular_request_with_null_tool_choice() {
        let request = CanonicalRequest::from_value(json!({
            "mode": {"type": "regular"},
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [],
            "toolChoice": null,
            "maxTokens": 64,
            "seed": 7
        }))
        .unwrap();

        assert_eq!(request.mode, Mode::Regular);
        assert_eq!(request.messages, vec![CanonicalMessage::user("hi")]);
        assert!(request.tools.is_empty());
        assert_eq!(request.tool_choice, None);
        assert_eq!(request.sampling.max_tokens, Some(64));
        assert_eq!(request.sampling.seed, Some(7));
    }

    #[test]
    fn message_content_accepts_part_arrays() {
        let message: CanonicalMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Checking."},
                {"type": "tool-call", "toolCallId": "call_1", "toolName": "weather", "args": {"location": "London"}}
            ]
        }))
        .unwrap();

        assert_eq!(message.role(), Role::Assistant);
        assert_eq!(message.content().len(), 2);
        assert_eq!(message.content()[1].kind(), "tool-call");
    }

    #[test]
    fn unknown_mode_is_rejected_with_its_tag() {
        let err = CanonicalRequest::from_value(json!({
            "mode": {"type": "object-yaml"},
            "messages": []
        }))
        .unwrap_err();

        match err {
            Error::UnsupportedMode(tag) => assert_eq!(tag, "object-yaml"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_tool_choice_is_rejected_with_its_tag() {
        let err = ToolChoice::try_from(&json!({"type": "sometimes"})).unwrap_err();
        assert!(matches!(err, Error::UnsupportedToolChoice(tag) if tag == "sometimes"));
    }

    #[test]
    fn tool_choice_tool_reads_tool_name() {
        let choice = ToolChoice::try_from(&json!({"type": "tool", "toolName": "weather"})).unwrap();
        assert_eq!(
            choice,
            ToolChoice::Tool {
                name: "weather".into()
            }
        );
        assert_eq!(ToolChoice::try_from(&json!("required")).unwrap(), ToolChoice::Required);
    }

    #[test]
    fn object_tool_mode_carries_its_tool() {
        let mode = Mode::try_from(&json!({
            "type": "object-tool",
            "tool": {"name": "json", "description": "Respond with JSON", "parameters": {"type": "object"}}
        }))
        .unwrap();

        match mode {
            Mode::ObjectTool(tool) => {
                assert_eq!(tool.name, "json");
                assert_eq!(tool.parameters, json!({"type": "object"}));
            }
            other => panic!("unexpected mode: {other:?}"),
        }
    }

    #[test]
    fn stream_events_serialize_with_type_tags() {
        let delta = serde_json::to_value(StreamEvent::text_delta("Rain")).unwrap();
        assert_eq!(delta, json!({"type": "text-delta", "textDelta": "Rain"}));

        let finish = serde_json::to_value(StreamEvent::finish_stop()).unwrap();
        assert_eq!(
            finish,
            json!({
                "type": "finish",
                "finishReason": "stop",
                "usage": {"promptTokens": 0, "completionTokens": 0}
            })
        );
    }
}
