use crate::error::{Error, Result};
use crate::models::{CanonicalMessage, ContentPart, Role};
use crate::protocol::workers_ai::{FunctionCall, Message, MessageToolCall};

/// 规范化消息 -> Workers AI chat 消息
///
/// 后端只接受纯文本 content，因此文本片段会被拼接；
/// 工具调用放到 assistant 的 tool_calls 中，工具结果各自成为一条 tool 消息
pub fn convert_messages(messages: &[CanonicalMessage]) -> Result<Vec<Message>> {
    let mut converted = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role() {
            Role::System => {
                let text = collect_text(message)?;
                converted.push(Message::new("system", text));
            }
            Role::User => {
                let text = collect_text(message)?;
                converted.push(Message::new("user", text));
            }
            Role::Assistant => {
                let mut text = String::new();
                let mut tool_calls = Vec::new();

                for part in message.content() {
                    match part {
                        ContentPart::Text { text: t } => text.push_str(t),
                        ContentPart::ToolCall {
                            tool_call_id,
                            tool_name,
                            args,
                        } => tool_calls.push(MessageToolCall {
                            id: tool_call_id.clone(),
                            call_type: "function".to_string(),
                            function: FunctionCall {
                                name: tool_name.clone(),
                                arguments: serde_json::to_string(args)?,
                            },
                        }),
                        ContentPart::ToolResult { .. } => {
                            return Err(unsupported_part(message.role(), part));
                        }
                    }
                }

                let mut assistant = Message::new("assistant", text);
                if !tool_calls.is_empty() {
                    assistant.tool_calls = Some(tool_calls);
                }
                converted.push(assistant);
            }
            Role::Tool => {
                for part in message.content() {
                    match part {
                        ContentPart::ToolResult {
                            tool_call_id,
                            tool_name,
                            result,
                        } => {
                            let mut tool = Message::new("tool", serde_json::to_string(result)?);
                            tool.name = Some(tool_name.clone());
                            tool.tool_call_id = Some(tool_call_id.clone());
                            converted.push(tool);
                        }
                        ContentPart::Text { .. } | ContentPart::ToolCall { .. } => {
                            return Err(unsupported_part(message.role(), part));
                        }
                    }
                }
            }
        }
    }

    Ok(converted)
}

fn collect_text(message: &CanonicalMessage) -> Result<String> {
    let mut text = String::new();
    for part in message.content() {
        match part {
            ContentPart::Text { text: t } => text.push_str(t),
            _ => return Err(unsupported_part(message.role(), part)),
        }
    }
    Ok(text)
}

fn unsupported_part(role: Role, part: &ContentPart) -> Error {
    Error::UnsupportedFunctionality(format!(
        "{} content in {:?} message",
        part.kind(),
        role
    ))
}
