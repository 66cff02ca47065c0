use crate::error::{Error, Result};
use crate::models::{CanonicalResult, FinishReason, RawCall, ToolCallResult, Usage, Warning};
use crate::protocol::workers_ai::ResponseToolCall;
use crate::protocol::BackendOutput;
use serde_json::Value;

/// 非流式响应 -> 规范化结果
///
/// 已知限制：后端的 finish_reason 和 usage 还没有映射，
/// 结束原因固定为 stop，用量固定为 0，不能用于计费或限额
pub fn decode(
    output: BackendOutput,
    raw_call: RawCall,
    warnings: Vec<Warning>,
) -> Result<CanonicalResult> {
    let response = match output {
        BackendOutput::Structured(response) => response,
        BackendOutput::Stream(_) => {
            return Err(Error::ProtocolMismatch {
                expected: "structured response",
                actual: "byte stream",
            });
        }
    };

    let tool_calls = response
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(to_tool_call_result)
        .collect::<Result<Vec<_>>>()?;

    Ok(CanonicalResult {
        text: response.response.unwrap_or_default(),
        tool_calls,
        finish_reason: FinishReason::Stop,
        usage: Usage::default(),
        raw_call,
        warnings,
    })
}

/// 后端没有工具调用 ID，用工具名代替
pub(crate) fn to_tool_call_result(call: ResponseToolCall) -> Result<ToolCallResult> {
    Ok(ToolCallResult {
        tool_call_id: call.name.clone(),
        arguments: arguments_json(call.arguments)?,
        name: call.name,
    })
}

/// 工具参数统一转成 JSON 文本
///
/// 空值（null、false、0、空字符串）视为没有参数，输出 `{}`
fn arguments_json(arguments: Value) -> Result<String> {
    match arguments {
        Value::Null | Value::Bool(false) => Ok("{}".to_string()),
        Value::Number(ref n) if n.as_f64() == Some(0.0) => Ok("{}".to_string()),
        Value::String(text) if text.is_empty() => Ok("{}".to_string()),
        // 部分模型直接返回 JSON 字符串，合法时原样保留
        Value::String(text) => {
            if serde_json::from_str::<Value>(&text).is_ok() {
                Ok(text)
            } else {
                Ok(serde_json::to_string(&text)?)
            }
        }
        other => Ok(serde_json::to_string(&other)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::workers_ai::StructuredResponse;
    use bytes::Bytes;
    use futures::stream;
    use serde_json::json;

    fn raw_call() -> RawCall {
        RawCall {
            raw_prompt: json!([{"role": "user", "content": "weather?"}]),
            raw_settings: json!({"model": "@cf/meta/llama-3.1-8b-instruct"}),
        }
    }

    #[test]
    fn decodes_text_and_tool_calls() {
        let response: StructuredResponse = serde_json::from_value(json!({
            "response": "",
            "tool_calls": [{"name": "weather", "arguments": {"location": "London"}}]
        }))
        .unwrap();

        let result = decode(BackendOutput::Structured(response), raw_call(), vec![]).unwrap();

        assert_eq!(result.tool_calls.len(), 1);
        let call = &result.tool_calls[0];
        assert_eq!(call.name, "weather");
        assert_eq!(call.tool_call_id, "weather");
        let args: Value = serde_json::from_str(&call.arguments).unwrap();
        assert_eq!(args, json!({"location": "London"}));
        assert_eq!(result.finish_reason, FinishReason::Stop);
        assert_eq!(result.usage, Usage::default());
        assert_eq!(result.raw_call, raw_call());
    }

    #[test]
    fn missing_arguments_become_empty_object() {
        let response: StructuredResponse = serde_json::from_value(json!({
            "response": "calling",
            "tool_calls": [{"name": "time"}]
        }))
        .unwrap();

        let result = decode(BackendOutput::Structured(response), raw_call(), vec![]).unwrap();
        assert_eq!(result.text, "calling");
        assert_eq!(result.tool_calls[0].arguments, "{}");
    }

    #[test]
    fn string_arguments_always_come_out_as_json_text() {
        let cases = [
            (json!("London"), r#""London""#),
            (json!(""), "{}"),
            (json!(false), "{}"),
            (json!(0), "{}"),
            (json!(r#"{"location":"London"}"#), r#"{"location":"London"}"#),
            (json!(["a", 1]), r#"["a",1]"#),
        ];

        for (input, expected) in cases {
            let call = ResponseToolCall {
                name: "weather".into(),
                arguments: input.clone(),
            };
            let result = to_tool_call_result(call).unwrap();
            assert_eq!(result.arguments, expected, "input {input}");
            assert!(
                serde_json::from_str::<Value>(&result.arguments).is_ok(),
                "input {input} produced {}",
                result.arguments
            );
        }
    }

    #[test]
    fn warnings_ride_along() {
        let warnings = vec![Warning::unsupported_setting("presencePenalty")];
        let response = StructuredResponse {
            response: Some("hello".into()),
            tool_calls: None,
        };

        let result = decode(BackendOutput::Structured(response), raw_call(), warnings.clone()).unwrap();
        assert_eq!(result.text, "hello");
        assert!(result.tool_calls.is_empty());
        assert_eq!(result.warnings, warnings);
    }

    #[test]
    fn stream_output_is_a_protocol_mismatch() {
        let bytes = stream::iter(vec![Ok(Bytes::from_static(b"data: [DONE]\n\n"))]);
        let err = decode(BackendOutput::Stream(Box::pin(bytes)), raw_call(), vec![]).unwrap_err();
        assert!(matches!(err, Error::ProtocolMismatch { .. }));
    }
}
