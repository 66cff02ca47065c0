use crate::catalog::ModelId;
use crate::config::ChatSettings;
use crate::error::{Error, Result};
use crate::models::{CanonicalRequest, Mode, Warning};
use crate::protocol::messages::convert_messages;
use crate::protocol::tool_choice::resolve as resolve_tools;
use crate::protocol::workers_ai::{BackendRequest, ResponseFormat, Tool, ToolChoice};
use tracing::{debug, warn};

/// 规范化请求 -> Workers AI 请求
///
/// 返回映射后的请求和警告列表。警告不阻塞生成，随结果一起返回。
pub fn map(
    request: CanonicalRequest,
    model: &ModelId,
    settings: &ChatSettings,
    stream: bool,
) -> Result<(BackendRequest, Vec<Warning>)> {
    let CanonicalRequest {
        mode,
        messages,
        sampling,
        tools,
        tool_choice,
    } = request;

    let mut warnings = Vec::new();

    // 后端没有对应的惩罚参数，丢弃并给出警告
    if sampling.frequency_penalty.is_some() {
        warn!("frequencyPenalty is not supported by Workers AI, dropping it");
        warnings.push(Warning::unsupported_setting("frequencyPenalty"));
    }
    if sampling.presence_penalty.is_some() {
        warn!("presencePenalty is not supported by Workers AI, dropping it");
        warnings.push(Warning::unsupported_setting("presencePenalty"));
    }

    // 每个 mode 都必须显式处理，新增 mode 时这里会编译失败
    let (tools, tool_choice, response_format) = match mode {
        Mode::Regular => {
            let (tools, tool_choice) = resolve_tools(&tools, tool_choice.as_ref())?;
            (tools, tool_choice, None)
        }
        // json 模式下即使请求带了工具也不转发
        Mode::ObjectJson => (None, None, Some(ResponseFormat::json_object())),
        Mode::ObjectTool(tool) => (
            Some(vec![Tool::function(&tool)]),
            Some(ToolChoice::Any),
            None,
        ),
        Mode::ObjectGrammar => {
            return Err(Error::UnsupportedFunctionality(
                "object-grammar mode".to_string(),
            ));
        }
    };

    let backend = BackendRequest {
        model: model.to_string(),
        messages: convert_messages(&messages)?,
        max_tokens: sampling.max_tokens,
        temperature: sampling.temperature,
        top_p: sampling.top_p,
        random_seed: sampling.seed,
        safe_prompt: settings.safe_prompt,
        tools,
        tool_choice,
        response_format,
        stream,
    };

    debug!(
        "Mapped request: model={}, messages={}, tools={}, stream={}",
        backend.model,
        backend.messages.len(),
        backend.tools.as_ref().map_or(0, Vec::len),
        backend.stream
    );

    Ok((backend, warnings))
}
