use crate::catalog::ModelId;
use crate::config::ChatSettings;
use crate::error::{Error, Result};
use crate::models::{CanonicalRequest, CanonicalResult, RawCall, StreamEvent, Warning};
use crate::protocol::workers_ai::{BackendRequest, RunOptions};
use crate::protocol::{mapper, response, stream, BackendOutput, Binding};
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// 对话模型的 provider 名称
pub const PROVIDER_NAME: &str = "workersai.chat";

/// 结构化输出默认使用的模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectGenerationMode {
    Json,
    Tool,
}

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// 流式调用结果：事件流 + 原始请求回显 + 警告
pub struct StreamResult {
    pub stream: EventStream,
    pub raw_call: RawCall,
    pub warnings: Vec<Warning>,
}

/// Workers AI 对话模型
///
/// 只持有不可变配置和 binding 引用，可以在多个请求间共享、并发调用
#[derive(Clone)]
pub struct ChatModel {
    model_id: ModelId,
    settings: ChatSettings,
    provider: String,
    binding: Arc<dyn Binding>,
}

impl ChatModel {
    pub fn new(
        model_id: ModelId,
        settings: ChatSettings,
        provider: impl Into<String>,
        binding: Arc<dyn Binding>,
    ) -> Self {
        Self {
            model_id,
            settings,
            provider: provider.into(),
            binding,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model_id(&self) -> &ModelId {
        &self.model_id
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn default_object_generation_mode(&self) -> ObjectGenerationMode {
        ObjectGenerationMode::Json
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            gateway: self.settings.gateway.clone(),
        }
    }

    /// 非流式生成
    pub async fn generate(&self, request: CanonicalRequest) -> Result<CanonicalResult> {
        let request_id = Uuid::new_v4();
        info!(
            "generate: start request_id={} model={} mode={}",
            request_id,
            self.model_id,
            request.mode.kind()
        );

        let (backend, warnings) = mapper::map(request, &self.model_id, &self.settings, false)?;
        let raw_call = raw_call(&backend)?;

        let output = self
            .binding
            .run(self.model_id.as_str(), &backend, &self.run_options())
            .await
            .map_err(|e| {
                error!("generate: backend call failed request_id={}: {}", request_id, e);
                e
            })?;

        let result = response::decode(output, raw_call, warnings)?;
        info!(
            "generate: done request_id={} tool_calls={}",
            request_id,
            result.tool_calls.len()
        );
        Ok(result)
    }

    /// 流式生成
    ///
    /// 返回的事件流以恰好一个 finish 结束（上游出错时以 error 结束）；
    /// 丢弃事件流即取消，底层字节流随之关闭
    pub async fn stream(&self, request: CanonicalRequest) -> Result<StreamResult> {
        let request_id = Uuid::new_v4();
        info!(
            "stream: start request_id={} model={} mode={}",
            request_id,
            self.model_id,
            request.mode.kind()
        );

        let (backend, warnings) = mapper::map(request, &self.model_id, &self.settings, true)?;
        let raw_call = raw_call(&backend)?;

        let output = self
            .binding
            .run(self.model_id.as_str(), &backend, &self.run_options())
            .await
            .map_err(|e| {
                error!("stream: backend call failed request_id={}: {}", request_id, e);
                e
            })?;

        let bytes = match output {
            BackendOutput::Stream(bytes) => bytes,
            other @ BackendOutput::Structured(_) => {
                return Err(Error::ProtocolMismatch {
                    expected: "byte stream",
                    actual: other.kind(),
                });
            }
        };

        info!("stream: established request_id={}", request_id);
        Ok(StreamResult {
            stream: Box::pin(stream::decode_stream(bytes)),
            raw_call,
            warnings,
        })
    }
}

fn raw_call(backend: &BackendRequest) -> Result<RawCall> {
    let mut raw_settings = serde_json::to_value(backend)?;
    if let Value::Object(ref mut obj) = raw_settings {
        obj.insert("model".to_string(), Value::String(backend.model.clone()));
    }

    Ok(RawCall {
        raw_prompt: serde_json::to_value(&backend.messages)?,
        raw_settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CanonicalMessage, Mode, StreamEvent, ToolChoice, ToolDefinition};
    use crate::protocol::workers_ai::{GatewayOptions, StructuredResponse};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::{stream as futures_stream, StreamExt};
    use serde_json::json;
    use std::sync::Mutex;

    /// 记录调用并返回预设输出
    struct ScriptedBinding {
        calls: Mutex<Vec<(String, BackendRequest, RunOptions)>>,
        stream_body: Option<&'static [u8]>,
        structured: StructuredResponse,
    }

    impl ScriptedBinding {
        fn structured(response: StructuredResponse) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                stream_body: None,
                structured: response,
            }
        }

        fn streaming(body: &'static [u8]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                stream_body: Some(body),
                structured: StructuredResponse::default(),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Binding for ScriptedBinding {
        async fn run(
            &self,
            model: &str,
            request: &BackendRequest,
            options: &RunOptions,
        ) -> Result<BackendOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), request.clone(), options.clone()));

            Ok(match self.stream_body {
                Some(body) => {
                    let chunks: Vec<Result<Bytes>> = body
                        .chunks(7)
                        .map(|c| Ok(Bytes::copy_from_slice(c)))
                        .collect();
                    BackendOutput::Stream(Box::pin(futures_stream::iter(chunks)))
                }
                None => BackendOutput::Structured(self.structured.clone()),
            })
        }
    }

    fn model(binding: Arc<ScriptedBinding>, settings: ChatSettings) -> ChatModel {
        ChatModel::new(
            "@cf/meta/llama-3.1-8b-instruct".parse().unwrap(),
            settings,
            PROVIDER_NAME,
            binding,
        )
    }

    fn hi() -> CanonicalRequest {
        CanonicalRequest::new(Mode::Regular, vec![CanonicalMessage::user("hi")])
    }

    #[tokio::test]
    async fn generate_decodes_tool_calls_and_echoes_request() {
        let binding = Arc::new(ScriptedBinding::structured(
            serde_json::from_value(json!({
                "response": "",
                "tool_calls": [{"name": "weather", "arguments": {"location": "London"}}]
            }))
            .unwrap(),
        ));
        let chat = model(binding.clone(), ChatSettings::default());

        let request = hi().with_tools(
            vec![ToolDefinition::new("weather", "Get weather", json!({"type": "object"}))],
            Some(ToolChoice::Auto),
        );
        let result = chat.generate(request).await.unwrap();

        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].name, "weather");
        assert_eq!(result.raw_call.raw_settings["model"], "@cf/meta/llama-3.1-8b-instruct");
        assert_eq!(result.raw_call.raw_settings["tool_choice"], "auto");
        assert_eq!(result.raw_call.raw_prompt, json!([{"role": "user", "content": "hi"}]));

        let calls = binding.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "@cf/meta/llama-3.1-8b-instruct");
        assert!(!calls[0].1.stream);
    }

    #[tokio::test]
    async fn object_grammar_never_reaches_the_binding() {
        let binding = Arc::new(ScriptedBinding::structured(StructuredResponse::default()));
        let chat = model(binding.clone(), ChatSettings::default());

        let request = CanonicalRequest::new(Mode::ObjectGrammar, vec![CanonicalMessage::user("hi")]);
        let err = chat.generate(request.clone()).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFunctionality(_)));

        let err = chat.stream(request).await.err().unwrap();
        assert!(matches!(err, Error::UnsupportedFunctionality(_)));

        assert_eq!(binding.call_count(), 0);
    }

    #[tokio::test]
    async fn stream_yields_deltas_and_single_finish() {
        let binding = Arc::new(ScriptedBinding::streaming(
            "data: {\"response\":\"Rain\"}\n\ndata: {\"response\":\" in Zürich\"}\n\ndata: [DONE]\n\n".as_bytes(),
        ));
        let chat = model(binding.clone(), ChatSettings::default());

        let result = chat.stream(hi()).await.unwrap();
        let events: Vec<StreamEvent> = result.stream.collect().await;

        assert_eq!(
            events,
            vec![
                StreamEvent::text_delta("Rain"),
                StreamEvent::text_delta(" in Zürich"),
                StreamEvent::finish_stop(),
            ]
        );
        assert_eq!(result.raw_call.raw_settings["stream"], true);
        assert!(binding.calls.lock().unwrap()[0].1.stream);
    }

    #[tokio::test]
    async fn structured_output_on_stream_call_is_a_mismatch() {
        let binding = Arc::new(ScriptedBinding::structured(StructuredResponse::default()));
        let chat = model(binding, ChatSettings::default());

        let err = chat.stream(hi()).await.err().unwrap();
        assert!(matches!(
            err,
            Error::ProtocolMismatch {
                expected: "byte stream",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn stream_output_on_generate_call_is_a_mismatch() {
        let binding = Arc::new(ScriptedBinding::streaming(b"data: [DONE]\n\n"));
        let chat = model(binding, ChatSettings::default());

        let err = chat.generate(hi()).await.unwrap_err();
        assert!(matches!(err, Error::ProtocolMismatch { .. }));
    }

    #[tokio::test]
    async fn gateway_settings_are_forwarded_as_run_options() {
        let binding = Arc::new(ScriptedBinding::structured(StructuredResponse {
            response: Some("ok".into()),
            tool_calls: None,
        }));
        let gateway = GatewayOptions {
            id: "my-gateway".into(),
            skip_cache: true,
            cache_ttl: Some(3600),
        };
        let chat = model(
            binding.clone(),
            ChatSettings {
                safe_prompt: None,
                gateway: Some(gateway.clone()),
            },
        );

        chat.generate(hi()).await.unwrap();
        assert_eq!(binding.calls.lock().unwrap()[0].2.gateway, Some(gateway));
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_model() {
        let binding = Arc::new(ScriptedBinding::streaming(
            b"data: {\"response\":\"a\"}\n\ndata: [DONE]\n\n",
        ));
        let chat = model(binding.clone(), ChatSettings::default());

        let (first, second) = tokio::join!(chat.stream(hi()), chat.stream(hi()));
        let first: Vec<StreamEvent> = first.unwrap().stream.collect().await;
        let second: Vec<StreamEvent> = second.unwrap().stream.collect().await;

        assert_eq!(first, second);
        assert_eq!(binding.call_count(), 2);
    }

    #[test]
    fn defaults_to_json_object_generation() {
        let binding = Arc::new(ScriptedBinding::structured(StructuredResponse::default()));
        let chat = model(binding, ChatSettings::default());
        assert_eq!(chat.default_object_generation_mode(), ObjectGenerationMode::Json);
        assert_eq!(chat.provider(), "workersai.chat");
    }
}
