use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 已知的文本生成模型
/// 新模型上线后可以通过配置 `models.extra_models` 追加，无需改代码
pub const TEXT_GENERATION_MODELS: &[&str] = &[
    "@cf/meta/llama-2-7b-chat-fp16",
    "@cf/meta/llama-2-7b-chat-int8",
    "@cf/meta/llama-3-8b-instruct",
    "@cf/meta/llama-3-8b-instruct-awq",
    "@cf/meta/llama-3.1-8b-instruct",
    "@cf/meta/llama-3.1-8b-instruct-fp8",
    "@cf/meta/llama-3.1-70b-instruct",
    "@cf/meta/llama-3.2-1b-instruct",
    "@cf/meta/llama-3.2-3b-instruct",
    "@cf/meta/llama-3.3-70b-instruct-fp8-fast",
    "@cf/mistral/mistral-7b-instruct-v0.1",
    "@hf/mistral/mistral-7b-instruct-v0.2",
    "@hf/nousresearch/hermes-2-pro-mistral-7b",
    "@hf/google/gemma-7b-it",
    "@cf/google/gemma-2b-it-lora",
    "@cf/google/gemma-7b-it-lora",
    "@cf/qwen/qwen1.5-0.5b-chat",
    "@cf/qwen/qwen1.5-1.8b-chat",
    "@cf/qwen/qwen1.5-7b-chat-awq",
    "@cf/qwen/qwen1.5-14b-chat-awq",
    "@cf/microsoft/phi-2",
    "@cf/tinyllama/tinyllama-1.1b-chat-v1.0",
    "@cf/openchat/openchat-3.5-0106",
    "@cf/deepseek-ai/deepseek-math-7b-instruct",
    "@hf/thebloke/deepseek-coder-6.7b-instruct-awq",
    "@cf/thebloke/discolm-german-7b-v1-awq",
    "@cf/fblgit/una-cybertron-7b-v2-bf16",
];

/// 经过校验的模型 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ModelId {
    type Err = Error;

    /// 只校验内置列表
    fn from_str(s: &str) -> Result<Self> {
        ModelCatalog::default().resolve(s)
    }
}

/// 模型目录：内置列表 + 配置追加的模型
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    extra: Vec<String>,
}

impl ModelCatalog {
    pub fn with_extra_models(extra: Vec<String>) -> Self {
        Self { extra }
    }

    pub fn contains(&self, model: &str) -> bool {
        TEXT_GENERATION_MODELS.contains(&model) || self.extra.iter().any(|m| m == model)
    }

    pub fn resolve(&self, model: &str) -> Result<ModelId> {
        if self.contains(model) {
            Ok(ModelId(model.to_string()))
        } else {
            Err(Error::UnknownModel(model.to_string()))
        }
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        TEXT_GENERATION_MODELS
            .iter()
            .copied()
            .chain(self.extra.iter().map(String::as_str))
    }
}
