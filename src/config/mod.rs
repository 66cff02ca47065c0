use crate::error::{Error, Result};
use crate::protocol::workers_ai::GatewayOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 适配器的主配置结构
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdapterConfig {
    /// 后端调用配置
    pub binding: BindingConfig,
    /// 对话模型设置
    #[serde(default)]
    pub chat: ChatSettings,
    /// 模型目录扩展
    #[serde(default)]
    pub models: ModelsConfig,
}

/// Workers AI REST 接口配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BindingConfig {
    /// Cloudflare 账号 ID
    pub account_id: String,
    /// API Token，以 Bearer 方式发送
    pub api_token: String,
    /// REST API 基础地址
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// AI Gateway 基础地址，配置了 chat.gateway 时使用
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,
    /// 非流式请求超时时间，使用humantime格式（如 "30s"）
    /// 流式请求不设全局超时
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_base_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_gateway_base_url() -> String {
    "https://gateway.ai.cloudflare.com/v1".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

/// 模型级设置，每个 ChatModel 持有一份
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatSettings {
    /// 是否在提示词前注入安全提示
    #[serde(default)]
    pub safe_prompt: Option<bool>,
    /// 通过 AI Gateway 转发
    #[serde(default)]
    pub gateway: Option<GatewayOptions>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelsConfig {
    /// 内置目录之外允许使用的模型
    #[serde(default)]
    pub extra_models: Vec<String>,
}

impl AdapterConfig {
    /// 从配置文件加载配置
    ///
    /// 先读文件，再用环境变量覆盖（前缀 WORKERS_AI，分隔符 __），
    /// 例如 WORKERS_AI__BINDING__API_TOKEN=xxx 会覆盖 binding.api_token
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("WORKERS_AI").separator("__"))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.binding.account_id.trim().is_empty() {
            return Err(Error::Config("binding.account_id must not be empty".into()));
        }
        if let Some(gateway) = &self.chat.gateway {
            if gateway.id.trim().is_empty() {
                return Err(Error::Config("chat.gateway.id must not be empty".into()));
            }
        }
        Ok(())
    }
}

impl Default for AdapterConfig {
    /// 默认值：官方 REST 地址，超时 60 秒，不走 Gateway
    fn default() -> Self {
        Self {
            binding: BindingConfig {
                account_id: String::new(),
                api_token: String::new(),
                base_url: default_base_url(),
                gateway_base_url: default_gateway_base_url(),
                timeout: default_timeout(),
            },
            chat: ChatSettings::default(),
            models: ModelsConfig::default(),
        }
    }
}
