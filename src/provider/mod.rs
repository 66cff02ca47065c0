use crate::catalog::ModelCatalog;
use crate::config::{AdapterConfig, ChatSettings};
use crate::error::Result;
use crate::protocol::adapter::{ChatModel, PROVIDER_NAME};
use crate::protocol::Binding;
use crate::proxy::RestBinding;
use std::sync::Arc;
use tracing::info;

/// Workers AI provider，负责创建对话模型
#[derive(Clone)]
pub struct WorkersAi {
    binding: Arc<dyn Binding>,
    catalog: ModelCatalog,
}

impl WorkersAi {
    pub fn new(binding: Arc<dyn Binding>) -> Self {
        Self {
            binding,
            catalog: ModelCatalog::default(),
        }
    }

    /// 按配置创建 REST binding 和模型目录
    pub fn from_config(config: &AdapterConfig) -> Result<Self> {
        let binding = RestBinding::new(&config.binding)?;
        let catalog = ModelCatalog::with_extra_models(config.models.extra_models.clone());
        info!(
            "provider: initialized (account={}, models={}, extra_models={})",
            config.binding.account_id,
            catalog.models().count(),
            config.models.extra_models.len()
        );

        Ok(Self {
            binding: Arc::new(binding),
            catalog,
        })
    }

    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// 创建对话模型，模型 ID 必须在目录中
    pub fn chat(&self, model_id: &str, settings: ChatSettings) -> Result<ChatModel> {
        let model_id = self.catalog.resolve(model_id)?;
        Ok(ChatModel::new(
            model_id,
            settings,
            PROVIDER_NAME,
            self.binding.clone(),
        ))
    }
}
