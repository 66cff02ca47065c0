pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod protocol;
pub mod provider;
pub mod proxy;
pub mod telemetry;

pub use catalog::{ModelCatalog, ModelId};
pub use config::{AdapterConfig, ChatSettings};
pub use error::{Error, Result};
pub use models::{
    CanonicalMessage, CanonicalRequest, CanonicalResult, Mode, StreamEvent, ToolChoice,
    ToolDefinition,
};
pub use protocol::adapter::{ChatModel, StreamResult};
pub use protocol::{BackendOutput, Binding};
pub use provider::WorkersAi;
pub use proxy::RestBinding;
