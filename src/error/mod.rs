use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// 后端没有对应能力（例如 object-grammar 模式）
    #[error("Unsupported functionality: {0}")]
    UnsupportedFunctionality(String),

    #[error("Unsupported mode: {0}")]
    UnsupportedMode(String),

    #[error("Unsupported tool choice: {0}")]
    UnsupportedToolChoice(String),

    /// tool_choice 指定的工具不在工具列表中
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    /// 期望结构化响应却收到字节流，或者反过来
    #[error("Protocol mismatch: expected {expected}, got {actual}")]
    ProtocolMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
