pub mod adapter;
pub mod mapper;
pub mod messages;
pub mod response;
pub mod stream;
pub mod tool_choice;
pub mod workers_ai;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use workers_ai::{BackendRequest, RunOptions, StructuredResponse};

/// 后端原始字节流
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// 后端返回：stream=false 时为结构化响应，stream=true 时为 SSE 字节流
pub enum BackendOutput {
    Structured(StructuredResponse),
    Stream(ByteStream),
}

impl BackendOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured response",
            Self::Stream(_) => "byte stream",
        }
    }
}

impl std::fmt::Debug for BackendOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structured(response) => f.debug_tuple("Structured").field(response).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// 后端调用契约
///
/// 超时、重试等由实现自行处理，适配器核心不关心
#[async_trait]
pub trait Binding: Send + Sync {
    async fn run(
        &self,
        model: &str,
        request: &BackendRequest,
        options: &RunOptions,
    ) -> Result<BackendOutput>;
}
