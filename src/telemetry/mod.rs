use crate::error::{Error, Result};
use tracing_subscriber::EnvFilter;

/// 初始化日志，支持通过 RUST_LOG 配置，未配置时使用 default_level
///
/// 已经初始化过时返回 Error::Config，调用方可以忽略
pub fn init_tracing(default_level: &str, json: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| Error::Config(format!("failed to initialize tracing: {}", e)))
}
