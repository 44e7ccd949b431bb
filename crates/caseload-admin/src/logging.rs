//! 日志初始化
//!
//! 根据 `LoggingConfig` 安装 `tracing-subscriber`，`RUST_LOG` 存在时优先使用。

use crate::config::LoggingConfig;
use caseload_core::{CaseloadError, Result};
use tracing_subscriber::EnvFilter;

/// 构造事件过滤器
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| CaseloadError::Config(format!("日志级别 {} 无效: {}", config.level, e))),
    }
}

/// 安装全局日志订阅者，只能调用一次
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| CaseloadError::Config(format!("日志初始化失败: {}", e)))?;

    tracing::debug!(
        "Logging initialised at {} (json: {})",
        config.level,
        config.json
    );
    Ok(())
}
