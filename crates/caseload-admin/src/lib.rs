//! # 管理模块
//!
//! 提供控制台的配置管理和日志初始化

pub mod config;
pub mod logging;

pub use config::{ConfigManager, ConfigValidator, ConsoleConfig, LoggingConfig, ReassignmentConfig};
pub use logging::init_logging;
