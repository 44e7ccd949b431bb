//! 配置管理
//!
//! 从配置文件和环境变量加载控制台配置，支持校验和保存。
//! 环境变量前缀为 `CASELOAD`，层级分隔符为 `__`，例如
//! `CASELOAD__BACKEND__BASE_URL`。

use caseload_core::{CaseloadError, ReassignmentMode, Result};
use caseload_integration::BackendConfig;
use caseload_workflow::SessionConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

/// 控制台完整配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// 后端连接配置
    pub backend: BackendConfig,
    /// 重新分配配置
    pub reassignment: ReassignmentConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 重新分配配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassignmentConfig {
    /// 提交方式
    pub mode: ReassignmentMode,
    /// 全部成功后保留成功提示的毫秒数
    pub success_display_delay_ms: u64,
    /// 仅负责人模式下，目录中是否排除当前负责人
    pub exclude_current_handler: bool,
}

impl ReassignmentConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            mode: self.mode,
            success_display_delay: Duration::from_millis(self.success_display_delay_ms),
            exclude_current_handler: self.exclude_current_handler,
        }
    }
}

impl Default for ReassignmentConfig {
    fn default() -> Self {
        Self {
            mode: ReassignmentMode::HandlerOnly,
            success_display_delay_ms: 2200,
            exclude_current_handler: true,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别，`RUST_LOG` 优先
    pub level: String,
    /// 输出JSON格式
    pub json: bool,
    /// 显示事件目标
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<ConsoleConfig>>,
    /// 配置文件路径
    config_path: String,
    /// 配置验证器
    validator: ConfigValidator,
}

impl ConfigManager {
    /// 创建新的配置管理器；文件不存在时使用默认值加环境变量
    pub fn new(config_path: &str) -> Result<Self> {
        let validator = ConfigValidator::new();
        let config = Self::load_config(config_path)?;
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: config_path.to_string(),
            validator,
        })
    }

    /// 从文件和环境变量加载配置
    fn load_config(config_path: &str) -> Result<ConsoleConfig> {
        let settings = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                Environment::with_prefix("CASELOAD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CaseloadError::Config(format!("加载 {} 失败: {}", config_path, e)))?;

        let config: ConsoleConfig = settings
            .try_deserialize()
            .map_err(|e| CaseloadError::Config(format!("配置格式错误: {}", e)))?;

        info!("Configuration loaded from: {}", config_path);
        Ok(config)
    }

    /// 获取配置
    pub async fn get_config(&self) -> ConsoleConfig {
        self.config.read().await.clone()
    }

    /// 更新配置，校验通过后写回文件
    pub async fn update_config(&self, new_config: ConsoleConfig) -> Result<()> {
        self.validator.validate(&new_config)?;
        {
            let mut config = self.config.write().await;
            *config = new_config;
        }
        self.save().await?;

        info!("Configuration updated");
        Ok(())
    }

    /// 保存配置到文件（TOML）
    pub async fn save(&self) -> Result<()> {
        let config = self.config.read().await;
        let config_str = toml::to_string_pretty(&*config)
            .map_err(|e| CaseloadError::Config(format!("配置序列化失败: {}", e)))?;

        tokio::fs::write(&self.config_path, config_str)
            .await
            .map_err(|e| CaseloadError::Config(format!("写入 {} 失败: {}", self.config_path, e)))?;

        info!("Configuration saved to: {}", self.config_path);
        Ok(())
    }

    /// 重新加载配置
    pub async fn reload(&self) -> Result<()> {
        let new_config = Self::load_config(&self.config_path)?;
        self.validator.validate(&new_config)?;
        *self.config.write().await = new_config;
        info!("Configuration reloaded");
        Ok(())
    }

    pub fn config_path(&self) -> &str {
        &self.config_path
    }
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&ConsoleConfig) -> std::result::Result<(), String>,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

impl ConfigValidator {
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "backend.base_url",
                validator: |config| {
                    let url = config.backend.base_url.trim();
                    if url.is_empty() {
                        Err("地址不能为空".to_string())
                    } else if !(url.starts_with("http://") || url.starts_with("https://")) {
                        Err(format!("不支持的地址: {}", url))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "backend.request_timeout",
                validator: |config| {
                    if config.backend.request_timeout == 0 {
                        Err("超时时间不能为0".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "logging.level",
                validator: |config| {
                    let level = config.logging.level.to_lowercase();
                    if LOG_LEVELS.contains(&level.as_str()) {
                        Ok(())
                    } else {
                        Err(format!("未知的日志级别: {}", config.logging.level))
                    }
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &ConsoleConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(message) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, message);
                return Err(CaseloadError::Config(format!("{}: {}", rule.field_path, message)));
            }
        }
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseload_integration::AuthenticationConfig;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("caseload-{}-{}.toml", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ConsoleConfig::default();
        assert!(ConfigValidator::new().validate(&config).is_ok());
        assert_eq!(config.reassignment.success_display_delay_ms, 2200);
        assert_eq!(
            config.reassignment.session_config().success_display_delay,
            Duration::from_millis(2200)
        );
    }

    #[test]
    fn test_validator_rejects_bad_values() {
        let validator = ConfigValidator::new();

        let mut config = ConsoleConfig::default();
        config.backend.base_url = "  ".to_string();
        assert!(matches!(validator.validate(&config), Err(CaseloadError::Config(_))));

        let mut config = ConsoleConfig::default();
        config.backend.request_timeout = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = ConsoleConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(validator.validate(&config).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let path = temp_path("load");
        std::fs::write(
            &path,
            r#"
            [backend]
            base_url = "https://console.example/api"
            request_timeout = 10

            [backend.authentication]
            type = "api_key"
            key = "secret"

            [reassignment]
            mode = "slot-aware"
            success_display_delay_ms = 0
            "#,
        )
        .unwrap();

        let manager = ConfigManager::new(path.to_str().unwrap()).unwrap();
        let config = manager.get_config().await;
        assert_eq!(config.backend.base_url, "https://console.example/api");
        assert_eq!(config.backend.request_timeout, 10);
        assert_eq!(
            config.backend.authentication,
            AuthenticationConfig::ApiKey {
                key: "secret".to_string(),
                header: None
            }
        );
        assert_eq!(config.reassignment.mode, ReassignmentMode::SlotAware);
        assert!(config.reassignment.exclude_current_handler);
        assert_eq!(config.logging, LoggingConfig::default());

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_save_and_reload_round_trip() {
        let path = temp_path("save");
        let manager = ConfigManager::new(path.to_str().unwrap()).unwrap();
        assert_eq!(manager.get_config().await, ConsoleConfig::default());

        let mut updated = manager.get_config().await;
        updated.reassignment.mode = ReassignmentMode::SlotAware;
        updated.logging.json = true;
        manager.update_config(updated.clone()).await.unwrap();

        let reopened = ConfigManager::new(path.to_str().unwrap()).unwrap();
        assert_eq!(reopened.get_config().await, updated);

        let mut invalid = updated;
        invalid.backend.request_timeout = 0;
        assert!(manager.update_config(invalid).await.is_err());

        std::fs::remove_file(&path).unwrap();
    }
}
