//! 后端连接配置

use caseload_core::ReassignmentMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 后端连接配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// 服务根地址，例如 `http://localhost:8080/api`
    pub base_url: String,
    /// 单次请求超时（秒）
    pub request_timeout: u64,
    pub authentication: AuthenticationConfig,
    pub endpoints: EndpointConfig,
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// 拼接完整地址，避免重复或缺失的斜杠
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            request_timeout: 30,
            authentication: AuthenticationConfig::None,
            endpoints: EndpointConfig::default(),
        }
    }
}

/// 认证配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthenticationConfig {
    #[default]
    None,
    BearerToken { token: String },
    ApiKey { key: String, header: Option<String> },
    BasicAuth { username: String, password: String },
}

/// 单一模式下的读取路由
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRoutes {
    /// 病例列表
    pub caseload: String,
    /// 负责人目录
    pub handler_directory: String,
    /// 病例列表中负责人ID的查询参数名
    pub handler_param: String,
}

/// 路由模板，`{id}` 会被替换为病例ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub batch_reassign: String,
    pub case_reassign: String,
    /// 仅负责人模式（管理员）的读取路由
    pub handler_only: VariantRoutes,
    /// 按时间段模式（护理）的读取路由，占用查询也走这里
    pub slot_aware: VariantRoutes,
}

impl EndpointConfig {
    pub fn routes(&self, mode: ReassignmentMode) -> &VariantRoutes {
        match mode {
            ReassignmentMode::HandlerOnly => &self.handler_only,
            ReassignmentMode::SlotAware => &self.slot_aware,
        }
    }

    pub fn case_reassign_path(&self, case_id: i64) -> String {
        self.case_reassign.replace("{id}", &case_id.to_string())
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            batch_reassign: "/enfermeria/reasignar-masivo".to_string(),
            case_reassign: "/bolsas/solicitudes/{id}/asignar".to_string(),
            handler_only: VariantRoutes {
                caseload: "/bolsas/solicitudes".to_string(),
                handler_directory: "/bolsas/solicitudes/gestoras-disponibles".to_string(),
                handler_param: "gestoraId".to_string(),
            },
            slot_aware: VariantRoutes {
                caseload: "/enfermeria/pacientes/por-enfermera".to_string(),
                handler_directory: "/enfermeria/enfermeras".to_string(),
                handler_param: "idPersonal".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_slashes() {
        let config = BackendConfig {
            base_url: "http://console/api/".to_string(),
            ..BackendConfig::default()
        };
        assert_eq!(
            config.url("/enfermeria/enfermeras"),
            "http://console/api/enfermeria/enfermeras"
        );
        assert_eq!(
            config.endpoints.case_reassign_path(42),
            "/bolsas/solicitudes/42/asignar"
        );
    }

    #[test]
    fn test_authentication_from_toml() {
        let config: BackendConfig = toml::from_str(
            r#"
            base_url = "https://console.example"
            [authentication]
            type = "bearer_token"
            token = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.authentication,
            AuthenticationConfig::BearerToken {
                token: "abc".to_string()
            }
        );
        assert_eq!(config.request_timeout, 30);
        assert_eq!(config.endpoints, EndpointConfig::default());
    }

    #[test]
    fn test_routes_follow_mode() {
        let endpoints = EndpointConfig::default();
        let handler_only = endpoints.routes(ReassignmentMode::HandlerOnly);
        assert_eq!(handler_only.caseload, "/bolsas/solicitudes");
        assert_eq!(
            handler_only.handler_directory,
            "/bolsas/solicitudes/gestoras-disponibles"
        );
        assert_eq!(handler_only.handler_param, "gestoraId");

        let slot_aware = endpoints.routes(ReassignmentMode::SlotAware);
        assert_eq!(slot_aware.caseload, "/enfermeria/pacientes/por-enfermera");
        assert_eq!(slot_aware.handler_directory, "/enfermeria/enfermeras");
        assert_eq!(slot_aware.handler_param, "idPersonal");
    }

    #[test]
    fn test_override_one_variant_from_toml() {
        let config: BackendConfig = toml::from_str(
            r#"
            [endpoints.handler_only]
            caseload = "/v2/solicitudes"
            handler_directory = "/v2/gestoras"
            handler_param = "gestora"
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoints.handler_only.caseload, "/v2/solicitudes");
        assert_eq!(
            config.endpoints.slot_aware,
            EndpointConfig::default().slot_aware
        );
    }
}
