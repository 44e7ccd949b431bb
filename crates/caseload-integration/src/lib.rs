//! # 后端集成模块
//!
//! 提供 `CaseloadBackend` 的具体实现：
//! - HTTP/JSON 后端，对接控制台的 REST 接口
//! - 内存后端，用于演示、离线模式和测试

pub mod config;
pub mod http;
pub mod memory;

pub use config::{AuthenticationConfig, BackendConfig, EndpointConfig, VariantRoutes};
pub use http::HttpBackend;
pub use memory::InMemoryBackend;
