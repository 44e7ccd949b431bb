//! # Caseload
//!
//! 患者负荷批量重新分配系统的统一入口，重新导出各子模块。

pub use caseload_core as core;
pub use caseload_integration as integration;
pub use caseload_workflow as workflow;
