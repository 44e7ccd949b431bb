//! # Caseload Core
//!
//! 患者负荷重新分配系统的核心模块，提供基础数据结构、时间段网格、错误定义、
//! 外部协作者接口和通用工具。

pub mod backend;
pub mod error;
pub mod models;
pub mod slots;
pub mod utils;

pub use backend::{BackendError, CaseloadBackend};
pub use error::{
    CaseloadError, CommitError, CommitScope, LoadError, LoadTarget, Result, ValidationError,
};
pub use models::*;
pub use slots::{SlotGrid, SlotLabel};
