//! 错误定义模块
//!
//! 三类错误对应重新分配会话中的三个阶段：读取（`LoadError`）、
//! 校验（`ValidationError`）、提交（`CommitError`）。所有错误都限定在
//! 单个会话内，可以重试或关闭对话框恢复。

use crate::backend::BackendError;
use crate::models::{CaseId, HandlerId, Shift};
use crate::slots::SlotLabel;
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// 读取操作的目标，用于定位失败的具体请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadTarget {
    Caseload {
        handler_id: HandlerId,
        date: Option<NaiveDate>,
        shift: Option<Shift>,
    },
    HandlerDirectory,
    Occupancy {
        handler_id: HandlerId,
        date: NaiveDate,
    },
}

impl fmt::Display for LoadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadTarget::Caseload {
                handler_id,
                date,
                shift,
            } => {
                write!(f, "负责人 {} 的病例列表", handler_id)?;
                if let Some(date) = date {
                    write!(f, " 日期 {}", date)?;
                }
                if let Some(shift) = shift {
                    write!(f, " 班次 {}", shift.as_param())?;
                }
                Ok(())
            }
            LoadTarget::HandlerDirectory => write!(f, "负责人目录"),
            LoadTarget::Occupancy { handler_id, date } => {
                write!(f, "负责人 {} 在 {} 的已占用时间段", handler_id, date)
            }
        }
    }
}

/// 读取失败，可恢复，调用方保留上一份数据
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("读取{target}失败: {reason}")]
pub struct LoadError {
    pub target: LoadTarget,
    pub reason: String,
}

impl LoadError {
    pub fn new(target: LoadTarget, source: BackendError) -> Self {
        Self {
            target,
            reason: source.to_string(),
        }
    }
}

/// 计划校验失败，不会发出任何网络请求
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("未选择任何病例")]
    EmptySelection,

    #[error("未选择目标负责人")]
    MissingDestination,

    #[error("未知的负责人: {0}")]
    UnknownHandler(HandlerId),

    #[error("未选择目标日期")]
    MissingDate,

    #[error("未选择目标时间段")]
    MissingSlot,

    #[error("时间段 {0} 不在预约网格上")]
    SlotOffGrid(SlotLabel),

    #[error("负责人 {handler_id} 在 {date} 的时间段 {slot} 已被占用")]
    SlotOccupied {
        handler_id: HandlerId,
        date: NaiveDate,
        slot: SlotLabel,
    },

    #[error("时间段占用情况尚未加载完成")]
    SlotAvailabilityPending,
}

/// 提交范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitScope {
    /// 批量提交（整批同一结果）
    Batch(Vec<CaseId>),
    /// 单个病例提交
    Case(CaseId),
}

impl fmt::Display for CommitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitScope::Batch(ids) => write!(f, "批量 {} 个病例", ids.len()),
            CommitScope::Case(id) => write!(f, "病例 {}", id),
        }
    }
}

/// 提交失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("提交{scope}失败: {reason}")]
pub struct CommitError {
    pub scope: CommitScope,
    pub reason: String,
}

impl CommitError {
    pub fn new(scope: CommitScope, source: BackendError) -> Self {
        Self {
            scope,
            reason: source.to_string(),
        }
    }
}

/// 系统统一错误类型
#[derive(Error, Debug)]
pub enum CaseloadError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("会话已关闭")]
    SessionClosed,
}

/// 系统统一结果类型
pub type Result<T> = std::result::Result<T, CaseloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_names_its_target() {
        let err = LoadError::new(
            LoadTarget::Occupancy {
                handler_id: 7,
                date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            },
            BackendError::Status {
                status: 503,
                body: "unavailable".to_string(),
            },
        );
        let message = err.to_string();
        assert!(message.contains("7"));
        assert!(message.contains("2025-03-10"));
        assert!(message.contains("503"));
    }

    #[test]
    fn test_commit_error_names_the_case() {
        let err = CommitError::new(CommitScope::Case(42), BackendError::Transport("reset".into()));
        assert!(err.to_string().contains("42"));
    }
}
