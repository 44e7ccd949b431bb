//! 外部协作者接口
//!
//! 引擎只依赖以下四类远端操作，具体传输格式由实现方决定。

use crate::models::{
    CaseId, CaseloadFilter, HandlerId, HandlerSummary, OccupiedAppointment, PatientCaseRecord,
    ReassignmentPlan,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

/// 后端调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("传输错误: {0}")]
    Transport(String),

    #[error("HTTP状态 {status}: {body}")]
    Status { status: u16, body: String },

    #[error("响应解析错误: {0}")]
    Decode(String),

    #[error("请求被拒绝: {0}")]
    Rejected(String),
}

/// 病例负荷后端
#[async_trait]
pub trait CaseloadBackend: Send + Sync {
    /// 获取负责人在指定日期/班次下的全部病例
    async fn fetch_caseload(
        &self,
        filter: &CaseloadFilter,
    ) -> Result<Vec<PatientCaseRecord>, BackendError>;

    /// 获取可作为目标的负责人目录
    async fn fetch_handler_directory(
        &self,
        exclude: Option<HandlerId>,
    ) -> Result<Vec<HandlerSummary>, BackendError>;

    /// 获取负责人某日已有的预约
    async fn fetch_occupied_appointments(
        &self,
        handler_id: HandlerId,
        date: NaiveDate,
    ) -> Result<Vec<OccupiedAppointment>, BackendError>;

    /// 批量提交：整批病例移到同一负责人/日期/时间段，后端保证原子性
    async fn commit_reassignment(&self, plan: &ReassignmentPlan) -> Result<(), BackendError>;

    /// 单个病例提交：只更换负责人
    async fn commit_reassignment_one(
        &self,
        case_id: CaseId,
        destination: &HandlerSummary,
    ) -> Result<(), BackendError>;
}
