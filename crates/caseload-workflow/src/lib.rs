//! # 重新分配工作流模块
//!
//! 提供患者负荷批量重新分配的完整流程，包括：
//! - 病例索引与列表视图：按负责人/日期/班次读取病例并筛选
//! - 选择集与类别分类：多选病例并计算类别汇总
//! - 时间段占用索引：按目标负责人和日期计算可用时间段
//! - 计划校验与批处理执行：校验前置条件，执行批量或逐个提交
//! - 重新分配会话：持有一次对话框生命周期内的全部状态

pub mod availability;
pub mod caseload;
pub mod classifier;
pub mod directory;
pub mod executor;
pub mod planner;
pub mod selection;
pub mod session;
pub mod state_machine;

#[cfg(test)]
mod testing;

// 重新导出主要类型
pub use availability::{
    fetch_occupancy, AvailabilityKey, SlotAvailabilityIndex, SlotCell, SlotGridView, SlotRequest,
    SlotResponse,
};
pub use caseload::{CaseloadIndex, CaseloadSnapshot, LoadStatus, RosterView, StatusFilter};
pub use classifier::{CategoryClassifier, CategoryCounts};
pub use directory::HandlerDirectory;
pub use executor::{BatchExecutor, BatchOutcome};
pub use planner::{PlanDraft, ReassignmentPlanner};
pub use selection::SelectionSet;
pub use session::{ReassignmentSession, SessionConfig};
pub use state_machine::{BatchEvent, BatchState, BatchStateMachine};
