//! 重新分配计划校验
//!
//! 校验通过后产出覆盖整批病例的单一计划；任何前置条件不满足时返回
//! `ValidationError`，此时不发出网络请求。

use crate::availability::SlotAvailabilityIndex;
use crate::directory::HandlerDirectory;
use crate::selection::SelectionSet;
use caseload_core::{
    HandlerId, ReassignmentMode, ReassignmentPlan, SlotGrid, SlotLabel, ValidationError,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 对话框中尚未提交的目标选择
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub destination: Option<HandlerId>,
    pub date: Option<NaiveDate>,
    pub slot: Option<SlotLabel>,
}

/// 重新分配计划器
#[derive(Debug, Clone)]
pub struct ReassignmentPlanner {
    mode: ReassignmentMode,
    grid: SlotGrid,
}

impl ReassignmentPlanner {
    pub fn new(mode: ReassignmentMode) -> Self {
        Self {
            mode,
            grid: SlotGrid::standard(),
        }
    }

    pub fn mode(&self) -> ReassignmentMode {
        self.mode
    }

    /// 校验并生成计划
    ///
    /// 目标负责人可以与当前负责人相同（同一负责人内改期是合法的），但必须在目录中。
    /// 按时间段模式下，已知被占用的时间段不会出现在计划中。
    pub fn validate(
        &self,
        selection: &SelectionSet,
        draft: &PlanDraft,
        directory: &HandlerDirectory,
        availability: &SlotAvailabilityIndex,
    ) -> Result<ReassignmentPlan, ValidationError> {
        if selection.is_empty() {
            return Err(ValidationError::EmptySelection);
        }

        let destination_id = draft.destination.ok_or(ValidationError::MissingDestination)?;
        let destination = directory
            .find(destination_id)
            .cloned()
            .ok_or(ValidationError::UnknownHandler(destination_id))?;

        let (destination_date, destination_slot) = match self.mode {
            ReassignmentMode::HandlerOnly => (None, None),
            ReassignmentMode::SlotAware => {
                let date = draft.date.ok_or(ValidationError::MissingDate)?;
                let slot = draft.slot.ok_or(ValidationError::MissingSlot)?;
                self.check_slot(availability, destination_id, date, slot)?;
                (Some(date), Some(slot))
            }
        };

        let plan = ReassignmentPlan {
            mode: self.mode,
            case_ids: selection.ids(),
            destination,
            destination_date,
            destination_slot,
        };

        tracing::info!(
            "Validated {:?} plan: {} cases to handler {}",
            plan.mode,
            plan.len(),
            plan.destination.id
        );
        Ok(plan)
    }

    fn check_slot(
        &self,
        availability: &SlotAvailabilityIndex,
        handler_id: HandlerId,
        date: NaiveDate,
        slot: SlotLabel,
    ) -> Result<(), ValidationError> {
        if !self.grid.contains(&slot) {
            return Err(ValidationError::SlotOffGrid(slot));
        }

        if availability.is_loading() {
            return Err(ValidationError::SlotAvailabilityPending);
        }

        let occupied = availability
            .occupied_slots(handler_id, date)
            .ok_or(ValidationError::SlotAvailabilityPending)?;

        if occupied.contains(&slot) {
            return Err(ValidationError::SlotOccupied {
                handler_id,
                date,
                slot,
            });
        }
        Ok(())
    }
}
