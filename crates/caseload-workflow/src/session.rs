//! 重新分配会话
//!
//! 一个会话对应一个负责人的病例面板及其重新分配对话框，独占持有病例索引、
//! 选择集、时间段索引和执行器。同一时间只有一个写入方。

use crate::availability::{SlotAvailabilityIndex, SlotGridView};
use crate::caseload::{CaseloadIndex, LoadStatus, RosterView, StatusFilter};
use crate::classifier::{CategoryClassifier, CategoryCounts};
use crate::directory::HandlerDirectory;
use crate::executor::{BatchExecutor, BatchOutcome};
use crate::planner::{PlanDraft, ReassignmentPlanner};
use crate::selection::SelectionSet;
use crate::state_machine::BatchState;
use caseload_core::{
    BatchProgress, CaseId, CaseloadBackend, CaseloadError, CaseloadFilter, Category, HandlerId,
    HandlerSummary, LoadError, PatientCaseRecord, ReassignmentMode, Result, SlotLabel,
    ValidationError,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// 会话配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub mode: ReassignmentMode,
    /// 全部成功后保留成功提示的时间，之后自动关闭并刷新
    pub success_display_delay: Duration,
    /// 目录中是否排除当前负责人（仅负责人模式生效）
    pub exclude_current_handler: bool,
}

impl SessionConfig {
    pub fn new(mode: ReassignmentMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: ReassignmentMode::HandlerOnly,
            success_display_delay: Duration::from_millis(2200),
            exclude_current_handler: true,
        }
    }
}

/// 重新分配会话
pub struct ReassignmentSession {
    id: Uuid,
    backend: Arc<dyn CaseloadBackend>,
    config: SessionConfig,
    filter: CaseloadFilter,
    view: RosterView,
    classifier: CategoryClassifier,
    caseload: CaseloadIndex,
    selection: SelectionSet,
    directory: HandlerDirectory,
    availability: SlotAvailabilityIndex,
    planner: ReassignmentPlanner,
    executor: BatchExecutor,
    draft: PlanDraft,
    dialog_open: bool,
    last_outcome: Option<BatchOutcome>,
}

impl ReassignmentSession {
    /// 创建会话，尚未读取任何数据
    pub fn new(backend: Arc<dyn CaseloadBackend>, config: SessionConfig, filter: CaseloadFilter) -> Self {
        let id = Uuid::new_v4();
        tracing::info!(
            "Opening {:?} reassignment session {} for handler {}",
            config.mode,
            id,
            filter.handler_id
        );
        Self {
            id,
            executor: BatchExecutor::new(Arc::clone(&backend)),
            planner: ReassignmentPlanner::new(config.mode),
            backend,
            config,
            filter,
            view: RosterView::default(),
            classifier: CategoryClassifier::new(),
            caseload: CaseloadIndex::new(),
            selection: SelectionSet::new(),
            directory: HandlerDirectory::new(),
            availability: SlotAvailabilityIndex::default(),
            draft: PlanDraft::default(),
            dialog_open: false,
            last_outcome: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> ReassignmentMode {
        self.config.mode
    }

    pub fn filter(&self) -> &CaseloadFilter {
        &self.filter
    }

    // ---- 病例列表 ----

    /// 重新读取病例列表；成功后选择集与新快照取交集
    pub async fn refresh(&mut self) -> std::result::Result<(), LoadError> {
        self.caseload.load(self.backend.as_ref(), &self.filter).await?;
        let known = self.caseload.case_ids();
        self.selection.retain_known(&known);
        Ok(())
    }

    /// 更换日期/班次等筛选条件并重新读取
    pub async fn apply_filter(
        &mut self,
        date: Option<NaiveDate>,
        shift: Option<caseload_core::Shift>,
    ) -> std::result::Result<(), LoadError> {
        self.filter.date = date;
        self.filter.shift = shift;
        self.refresh().await
    }

    pub fn load_status(&self) -> &LoadStatus {
        self.caseload.status()
    }

    pub fn records(&self) -> &[PatientCaseRecord] {
        self.caseload.records()
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.view.search = search.into();
    }

    pub fn set_status_filter(&mut self, status: StatusFilter) {
        self.view.status = status;
    }

    /// 当前可见的记录
    pub fn visible_records(&self) -> Vec<&PatientCaseRecord> {
        self.view.apply(self.caseload.records(), &self.classifier)
    }

    pub fn visible_ids(&self) -> Vec<CaseId> {
        self.visible_records()
            .into_iter()
            .map(|record| record.case_id)
            .collect()
    }

    pub fn category_of(&self, record: &PatientCaseRecord) -> Category {
        self.classifier.classify(record)
    }

    /// 整个快照的类别计数
    pub fn category_counts(&self) -> CategoryCounts {
        self.classifier.count_by_category(self.caseload.records())
    }

    // ---- 选择 ----

    pub fn toggle(&mut self, case_id: CaseId) -> bool {
        let visible = self.visible_ids();
        self.selection.toggle(case_id, &visible)
    }

    pub fn toggle_all_visible(&mut self) {
        let visible = self.visible_ids();
        self.selection.select_all(&visible);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    // ---- 对话框 ----

    /// 打开重新分配对话框并读取目标负责人目录
    pub async fn open_dialog(&mut self) -> std::result::Result<&[HandlerSummary], LoadError> {
        self.dialog_open = true;
        self.draft = PlanDraft::default();
        self.availability.reset();
        self.last_outcome = None;

        let exclude = (self.config.exclude_current_handler
            && self.config.mode == ReassignmentMode::HandlerOnly)
            .then_some(self.filter.handler_id);
        self.directory.load(self.backend.as_ref(), exclude).await
    }

    pub fn is_dialog_open(&self) -> bool {
        self.dialog_open
    }

    pub fn directory(&self) -> &[HandlerSummary] {
        self.directory.handlers()
    }

    pub fn draft(&self) -> &PlanDraft {
        &self.draft
    }

    /// 选择目标负责人；按时间段模式下触发占用刷新
    pub async fn choose_destination(
        &mut self,
        handler_id: Option<HandlerId>,
    ) -> std::result::Result<(), LoadError> {
        self.draft.destination = handler_id;
        self.refresh_availability().await
    }

    /// 选择目标日期；按时间段模式下触发占用刷新
    pub async fn choose_date(&mut self, date: Option<NaiveDate>) -> std::result::Result<(), LoadError> {
        self.draft.date = date;
        self.refresh_availability().await
    }

    /// 选择时间段；已占用或不在网格上的时间段被拒绝
    pub fn choose_slot(&mut self, slot: Option<SlotLabel>) -> std::result::Result<(), ValidationError> {
        let Some(slot) = slot else {
            self.draft.slot = None;
            return Ok(());
        };

        if !self.availability.grid().contains(&slot) {
            return Err(ValidationError::SlotOffGrid(slot));
        }
        let (Some(handler_id), Some(date)) = (self.draft.destination, self.draft.date) else {
            return Err(ValidationError::SlotAvailabilityPending);
        };
        let occupied = self
            .availability
            .occupied_slots(handler_id, date)
            .ok_or(ValidationError::SlotAvailabilityPending)?;
        if occupied.contains(&slot) {
            return Err(ValidationError::SlotOccupied {
                handler_id,
                date,
                slot,
            });
        }

        self.draft.slot = Some(slot);
        Ok(())
    }

    async fn refresh_availability(&mut self) -> std::result::Result<(), LoadError> {
        self.draft.slot = None;
        if !self.config.mode.requires_slot() {
            return Ok(());
        }

        match (self.draft.destination, self.draft.date) {
            (Some(handler_id), Some(date)) => self
                .availability
                .refresh(self.backend.as_ref(), handler_id, date)
                .await
                .map(|_| ()),
            _ => {
                self.availability.reset();
                Ok(())
            }
        }
    }

    pub fn slot_grid(&self) -> SlotGridView {
        self.availability.view()
    }

    pub fn availability(&self) -> &SlotAvailabilityIndex {
        &self.availability
    }

    // ---- 提交 ----

    pub fn subscribe_progress(&self) -> watch::Receiver<BatchProgress> {
        self.executor.subscribe()
    }

    pub fn batch_state(&self) -> BatchState {
        self.executor.state()
    }

    pub fn last_outcome(&self) -> Option<&BatchOutcome> {
        self.last_outcome.as_ref()
    }

    /// 校验并执行重新分配
    ///
    /// 全部成功时，等待成功提示时间后关闭对话框、清空选择并刷新病例列表；
    /// 存在失败时对话框保持打开，显示部分结果，不自动重试。
    pub async fn commit(&mut self) -> Result<BatchOutcome> {
        if !self.dialog_open {
            return Err(CaseloadError::SessionClosed);
        }

        self.executor.submit()?;
        let plan = match self.planner.validate(
            &self.selection,
            &self.draft,
            &self.directory,
            &self.availability,
        ) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!("Session {}: plan rejected: {}", self.id, e);
                self.executor.reject()?;
                return Err(e.into());
            }
        };

        let outcome = self.executor.execute(plan).await?;
        self.last_outcome = Some(outcome.clone());

        if outcome.is_success() {
            if !self.config.success_display_delay.is_zero() {
                tokio::time::sleep(self.config.success_display_delay).await;
            }
            self.close();
            if let Err(e) = self.refresh().await {
                tracing::warn!("Session {}: refresh after commit failed: {}", self.id, e);
            }
        } else {
            tracing::warn!(
                "Session {}: {} of {} reassignments failed, dialog stays open",
                self.id,
                outcome.progress.failed,
                outcome.progress.total
            );
        }

        Ok(outcome)
    }

    /// 关闭对话框，释放本次对话框的全部状态
    pub fn close(&mut self) {
        self.dialog_open = false;
        self.selection.clear();
        self.draft = PlanDraft::default();
        self.availability.reset();
        if self.executor.state().is_terminal() {
            if let Err(e) = self.executor.reset() {
                tracing::error!("Session {}: {}", self.id, e);
            }
        }
        tracing::debug!("Session {}: dialog closed", self.id);
    }
}

impl Drop for ReassignmentSession {
    fn drop(&mut self) {
        tracing::debug!("Reassignment session {} released", self.id);
    }
}
