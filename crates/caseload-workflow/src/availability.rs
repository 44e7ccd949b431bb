//! 时间段占用索引
//!
//! 针对 (目标负责人, 目标日期) 计算已占用的时间段。每次请求携带单调递增的
//! 令牌，只有与最新令牌匹配的响应才会被应用，迟到的旧响应直接丢弃。

use caseload_core::{
    BackendError, CaseloadBackend, HandlerId, LoadError, LoadTarget, OccupiedAppointment,
    SlotGrid, SlotLabel,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 占用查询的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AvailabilityKey {
    pub handler_id: HandlerId,
    pub date: NaiveDate,
}

/// 一次占用查询
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRequest {
    pub token: u64,
    pub key: AvailabilityKey,
}

/// 占用查询的响应
#[derive(Debug)]
pub struct SlotResponse {
    pub request: SlotRequest,
    pub result: Result<Vec<OccupiedAppointment>, BackendError>,
}

/// 发出占用查询，不修改索引，可与其他查询并发
pub async fn fetch_occupancy(backend: &dyn CaseloadBackend, request: SlotRequest) -> SlotResponse {
    let result = backend
        .fetch_occupied_appointments(request.key.handler_id, request.key.date)
        .await;
    SlotResponse { request, result }
}

/// 网格中的单个时间段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCell {
    pub label: SlotLabel,
    pub occupied: bool,
}

/// 提供给界面的网格视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotGridView {
    pub key: Option<AvailabilityKey>,
    pub loading: bool,
    pub cells: Vec<SlotCell>,
}

impl SlotGridView {
    pub fn available(&self) -> impl Iterator<Item = SlotLabel> + '_ {
        self.cells
            .iter()
            .filter(|cell| !cell.occupied)
            .map(|cell| cell.label)
    }
}

/// 时间段占用索引
#[derive(Debug)]
pub struct SlotAvailabilityIndex {
    grid: SlotGrid,
    last_token: u64,
    pending: Option<SlotRequest>,
    current: Option<AvailabilityKey>,
    occupied: BTreeSet<SlotLabel>,
    last_error: Option<LoadError>,
    /// 被新查询取代的未完成查询数
    superseded_requests: u64,
}

impl SlotAvailabilityIndex {
    pub fn new(grid: SlotGrid) -> Self {
        Self {
            grid,
            last_token: 0,
            pending: None,
            current: None,
            occupied: BTreeSet::new(),
            last_error: None,
            superseded_requests: 0,
        }
    }

    /// 开始一次新查询，之前所有未完成的查询随之失效
    ///
    /// 如果键变化，旧的占用结果立即清除，避免显示到新的 (负责人, 日期) 上。
    pub fn begin(&mut self, handler_id: HandlerId, date: NaiveDate) -> SlotRequest {
        let key = AvailabilityKey { handler_id, date };
        self.last_token += 1;

        if let Some(superseded) = self.pending {
            self.superseded_requests = self.superseded_requests.saturating_add(1);
            tracing::debug!(
                "Occupancy request {} superseded by {}",
                superseded.token,
                self.last_token
            );
        }

        if self.current != Some(key) {
            self.current = None;
            self.occupied.clear();
        }
        self.last_error = None;

        let request = SlotRequest {
            token: self.last_token,
            key,
        };
        self.pending = Some(request);
        request
    }

    /// 应用查询响应；过期的响应被丢弃并返回 `false`
    pub fn apply(&mut self, response: SlotResponse) -> bool {
        let SlotResponse { request, result } = response;
        if self.pending.map(|pending| pending.token) != Some(request.token) {
            tracing::warn!(
                "Discarding stale occupancy response {} for handler {} on {}",
                request.token,
                request.key.handler_id,
                request.key.date
            );
            return false;
        }
        self.pending = None;

        match result {
            Ok(appointments) => {
                self.occupied = self.extract(&appointments);
                self.current = Some(request.key);
                tracing::info!(
                    "Handler {} has {} occupied slots on {}",
                    request.key.handler_id,
                    self.occupied.len(),
                    request.key.date
                );
            }
            Err(e) => {
                let error = LoadError::new(
                    LoadTarget::Occupancy {
                        handler_id: request.key.handler_id,
                        date: request.key.date,
                    },
                    e,
                );
                tracing::warn!("{}", error);
                self.last_error = Some(error);
            }
        }
        true
    }

    /// 查询并应用（单一调用方的便捷方法）
    pub async fn refresh(
        &mut self,
        backend: &dyn CaseloadBackend,
        handler_id: HandlerId,
        date: NaiveDate,
    ) -> Result<&BTreeSet<SlotLabel>, LoadError> {
        let request = self.begin(handler_id, date);
        let response = fetch_occupancy(backend, request).await;
        self.apply(response);

        match &self.last_error {
            Some(error) => Err(error.clone()),
            None => Ok(&self.occupied),
        }
    }

    /// 取消所有查询并清空结果（目标负责人或日期被清除时）
    pub fn reset(&mut self) {
        self.pending = None;
        self.current = None;
        self.occupied.clear();
        self.last_error = None;
    }

    /// 只保留网格上的时间段，精确到分钟
    fn extract(&self, appointments: &[OccupiedAppointment]) -> BTreeSet<SlotLabel> {
        appointments
            .iter()
            .filter_map(|appointment| appointment.appointment_time)
            .map(SlotLabel::truncate)
            .filter(|label| {
                let on_grid = self.grid.contains(label);
                if !on_grid {
                    tracing::debug!("Ignoring off-grid appointment at {}", label);
                }
                on_grid
            })
            .collect()
    }

    /// 指定键的已占用时间段；结果未就绪或属于其他键时返回 `None`
    pub fn occupied_slots(&self, handler_id: HandlerId, date: NaiveDate) -> Option<&BTreeSet<SlotLabel>> {
        let key = AvailabilityKey { handler_id, date };
        (self.current == Some(key)).then_some(&self.occupied)
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn current_key(&self) -> Option<AvailabilityKey> {
        self.current
    }

    pub fn last_error(&self) -> Option<&LoadError> {
        self.last_error.as_ref()
    }

    pub fn superseded_requests(&self) -> u64 {
        self.superseded_requests
    }

    pub fn grid(&self) -> &SlotGrid {
        &self.grid
    }

    /// 网格视图：每个时间段的占用标记和加载标记
    pub fn view(&self) -> SlotGridView {
        SlotGridView {
            key: self.current,
            loading: self.is_loading(),
            cells: self
                .grid
                .labels()
                .into_iter()
                .map(|label| SlotCell {
                    label,
                    occupied: self.occupied.contains(&label),
                })
                .collect(),
        }
    }
}

impl Default for SlotAvailabilityIndex {
    fn default() -> Self {
        Self::new(SlotGrid::standard())
    }
}
