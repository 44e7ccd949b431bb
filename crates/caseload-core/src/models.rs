//! 核心数据模型定义

use crate::slots::SlotLabel;
use crate::utils::normalize_status_code;
use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 病例标识（重新分配前后保持不变）
pub type CaseId = i64;

/// 负责人标识（个案管理员或护士）
pub type HandlerId = i64;

/// 患者当前分配记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientCaseRecord {
    pub case_id: CaseId,
    pub patient_name: String,
    pub patient_external_id: String,    // 证件号，仅用于显示
    pub status_code: Option<String>,    // 状态代码，类别的唯一来源
    pub current_handler_id: HandlerId,
    pub appointment_time: Option<NaiveTime>, // 仅护士模式有意义
}

/// 病例粗粒度类别
///
/// 由状态代码推导，从不持久化。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Pending,   // 待处理
    Scheduled, // 已预约
    FollowUp,  // 需跟进
    Observed,  // 观察中
    Closed,    // 已结案（流失）
    Seen,      // 已就诊
}

impl Category {
    /// 所有类别，按显示顺序
    pub const ALL: [Category; 6] = [
        Category::Pending,
        Category::Scheduled,
        Category::FollowUp,
        Category::Observed,
        Category::Closed,
        Category::Seen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Pending => "PENDING",
            Category::Scheduled => "SCHEDULED",
            Category::FollowUp => "FOLLOW_UP",
            Category::Observed => "OBSERVED",
            Category::Closed => "CLOSED",
            Category::Seen => "SEEN",
        }
    }

    /// 是否计入完成率
    pub fn is_complete(&self) -> bool {
        matches!(self, Category::Seen | Category::Closed)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Category::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

/// 班次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shift {
    #[serde(rename = "MANANA")]
    Morning, // 上午 07:00 – 13:59
    #[serde(rename = "TARDE")]
    Afternoon, // 下午 14:00 – 20:59
}

impl Shift {
    /// 远端接口使用的参数值
    pub fn as_param(&self) -> &'static str {
        match self {
            Shift::Morning => "MANANA",
            Shift::Afternoon => "TARDE",
        }
    }

    /// 班次的起止时间（含）
    pub fn bounds(&self) -> (NaiveTime, NaiveTime) {
        let hm = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        match self {
            Shift::Morning => (hm(7, 0), hm(13, 59)),
            Shift::Afternoon => (hm(14, 0), hm(20, 59)),
        }
    }

    /// 判断时间（精确到分钟）是否落在班次内
    pub fn contains(&self, time: NaiveTime) -> bool {
        let (start, end) = self.bounds();
        let minute = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time);
        start <= minute && minute <= end
    }
}

impl FromStr for Shift {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_status_code(s).as_deref() {
            Some("MANANA" | "MORNING") => Ok(Shift::Morning),
            Some("TARDE" | "AFTERNOON") => Ok(Shift::Afternoon),
            _ => Err(format!("unknown shift: {}", s.trim())),
        }
    }
}

/// 病例列表查询条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseloadFilter {
    pub handler_id: HandlerId,
    pub date: Option<NaiveDate>,
    pub shift: Option<Shift>,
}

impl CaseloadFilter {
    pub fn for_handler(handler_id: HandlerId) -> Self {
        Self {
            handler_id,
            date: None,
            shift: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn during(mut self, shift: Shift) -> Self {
        self.shift = Some(shift);
        self
    }
}

/// 负责人目录条目
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerSummary {
    pub id: HandlerId,
    pub display_name: String,
}

/// 目标负责人某日已有的预约
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupiedAppointment {
    pub case_id: Option<CaseId>,
    pub appointment_time: Option<NaiveTime>,
}

/// 重新分配模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReassignmentMode {
    /// 仅更换负责人，逐个病例提交
    HandlerOnly,
    /// 更换负责人并重新排程到同一日期和时间段，一次性批量提交
    SlotAware,
}

impl ReassignmentMode {
    pub fn requires_slot(&self) -> bool {
        matches!(self, ReassignmentMode::SlotAware)
    }
}

impl FromStr for ReassignmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "handler-only" | "gestora" => Ok(ReassignmentMode::HandlerOnly),
            "slot-aware" | "enfermeria" => Ok(ReassignmentMode::SlotAware),
            other => Err(format!("unknown reassignment mode: {}", other)),
        }
    }
}

/// 重新分配计划
///
/// 仅在校验通过后创建，生命周期不超过一次批处理。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassignmentPlan {
    pub mode: ReassignmentMode,
    pub case_ids: Vec<CaseId>,
    pub destination: HandlerSummary,
    pub destination_date: Option<NaiveDate>,
    pub destination_slot: Option<SlotLabel>,
}

impl ReassignmentPlan {
    pub fn destination_handler_id(&self) -> HandlerId {
        self.destination.id
    }

    pub fn len(&self) -> usize {
        self.case_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.case_ids.is_empty()
    }
}

/// 批处理进度
///
/// 只由批处理执行器修改，单调递增直到 `succeeded + failed == total`。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            succeeded: 0,
            failed: 0,
            total,
        }
    }

    /// 已结束的调用数
    pub fn settled(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.settled() >= self.total
    }

    /// 进度比例 (0.0 - 1.0)
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.settled() as f64 / self.total as f64
    }

    pub fn record_success(&mut self, count: usize) {
        let room = self.total.saturating_sub(self.settled());
        self.succeeded += count.min(room);
    }

    pub fn record_failure(&mut self, count: usize) {
        let room = self.total.saturating_sub(self.settled());
        self.failed += count.min(room);
    }
}
