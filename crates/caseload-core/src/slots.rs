//! 预约时间段网格
//!
//! 固定宽度的时间段，以开始时间 `HH:MM` 标记。标准网格从 07:00 开始，
//! 每 30 分钟一个，直到 20:00（含），共 27 个。

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 标准网格起点（小时）
pub const GRID_START_HOUR: u32 = 7;
/// 标准网格终点（小时，含）
pub const GRID_END_HOUR: u32 = 20;
/// 时间段宽度（分钟）
pub const SLOT_MINUTES: u32 = 30;

/// 时间段标签，精确到分钟
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotLabel(NaiveTime);

impl SlotLabel {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(SlotLabel)
    }

    /// 截断秒及以下部分
    pub fn truncate(time: NaiveTime) -> Self {
        SlotLabel(NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time))
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    fn minutes_since_midnight(&self) -> u32 {
        self.0.hour() * 60 + self.0.minute()
    }
}

impl fmt::Display for SlotLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for SlotLabel {
    type Err = String;

    /// 接受 `HH:MM` 或 `HH:MM:SS`，后者截断到分钟
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        NaiveTime::parse_from_str(s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .map(SlotLabel::truncate)
            .map_err(|_| format!("invalid slot label: {}", s))
    }
}

impl TryFrom<String> for SlotLabel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SlotLabel> for String {
    fn from(label: SlotLabel) -> Self {
        label.to_string()
    }
}

/// 时间段网格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotGrid {
    first: SlotLabel,
    last: SlotLabel,
    step_minutes: u32,
}

impl SlotGrid {
    /// 07:00 – 20:00，每 30 分钟
    pub fn standard() -> Self {
        Self {
            first: SlotLabel(NaiveTime::from_hms_opt(GRID_START_HOUR, 0, 0).unwrap_or(NaiveTime::MIN)),
            last: SlotLabel(NaiveTime::from_hms_opt(GRID_END_HOUR, 0, 0).unwrap_or(NaiveTime::MIN)),
            step_minutes: SLOT_MINUTES,
        }
    }

    /// 网格中的全部时间段，按时间升序
    pub fn labels(&self) -> Vec<SlotLabel> {
        let start = self.first.minutes_since_midnight();
        let end = self.last.minutes_since_midnight();
        (start..=end)
            .step_by(self.step_minutes as usize)
            .filter_map(|minutes| SlotLabel::from_hm(minutes / 60, minutes % 60))
            .collect()
    }

    pub fn len(&self) -> usize {
        let span = self
            .last
            .minutes_since_midnight()
            .saturating_sub(self.first.minutes_since_midnight());
        (span / self.step_minutes) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 标签是否落在网格上
    pub fn contains(&self, label: &SlotLabel) -> bool {
        let minutes = label.minutes_since_midnight();
        let start = self.first.minutes_since_midnight();
        minutes >= start
            && minutes <= self.last.minutes_since_midnight()
            && (minutes - start) % self.step_minutes == 0
    }
}

impl Default for SlotGrid {
    fn default() -> Self {
        Self::standard()
    }
}
