//! 批处理状态机
//!
//! 管理一次重新分配提交的生命周期：
//! `Idle → Validating → Executing → {CompleteSuccess | CompletePartial}`

use caseload_core::{CaseloadError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 批处理状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BatchState {
    Idle,            // 空闲
    Validating,      // 校验中
    Executing,       // 执行中，不可取消
    CompleteSuccess, // 全部成功
    CompletePartial, // 存在失败
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::CompleteSuccess | BatchState::CompletePartial)
    }
}

/// 批处理事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BatchEvent {
    Submit,
    ValidationPassed,
    ValidationFailed,
    AllSettledOk,
    AllSettledWithFailures,
    Reset,
}

/// 批处理状态机
#[derive(Debug)]
pub struct BatchStateMachine {
    transitions: HashMap<(BatchState, BatchEvent), BatchState>,
}

impl BatchStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((BatchState::Idle, BatchEvent::Submit), BatchState::Validating);
        transitions.insert((BatchState::Validating, BatchEvent::ValidationPassed), BatchState::Executing);
        transitions.insert((BatchState::Validating, BatchEvent::ValidationFailed), BatchState::Idle);
        transitions.insert((BatchState::Executing, BatchEvent::AllSettledOk), BatchState::CompleteSuccess);
        transitions.insert(
            (BatchState::Executing, BatchEvent::AllSettledWithFailures),
            BatchState::CompletePartial,
        );
        // 部分失败后操作员可以重新提交剩余病例
        transitions.insert((BatchState::CompletePartial, BatchEvent::Reset), BatchState::Idle);
        transitions.insert((BatchState::CompleteSuccess, BatchEvent::Reset), BatchState::Idle);
        transitions.insert((BatchState::CompletePartial, BatchEvent::Submit), BatchState::Validating);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: BatchState, event: BatchEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: BatchState, event: BatchEvent) -> Result<BatchState> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(CaseloadError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: BatchState) -> Vec<BatchEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current_state)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for BatchStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
