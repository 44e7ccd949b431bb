//! 批处理执行器
//!
//! 按时间段模式：一次批量调用，整批同一结果（后端保证原子性）。
//! 仅负责人模式：每个病例一次调用，并发发出；单个失败不会中止其余调用，
//! 也不会自动重试。所有调用结束后才进入终态。

use crate::state_machine::{BatchEvent, BatchState, BatchStateMachine};
use caseload_core::{
    BatchProgress, CaseId, CaseloadBackend, CommitError, CommitScope, ReassignmentMode,
    ReassignmentPlan, Result,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use uuid::Uuid;

/// 批处理终态
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub run_id: Uuid,
    pub mode: ReassignmentMode,
    pub progress: BatchProgress,
    pub state: BatchState,
    /// 失败明细；批量模式下最多一条，覆盖整批
    #[serde(skip)]
    pub failures: Vec<CommitError>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.progress.failed == 0
    }

    /// 单个病例模式下失败的病例ID
    pub fn failed_case_ids(&self) -> Vec<CaseId> {
        self.failures
            .iter()
            .flat_map(|failure| match &failure.scope {
                CommitScope::Case(case_id) => vec![*case_id],
                CommitScope::Batch(case_ids) => case_ids.clone(),
            })
            .collect()
    }
}

/// 批处理执行器
pub struct BatchExecutor {
    backend: Arc<dyn CaseloadBackend>,
    progress: watch::Sender<BatchProgress>,
    state_machine: BatchStateMachine,
    state: BatchState,
}

impl BatchExecutor {
    pub fn new(backend: Arc<dyn CaseloadBackend>) -> Self {
        let (progress, _) = watch::channel(BatchProgress::default());
        Self {
            backend,
            progress,
            state_machine: BatchStateMachine::new(),
            state: BatchState::Idle,
        }
    }

    /// 订阅进度流
    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> BatchProgress {
        *self.progress.borrow()
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    fn fire(&mut self, event: BatchEvent) -> Result<BatchState> {
        let next = self.state_machine.transition(self.state, event)?;
        tracing::debug!("Batch state {:?} -> {:?} on {:?}", self.state, next, event);
        self.state = next;
        Ok(next)
    }

    /// 操作员提交，进入校验
    pub fn submit(&mut self) -> Result<()> {
        self.fire(BatchEvent::Submit).map(|_| ())
    }

    /// 校验未通过，回到空闲
    pub fn reject(&mut self) -> Result<()> {
        self.fire(BatchEvent::ValidationFailed).map(|_| ())
    }

    /// 终态之后回到空闲
    pub fn reset(&mut self) -> Result<()> {
        self.fire(BatchEvent::Reset)?;
        self.progress.send_replace(BatchProgress::default());
        Ok(())
    }

    /// 执行已校验的计划，直到所有调用结束
    pub async fn execute(&mut self, plan: ReassignmentPlan) -> Result<BatchOutcome> {
        self.fire(BatchEvent::ValidationPassed)?;

        let run_id = Uuid::new_v4();
        let total = plan.len();
        self.progress.send_replace(BatchProgress::new(total));
        tracing::info!(
            "Batch {} started: {:?}, {} cases to handler {}",
            run_id,
            plan.mode,
            total,
            plan.destination.id
        );

        let failures = match plan.mode {
            ReassignmentMode::SlotAware => self.execute_batched(run_id, &plan).await,
            ReassignmentMode::HandlerOnly => self.execute_per_case(run_id, &plan).await,
        };

        let progress = self.progress();
        let state = if progress.failed == 0 {
            self.fire(BatchEvent::AllSettledOk)?
        } else {
            self.fire(BatchEvent::AllSettledWithFailures)?
        };

        tracing::info!(
            "Batch {} finished: {} succeeded, {} failed, {} total",
            run_id,
            progress.succeeded,
            progress.failed,
            progress.total
        );

        Ok(BatchOutcome {
            run_id,
            mode: plan.mode,
            progress,
            state,
            failures,
        })
    }

    async fn execute_batched(&mut self, run_id: Uuid, plan: &ReassignmentPlan) -> Vec<CommitError> {
        let total = plan.len();
        match self.backend.commit_reassignment(plan).await {
            Ok(()) => {
                self.progress.send_modify(|p| p.record_success(total));
                Vec::new()
            }
            Err(e) => {
                let error = CommitError::new(CommitScope::Batch(plan.case_ids.clone()), e);
                tracing::warn!("Batch {}: {}", run_id, error);
                self.progress.send_modify(|p| p.record_failure(total));
                vec![error]
            }
        }
    }

    async fn execute_per_case(&mut self, run_id: Uuid, plan: &ReassignmentPlan) -> Vec<CommitError> {
        let mut tasks = JoinSet::new();
        let mut unsettled: HashSet<CaseId> = plan.case_ids.iter().copied().collect();

        for &case_id in &plan.case_ids {
            let backend = Arc::clone(&self.backend);
            let destination = plan.destination.clone();
            tasks.spawn(async move {
                let result = backend.commit_reassignment_one(case_id, &destination).await;
                (case_id, result)
            });
        }

        // 完成结果只在这个循环中合并，计数不会丢失
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((case_id, Ok(()))) => {
                    unsettled.remove(&case_id);
                    self.progress.send_modify(|p| p.record_success(1));
                    tracing::debug!("Batch {}: case {} reassigned", run_id, case_id);
                }
                Ok((case_id, Err(e))) => {
                    unsettled.remove(&case_id);
                    let error = CommitError::new(CommitScope::Case(case_id), e);
                    tracing::warn!("Batch {}: {}", run_id, error);
                    self.progress.send_modify(|p| p.record_failure(1));
                    failures.push(error);
                }
                Err(join_error) => {
                    tracing::error!("Batch {}: commit task failed: {}", run_id, join_error);
                }
            }
        }

        // 任务异常退出时无法拿到病例ID，按剩余未结算的病例记为失败
        let mut orphaned: Vec<CaseId> = unsettled.into_iter().collect();
        orphaned.sort_unstable();
        for case_id in orphaned {
            self.progress.send_modify(|p| p.record_failure(1));
            failures.push(CommitError {
                scope: CommitScope::Case(case_id),
                reason: "commit task aborted".to_string(),
            });
        }

        failures.sort_by_key(|failure| match failure.scope {
            CommitScope::Case(case_id) => case_id,
            CommitScope::Batch(_) => CaseId::MIN,
        });
        failures
    }
}
