//! 内存后端
//!
//! 在进程内保存病例、负责人和预约时间，行为与 HTTP 后端一致，
//! 用于演示程序、命令行离线模式和集成测试。

use async_trait::async_trait;
use caseload_core::{
    BackendError, CaseId, CaseloadBackend, CaseloadFilter, HandlerId, HandlerSummary,
    OccupiedAppointment, PatientCaseRecord, ReassignmentPlan,
};
use chrono::{NaiveDate, NaiveTime};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct StoredCase {
    record: PatientCaseRecord,
    date: Option<NaiveDate>,
}

#[derive(Debug, Default)]
struct Store {
    cases: BTreeMap<CaseId, StoredCase>,
    handlers: Vec<HandlerSummary>,
    locked_cases: HashSet<CaseId>,
}

/// 内存后端
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    store: RwLock<Store>,
    latency: Option<Duration>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次调用前等待固定时间，模拟网络延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn add_handler(&self, id: HandlerId, display_name: impl Into<String>) {
        self.store.write().await.handlers.push(HandlerSummary {
            id,
            display_name: display_name.into(),
        });
    }

    /// 添加病例，日期为空表示未排期
    pub async fn add_case(&self, record: PatientCaseRecord, date: Option<NaiveDate>) {
        self.store
            .write()
            .await
            .cases
            .insert(record.case_id, StoredCase { record, date });
    }

    /// 锁定病例，之后对它的单个重新分配会被拒绝
    pub async fn lock_case(&self, case_id: CaseId) {
        self.store.write().await.locked_cases.insert(case_id);
    }

    pub async fn case(&self, case_id: CaseId) -> Option<PatientCaseRecord> {
        self.store
            .read()
            .await
            .cases
            .get(&case_id)
            .map(|stored| stored.record.clone())
    }

    /// 内置的示例数据：三名负责人，八个病例
    pub async fn sample(date: NaiveDate) -> Self {
        let backend = Self::new();
        backend.add_handler(1, "Ana Torres").await;
        backend.add_handler(2, "Beatriz Rojas").await;
        backend.add_handler(3, "Carmen Flores").await;

        let cases = [
            (101, "Rosa Quispe", "45678912", Some("PENDIENTE"), 1, Some((8, 0))),
            (102, "Luis Huaman", "40011223", Some("Citado"), 1, Some((9, 30))),
            (103, "Julia Mamani", "41234567", None, 1, None),
            (104, "Pedro Castillo", "42345678", Some("NO_CONTESTA"), 1, Some((14, 0))),
            (105, "Elsa Vargas", "43456789", Some("Atendido"), 1, Some((15, 30))),
            (106, "Mario Chavez", "44567890", Some("OBSERVADO"), 1, Some((16, 0))),
            (201, "Nora Salas", "46789012", Some("CITADO"), 2, Some((9, 0))),
            (202, "Hugo Ramos", "47890123", Some("CITADO"), 2, Some((10, 0))),
        ];
        for (case_id, name, dni, status, handler, hm) in cases {
            let appointment_time = hm.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0));
            backend
                .add_case(
                    PatientCaseRecord {
                        case_id,
                        patient_name: name.to_string(),
                        patient_external_id: dni.to_string(),
                        status_code: status.map(str::to_string),
                        current_handler_id: handler,
                        appointment_time,
                    },
                    appointment_time.map(|_| date),
                )
                .await;
        }
        backend
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn matches(stored: &StoredCase, filter: &CaseloadFilter) -> bool {
        if stored.record.current_handler_id != filter.handler_id {
            return false;
        }
        if filter.date.is_some() && stored.date != filter.date {
            return false;
        }
        match (filter.shift, stored.record.appointment_time) {
            (None, _) => true,
            (Some(shift), Some(time)) => shift.contains(time),
            (Some(_), None) => false,
        }
    }
}

#[async_trait]
impl CaseloadBackend for InMemoryBackend {
    async fn fetch_caseload(
        &self,
        filter: &CaseloadFilter,
    ) -> Result<Vec<PatientCaseRecord>, BackendError> {
        self.simulate_latency().await;
        let store = self.store.read().await;
        Ok(store
            .cases
            .values()
            .filter(|stored| Self::matches(stored, filter))
            .map(|stored| stored.record.clone())
            .collect())
    }

    async fn fetch_handler_directory(
        &self,
        exclude: Option<HandlerId>,
    ) -> Result<Vec<HandlerSummary>, BackendError> {
        self.simulate_latency().await;
        let store = self.store.read().await;
        Ok(store
            .handlers
            .iter()
            .filter(|handler| Some(handler.id) != exclude)
            .cloned()
            .collect())
    }

    async fn fetch_occupied_appointments(
        &self,
        handler_id: HandlerId,
        date: NaiveDate,
    ) -> Result<Vec<OccupiedAppointment>, BackendError> {
        self.simulate_latency().await;
        let store = self.store.read().await;
        Ok(store
            .cases
            .values()
            .filter(|stored| {
                stored.record.current_handler_id == handler_id && stored.date == Some(date)
            })
            .map(|stored| OccupiedAppointment {
                case_id: Some(stored.record.case_id),
                appointment_time: stored.record.appointment_time,
            })
            .collect())
    }

    async fn commit_reassignment(&self, plan: &ReassignmentPlan) -> Result<(), BackendError> {
        self.simulate_latency().await;
        let (Some(date), Some(slot)) = (plan.destination_date, plan.destination_slot) else {
            return Err(BackendError::Rejected(
                "batch reassignment requires a destination date and slot".to_string(),
            ));
        };

        let mut store = self.store.write().await;
        if let Some(missing) = plan.case_ids.iter().find(|id| !store.cases.contains_key(*id)) {
            return Err(BackendError::Status {
                status: 404,
                body: format!("case {} not found", missing),
            });
        }

        // 整批要么全部成功，要么全部不变
        let taken = store.cases.values().any(|stored| {
            stored.record.current_handler_id == plan.destination.id
                && stored.date == Some(date)
                && stored.record.appointment_time.map(caseload_core::SlotLabel::truncate)
                    == Some(slot)
                && !plan.case_ids.contains(&stored.record.case_id)
        });
        if taken {
            return Err(BackendError::Status {
                status: 409,
                body: format!("slot {} on {} is already taken", slot, date),
            });
        }

        for case_id in &plan.case_ids {
            if let Some(stored) = store.cases.get_mut(case_id) {
                stored.record.current_handler_id = plan.destination.id;
                stored.record.appointment_time = Some(slot.time());
                stored.date = Some(date);
            }
        }
        info!(
            "In-memory batch moved {} cases to handler {}",
            plan.case_ids.len(),
            plan.destination.id
        );
        Ok(())
    }

    async fn commit_reassignment_one(
        &self,
        case_id: CaseId,
        destination: &HandlerSummary,
    ) -> Result<(), BackendError> {
        self.simulate_latency().await;
        let mut store = self.store.write().await;
        if store.locked_cases.contains(&case_id) {
            return Err(BackendError::Status {
                status: 409,
                body: format!("case {} is locked", case_id),
            });
        }
        let stored = store.cases.get_mut(&case_id).ok_or_else(|| BackendError::Status {
            status: 404,
            body: format!("case {} not found", case_id),
        })?;
        stored.record.current_handler_id = destination.id;
        debug!("In-memory case {} assigned to {}", case_id, destination.display_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseload_core::{ReassignmentMode, Shift, SlotLabel};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[tokio::test]
    async fn test_caseload_filters_by_date_and_shift() {
        let backend = InMemoryBackend::sample(day()).await;

        let all = backend
            .fetch_caseload(&CaseloadFilter::for_handler(1))
            .await
            .unwrap();
        assert_eq!(all.len(), 6);

        let dated = backend
            .fetch_caseload(&CaseloadFilter::for_handler(1).on(day()))
            .await
            .unwrap();
        assert_eq!(dated.len(), 5);

        let afternoon = backend
            .fetch_caseload(&CaseloadFilter::for_handler(1).on(day()).during(Shift::Afternoon))
            .await
            .unwrap();
        let ids: Vec<_> = afternoon.iter().map(|r| r.case_id).collect();
        assert_eq!(ids, vec![104, 105, 106]);
    }

    #[tokio::test]
    async fn test_batch_rejects_taken_slot_atomically() {
        let backend = InMemoryBackend::sample(day()).await;
        let plan = ReassignmentPlan {
            mode: ReassignmentMode::SlotAware,
            case_ids: vec![101, 103],
            destination: HandlerSummary {
                id: 2,
                display_name: "Beatriz Rojas".to_string(),
            },
            destination_date: Some(day()),
            destination_slot: SlotLabel::from_hm(9, 0),
        };

        let result = backend.commit_reassignment(&plan).await;
        assert!(matches!(result, Err(BackendError::Status { status: 409, .. })));
        assert_eq!(backend.case(101).await.unwrap().current_handler_id, 1);
        assert_eq!(backend.case(103).await.unwrap().current_handler_id, 1);
    }

    #[tokio::test]
    async fn test_locked_case_is_rejected() {
        let backend = InMemoryBackend::sample(day()).await;
        backend.lock_case(102).await;
        let destination = HandlerSummary {
            id: 3,
            display_name: "Carmen Flores".to_string(),
        };

        assert!(backend.commit_reassignment_one(101, &destination).await.is_ok());
        assert!(backend.commit_reassignment_one(102, &destination).await.is_err());
        assert!(matches!(
            backend.commit_reassignment_one(999, &destination).await,
            Err(BackendError::Status { status: 404, .. })
        ));
        assert_eq!(backend.case(101).await.unwrap().current_handler_id, 3);
    }
}
