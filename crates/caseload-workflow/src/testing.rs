//! 测试用的脚本化后端

use async_trait::async_trait;
use caseload_core::{
    BackendError, CaseId, CaseloadBackend, CaseloadFilter, HandlerId, HandlerSummary,
    OccupiedAppointment, PatientCaseRecord, ReassignmentPlan,
};
use chrono::{NaiveDate, NaiveTime};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

pub fn record(case_id: CaseId, handler_id: HandlerId, status: Option<&str>) -> PatientCaseRecord {
    PatientCaseRecord {
        case_id,
        patient_name: format!("Paciente {}", case_id),
        patient_external_id: format!("{:08}", case_id),
        status_code: status.map(str::to_string),
        current_handler_id: handler_id,
        appointment_time: None,
    }
}

pub fn handler(id: HandlerId, name: &str) -> HandlerSummary {
    HandlerSummary {
        id,
        display_name: name.to_string(),
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[derive(Default)]
struct State {
    caseloads: HashMap<HandlerId, Vec<PatientCaseRecord>>,
    directory: Vec<HandlerSummary>,
    occupied: HashMap<(HandlerId, NaiveDate), Vec<OccupiedAppointment>>,
    occupancy_gates: HashMap<(HandlerId, NaiveDate), oneshot::Receiver<()>>,
    caseload_failure: Option<BackendError>,
    directory_failure: Option<BackendError>,
    occupancy_failure: Option<BackendError>,
    batch_failure: Option<BackendError>,
    failing_cases: HashSet<CaseId>,
    case_delays: HashMap<CaseId, Duration>,
    caseload_fetches: usize,
    batch_commits: Vec<ReassignmentPlan>,
    case_commits: Vec<(CaseId, HandlerId)>,
}

/// 内存中的脚本化后端，支持注入失败和延迟响应
#[derive(Default)]
pub struct ScriptedBackend {
    state: Mutex<State>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_caseload(&self, handler_id: HandlerId, records: Vec<PatientCaseRecord>) {
        self.state.lock().unwrap().caseloads.insert(handler_id, records);
    }

    pub fn set_directory(&self, handlers: Vec<HandlerSummary>) {
        self.state.lock().unwrap().directory = handlers;
    }

    pub fn set_occupied(&self, handler_id: HandlerId, date: NaiveDate, times: &[&str]) {
        let appointments = times
            .iter()
            .map(|raw| OccupiedAppointment {
                case_id: None,
                appointment_time: caseload_core::utils::parse_clock_time(raw),
            })
            .collect();
        self.state
            .lock()
            .unwrap()
            .occupied
            .insert((handler_id, date), appointments);
    }

    /// 让下一次占用查询挂起，直到返回的发送端被触发
    pub fn gate_occupancy(&self, handler_id: HandlerId, date: NaiveDate) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state
            .lock()
            .unwrap()
            .occupancy_gates
            .insert((handler_id, date), rx);
        tx
    }

    pub fn fail_caseload(&self, error: BackendError) {
        self.state.lock().unwrap().caseload_failure = Some(error);
    }

    pub fn fail_directory(&self, error: BackendError) {
        self.state.lock().unwrap().directory_failure = Some(error);
    }

    pub fn fail_occupancy(&self, error: BackendError) {
        self.state.lock().unwrap().occupancy_failure = Some(error);
    }

    pub fn fail_batch(&self, error: BackendError) {
        self.state.lock().unwrap().batch_failure = Some(error);
    }

    pub fn fail_case(&self, case_id: CaseId) {
        self.state.lock().unwrap().failing_cases.insert(case_id);
    }

    /// 单个提交在返回前等待的时间
    pub fn delay_case(&self, case_id: CaseId, delay: Duration) {
        self.state.lock().unwrap().case_delays.insert(case_id, delay);
    }

    pub fn caseload_fetches(&self) -> usize {
        self.state.lock().unwrap().caseload_fetches
    }

    pub fn batch_commits(&self) -> Vec<ReassignmentPlan> {
        self.state.lock().unwrap().batch_commits.clone()
    }

    pub fn case_commits(&self) -> Vec<(CaseId, HandlerId)> {
        self.state.lock().unwrap().case_commits.clone()
    }

    fn move_case(state: &mut State, case_id: CaseId, destination: HandlerId, slot: Option<NaiveTime>) {
        let mut moved = None;
        for records in state.caseloads.values_mut() {
            if let Some(pos) = records.iter().position(|r| r.case_id == case_id) {
                moved = Some(records.remove(pos));
                break;
            }
        }
        if let Some(mut record) = moved {
            record.current_handler_id = destination;
            if slot.is_some() {
                record.appointment_time = slot;
            }
            state.caseloads.entry(destination).or_default().push(record);
        }
    }
}

#[async_trait]
impl CaseloadBackend for ScriptedBackend {
    async fn fetch_caseload(
        &self,
        filter: &CaseloadFilter,
    ) -> Result<Vec<PatientCaseRecord>, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.caseload_fetches += 1;
        if let Some(error) = state.caseload_failure.clone() {
            return Err(error);
        }
        Ok(state
            .caseloads
            .get(&filter.handler_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_handler_directory(
        &self,
        exclude: Option<HandlerId>,
    ) -> Result<Vec<HandlerSummary>, BackendError> {
        let state = self.state.lock().unwrap();
        if let Some(error) = state.directory_failure.clone() {
            return Err(error);
        }
        Ok(state
            .directory
            .iter()
            .filter(|h| Some(h.id) != exclude)
            .cloned()
            .collect())
    }

    async fn fetch_occupied_appointments(
        &self,
        handler_id: HandlerId,
        date: NaiveDate,
    ) -> Result<Vec<OccupiedAppointment>, BackendError> {
        let gate = self
            .state
            .lock()
            .unwrap()
            .occupancy_gates
            .remove(&(handler_id, date));
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let state = self.state.lock().unwrap();
        if let Some(error) = state.occupancy_failure.clone() {
            return Err(error);
        }
        Ok(state
            .occupied
            .get(&(handler_id, date))
            .cloned()
            .unwrap_or_default())
    }

    async fn commit_reassignment(&self, plan: &ReassignmentPlan) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.batch_commits.push(plan.clone());
        if let Some(error) = state.batch_failure.clone() {
            return Err(error);
        }
        let slot = plan.destination_slot.map(|s| s.time());
        for case_id in &plan.case_ids {
            Self::move_case(&mut state, *case_id, plan.destination.id, slot);
        }
        Ok(())
    }

    async fn commit_reassignment_one(
        &self,
        case_id: CaseId,
        destination: &HandlerSummary,
    ) -> Result<(), BackendError> {
        let delay = self.state.lock().unwrap().case_delays.get(&case_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.case_commits.push((case_id, destination.id));
        if state.failing_cases.contains(&case_id) {
            return Err(BackendError::Status {
                status: 409,
                body: format!("case {} is locked", case_id),
            });
        }
        Self::move_case(&mut state, case_id, destination.id, None);
        Ok(())
    }
}
