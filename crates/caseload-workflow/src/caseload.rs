//! 病例负荷索引
//!
//! 保存某负责人在指定筛选条件下的病例快照。读取失败时保留上一份快照，
//! 直到下一次成功读取。

use crate::classifier::CategoryClassifier;
use caseload_core::{
    CaseId, CaseloadBackend, CaseloadFilter, Category, LoadError, LoadTarget, PatientCaseRecord,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 一次成功读取的快照
#[derive(Debug, Clone)]
pub struct CaseloadSnapshot {
    pub filter: CaseloadFilter,
    pub records: Vec<PatientCaseRecord>,
    pub fetched_at: DateTime<Utc>,
}

impl CaseloadSnapshot {
    pub fn case_ids(&self) -> HashSet<CaseId> {
        self.records.iter().map(|record| record.case_id).collect()
    }

    pub fn get(&self, case_id: CaseId) -> Option<&PatientCaseRecord> {
        self.records.iter().find(|record| record.case_id == case_id)
    }
}

/// 读取状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Loaded,
    Failed(LoadError),
}

/// 病例负荷索引
#[derive(Debug)]
pub struct CaseloadIndex {
    snapshot: Option<CaseloadSnapshot>,
    status: LoadStatus,
}

impl CaseloadIndex {
    pub fn new() -> Self {
        Self {
            snapshot: None,
            status: LoadStatus::Idle,
        }
    }

    /// 按筛选条件读取病例列表
    ///
    /// 成功时替换快照；失败时保留旧快照并返回 `LoadError`。空列表是合法结果。
    pub async fn load(
        &mut self,
        backend: &dyn CaseloadBackend,
        filter: &CaseloadFilter,
    ) -> Result<&CaseloadSnapshot, LoadError> {
        self.status = LoadStatus::Loading;
        tracing::debug!(
            "Loading caseload for handler {} (date {:?}, shift {:?})",
            filter.handler_id,
            filter.date,
            filter.shift
        );

        match backend.fetch_caseload(filter).await {
            Ok(records) => {
                let records = dedupe_by_case_id(records);
                tracing::info!(
                    "Loaded {} cases for handler {}",
                    records.len(),
                    filter.handler_id
                );
                self.status = LoadStatus::Loaded;
                Ok(self.snapshot.insert(CaseloadSnapshot {
                    filter: filter.clone(),
                    records,
                    fetched_at: Utc::now(),
                }))
            }
            Err(e) => {
                let error = LoadError::new(
                    LoadTarget::Caseload {
                        handler_id: filter.handler_id,
                        date: filter.date,
                        shift: filter.shift,
                    },
                    e,
                );
                tracing::warn!("{} (keeping previous snapshot)", error);
                self.status = LoadStatus::Failed(error.clone());
                Err(error)
            }
        }
    }

    pub fn snapshot(&self) -> Option<&CaseloadSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn records(&self) -> &[PatientCaseRecord] {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.records.as_slice())
            .unwrap_or(&[])
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn is_loading(&self) -> bool {
        self.status == LoadStatus::Loading
    }

    pub fn case_ids(&self) -> HashSet<CaseId> {
        self.snapshot
            .as_ref()
            .map(CaseloadSnapshot::case_ids)
            .unwrap_or_default()
    }
}

impl Default for CaseloadIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// 同一快照内病例ID必须唯一，重复项保留第一条
fn dedupe_by_case_id(records: Vec<PatientCaseRecord>) -> Vec<PatientCaseRecord> {
    let mut seen = HashSet::new();
    let before = records.len();
    let unique: Vec<_> = records
        .into_iter()
        .filter(|record| seen.insert(record.case_id))
        .collect();

    if unique.len() != before {
        tracing::warn!(
            "Dropped {} duplicate case ids from caseload response",
            before - unique.len()
        );
    }
    unique
}

/// 状态筛选
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusFilter {
    #[default]
    Any,
    /// 没有状态代码的记录
    Unset,
    Category(Category),
}

/// 列表视图筛选（搜索 + 状态），决定哪些记录"可见"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterView {
    pub search: String,
    pub status: StatusFilter,
}

impl RosterView {
    /// 姓名不区分大小写匹配，证件号子串匹配
    pub fn matches(&self, record: &PatientCaseRecord, classifier: &CategoryClassifier) -> bool {
        let status_ok = match self.status {
            StatusFilter::Any => true,
            StatusFilter::Unset => record
                .status_code
                .as_deref()
                .map_or(true, |code| code.trim().is_empty()),
            StatusFilter::Category(category) => classifier.classify(record) == category,
        };

        let needle = self.search.trim();
        let search_ok = needle.is_empty()
            || record
                .patient_name
                .to_lowercase()
                .contains(&needle.to_lowercase())
            || record.patient_external_id.contains(needle);

        status_ok && search_ok
    }

    pub fn apply<'a>(
        &self,
        records: &'a [PatientCaseRecord],
        classifier: &CategoryClassifier,
    ) -> Vec<&'a PatientCaseRecord> {
        records
            .iter()
            .filter(|record| self.matches(record, classifier))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, ScriptedBackend};
    use caseload_core::BackendError;

    #[tokio::test]
    async fn test_load_replaces_snapshot() {
        let backend = ScriptedBackend::new();
        backend.set_caseload(1, vec![record(10, 1, Some("Pendiente")), record(11, 1, None)]);

        let mut index = CaseloadIndex::new();
        let snapshot = index
            .load(&backend, &CaseloadFilter::for_handler(1))
            .await
            .unwrap();
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(index.status(), &LoadStatus::Loaded);
    }

    #[tokio::test]
    async fn test_empty_roster_is_not_an_error() {
        let backend = ScriptedBackend::new();
        let mut index = CaseloadIndex::new();
        let snapshot = index
            .load(&backend, &CaseloadFilter::for_handler(99))
            .await
            .unwrap();
        assert!(snapshot.records.is_empty());
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_snapshot() {
        let backend = ScriptedBackend::new();
        backend.set_caseload(1, vec![record(10, 1, None)]);

        let mut index = CaseloadIndex::new();
        let filter = CaseloadFilter::for_handler(1);
        index.load(&backend, &filter).await.unwrap();

        backend.fail_caseload(BackendError::Transport("connection reset".into()));
        let err = index.load(&backend, &filter).await.unwrap_err();
        assert!(matches!(err.target, LoadTarget::Caseload { handler_id: 1, .. }));
        assert_eq!(index.records().len(), 1);
        assert!(matches!(index.status(), LoadStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_duplicate_case_ids_are_dropped() {
        let backend = ScriptedBackend::new();
        backend.set_caseload(
            1,
            vec![record(10, 1, None), record(10, 1, Some("Atendido")), record(11, 1, None)],
        );

        let mut index = CaseloadIndex::new();
        index.load(&backend, &CaseloadFilter::for_handler(1)).await.unwrap();
        assert_eq!(index.records().len(), 2);
        assert_eq!(index.records()[0].status_code, None);
    }

    #[test]
    fn test_roster_view_filters() {
        let classifier = CategoryClassifier::new();
        let mut ana = record(1, 1, Some("Atendido"));
        ana.patient_name = "Ana Torres".into();
        ana.patient_external_id = "45871236".into();
        let mut luis = record(2, 1, None);
        luis.patient_name = "Luis Rojas".into();
        luis.patient_external_id = "10293847".into();
        let records = vec![ana, luis];

        let view = RosterView {
            search: "torres".into(),
            status: StatusFilter::Any,
        };
        assert_eq!(view.apply(&records, &classifier).len(), 1);

        let view = RosterView {
            search: "1029".into(),
            status: StatusFilter::Any,
        };
        assert_eq!(view.apply(&records, &classifier)[0].case_id, 2);

        let view = RosterView {
            search: String::new(),
            status: StatusFilter::Unset,
        };
        assert_eq!(view.apply(&records, &classifier)[0].case_id, 2);

        let view = RosterView {
            search: String::new(),
            status: StatusFilter::Category(Category::Seen),
        };
        assert_eq!(view.apply(&records, &classifier)[0].case_id, 1);
    }
}
