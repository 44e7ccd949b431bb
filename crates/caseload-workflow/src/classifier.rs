//! 病例类别分类
//!
//! 将状态代码映射到固定的粗粒度类别，用于筛选和汇总徽章。

use caseload_core::utils::normalize_status_code;
use caseload_core::{Category, PatientCaseRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 未知或空状态代码的默认类别
pub const DEFAULT_CATEGORY: Category = Category::Pending;

/// 类别分类器
#[derive(Debug, Clone)]
pub struct CategoryClassifier {
    table: HashMap<String, Category>,
}

impl CategoryClassifier {
    /// 创建分类器，加载固定的状态代码表
    pub fn new() -> Self {
        let mut table = HashMap::new();

        let mut map = |codes: &[&str], category: Category| {
            for code in codes {
                table.insert((*code).to_string(), category);
            }
        };

        map(&["PENDIENTE", "PENDIENTE_CITAR"], Category::Pending);
        map(&["CITADO", "PROGRAMADO", "AGENDADO", "REPROGRAMADO"], Category::Scheduled);
        map(
            &[
                "NO_CONTESTA",
                "APAGADO",
                "TEL_SIN_SERVICIO",
                "NUM_NO_EXISTE",
                "REPROG_FALLIDA",
                "HC_BLOQUEADA",
            ],
            Category::FollowUp,
        );
        map(&["OBSERVADO", "INTERCONSULTA", "HOSPITALIZADO"], Category::Observed);
        map(
            &[
                "DESERCION",
                "NO_DESEA",
                "YA_NO_REQUIERE",
                "SIN_VIGENCIA",
                "FALLECIDO",
                "NO_IPRESS_CENATE",
                "CERRADO",
            ],
            Category::Closed,
        );
        map(&["ATENDIDO", "ATENDIDO_IPRESS"], Category::Seen);

        Self { table }
    }

    /// 对单条记录分类，全函数，从不失败
    pub fn classify(&self, record: &PatientCaseRecord) -> Category {
        self.classify_code(record.status_code.as_deref())
    }

    /// 对原始状态代码分类
    pub fn classify_code(&self, code: Option<&str>) -> Category {
        code.and_then(normalize_status_code)
            .and_then(|normalized| self.table.get(&normalized).copied())
            .unwrap_or(DEFAULT_CATEGORY)
    }

    /// 已知的状态代码数量
    pub fn known_codes(&self) -> usize {
        self.table.len()
    }

    /// 按类别计数
    pub fn count_by_category<'a, I>(&self, records: I) -> CategoryCounts
    where
        I: IntoIterator<Item = &'a PatientCaseRecord>,
    {
        records
            .into_iter()
            .fold(CategoryCounts::empty(), |mut counts, record| {
                counts.add(self.classify(record));
                counts
            })
    }
}

impl Default for CategoryClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// 类别计数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub by_category: BTreeMap<Category, usize>,
    pub total: usize,
}

impl CategoryCounts {
    /// 所有类别都为 0 的计数
    pub fn empty() -> Self {
        Self {
            by_category: Category::ALL.iter().map(|category| (*category, 0)).collect(),
            total: 0,
        }
    }

    fn add(&mut self, category: Category) {
        *self.by_category.entry(category).or_insert(0) += 1;
        self.total += 1;
    }

    pub fn get(&self, category: Category) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    /// 完成率 `(SEEN + CLOSED) / total`，空列表为 0
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let complete: usize = self
            .by_category
            .iter()
            .filter(|(category, _)| category.is_complete())
            .map(|(_, count)| count)
            .sum();
        complete as f64 * 100.0 / self.total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(case_id: i64, status: Option<&str>) -> PatientCaseRecord {
        PatientCaseRecord {
            case_id,
            patient_name: format!("Paciente {}", case_id),
            patient_external_id: format!("{:08}", case_id),
            status_code: status.map(str::to_string),
            current_handler_id: 1,
            appointment_time: None,
        }
    }

    #[test]
    fn test_known_codes() {
        let classifier = CategoryClassifier::new();
        assert_eq!(classifier.classify_code(Some("Atendido")), Category::Seen);
        assert_eq!(classifier.classify_code(Some("Deserción")), Category::Closed);
        assert_eq!(classifier.classify_code(Some("CITADO")), Category::Scheduled);
        assert_eq!(classifier.classify_code(Some("no contesta")), Category::FollowUp);
        assert_eq!(classifier.classify_code(Some("Observado")), Category::Observed);
    }

    #[test]
    fn test_unknown_and_null_fall_back_to_pending() {
        let classifier = CategoryClassifier::new();
        assert_eq!(classifier.classify_code(None), Category::Pending);
        assert_eq!(classifier.classify_code(Some("")), Category::Pending);
        assert_eq!(classifier.classify_code(Some("¿¿??")), Category::Pending);
        assert_eq!(classifier.classify(&record(1, Some("SOMETHING_NEW"))), Category::Pending);
    }

    #[test]
    fn test_counts_sum_to_length() {
        let classifier = CategoryClassifier::new();
        let records = vec![
            record(1, Some("Atendido")),
            record(2, Some("Pendiente")),
            record(3, None),
            record(4, Some("Deserción")),
            record(5, Some("bogus")),
        ];

        let counts = classifier.count_by_category(&records);
        assert_eq!(counts.total, records.len());
        assert_eq!(counts.by_category.values().sum::<usize>(), records.len());
        assert_eq!(counts.get(Category::Pending), 3);
        assert_eq!(counts.get(Category::Seen), 1);
        assert_eq!(counts.get(Category::Closed), 1);
        assert!((counts.percent_complete() - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_counts() {
        let classifier = CategoryClassifier::new();
        let counts = classifier.count_by_category(&Vec::<PatientCaseRecord>::new());
        assert_eq!(counts.total, 0);
        assert_eq!(counts.by_category.len(), Category::ALL.len());
        assert_eq!(counts.percent_complete(), 0.0);
    }
}
