//! 批量操作的病例选择集

use caseload_core::CaseId;
use std::collections::{BTreeSet, HashSet};

/// 选择集
///
/// 会话开始时为空，提交成功或关闭对话框时清空。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    selected: BTreeSet<CaseId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 切换单个病例；不在可见列表中的ID被忽略
    ///
    /// 返回操作后该病例是否被选中。
    pub fn toggle(&mut self, case_id: CaseId, visible: &[CaseId]) -> bool {
        if !visible.contains(&case_id) {
            tracing::debug!("Ignoring toggle of case {} which is not visible", case_id);
            return self.selected.contains(&case_id);
        }

        if !self.selected.remove(&case_id) {
            self.selected.insert(case_id);
            return true;
        }
        false
    }

    /// "全选"开关：可见项已全部选中时取消选中这些项，否则全部选中
    pub fn select_all(&mut self, visible: &[CaseId]) {
        if visible.is_empty() {
            return;
        }

        if self.all_selected(visible) {
            for case_id in visible {
                self.selected.remove(case_id);
            }
        } else {
            self.selected.extend(visible.iter().copied());
        }
    }

    /// 可见项是否已全部选中（空列表视为否）
    pub fn all_selected(&self, visible: &[CaseId]) -> bool {
        !visible.is_empty() && visible.iter().all(|case_id| self.selected.contains(case_id))
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, case_id: CaseId) -> bool {
        self.selected.contains(&case_id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// 与最新快照取交集，返回被丢弃的ID数量
    pub fn retain_known(&mut self, snapshot_ids: &HashSet<CaseId>) -> usize {
        let before = self.selected.len();
        self.selected.retain(|case_id| snapshot_ids.contains(case_id));
        let dropped = before - self.selected.len();
        if dropped > 0 {
            tracing::debug!("Dropped {} stale case ids from selection", dropped);
        }
        dropped
    }

    /// 升序排列的病例ID
    pub fn ids(&self) -> Vec<CaseId> {
        self.selected.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_one() {
        let mut selection = SelectionSet::new();
        let visible = [1, 2, 3];
        assert!(selection.toggle(2, &visible));
        assert!(selection.is_selected(2));
        assert!(!selection.toggle(2, &visible));
        assert!(selection.is_empty());
    }

    #[test]
    fn test_toggle_invisible_is_ignored() {
        let mut selection = SelectionSet::new();
        assert!(!selection.toggle(9, &[1, 2]));
        assert!(selection.is_empty());
    }

    #[test]
    fn test_select_all_twice_returns_to_empty() {
        let mut selection = SelectionSet::new();
        let visible = [4, 5, 6];
        selection.select_all(&visible);
        assert_eq!(selection.len(), 3);
        selection.select_all(&visible);
        assert!(selection.is_empty());
    }

    #[test]
    fn test_select_all_only_deselects_visible() {
        let mut selection = SelectionSet::new();
        selection.toggle(1, &[1, 2, 3]);
        selection.select_all(&[2, 3]);
        assert_eq!(selection.ids(), vec![1, 2, 3]);
        selection.select_all(&[2, 3]);
        assert_eq!(selection.ids(), vec![1]);
    }

    #[test]
    fn test_partial_selection_completes_on_select_all() {
        let mut selection = SelectionSet::new();
        selection.toggle(2, &[1, 2, 3]);
        selection.select_all(&[1, 2, 3]);
        assert_eq!(selection.len(), 3);
    }

    #[test]
    fn test_retain_known() {
        let mut selection = SelectionSet::new();
        selection.select_all(&[1, 2, 3]);
        let snapshot: HashSet<CaseId> = [2, 3, 4].into_iter().collect();
        assert_eq!(selection.retain_known(&snapshot), 1);
        assert_eq!(selection.ids(), vec![2, 3]);
    }
}
