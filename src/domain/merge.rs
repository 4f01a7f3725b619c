// ==========================================
// 数据值导入系统 - 元数据合并
// ==========================================
// 职责: 已持久化对象与传入对象的显式逐字段合并
// 模式: REPLACE 覆盖全部字段；MERGE 只覆盖传入对象给出的字段
// 红线: 内部 ID 永不被覆盖
// ==========================================

use crate::domain::category::{Category, CategoryCombo};
use crate::domain::metadata::{DataElement, DataSet, OrganisationUnit};
use crate::domain::types::MergeMode;

pub trait Mergeable {
    fn merge_from(&mut self, incoming: &Self, mode: MergeMode);
}

// ===== 字段合并辅助 =====

fn merge_string(target: &mut String, incoming: &str, mode: MergeMode) {
    if mode == MergeMode::Replace || !incoming.is_empty() {
        *target = incoming.to_string();
    }
}

fn merge_option<T: Clone>(target: &mut Option<T>, incoming: &Option<T>, mode: MergeMode) {
    if mode == MergeMode::Replace || incoming.is_some() {
        *target = incoming.clone();
    }
}

fn merge_vec<T: Clone>(target: &mut Vec<T>, incoming: &[T], mode: MergeMode) {
    if mode == MergeMode::Replace || !incoming.is_empty() {
        *target = incoming.to_vec();
    }
}

/// 外键 ID: 0 视为未给出
fn merge_ref(target: &mut i64, incoming: i64, mode: MergeMode) {
    if mode == MergeMode::Replace || incoming != 0 {
        *target = incoming;
    }
}

impl Mergeable for DataElement {
    fn merge_from(&mut self, incoming: &Self, mode: MergeMode) {
        merge_string(&mut self.uid, &incoming.uid, mode);
        merge_option(&mut self.code, &incoming.code, mode);
        merge_string(&mut self.name, &incoming.name, mode);
        self.value_type = incoming.value_type;
        self.domain_type = incoming.domain_type;
        merge_ref(&mut self.category_combo_id, incoming.category_combo_id, mode);
        self.zero_is_significant = incoming.zero_is_significant;
        merge_vec(&mut self.aggregation_levels, &incoming.aggregation_levels, mode);
        merge_option(&mut self.option_set, &incoming.option_set, mode);
    }
}

impl Mergeable for Category {
    fn merge_from(&mut self, incoming: &Self, mode: MergeMode) {
        merge_string(&mut self.uid, &incoming.uid, mode);
        merge_option(&mut self.code, &incoming.code, mode);
        merge_string(&mut self.name, &incoming.name, mode);
        merge_vec(&mut self.options, &incoming.options, mode);
    }
}

impl Mergeable for CategoryCombo {
    /// option_combos 由组合引擎维护，不参与合并
    fn merge_from(&mut self, incoming: &Self, mode: MergeMode) {
        merge_string(&mut self.uid, &incoming.uid, mode);
        merge_option(&mut self.code, &incoming.code, mode);
        merge_string(&mut self.name, &incoming.name, mode);
        self.skip_total = incoming.skip_total;
        merge_vec(&mut self.categories, &incoming.categories, mode);
    }
}

impl Mergeable for OrganisationUnit {
    /// path 由仓储按父节点派生
    fn merge_from(&mut self, incoming: &Self, mode: MergeMode) {
        merge_string(&mut self.uid, &incoming.uid, mode);
        merge_option(&mut self.code, &incoming.code, mode);
        merge_string(&mut self.name, &incoming.name, mode);
        merge_option(&mut self.parent_id, &incoming.parent_id, mode);
    }
}

impl Mergeable for DataSet {
    fn merge_from(&mut self, incoming: &Self, mode: MergeMode) {
        merge_string(&mut self.uid, &incoming.uid, mode);
        merge_option(&mut self.code, &incoming.code, mode);
        merge_string(&mut self.name, &incoming.name, mode);
        self.period_type = incoming.period_type;
        merge_ref(&mut self.category_combo_id, incoming.category_combo_id, mode);
        self.open_future_periods = incoming.open_future_periods;
        merge_vec(&mut self.data_element_ids, &incoming.data_element_ids, mode);
        merge_vec(&mut self.source_ids, &incoming.source_ids, mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::category::CategoryOption;
    use crate::domain::types::{DomainType, PeriodType, ValueType};

    fn create_test_element() -> DataElement {
        DataElement {
            id: 5,
            uid: "DE1".to_string(),
            code: Some("C1".to_string()),
            name: "Doses".to_string(),
            value_type: ValueType::Integer,
            domain_type: DomainType::Aggregate,
            category_combo_id: 1,
            zero_is_significant: false,
            aggregation_levels: vec![2, 3],
            option_set: None,
        }
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut persisted = create_test_element();
        let incoming = DataElement {
            id: 0,
            uid: String::new(),
            code: None,
            name: "Doses given".to_string(),
            category_combo_id: 0,
            aggregation_levels: Vec::new(),
            ..create_test_element()
        };
        persisted.merge_from(&incoming, MergeMode::Merge);

        assert_eq!(persisted.id, 5);
        assert_eq!(persisted.uid, "DE1");
        assert_eq!(persisted.code.as_deref(), Some("C1"));
        assert_eq!(persisted.name, "Doses given");
        assert_eq!(persisted.category_combo_id, 1);
        assert_eq!(persisted.aggregation_levels, vec![2, 3]);
    }

    #[test]
    fn test_replace_overwrites_everything_but_id() {
        let mut persisted = create_test_element();
        let incoming = DataElement {
            id: 0,
            code: None,
            aggregation_levels: Vec::new(),
            ..create_test_element()
        };
        persisted.merge_from(&incoming, MergeMode::Replace);

        assert_eq!(persisted.id, 5);
        assert!(persisted.code.is_none());
        assert!(persisted.aggregation_levels.is_empty());
    }

    #[test]
    fn test_category_combo_merge_ignores_option_combos() {
        let mut persisted = CategoryCombo::new(
            "CC",
            "Sex",
            vec![Category::new("SEX", "Sex", vec![CategoryOption::new("M", "Male")])],
        );
        let incoming = CategoryCombo::new("CC", "", Vec::new());
        persisted.merge_from(&incoming, MergeMode::Merge);
        assert_eq!(persisted.name, "Sex");
        assert_eq!(persisted.categories.len(), 1);
    }

    #[test]
    fn test_data_set_merge() {
        let mut persisted = DataSet {
            id: 1,
            uid: "DS1".to_string(),
            code: None,
            name: "Monthly".to_string(),
            period_type: PeriodType::Monthly,
            category_combo_id: 1,
            open_future_periods: 0,
            data_element_ids: vec![1],
            source_ids: vec![2],
        };
        let incoming = DataSet {
            open_future_periods: 2,
            source_ids: Vec::new(),
            ..persisted.clone()
        };
        persisted.merge_from(&incoming, MergeMode::Merge);
        assert_eq!(persisted.open_future_periods, 2);
        assert_eq!(persisted.source_ids, vec![2]);
    }
}
