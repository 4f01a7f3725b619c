// ==========================================
// 数据值导入系统 - 分类组合引擎
// ==========================================
// 职责: 由有序分类生成笛卡尔积选项组合；按选项集合与已持久化组合对账；
//       分类组合结构校验；展示顺序排序
// 顺序: 最后一个分类变化最快（里程表顺序）
// 红线: 对账只追加，从不删除已持久化组合
// ==========================================

use crate::domain::category::{Category, CategoryCombo, CategoryOption, CategoryOptionCombo};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// 生成 11 位对象 UID（字母开头）
pub fn generate_uid() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("c{}", &hex[..10])
}

// ==========================================
// CombinationGenerator - 笛卡尔积迭代器
// ==========================================
// 任一轴为空或无轴时不产出
pub struct CombinationGenerator<'a, T> {
    axes: Vec<&'a [T]>,
    indices: Vec<usize>,
    exhausted: bool,
}

impl<'a, T> CombinationGenerator<'a, T> {
    pub fn new(axes: Vec<&'a [T]>) -> Self {
        let exhausted = axes.is_empty() || axes.iter().any(|axis| axis.is_empty());
        let indices = vec![0; axes.len()];
        Self {
            axes,
            indices,
            exhausted,
        }
    }
}

impl<'a, T> Iterator for CombinationGenerator<'a, T> {
    type Item = Vec<&'a T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let current: Vec<&'a T> = self
            .axes
            .iter()
            .zip(&self.indices)
            .map(|(axis, &i)| &axis[i])
            .collect();

        // 从最后一轴开始进位
        let mut pos = self.axes.len();
        loop {
            if pos == 0 {
                self.exhausted = true;
                break;
            }
            pos -= 1;
            self.indices[pos] += 1;
            if self.indices[pos] < self.axes[pos].len() {
                break;
            }
            self.indices[pos] = 0;
        }

        Some(current)
    }
}

// ==========================================
// 生成结果与校验违规
// ==========================================

/// 一个生成的选项组合（尚未持久化）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCombination {
    pub option_uids: BTreeSet<String>,
    /// 选项名按分类顺序以 ", " 连接
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComboViolation {
    #[error("分类组合未包含任何分类")]
    NoCategories,

    #[error("分类重复: {0}")]
    DuplicateCategory(String),

    #[error("分类没有任何选项: {0}")]
    EmptyCategory(String),

    #[error("选项 {option} 同时属于分类 {first} 与 {second}")]
    SharedOption {
        option: String,
        first: String,
        second: String,
    },
}

// ==========================================
// CategoryCombinationEngine
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryCombinationEngine;

impl CategoryCombinationEngine {
    pub fn new() -> Self {
        Self
    }

    /// 生成全部选项组合（确定性顺序）
    pub fn generate_combinations(&self, categories: &[Category]) -> Vec<GeneratedCombination> {
        let axes: Vec<&[CategoryOption]> = categories.iter().map(|c| c.options.as_slice()).collect();
        CombinationGenerator::new(axes)
            .map(|options| GeneratedCombination {
                option_uids: options.iter().map(|o| o.uid.clone()).collect(),
                name: options
                    .iter()
                    .map(|o| o.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect()
    }

    /// 对账: 返回需要新建的组合（保持生成顺序）
    ///
    /// 已持久化组合按选项集合匹配，匹配上的保持不变
    pub fn reconcile(
        &self,
        combo: &CategoryCombo,
        generated: Vec<GeneratedCombination>,
    ) -> Vec<CategoryOptionCombo> {
        let persisted: HashSet<&BTreeSet<String>> =
            combo.option_combos.iter().map(|c| c.option_key()).collect();

        let missing: Vec<CategoryOptionCombo> = generated
            .into_iter()
            .filter(|g| !persisted.contains(&g.option_uids))
            .map(|g| CategoryOptionCombo {
                id: 0,
                uid: generate_uid(),
                code: None,
                name: g.name,
                category_combo_id: combo.id,
                options: g.option_uids,
            })
            .collect();

        if !missing.is_empty() {
            info!(
                category_combo = %combo.uid,
                added = missing.len(),
                persisted = combo.option_combos.len(),
                "分类组合存在缺失的选项组合"
            );
        }
        missing
    }

    /// 分类组合结构校验，返回全部违规
    pub fn validate(&self, combo: &CategoryCombo) -> Vec<ComboViolation> {
        let mut violations = Vec::new();

        if combo.categories.is_empty() {
            violations.push(ComboViolation::NoCategories);
            return violations;
        }

        let mut seen_categories = HashSet::new();
        let mut option_owner: HashMap<&str, &str> = HashMap::new();

        for category in &combo.categories {
            if !seen_categories.insert(category.uid.as_str()) {
                violations.push(ComboViolation::DuplicateCategory(category.uid.clone()));
                continue;
            }
            if category.options.is_empty() {
                violations.push(ComboViolation::EmptyCategory(category.uid.clone()));
            }
            for option in &category.options {
                if let Some(first) = option_owner.insert(option.uid.as_str(), category.uid.as_str()) {
                    if first != category.uid {
                        violations.push(ComboViolation::SharedOption {
                            option: option.uid.clone(),
                            first: first.to_string(),
                            second: category.uid.clone(),
                        });
                    }
                }
            }
        }

        violations
    }

    /// 已持久化组合按生成顺序排列（展示顺序），未生成的组合不出现
    pub fn sorted_option_combos(&self, combo: &CategoryCombo) -> Vec<CategoryOptionCombo> {
        let by_options: HashMap<&BTreeSet<String>, &CategoryOptionCombo> =
            combo.option_combos.iter().map(|c| (c.option_key(), c)).collect();

        self.generate_combinations(&combo.categories)
            .into_iter()
            .filter_map(|g| by_options.get(&g.option_uids).map(|c| (*c).clone()))
            .collect()
    }
}
