// ==========================================
// 数据值导入系统 - 分类维度领域模型
// ==========================================
// 职责: 分类选项 / 分类 / 分类组合 / 分类选项组合
// 红线: 分类选项组合的匹配身份是"选项集合"，与插入顺序无关
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 保留名称: 默认分类组合 / 默认分类 / 默认选项
pub const DEFAULT_NAME: &str = "default";

// ==========================================
// CategoryOption - 分类选项
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOption {
    pub id: i64,
    pub uid: String,
    pub code: Option<String>,
    pub name: String,
}

impl CategoryOption {
    pub fn new(uid: &str, name: &str) -> Self {
        Self {
            id: 0,
            uid: uid.to_string(),
            code: None,
            name: name.to_string(),
        }
    }
}

// ==========================================
// Category - 分类（分解轴）
// ==========================================
// options 有序
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub uid: String,
    pub code: Option<String>,
    pub name: String,
    pub options: Vec<CategoryOption>,
}

impl Category {
    pub fn new(uid: &str, name: &str, options: Vec<CategoryOption>) -> Self {
        Self {
            id: 0,
            uid: uid.to_string(),
            code: None,
            name: name.to_string(),
            options,
        }
    }

    pub fn option_uids(&self) -> BTreeSet<String> {
        self.options.iter().map(|o| o.uid.clone()).collect()
    }
}

// ==========================================
// CategoryCombo - 分类组合
// ==========================================
// 约束: categories 非空、无重复; 每个分类至少一个选项; 不同分类间选项不相交
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCombo {
    pub id: i64,
    pub uid: String,
    pub code: Option<String>,
    pub name: String,
    pub skip_total: bool,
    pub categories: Vec<Category>,
    pub option_combos: Vec<CategoryOptionCombo>,
}

impl CategoryCombo {
    pub fn new(uid: &str, name: &str, categories: Vec<Category>) -> Self {
        Self {
            id: 0,
            uid: uid.to_string(),
            code: None,
            name: name.to_string(),
            skip_total: false,
            categories,
            option_combos: Vec::new(),
        }
    }

    /// 是否为保留的默认组合
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_NAME
    }

    pub fn has_option_combos(&self) -> bool {
        !self.option_combos.is_empty()
    }

    /// 所有分类的选项（按分类顺序展开）
    pub fn category_options(&self) -> Vec<&CategoryOption> {
        self.categories.iter().flat_map(|c| c.options.iter()).collect()
    }
}

// ==========================================
// CategoryOptionCombo - 分类选项组合
// ==========================================
// options: 选项 UID 集合（无序），每个分类恰好取一个
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOptionCombo {
    pub id: i64,
    pub uid: String,
    pub code: Option<String>,
    pub name: String,
    pub category_combo_id: i64,
    pub options: BTreeSet<String>,
}

impl CategoryOptionCombo {
    /// 匹配身份: 选项集合
    pub fn option_key(&self) -> &BTreeSet<String> {
        &self.options
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_NAME
    }
}
