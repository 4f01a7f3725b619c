// ==========================================
// 数据值导入系统 - 数据值领域模型
// ==========================================
// 职责: 外部输入记录 / 集合级上下文 / 内部数据值 / 完成登记 / 导入汇总
// 红线: 数据值自然键 (数据元, 周期, 组织机构, 分类选项组合, 属性选项组合) 唯一
// ==========================================

use crate::domain::types::{IdScheme, ImportStatus, ImportStrategy};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// DataValueRecord - 外部输入记录（每个数据值一条）
// ==========================================
// 所有引用均为松散标识，由 MetadataResolver 按标识方案解析
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValueRecord {
    pub data_element: Option<String>,
    pub period: Option<String>,
    #[serde(alias = "organisationUnit")]
    pub org_unit: Option<String>,
    pub category_option_combo: Option<String>,
    pub attribute_option_combo: Option<String>,
    pub value: Option<String>,
    pub comment: Option<String>,
    pub stored_by: Option<String>,
    pub created: Option<String>,
    pub last_updated: Option<String>,
    pub followup: Option<bool>,

    // ===== 记录级标识方案（优先于集合级）=====
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_scheme: Option<IdScheme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_element_id_scheme: Option<IdScheme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_unit_id_scheme: Option<IdScheme>,
}

impl DataValueRecord {
    /// value 与 comment 均未提供
    pub fn is_value_and_comment_absent(&self) -> bool {
        self.value.is_none() && self.comment.is_none()
    }
}

// ==========================================
// DataValueSetHeader - 集合级上下文
// ==========================================
// 对每条记录生效，除非记录自身覆盖
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValueSetHeader {
    pub data_set: Option<String>,
    pub complete_date: Option<String>,
    pub period: Option<String>,
    #[serde(alias = "organisationUnit")]
    pub org_unit: Option<String>,
    pub attribute_option_combo: Option<String>,
    pub id_scheme: Option<IdScheme>,
    pub data_element_id_scheme: Option<IdScheme>,
    pub org_unit_id_scheme: Option<IdScheme>,
    pub dry_run: Option<bool>,
    #[serde(alias = "importStrategy")]
    pub strategy: Option<ImportStrategy>,
}

// ==========================================
// DataValueSetDocument - 完整数据值集合文档
// ==========================================
// 用途: JSON 输入 / 导出输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValueSetDocument {
    #[serde(flatten)]
    pub header: DataValueSetHeader,
    #[serde(default)]
    pub data_values: Vec<DataValueRecord>,
}

// ==========================================
// DataValueKey - 数据值自然键（内部 ID）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataValueKey {
    pub data_element_id: i64,
    pub period: String,
    pub org_unit_id: i64,
    pub category_option_combo_id: i64,
    pub attribute_option_combo_id: i64,
}

// ==========================================
// DataValue - 内部数据值（事实）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    pub key: DataValueKey,
    pub value: Option<String>,
    pub comment: Option<String>,
    pub stored_by: String,
    pub created: NaiveDateTime,
    pub last_updated: NaiveDateTime,
    pub followup: bool,
}

impl DataValue {
    /// 空值标记: value 与 comment 去空白后均为空
    ///
    /// 覆盖到已存在行上表示逻辑删除
    pub fn is_null_value(&self) -> bool {
        trim_to_none(self.value.as_deref()).is_none()
            && trim_to_none(self.comment.as_deref()).is_none()
    }
}

// ==========================================
// CompleteDataSetRegistration - 数据集完成登记
// ==========================================
// 自然键: (数据集, 周期, 组织机构, 属性选项组合)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteDataSetRegistration {
    pub id: i64,
    pub data_set_id: i64,
    pub period: String,
    pub org_unit_id: i64,
    pub attribute_option_combo_id: i64,
    pub date: NaiveDate,
    pub stored_by: String,
    pub accepted: bool,
}

// ==========================================
// ImportConflict - 记录级冲突
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConflict {
    /// 冲突对象（通常为出错的原始值）
    pub object: String,
    /// 冲突原因
    pub message: String,
}

impl ImportConflict {
    pub fn new(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            message: message.into(),
        }
    }
}

// ==========================================
// ImportCount - 计数
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCount {
    pub imported: usize,
    pub updated: usize,
    pub ignored: usize,
    pub deleted: usize,
}

// ==========================================
// ImportSummary - 导入汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub status: ImportStatus,
    pub description: String,
    #[serde(rename = "counts")]
    pub import_count: ImportCount,
    /// 扫描记录总数（含静默跳过）
    pub scanned: usize,
    pub conflicts: Vec<ImportConflict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_applied: Option<NaiveDate>,
}

impl ImportSummary {
    /// 结构性失败: 零记录处理
    pub fn error(description: impl Into<String>, conflicts: Vec<ImportConflict>) -> Self {
        Self {
            status: ImportStatus::Error,
            description: description.into(),
            import_count: ImportCount::default(),
            scanned: 0,
            conflicts,
            completion_applied: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ImportStatus::Success
    }
}

// ==========================================
// DataExportParams - 导出参数
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataExportParams {
    pub data_sets: Vec<String>,
    pub periods: Vec<String>,
    pub org_units: Vec<String>,
}

impl DataExportParams {
    /// 校验导出参数，返回第一个违规原因
    pub fn validate(&self) -> Result<(), String> {
        if self.data_sets.is_empty() {
            return Err("至少需要指定一个有效数据集".to_string());
        }
        if self.periods.is_empty() {
            return Err("至少需要指定一个有效周期".to_string());
        }
        if self.org_units.is_empty() {
            return Err("至少需要指定一个有效组织机构".to_string());
        }
        Ok(())
    }
}

/// 去除首尾空白，空串视为缺失
pub fn trim_to_none(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
