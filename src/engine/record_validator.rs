// ==========================================
// 数据值导入系统 - 记录校验器
// ==========================================
// 职责: 单条记录的校验状态机
// 终态: Staged（可落库） / Conflict（一条冲突） / Skipped（静默跳过）
// 红线: 步骤严格按序执行，首个失败步骤产出恰好一条冲突；不写存储
// ==========================================

use crate::config::import_options::EffectivePolicy;
use crate::domain::category::CategoryOptionCombo;
use crate::domain::data_value::{
    trim_to_none, DataValue, DataValueKey, DataValueRecord, ImportConflict,
};
use crate::domain::metadata::{OrganisationUnit, Period};
use crate::engine::collaborators::HierarchyOracle;
use crate::engine::metadata_resolver::MetadataResolver;
use crate::engine::value_validation::ValueValidator;
use crate::repository::error::RepositoryResult;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::sync::Arc;

// ==========================================
// 校验结果
// ==========================================

/// 通过校验、等待落库的数据值
#[derive(Debug, Clone, PartialEq)]
pub struct StagedValue {
    pub value: DataValue,
    /// 空值标记: 覆盖已存在行时为逻辑删除
    pub is_delete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Staged(StagedValue),
    Conflict(ImportConflict),
    Skipped,
}

// ==========================================
// ValidationContext - 单次导入内不变的上下文
// ==========================================
pub struct ValidationContext<'a> {
    pub policy: &'a EffectivePolicy,
    /// 集合级周期 / 组织机构 / 属性选项组合（记录未提供时使用）
    pub outer_period: Option<&'a Period>,
    pub outer_org_unit: Option<&'a OrganisationUnit>,
    pub outer_attribute_option_combo: Option<&'a CategoryOptionCombo>,
    pub current_user: &'a str,
    pub user_roots: &'a [String],
    pub today: NaiveDate,
    pub now: NaiveDateTime,
}

// ==========================================
// RecordValidator
// ==========================================
pub struct RecordValidator {
    hierarchy: Arc<dyn HierarchyOracle>,
    validator: Arc<dyn ValueValidator>,
}

impl RecordValidator {
    pub fn new(hierarchy: Arc<dyn HierarchyOracle>, validator: Arc<dyn ValueValidator>) -> Self {
        Self { hierarchy, validator }
    }

    /// 校验一条记录
    ///
    /// # 返回
    /// - `Ok(RecordOutcome)`: 记录级结果（冲突不是错误）
    /// - `Err(...)`: 元数据存储不可用
    pub fn validate(
        &self,
        resolver: &mut MetadataResolver,
        ctx: &ValidationContext<'_>,
        record: &DataValueRecord,
    ) -> RepositoryResult<RecordOutcome> {
        let policy = ctx.policy;

        // ===== 1. 解析数据元 / 周期 / 组织机构 =====
        let data_element =
            match resolver.resolve_data_element(policy.data_element_scheme_for(record), record.data_element.as_deref())? {
                Some(de) => de,
                None => {
                    return Ok(conflict(
                        raw_or_empty(record.data_element.as_deref()),
                        "数据元不存在或无法解析",
                    ))
                }
            };

        let period = match trim_to_none(record.period.as_deref()) {
            Some(_) => resolver.resolve_period(record.period.as_deref()),
            None => ctx.outer_period.cloned(),
        };
        let period = match period {
            Some(p) => p,
            None => return Ok(conflict(raw_or_empty(record.period.as_deref()), "周期无效或缺失")),
        };

        let org_unit = match trim_to_none(record.org_unit.as_deref()) {
            Some(_) => resolver
                .resolve_organisation_unit(policy.org_unit_scheme_for(record), record.org_unit.as_deref())?,
            None => ctx.outer_org_unit.cloned(),
        };
        let org_unit = match org_unit {
            Some(ou) => ou,
            None => {
                return Ok(conflict(
                    raw_or_empty(record.org_unit.as_deref()),
                    "组织机构不存在或无法解析",
                ))
            }
        };

        // ===== 2. 用户层级 =====
        if !resolver.is_in_user_hierarchy(self.hierarchy.as_ref(), &org_unit, ctx.user_roots) {
            return Ok(conflict(
                org_unit.uid.clone(),
                format!("组织机构不在当前用户层级内: {}", ctx.current_user),
            ));
        }

        // ===== 3. 未来周期 =====
        if period.is_future(ctx.today) && !resolver.allows_future_periods(&data_element)? {
            return Ok(conflict(
                period.iso.clone(),
                format!("数据元所属数据集不允许未来周期: {}", data_element.uid),
            ));
        }

        // ===== 4. 静默跳过 =====
        if record.is_value_and_comment_absent() {
            return Ok(RecordOutcome::Skipped);
        }

        // ===== 5. 值格式 =====
        if let Some(reason) = self.validator.validate_value(record.value.as_deref(), &data_element) {
            return Ok(conflict(raw_or_empty(record.value.as_deref()), reason));
        }

        // ===== 6. 备注格式 =====
        if let Some(reason) = self.validator.validate_comment(record.comment.as_deref()) {
            return Ok(conflict(raw_or_empty(record.comment.as_deref()), reason));
        }

        // ===== 7. 分类选项组合 / 属性选项组合 =====
        let generic_scheme = policy.generic_scheme_for(record);

        let category_option_combo = match trim_to_none(record.category_option_combo.as_deref()) {
            Some(raw) => match resolver.resolve_option_combo(generic_scheme, Some(raw))? {
                Some(coc) => coc,
                None => return Ok(conflict(raw, "分类选项组合不存在或无法解析")),
            },
            None if policy.require_category_option_combo => {
                return Ok(conflict(data_element.uid.clone(), "缺少必填的分类选项组合"));
            }
            None => match resolver.default_option_combo()? {
                Some(coc) => coc,
                None => return Ok(conflict(data_element.uid.clone(), "系统默认分类选项组合不存在")),
            },
        };

        let attribute_option_combo = match trim_to_none(record.attribute_option_combo.as_deref()) {
            Some(raw) => match resolver.resolve_option_combo(generic_scheme, Some(raw))? {
                Some(aoc) => aoc,
                None => return Ok(conflict(raw, "属性选项组合不存在或无法解析")),
            },
            None => match ctx.outer_attribute_option_combo {
                Some(aoc) => aoc.clone(),
                None if policy.require_attribute_option_combo => {
                    return Ok(conflict(data_element.uid.clone(), "缺少必填的属性选项组合"));
                }
                None => match resolver.default_option_combo()? {
                    Some(aoc) => aoc,
                    None => {
                        return Ok(conflict(data_element.uid.clone(), "系统默认分类选项组合不存在"))
                    }
                },
            },
        };

        // ===== 8. 严格模式 =====
        if policy.strict_periods
            && !resolver
                .data_element_period_types(&data_element)?
                .contains(&period.period_type)
        {
            return Ok(conflict(
                period.iso.clone(),
                format!("周期类型 {} 不属于数据元允许的周期类型: {}", period.period_type, data_element.uid),
            ));
        }

        if policy.strict_category_option_combos
            && !resolver
                .data_element_option_combo_ids(&data_element)?
                .contains(&category_option_combo.id)
        {
            return Ok(conflict(
                category_option_combo.uid.clone(),
                format!("分类选项组合不属于数据元的分类组合: {}", data_element.uid),
            ));
        }

        if policy.strict_attribute_option_combos
            && !resolver
                .data_element_attribute_option_combo_ids(&data_element)?
                .contains(&attribute_option_combo.id)
        {
            return Ok(conflict(
                attribute_option_combo.uid.clone(),
                format!("属性选项组合不属于数据元所在数据集的分类组合: {}", data_element.uid),
            ));
        }

        if policy.strict_organisation_units && !resolver.is_data_element_assigned(&data_element, &org_unit)? {
            return Ok(conflict(
                org_unit.uid.clone(),
                format!("数据元未经数据集分配给该组织机构: {}", data_element.uid),
            ));
        }

        // ===== 9. 零值有效性 =====
        if self
            .validator
            .is_zero_and_insignificant(record.value.as_deref(), &data_element)
        {
            return Ok(conflict(
                raw_or_empty(record.value.as_deref()),
                format!("数据元不保存零值，该值未导入: {}", data_element.uid),
            ));
        }

        // ===== 10. 录入人 =====
        if let Some(reason) = self.validator.validate_stored_by(record.stored_by.as_deref()) {
            return Ok(conflict(raw_or_empty(record.stored_by.as_deref()), reason));
        }
        let stored_by = trim_to_none(record.stored_by.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| ctx.current_user.to_string());

        // ===== 11. 构建内部数据值 =====
        let value = DataValue {
            key: DataValueKey {
                data_element_id: data_element.id,
                period: period.iso.clone(),
                org_unit_id: org_unit.id,
                category_option_combo_id: category_option_combo.id,
                attribute_option_combo_id: attribute_option_combo.id,
            },
            value: trim_to_none(record.value.as_deref()).map(str::to_string),
            comment: trim_to_none(record.comment.as_deref()).map(str::to_string),
            stored_by,
            created: parse_timestamp(record.created.as_deref()).unwrap_or(ctx.now),
            last_updated: parse_timestamp(record.last_updated.as_deref()).unwrap_or(ctx.now),
            followup: record.followup.unwrap_or(false),
        };
        let is_delete = value.is_null_value();

        Ok(RecordOutcome::Staged(StagedValue { value, is_delete }))
    }
}

fn conflict(object: impl Into<String>, message: impl Into<String>) -> RecordOutcome {
    RecordOutcome::Conflict(ImportConflict::new(object, message))
}

fn raw_or_empty(raw: Option<&str>) -> String {
    raw.unwrap_or_default().to_string()
}

/// 宽松时间戳解析: RFC3339 / 本地日期时间 / 纯日期
pub fn parse_timestamp(raw: Option<&str>) -> Option<NaiveDateTime> {
    let raw = trim_to_none(raw)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
