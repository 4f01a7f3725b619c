// ==========================================
// 数据值导入系统 - 导入选项与生效策略
// ==========================================
// 职责: 调用方导入选项（策略对象） + 集合级覆盖 + 系统设置合并
// 优先级: 记录级 > 集合级 > 导入选项 > 默认值（UID）
// ==========================================

use crate::config::settings_manager::SystemImportSettings;
use crate::domain::data_value::{DataValueRecord, DataValueSetHeader};
use crate::domain::types::{IdScheme, ImportStrategy};
use serde::{Deserialize, Serialize};

/// 默认刷写阈值
pub const DEFAULT_BATCH_SIZE: usize = 1000;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

// ==========================================
// ImportOptions - 导入选项
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportOptions {
    pub id_scheme: IdScheme,
    pub data_element_id_scheme: Option<IdScheme>,
    #[serde(alias = "organisationUnitIdScheme")]
    pub org_unit_id_scheme: Option<IdScheme>,
    #[serde(alias = "importStrategy")]
    pub strategy: ImportStrategy,
    pub dry_run: bool,
    pub skip_existing_check: bool,

    // ===== 严格模式 =====
    pub strict_periods: bool,
    pub strict_category_option_combos: bool,
    pub strict_attribute_option_combos: bool,
    pub strict_organisation_units: bool,

    // ===== 必填选项组合 =====
    pub require_category_option_combo: bool,
    pub require_attribute_option_combo: bool,

    /// 流读取前预加载全部数据元 / 组织机构
    pub preheat_cache: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            id_scheme: IdScheme::Uid,
            data_element_id_scheme: None,
            org_unit_id_scheme: None,
            strategy: ImportStrategy::CreateAndUpdate,
            dry_run: false,
            skip_existing_check: false,
            strict_periods: false,
            strict_category_option_combos: false,
            strict_attribute_option_combos: false,
            strict_organisation_units: false,
            require_category_option_combo: false,
            require_attribute_option_combo: false,
            preheat_cache: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ImportOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: ImportStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

// ==========================================
// EffectivePolicy - 单次导入的生效策略
// ==========================================
// 严格 / 必填开关 = 导入选项 OR 系统设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectivePolicy {
    pub id_scheme: IdScheme,
    pub data_element_id_scheme: Option<IdScheme>,
    pub org_unit_id_scheme: Option<IdScheme>,
    pub strategy: ImportStrategy,
    pub dry_run: bool,
    pub skip_existing_check: bool,
    pub strict_periods: bool,
    pub strict_category_option_combos: bool,
    pub strict_attribute_option_combos: bool,
    pub strict_organisation_units: bool,
    pub require_category_option_combo: bool,
    pub require_attribute_option_combo: bool,
    pub preheat_cache: bool,
    pub batch_size: usize,
}

impl EffectivePolicy {
    /// 合并集合级上下文、导入选项与系统设置
    pub fn resolve(
        header: &DataValueSetHeader,
        options: &ImportOptions,
        settings: &SystemImportSettings,
    ) -> Self {
        Self {
            id_scheme: header.id_scheme.unwrap_or(options.id_scheme),
            data_element_id_scheme: header.data_element_id_scheme.or(options.data_element_id_scheme),
            org_unit_id_scheme: header.org_unit_id_scheme.or(options.org_unit_id_scheme),
            strategy: header.strategy.unwrap_or(options.strategy),
            dry_run: header.dry_run.unwrap_or(options.dry_run),
            skip_existing_check: options.skip_existing_check,
            strict_periods: options.strict_periods || settings.strict_periods,
            strict_category_option_combos: options.strict_category_option_combos
                || settings.strict_category_option_combos,
            strict_attribute_option_combos: options.strict_attribute_option_combos
                || settings.strict_attribute_option_combos,
            strict_organisation_units: options.strict_organisation_units
                || settings.strict_organisation_units,
            require_category_option_combo: options.require_category_option_combo
                || settings.require_category_option_combo,
            require_attribute_option_combo: options.require_attribute_option_combo
                || settings.require_attribute_option_combo,
            preheat_cache: options.preheat_cache,
            batch_size: options.batch_size.max(1),
        }
    }

    // ==========================================
    // 标识方案链
    // ==========================================
    // 专用方案（记录 > 集合）优先于通用方案（记录 > 集合 > UID）

    /// 集合级数据元方案（预热用）
    pub fn set_data_element_scheme(&self) -> IdScheme {
        self.data_element_id_scheme.unwrap_or(self.id_scheme)
    }

    /// 集合级组织机构方案（外层组织机构 / 预热用）
    pub fn set_org_unit_scheme(&self) -> IdScheme {
        self.org_unit_id_scheme.unwrap_or(self.id_scheme)
    }

    pub fn data_element_scheme_for(&self, record: &DataValueRecord) -> IdScheme {
        record
            .data_element_id_scheme
            .or(self.data_element_id_scheme)
            .or(record.id_scheme)
            .unwrap_or(self.id_scheme)
    }

    pub fn org_unit_scheme_for(&self, record: &DataValueRecord) -> IdScheme {
        record
            .org_unit_id_scheme
            .or(self.org_unit_id_scheme)
            .or(record.id_scheme)
            .unwrap_or(self.id_scheme)
    }

    /// 通用方案（分类选项组合 / 属性选项组合）
    pub fn generic_scheme_for(&self, record: &DataValueRecord) -> IdScheme {
        record.id_scheme.unwrap_or(self.id_scheme)
    }
}
