// ==========================================
// 数据值导入系统 - 元数据解析器
// ==========================================
// 职责: 按标识方案把外部标识解析为领域对象，并记忆派生谓词
// 红线: 缓存作用域 = 一次导入；未找到也记忆
// 键: (标识方案, 去空白后的原始标识)
// ==========================================

use crate::domain::category::CategoryOptionCombo;
use crate::domain::data_value::trim_to_none;
use crate::domain::metadata::{DataElement, DataSet, OrganisationUnit, Period};
use crate::domain::types::{IdScheme, PeriodType};
use crate::engine::collaborators::{HierarchyOracle, MetadataLookup};
use crate::engine::lookup_cache::{LookupCache, PredicateCache};
use crate::repository::error::RepositoryResult;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

type SchemeKey = (IdScheme, String);

/// 外部标识在某方案下对应的属性值
fn scheme_value(scheme: IdScheme, id: i64, uid: &str, code: Option<&str>, name: &str) -> Option<String> {
    match scheme {
        IdScheme::Uid => Some(uid.to_string()),
        IdScheme::Code => code.map(str::to_string),
        IdScheme::Name => Some(name.to_string()),
        IdScheme::Id => Some(id.to_string()),
    }
}

// ==========================================
// MetadataResolver - 单次导入的元数据解析器
// ==========================================
pub struct MetadataResolver {
    lookup: Arc<dyn MetadataLookup>,

    // ===== 对象缓存 =====
    data_elements: LookupCache<SchemeKey, DataElement>,
    org_units: LookupCache<SchemeKey, OrganisationUnit>,
    option_combos: LookupCache<SchemeKey, CategoryOptionCombo>,
    data_sets: LookupCache<SchemeKey, DataSet>,
    periods: LookupCache<String, Period>,
    default_option_combo: LookupCache<(), CategoryOptionCombo>,

    // ===== 派生谓词缓存 =====
    period_types: PredicateCache<i64, BTreeSet<PeriodType>>,
    category_option_combo_ids: PredicateCache<i64, HashSet<i64>>,
    attribute_option_combo_ids: PredicateCache<i64, HashSet<i64>>,
    org_unit_assignment: PredicateCache<(i64, i64), bool>,
    open_future_periods: PredicateCache<i64, bool>,
    in_hierarchy: PredicateCache<i64, bool>,
}

impl MetadataResolver {
    pub fn new(lookup: Arc<dyn MetadataLookup>) -> Self {
        Self {
            lookup,
            data_elements: LookupCache::new(),
            org_units: LookupCache::new(),
            option_combos: LookupCache::new(),
            data_sets: LookupCache::new(),
            periods: LookupCache::new(),
            default_option_combo: LookupCache::new(),
            period_types: PredicateCache::new(),
            category_option_combo_ids: PredicateCache::new(),
            attribute_option_combo_ids: PredicateCache::new(),
            org_unit_assignment: PredicateCache::new(),
            open_future_periods: PredicateCache::new(),
            in_hierarchy: PredicateCache::new(),
        }
    }

    /// 缓存预热: 按集合级方案一次性加载全部数据元与组织机构
    pub fn preheat(&mut self, data_element_scheme: IdScheme, org_unit_scheme: IdScheme) -> RepositoryResult<()> {
        let elements = self.lookup.all_data_elements()?;
        let element_count = elements.len();
        for de in elements {
            if let Some(key) = scheme_value(data_element_scheme, de.id, &de.uid, de.code.as_deref(), &de.name) {
                self.data_elements.insert_found((data_element_scheme, key), de);
            }
        }

        let units = self.lookup.all_organisation_units()?;
        let unit_count = units.len();
        for ou in units {
            if let Some(key) = scheme_value(org_unit_scheme, ou.id, &ou.uid, ou.code.as_deref(), &ou.name) {
                self.org_units.insert_found((org_unit_scheme, key), ou);
            }
        }

        debug!(
            data_elements = element_count,
            org_units = unit_count,
            "元数据缓存预热完成"
        );
        Ok(())
    }

    // ==========================================
    // 对象解析
    // ==========================================
    // 空白标识直接返回 None，不触发查找

    pub fn resolve_data_element(
        &mut self,
        scheme: IdScheme,
        raw: Option<&str>,
    ) -> RepositoryResult<Option<DataElement>> {
        let Some(identifier) = trim_to_none(raw) else {
            return Ok(None);
        };
        let lookup = &self.lookup;
        self.data_elements
            .get_or_try_load((scheme, identifier.to_string()), || {
                lookup.find_data_element(scheme, identifier)
            })
    }

    pub fn resolve_organisation_unit(
        &mut self,
        scheme: IdScheme,
        raw: Option<&str>,
    ) -> RepositoryResult<Option<OrganisationUnit>> {
        let Some(identifier) = trim_to_none(raw) else {
            return Ok(None);
        };
        let lookup = &self.lookup;
        self.org_units
            .get_or_try_load((scheme, identifier.to_string()), || {
                lookup.find_organisation_unit(scheme, identifier)
            })
    }

    pub fn resolve_option_combo(
        &mut self,
        scheme: IdScheme,
        raw: Option<&str>,
    ) -> RepositoryResult<Option<CategoryOptionCombo>> {
        let Some(identifier) = trim_to_none(raw) else {
            return Ok(None);
        };
        let lookup = &self.lookup;
        self.option_combos
            .get_or_try_load((scheme, identifier.to_string()), || {
                lookup.find_category_option_combo(scheme, identifier)
            })
    }

    pub fn resolve_data_set(&mut self, scheme: IdScheme, raw: Option<&str>) -> RepositoryResult<Option<DataSet>> {
        let Some(identifier) = trim_to_none(raw) else {
            return Ok(None);
        };
        let lookup = &self.lookup;
        self.data_sets
            .get_or_try_load((scheme, identifier.to_string()), || {
                lookup.find_data_set(scheme, identifier)
            })
    }

    /// 周期按 ISO 解析，不依赖存储
    pub fn resolve_period(&mut self, raw: Option<&str>) -> Option<Period> {
        let iso = trim_to_none(raw)?;
        let parsed: Result<Option<Period>, std::convert::Infallible> = self
            .periods
            .get_or_try_load(iso.to_string(), || Ok(Period::parse_iso(iso)));
        parsed.unwrap_or_default()
    }

    /// 系统默认分类选项组合
    pub fn default_option_combo(&mut self) -> RepositoryResult<Option<CategoryOptionCombo>> {
        let lookup = &self.lookup;
        self.default_option_combo
            .get_or_try_load((), || lookup.default_category_option_combo())
    }

    // ==========================================
    // 派生谓词（按稳定 ID 记忆）
    // ==========================================

    pub fn data_element_period_types(&mut self, data_element: &DataElement) -> RepositoryResult<BTreeSet<PeriodType>> {
        let lookup = &self.lookup;
        self.period_types
            .get_or_try_compute(data_element.id, || lookup.data_element_period_types(data_element.id))
    }

    /// 数据元分类组合下的选项组合 ID
    pub fn data_element_option_combo_ids(&mut self, data_element: &DataElement) -> RepositoryResult<HashSet<i64>> {
        let lookup = &self.lookup;
        let combo_id = data_element.category_combo_id;
        self.category_option_combo_ids
            .get_or_try_compute(combo_id, || lookup.category_option_combo_ids(combo_id))
    }

    pub fn data_element_attribute_option_combo_ids(
        &mut self,
        data_element: &DataElement,
    ) -> RepositoryResult<HashSet<i64>> {
        let lookup = &self.lookup;
        self.attribute_option_combo_ids.get_or_try_compute(data_element.id, || {
            lookup.data_set_attribute_option_combo_ids(data_element.id)
        })
    }

    pub fn is_data_element_assigned(
        &mut self,
        data_element: &DataElement,
        org_unit: &OrganisationUnit,
    ) -> RepositoryResult<bool> {
        let lookup = &self.lookup;
        self.org_unit_assignment
            .get_or_try_compute((data_element.id, org_unit.id), || {
                lookup.is_data_element_assigned(data_element.id, org_unit.id)
            })
    }

    pub fn allows_future_periods(&mut self, data_element: &DataElement) -> RepositoryResult<bool> {
        let lookup = &self.lookup;
        self.open_future_periods
            .get_or_try_compute(data_element.id, || lookup.allows_future_periods(data_element.id))
    }

    /// 层级判定（按组织机构记忆）
    pub fn is_in_user_hierarchy(
        &mut self,
        oracle: &dyn HierarchyOracle,
        org_unit: &OrganisationUnit,
        user_roots: &[String],
    ) -> bool {
        let result: Result<bool, std::convert::Infallible> = self
            .in_hierarchy
            .get_or_try_compute(org_unit.id, || Ok(oracle.is_in_user_hierarchy(org_unit, user_roots)));
        result.unwrap_or(false)
    }

    /// 数据元底层查找次数（测试 / 日志）
    pub fn data_element_loads(&self) -> usize {
        self.data_elements.loads()
    }
}
