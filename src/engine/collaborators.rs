// ==========================================
// 数据值导入系统 - 引擎层协作者接口
// ==========================================
// 职责: 定义导入管道依赖的外部协作者 trait，实现依赖倒置
// 说明: Engine 层定义 trait，Repository 层实现（SQLite）
// ==========================================

use crate::domain::category::CategoryOptionCombo;
use crate::domain::data_value::{CompleteDataSetRegistration, DataValue, DataValueKey};
use crate::domain::metadata::{DataElement, DataSet, OrganisationUnit};
use crate::domain::types::{IdScheme, PeriodType};
use crate::repository::error::RepositoryResult;
use std::collections::{BTreeSet, HashSet};

// ==========================================
// MetadataLookup - 按标识方案查找元数据
// ==========================================
// 实现者: MetadataRepository
pub trait MetadataLookup: Send + Sync {
    fn find_data_element(&self, scheme: IdScheme, identifier: &str) -> RepositoryResult<Option<DataElement>>;

    fn find_organisation_unit(
        &self,
        scheme: IdScheme,
        identifier: &str,
    ) -> RepositoryResult<Option<OrganisationUnit>>;

    fn find_category_option_combo(
        &self,
        scheme: IdScheme,
        identifier: &str,
    ) -> RepositoryResult<Option<CategoryOptionCombo>>;

    fn find_data_set(&self, scheme: IdScheme, identifier: &str) -> RepositoryResult<Option<DataSet>>;

    /// 系统默认分类选项组合（名称为 default）
    fn default_category_option_combo(&self) -> RepositoryResult<Option<CategoryOptionCombo>>;

    /// 全量数据元（缓存预热）
    fn all_data_elements(&self) -> RepositoryResult<Vec<DataElement>>;

    /// 全量组织机构（缓存预热）
    fn all_organisation_units(&self) -> RepositoryResult<Vec<OrganisationUnit>>;

    // ===== 派生谓词 =====

    /// 数据元经由数据集派生的允许周期类型
    fn data_element_period_types(&self, data_element_id: i64) -> RepositoryResult<BTreeSet<PeriodType>>;

    /// 分类组合下的全部分类选项组合 ID
    fn category_option_combo_ids(&self, category_combo_id: i64) -> RepositoryResult<HashSet<i64>>;

    /// 包含该数据元的所有数据集的属性组合所生成的选项组合 ID（并集）
    fn data_set_attribute_option_combo_ids(&self, data_element_id: i64) -> RepositoryResult<HashSet<i64>>;

    /// 数据元是否经由数据集分配给该组织机构
    fn is_data_element_assigned(&self, data_element_id: i64, org_unit_id: i64) -> RepositoryResult<bool>;

    /// 数据元是否允许采集未来周期（任一数据集 open_future_periods > 0）
    fn allows_future_periods(&self, data_element_id: i64) -> RepositoryResult<bool>;
}

// ==========================================
// HierarchyOracle - 组织机构层级判定
// ==========================================
pub trait HierarchyOracle: Send + Sync {
    /// 组织机构是否位于当前用户的可访问层级内
    fn is_in_user_hierarchy(&self, org_unit: &OrganisationUnit, user_roots: &[String]) -> bool;
}

/// 基于 path 的层级判定
#[derive(Debug, Clone, Copy, Default)]
pub struct PathHierarchyOracle;

impl HierarchyOracle for PathHierarchyOracle {
    fn is_in_user_hierarchy(&self, org_unit: &OrganisationUnit, user_roots: &[String]) -> bool {
        org_unit.is_descendant_of_any(user_roots)
    }
}

// ==========================================
// CurrentUserProvider - 当前操作用户
// ==========================================
pub trait CurrentUserProvider: Send + Sync {
    fn current_username(&self) -> String;

    /// 用户被分配的组织机构 UID（层级根）
    fn current_org_unit_uids(&self) -> Vec<String>;
}

/// 固定用户（命令行 / 测试）
#[derive(Debug, Clone)]
pub struct StaticUserProvider {
    username: String,
    org_unit_uids: Vec<String>,
}

impl StaticUserProvider {
    pub fn new(username: impl Into<String>, org_unit_uids: Vec<String>) -> Self {
        Self {
            username: username.into(),
            org_unit_uids,
        }
    }
}

impl CurrentUserProvider for StaticUserProvider {
    fn current_username(&self) -> String {
        self.username.clone()
    }

    fn current_org_unit_uids(&self) -> Vec<String> {
        self.org_unit_uids.clone()
    }
}

// ==========================================
// DataValueStore - 数据值持久化
// ==========================================
// 实现者: DataValueRepository
pub trait DataValueStore: Send + Sync {
    fn find(&self, key: &DataValueKey) -> RepositoryResult<Option<DataValue>>;

    fn exists(&self, key: &DataValueKey) -> RepositoryResult<bool> {
        Ok(self.find(key)?.is_some())
    }

    /// 在一个事务内应用整批写操作，失败则整批回滚
    fn apply_batch(&self, ops: &[WriteOp]) -> RepositoryResult<usize>;
}

/// 单条写操作
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert(DataValue),
    Update(DataValue),
    Delete(DataValueKey),
}

// ==========================================
// RegistrationStore - 完成登记持久化
// ==========================================
// 实现者: RegistrationRepository
pub trait RegistrationStore: Send + Sync {
    fn find_registration(
        &self,
        data_set_id: i64,
        period: &str,
        org_unit_id: i64,
        attribute_option_combo_id: i64,
    ) -> RepositoryResult<Option<CompleteDataSetRegistration>>;

    /// 插入，返回新 ID
    fn insert_registration(&self, registration: &CompleteDataSetRegistration) -> RepositoryResult<i64>;

    /// 按 ID 原地更新 date / stored_by
    fn update_registration(&self, registration: &CompleteDataSetRegistration) -> RepositoryResult<()>;
}
