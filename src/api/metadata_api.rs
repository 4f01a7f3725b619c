// ==========================================
// 数据值导入系统 - 元数据维护 API
// ==========================================
// 职责: 元数据按 UID 保存（显式合并）；分类组合维护与选项组合对账
// 说明: 导入期间元数据只读；这里是导入之外的唯一写入口
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::category::{Category, CategoryCombo, CategoryOptionCombo};
use crate::domain::merge::Mergeable;
use crate::domain::metadata::{DataElement, DataSet, OrganisationUnit};
use crate::domain::types::{IdScheme, MergeMode};
use crate::engine::category_service::CategoryService;
use crate::engine::collaborators::MetadataLookup;
use crate::repository::{CategoryRepository, MetadataRepository};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct MetadataApi {
    metadata: Arc<MetadataRepository>,
    categories: CategoryService,
}

impl MetadataApi {
    pub fn new(db_path: &str) -> ApiResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(format!("{}: {}", db_path, e)))?;
        init_schema(&conn).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            metadata: Arc::new(MetadataRepository::new(conn.clone())),
            categories: CategoryService::new(Arc::new(CategoryRepository::new(conn))),
        }
    }

    // ==========================================
    // 元数据保存（按 UID 新增或合并更新）
    // ==========================================

    /// 保存数据元
    ///
    /// # 返回
    /// 持久化后的内部 ID
    pub fn save_data_element(&self, incoming: &DataElement, mode: MergeMode) -> ApiResult<i64> {
        require_uid(&incoming.uid)?;
        match self.metadata.find_data_element(IdScheme::Uid, &incoming.uid)? {
            Some(mut persisted) => {
                persisted.merge_from(incoming, mode);
                self.metadata.update_data_element(&persisted)?;
                info!(uid = %persisted.uid, mode = ?mode, "数据元已更新");
                Ok(persisted.id)
            }
            None => {
                let id = self.metadata.insert_data_element(incoming)?;
                info!(uid = %incoming.uid, id, "数据元已新增");
                Ok(id)
            }
        }
    }

    /// 保存组织机构（path 由父节点重新推导）
    pub fn save_organisation_unit(&self, incoming: &OrganisationUnit, mode: MergeMode) -> ApiResult<i64> {
        require_uid(&incoming.uid)?;
        match self.metadata.find_organisation_unit(IdScheme::Uid, &incoming.uid)? {
            Some(mut persisted) => {
                persisted.merge_from(incoming, mode);
                self.metadata.update_organisation_unit(&persisted)?;
                Ok(persisted.id)
            }
            None => Ok(self.metadata.insert_organisation_unit(incoming)?),
        }
    }

    /// 保存数据集（成员关系随合并结果整体替换）
    pub fn save_data_set(&self, incoming: &DataSet, mode: MergeMode) -> ApiResult<i64> {
        require_uid(&incoming.uid)?;
        match self.metadata.find_data_set(IdScheme::Uid, &incoming.uid)? {
            Some(mut persisted) => {
                persisted.merge_from(incoming, mode);
                self.metadata.update_data_set(&persisted)?;
                info!(uid = %persisted.uid, mode = ?mode, "数据集已更新");
                Ok(persisted.id)
            }
            None => Ok(self.metadata.insert_data_set(incoming)?),
        }
    }

    // ==========================================
    // 分类维度
    // ==========================================

    pub fn generate_default_dimension(&self) -> ApiResult<CategoryCombo> {
        Ok(self.categories.generate_default_dimension()?)
    }

    /// 保存分类；包含它的组合会追加缺失选项组合
    ///
    /// # 返回
    /// - `Ok(added)`: 新增选项组合数
    pub fn save_category(&self, incoming: &Category, mode: MergeMode) -> ApiResult<usize> {
        require_uid(&incoming.uid)?;
        let (_, added) = self.categories.save_category(incoming, mode)?;
        Ok(added)
    }

    /// 保存分类组合；结构非法时返回 ValidationError
    pub fn save_category_combo(&self, incoming: &CategoryCombo, mode: MergeMode) -> ApiResult<CategoryCombo> {
        require_uid(&incoming.uid)?;
        Ok(self.categories.save_category_combo(incoming, mode)?)
    }

    pub fn update_option_combos_for_category(&self, category_uid: &str) -> ApiResult<usize> {
        Ok(self.categories.update_option_combos_for_category(category_uid)?)
    }

    pub fn update_all_option_combos(&self) -> ApiResult<usize> {
        Ok(self.categories.update_all_option_combos()?)
    }

    /// 按展示顺序返回选项组合
    pub fn sorted_option_combos(&self, category_combo_uid: &str) -> ApiResult<Vec<CategoryOptionCombo>> {
        Ok(self.categories.sorted_option_combos(category_combo_uid)?)
    }
}

fn require_uid(uid: &str) -> ApiResult<()> {
    if uid.trim().is_empty() {
        return Err(ApiError::InvalidInput("UID 不能为空".to_string()));
    }
    Ok(())
}
